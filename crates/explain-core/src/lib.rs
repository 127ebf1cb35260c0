//! Core types, configuration, and error handling for explainthisrepo.
//!
//! This crate provides the shared foundation used by the other crates:
//! - [`ExplainError`] — unified error type using `thiserror` and `miette`
//! - [`ExplainConfig`] — layered configuration loaded from `.explain.toml`
//! - [`resolve`] — the repository reference resolver
//! - [`DepthProfile`] — the fixed depth policy table
//! - Shared types: [`RepositoryRef`], [`RepoMetadata`], [`TreeEntry`],
//!   [`EntryKind`], [`OutputFormat`]

mod config;
mod depth;
mod error;
mod reference;
mod types;

pub use config::{AgentSettings, ExplainConfig, GitHubConfig, LlmConfig, OutputConfig};
pub use depth::{
    BudgetMode, BudgetStrategy, ContextBudget, Depth, DepthProfile, MemoryBackend, ToolOffload,
};
pub use error::ExplainError;
pub use reference::resolve;
pub use types::{EntryKind, OutputFormat, RepoMetadata, RepositoryRef, TreeEntry};

/// A convenience `Result` type for explainthisrepo operations.
pub type Result<T> = std::result::Result<T, ExplainError>;
