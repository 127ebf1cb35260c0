//! Model-facing orchestration for explainthisrepo.
//!
//! Provides the GitHub collaborator, the LLM client, prompt assembly, the
//! static tool registry, the bounded analysis agent, the three-reviewer
//! council and the single-shot explanation pipeline.

pub mod agent;
pub mod council;
pub mod github;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod prompt;
pub mod tools;
