use std::path::PathBuf;

/// Errors that can occur across explainthisrepo.
///
/// Reference errors are user-input errors and are always shown verbatim.
/// [`ExplainError::Signal`] and [`ExplainError::ReviewerFailure`] are
/// recoverable: callers absorb them and degrade to placeholder output.
/// Library crates use this type directly; the binary renders it through
/// `miette` so the `help` hints reach the user.
///
/// # Examples
///
/// ```
/// use explain_core::ExplainError;
///
/// let err = ExplainError::InvalidReference("nope".into());
/// assert!(err.to_string().contains("nope"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ExplainError {
    /// The reference matched none of the accepted shapes.
    #[error("invalid repository reference '{0}': use owner/repo or a GitHub repo URL")]
    #[diagnostic(
        code(explain::reference::invalid),
        help("accepted forms: owner/repo, github.com/owner/repo, https://github.com/owner/repo, git@github.com:owner/repo.git")
    )]
    InvalidReference(String),

    /// A URL pointed at a host other than github.com.
    #[error("unsupported host '{0}': only GitHub repository URLs are supported")]
    #[diagnostic(code(explain::reference::host))]
    UnsupportedHost(String),

    /// A GitHub URL without an owner and repository segment.
    #[error("'{0}' must point to a repository, not a GitHub page")]
    #[diagnostic(code(explain::reference::missing_repo))]
    MissingRepository(String),

    /// Signal extraction failed; callers downgrade this to a warning.
    #[error("could not read repository files: {0}")]
    #[diagnostic(code(explain::signal))]
    Signal(String),

    /// The language model call failed or returned no usable text.
    #[error("failed to generate explanation: {0}")]
    #[diagnostic(
        code(explain::generation),
        help("ensure the API key for your LLM provider is set, or run: explainthisrepo --doctor")
    )]
    Generation(String),

    /// A single council reviewer failed.
    #[error("{reviewer} failed: {reason}")]
    #[diagnostic(code(explain::council::reviewer))]
    ReviewerFailure {
        /// Display name of the reviewer.
        reviewer: String,
        /// Underlying failure.
        reason: String,
    },

    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// GitHub API failure.
    #[error("GitHub error: {0}")]
    #[diagnostic(help(
        "ensure the repository exists and is public, or set GITHUB_TOKEN to avoid rate limits"
    ))]
    GitHub(String),

    /// LLM transport or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// A tool call could not be executed.
    #[error("tool error: {0}")]
    Tool(String),

    /// The agent loop could not produce a final answer.
    #[error("agent error: {0}")]
    Agent(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl ExplainError {
    /// Returns `true` for the resolver's user-input error class.
    ///
    /// # Examples
    ///
    /// ```
    /// use explain_core::ExplainError;
    ///
    /// assert!(ExplainError::UnsupportedHost("gitlab.com".into()).is_reference_error());
    /// assert!(!ExplainError::Llm("timeout".into()).is_reference_error());
    /// ```
    pub fn is_reference_error(&self) -> bool {
        matches!(
            self,
            ExplainError::InvalidReference(_)
                | ExplainError::UnsupportedHost(_)
                | ExplainError::MissingRepository(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ExplainError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = ExplainError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn reviewer_failure_names_reviewer() {
        let err = ExplainError::ReviewerFailure {
            reviewer: "Security Auditor".into(),
            reason: "model timeout".into(),
        };
        assert_eq!(err.to_string(), "Security Auditor failed: model timeout");
    }

    #[test]
    fn generation_error_has_help() {
        use miette::Diagnostic;

        let err = ExplainError::Generation("empty response".into());
        let help = err.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("--doctor"));
    }

    #[test]
    fn only_resolver_errors_are_reference_errors() {
        assert!(ExplainError::InvalidReference("x".into()).is_reference_error());
        assert!(ExplainError::MissingRepository("x".into()).is_reference_error());
        assert!(!ExplainError::GitHub("404".into()).is_reference_error());
        assert!(!ExplainError::Signal("x".into()).is_reference_error());
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = ExplainError::FileNotFound(PathBuf::from("/tmp/missing.md"));
        assert!(err.to_string().contains("/tmp/missing.md"));
    }
}
