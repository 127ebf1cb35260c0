use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::depth::Depth;
use crate::error::ExplainError;

/// Top-level configuration loaded from `.explain.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use explain_core::ExplainConfig;
///
/// let config = ExplainConfig::default();
/// assert_eq!(config.output.file, "EXPLAIN.md");
/// assert_eq!(config.llm.provider, "gemini");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplainConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// GitHub access settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Report output settings.
    #[serde(default)]
    pub output: OutputConfig,
    /// Analysis agent settings.
    #[serde(default)]
    pub agent: AgentSettings,
}

impl ExplainConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Io`] if the file cannot be read, or
    /// [`ExplainError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use explain_core::ExplainConfig;
    /// use std::path::Path;
    ///
    /// let config = ExplainConfig::from_file(Path::new(".explain.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, ExplainError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use explain_core::ExplainConfig;
    ///
    /// let toml = r#"
    /// [output]
    /// file = "REPORT.md"
    /// "#;
    /// let config = ExplainConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.output.file, "REPORT.md");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ExplainError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay secrets from the process environment.
    ///
    /// A non-blank environment value replaces the file value; CLI flags
    /// are applied by the caller afterwards.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env`](Self::apply_env) with an injectable lookup.
    ///
    /// # Examples
    ///
    /// ```
    /// use explain_core::ExplainConfig;
    ///
    /// let mut config = ExplainConfig::default();
    /// config.apply_env_with(|key| (key == "GH_TOKEN").then(|| "t0k".to_string()));
    /// assert_eq!(config.github.token.as_deref(), Some("t0k"));
    /// ```
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let found = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
        };
        if let Some(key) = found(self.llm.api_key_env_vars()) {
            self.llm.api_key = Some(key);
        }
        if let Some(token) = found(&["GITHUB_TOKEN", "GH_TOKEN"]) {
            self.github.token = Some(token);
        }
    }
}

/// LLM provider configuration.
///
/// # Examples
///
/// ```
/// use explain_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gemini-2.5-flash-lite");
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (`"gemini"` or `"openai"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Retries after the first attempt on transient failures (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request timeout in seconds (default: 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "gemini".into()
}

fn default_model() -> String {
    "gemini-2.5-flash-lite".into()
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Environment variables consulted for the API key, in order.
    ///
    /// # Examples
    ///
    /// ```
    /// use explain_core::LlmConfig;
    ///
    /// assert_eq!(LlmConfig::default().api_key_env_vars(), &["GEMINI_API_KEY", "GOOGLE_API_KEY"]);
    /// ```
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self.provider.as_str() {
            "openai" => &["OPENAI_API_KEY"],
            _ => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }
}

/// GitHub access configuration.
///
/// # Examples
///
/// ```
/// use explain_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert_eq!(config.fallback_branch, "master");
/// assert_eq!(config.remote_max_depth, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token; raises the API rate limit.
    pub token: Option<String>,
    /// REST API root.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Raw content root.
    #[serde(default = "default_raw_base_url")]
    pub raw_base_url: String,
    /// Branch tried when the default branch has no such file.
    #[serde(default = "default_fallback_branch")]
    pub fallback_branch: String,
    /// Directory depth of remote signal walks.
    #[serde(default = "default_remote_max_depth")]
    pub remote_max_depth: usize,
}

fn default_api_base_url() -> String {
    "https://api.github.com".into()
}

fn default_raw_base_url() -> String {
    "https://raw.githubusercontent.com".into()
}

fn default_fallback_branch() -> String {
    "master".into()
}

fn default_remote_max_depth() -> usize {
    3
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base_url: default_api_base_url(),
            raw_base_url: default_raw_base_url(),
            fallback_branch: default_fallback_branch(),
            remote_max_depth: default_remote_max_depth(),
        }
    }
}

/// Report output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File receiving standard, detailed, council and agent reports.
    #[serde(default = "default_output_file")]
    pub file: String,
}

fn default_output_file() -> String {
    "EXPLAIN.md".into()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: default_output_file(),
        }
    }
}

/// Analysis agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Depth profile used when `--depth` is not given.
    #[serde(default)]
    pub depth: Depth,
}
