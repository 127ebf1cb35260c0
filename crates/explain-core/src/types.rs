use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical identity of a GitHub repository.
///
/// Produced once per invocation by [`crate::resolve`] and read by every
/// later stage. Both fields are non-empty and contain no path separators.
///
/// # Examples
///
/// ```
/// use explain_core::RepositoryRef;
///
/// let repo = RepositoryRef::new("rust-lang", "cargo");
/// assert_eq!(repo.to_string(), "rust-lang/cargo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    /// Account or organization that owns the repository.
    pub owner: String,
    /// Repository name, without a `.git` suffix.
    pub repo: String,
}

impl RepositoryRef {
    /// Build a reference from already-validated parts.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// A filesystem-safe slug, used for cache file names.
    ///
    /// # Examples
    ///
    /// ```
    /// use explain_core::RepositoryRef;
    ///
    /// assert_eq!(RepositoryRef::new("a", "b").slug(), "a__b");
    /// ```
    pub fn slug(&self) -> String {
        format!("{}__{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Repository metadata as returned by the GitHub repos endpoint.
///
/// Only the fields the prompts and reports use are kept; everything is
/// optional because forks, mirrors and empty repositories omit some of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoMetadata {
    /// `owner/repo` as GitHub spells it.
    #[serde(default)]
    pub full_name: String,
    /// Short description set by the owner.
    #[serde(default)]
    pub description: Option<String>,
    /// Default branch name.
    #[serde(default)]
    pub default_branch: Option<String>,
    /// Star count.
    #[serde(default)]
    pub stargazers_count: Option<u64>,
    /// Primary language detected by GitHub.
    #[serde(default)]
    pub language: Option<String>,
    /// Browser URL of the repository.
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A regular file.
    File,
    /// A directory.
    Dir,
    /// Symlinks, submodules and anything else that is neither.
    Other,
}

impl EntryKind {
    /// Map the GitHub contents API `type` field.
    ///
    /// # Examples
    ///
    /// ```
    /// use explain_core::EntryKind;
    ///
    /// assert_eq!(EntryKind::from_github("dir"), EntryKind::Dir);
    /// assert_eq!(EntryKind::from_github("submodule"), EntryKind::Other);
    /// ```
    pub fn from_github(kind: &str) -> Self {
        match kind {
            "file" => EntryKind::File,
            "dir" => EntryKind::Dir,
            _ => EntryKind::Other,
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Base name.
    pub name: String,
    /// File, directory or other.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
}

/// Output format for CLI reports.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use explain_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "md".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn repo_metadata_tolerates_missing_fields() {
        let meta: RepoMetadata =
            serde_json::from_str(r#"{"full_name":"a/b","stargazers_count":7}"#).unwrap();
        assert_eq!(meta.full_name, "a/b");
        assert_eq!(meta.stargazers_count, Some(7));
        assert!(meta.description.is_none());
        assert!(meta.default_branch.is_none());
    }

    #[test]
    fn tree_entry_uses_github_type_key() {
        let entry = TreeEntry {
            name: "src".into(),
            kind: EntryKind::Dir,
            path: "src".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "dir");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn repository_ref_display_and_slug() {
        let repo = RepositoryRef::new("octocat", "hello-world");
        assert_eq!(repo.to_string(), "octocat/hello-world");
        assert_eq!(repo.slug(), "octocat__hello-world");
    }
}
