use std::sync::Arc;

use async_trait::async_trait;
use explain_core::{EntryKind, ExplainError, GitHubConfig, RepoMetadata, RepositoryRef, TreeEntry};
use explain_signal::extract::is_skipped_dir;
use explain_signal::TreeSource;
use serde::Deserialize;
use tracing::debug;

const USER_AGENT: &str = concat!("explainthisrepo/", env!("CARGO_PKG_VERSION"));

/// Read-only access to a hosted repository.
///
/// [`GitHubClient`] is the production implementation; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait RepoApi: Send + Sync {
    /// Repository metadata.
    async fn fetch_repo_metadata(&self, owner: &str, repo: &str)
        -> explain_core::Result<RepoMetadata>;

    /// Raw README text, or `None` if the repository has none.
    async fn fetch_readme(&self, owner: &str, repo: &str) -> explain_core::Result<Option<String>>;

    /// Entries under `path`, descending at most `max_depth` levels (1 = direct children).
    async fn fetch_file_tree(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        max_depth: usize,
    ) -> explain_core::Result<Vec<TreeEntry>>;

    /// Raw file text from the default branch, then the fallback branch.
    async fn fetch_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> explain_core::Result<String>;

    /// `(language, bytes)` pairs, largest first.
    async fn fetch_languages(&self, owner: &str, repo: &str)
        -> explain_core::Result<Vec<(String, u64)>>;
}

/// One item of the GitHub contents API.
#[derive(Debug, Deserialize)]
struct ContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl From<ContentItem> for TreeEntry {
    fn from(item: ContentItem) -> Self {
        TreeEntry {
            kind: EntryKind::from_github(&item.kind),
            name: item.name,
            path: item.path,
        }
    }
}

/// The contents endpoint returns an array for directories and an object for files.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Contents {
    Dir(Vec<ContentItem>),
    File(ContentItem),
}

/// GitHub REST client for repository metadata and content.
///
/// Metadata, listings and languages go through `octocrab`; README and raw
/// file bodies are fetched with `reqwest` as plain text.
///
/// # Examples
///
/// ```no_run
/// use explain_core::GitHubConfig;
/// use explain_agent::github::GitHubClient;
///
/// let client = GitHubClient::new(&GitHubConfig::default()).unwrap();
/// ```
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    http: reqwest::Client,
    config: GitHubConfig,
}

impl GitHubClient {
    /// Create a client; a token is optional and only raises rate limits.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::GitHub`] if the client cannot be built.
    pub fn new(config: &GitHubConfig) -> explain_core::Result<Self> {
        let mut builder = octocrab::Octocrab::builder()
            .base_uri(config.api_base_url.as_str())
            .map_err(|e| ExplainError::GitHub(format!("invalid GitHub API URL: {e}")))?;
        if let Some(token) = &config.token {
            builder = builder.personal_token(token.clone());
        }
        let octocrab = builder
            .build()
            .map_err(|e| ExplainError::GitHub(format!("failed to create GitHub client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ExplainError::GitHub(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            octocrab,
            http,
            config: config.clone(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn list_contents(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> explain_core::Result<Vec<TreeEntry>> {
        let route = contents_route(owner, repo, path);
        let contents: Contents = self
            .octocrab
            .get(&route, None::<&()>)
            .await
            .map_err(|e| ExplainError::GitHub(format!("failed to fetch file tree at '{path}': {e}")))?;

        let mut entries: Vec<TreeEntry> = match contents {
            Contents::Dir(items) => items.into_iter().map(TreeEntry::from).collect(),
            Contents::File(item) => vec![item.into()],
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_raw(&self, url: &str) -> explain_core::Result<Option<String>> {
        let response = self
            .authorized(self.http.get(url))
            .send()
            .await
            .map_err(|e| ExplainError::GitHub(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExplainError::GitHub(format!("GitHub error {status}: {body}")));
        }
        response
            .text()
            .await
            .map(Some)
            .map_err(|e| ExplainError::GitHub(format!("failed to read response: {e}")))
    }
}

fn contents_route(owner: &str, repo: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        format!("/repos/{owner}/{repo}/contents")
    } else {
        format!("/repos/{owner}/{repo}/contents/{path}")
    }
}

#[async_trait]
impl RepoApi for GitHubClient {
    async fn fetch_repo_metadata(
        &self,
        owner: &str,
        repo: &str,
    ) -> explain_core::Result<RepoMetadata> {
        debug!(owner, repo, "fetching repository metadata");
        self.octocrab
            .get(format!("/repos/{owner}/{repo}"), None::<&()>)
            .await
            .map_err(|e| ExplainError::GitHub(format!("failed to fetch metadata for {owner}/{repo}: {e}")))
    }

    async fn fetch_readme(&self, owner: &str, repo: &str) -> explain_core::Result<Option<String>> {
        let url = format!(
            "{}/repos/{owner}/{repo}/readme",
            self.config.api_base_url.trim_end_matches('/')
        );
        let response = self
            .authorized(self.http.get(&url))
            .header("Accept", "application/vnd.github.v3.raw")
            .send()
            .await
            .map_err(|e| ExplainError::GitHub(format!("failed to fetch README: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExplainError::GitHub(format!(
                "failed to fetch README: {status} - {body}"
            )));
        }
        response
            .text()
            .await
            .map(Some)
            .map_err(|e| ExplainError::GitHub(format!("failed to read README: {e}")))
    }

    async fn fetch_file_tree(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        max_depth: usize,
    ) -> explain_core::Result<Vec<TreeEntry>> {
        let mut out = Vec::new();
        let mut stack = vec![(path.to_string(), 1usize)];

        while let Some((dir, depth)) = stack.pop() {
            let entries = self.list_contents(owner, repo, &dir).await?;
            let mut subdirs = Vec::new();
            for entry in entries {
                if entry.kind == EntryKind::Dir && depth < max_depth && !is_skipped_dir(&entry.name)
                {
                    subdirs.push(entry.path.clone());
                }
                out.push(entry);
            }
            for sub in subdirs.into_iter().rev() {
                stack.push((sub, depth + 1));
            }
        }
        Ok(out)
    }

    async fn fetch_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> explain_core::Result<String> {
        let root = self.config.raw_base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        // `HEAD` resolves to the default branch on the raw host.
        for branch in ["HEAD", self.config.fallback_branch.as_str()] {
            let url = format!("{root}/{owner}/{repo}/{branch}/{path}");
            if let Some(text) = self.get_raw(&url).await? {
                return Ok(text);
            }
        }
        Err(ExplainError::GitHub(format!(
            "failed to fetch file content at '{path}': 404 Not Found"
        )))
    }

    async fn fetch_languages(
        &self,
        owner: &str,
        repo: &str,
    ) -> explain_core::Result<Vec<(String, u64)>> {
        let map: std::collections::HashMap<String, u64> = self
            .octocrab
            .get(format!("/repos/{owner}/{repo}/languages"), None::<&()>)
            .await
            .map_err(|e| ExplainError::GitHub(format!("failed to fetch languages: {e}")))?;
        Ok(sort_languages(map.into_iter().collect()))
    }
}

/// Order languages by byte count, largest first, ties by name.
pub fn sort_languages(mut langs: Vec<(String, u64)>) -> Vec<(String, u64)> {
    langs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    langs
}

/// A [`TreeSource`] over a hosted repository.
///
/// Each `list_dir` costs one API call, so remote walks should be bounded
/// with [`explain_signal::SignalLimits::with_max_depth`].
pub struct RemoteTree {
    api: Arc<dyn RepoApi>,
    repo: RepositoryRef,
}

impl RemoteTree {
    /// Wrap `api` for walking `repo`.
    pub fn new(api: Arc<dyn RepoApi>, repo: RepositoryRef) -> Self {
        Self { api, repo }
    }
}

#[async_trait]
impl TreeSource for RemoteTree {
    async fn list_dir(&self, dir: &str) -> explain_core::Result<Vec<TreeEntry>> {
        self.api
            .fetch_file_tree(&self.repo.owner, &self.repo.repo, dir, 1)
            .await
    }

    async fn read_file(&self, path: &str, max_bytes: usize) -> explain_core::Result<Vec<u8>> {
        let text = self
            .api
            .fetch_file_content(&self.repo.owner, &self.repo.repo, path)
            .await?;
        let mut bytes = text.into_bytes();
        bytes.truncate(max_bytes);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contents_route_handles_root_and_nested() {
        assert_eq!(contents_route("a", "b", ""), "/repos/a/b/contents");
        assert_eq!(contents_route("a", "b", "/src/"), "/repos/a/b/contents/src");
    }

    #[test]
    fn contents_accepts_dir_and_file_shapes() {
        let dir: Contents = serde_json::from_str(
            r#"[{"name":"src","path":"src","type":"dir","sha":"x"},{"name":"a.rs","path":"a.rs","type":"file"}]"#,
        )
        .unwrap();
        assert!(matches!(dir, Contents::Dir(ref items) if items.len() == 2));

        let file: Contents =
            serde_json::from_str(r#"{"name":"a.rs","path":"a.rs","type":"file"}"#).unwrap();
        let Contents::File(item) = file else {
            panic!("expected a single file");
        };
        assert_eq!(TreeEntry::from(item).kind, EntryKind::File);
    }

    #[test]
    fn languages_sort_by_bytes() {
        let sorted = sort_languages(vec![
            ("Shell".into(), 10),
            ("Rust".into(), 900),
            ("C".into(), 10),
        ]);
        let names: Vec<&str> = sorted.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Rust", "C", "Shell"]);
    }

    #[tokio::test]
    async fn client_builds_without_token() {
        assert!(GitHubClient::new(&GitHubConfig::default()).is_ok());
    }
}
