//! Static tool registry offered to the analysis agent.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use explain_core::{ExplainError, ToolOffload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::github::RepoApi;

/// Default `max_depth` of `fetch_file_tree` when the model omits it.
const DEFAULT_TREE_DEPTH: usize = 2;

/// Rough token estimate: four characters per token.
///
/// # Examples
///
/// ```
/// use explain_agent::tools::estimate_tokens;
///
/// assert_eq!(estimate_tokens("abcdefgh"), 2);
/// assert_eq!(estimate_tokens("abc"), 1);
/// assert_eq!(estimate_tokens(""), 0);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Every tool the agent can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Repository metadata.
    FetchRepo,
    /// Raw README text.
    FetchReadme,
    /// Directory listing.
    FetchFileTree,
    /// Raw file text.
    FetchFileContent,
    /// Mermaid graph from nodes and edges.
    GenerateMermaidDiagram,
    /// A page of an offloaded tool output.
    ReadOffloaded,
}

impl ToolName {
    /// All tools in catalog order.
    pub const ALL: [ToolName; 6] = [
        ToolName::FetchRepo,
        ToolName::FetchReadme,
        ToolName::FetchFileTree,
        ToolName::FetchFileContent,
        ToolName::GenerateMermaidDiagram,
        ToolName::ReadOffloaded,
    ];

    /// Wire name used in tool calls.
    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::FetchRepo => "fetch_repo",
            ToolName::FetchReadme => "fetch_readme",
            ToolName::FetchFileTree => "fetch_file_tree",
            ToolName::FetchFileContent => "fetch_file_content",
            ToolName::GenerateMermaidDiagram => "generate_mermaid_diagram",
            ToolName::ReadOffloaded => "read_offloaded",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ToolName::FetchRepo => {
                "Fetch metadata for a GitHub repository: description, stars, language and default branch."
            }
            ToolName::FetchReadme => "Fetch the raw text content of the repository's README file.",
            ToolName::FetchFileTree => {
                "Fetch the file structure of the repository to explore its layout and find source files."
            }
            ToolName::FetchFileContent => "Read the content of a specific file.",
            ToolName::GenerateMermaidDiagram => {
                "Generate a Mermaid.js graph definition from node names and [source, target, label?] edges."
            }
            ToolName::ReadOffloaded => {
                "Read a page of a tool output that was too large to show inline, by its digest."
            }
        }
    }

    fn arguments(self) -> &'static str {
        match self {
            ToolName::FetchRepo | ToolName::FetchReadme => {
                r#"{"owner": string, "repo": string}"#
            }
            ToolName::FetchFileTree => {
                r#"{"owner": string, "repo": string, "path"?: string, "max_depth"?: integer (default 2)}"#
            }
            ToolName::FetchFileContent => r#"{"owner": string, "repo": string, "path": string}"#,
            ToolName::GenerateMermaidDiagram => {
                r#"{"nodes": [string], "edges": [[source, target] or [source, target, label]]}"#
            }
            ToolName::ReadOffloaded => {
                r#"{"digest": string, "offset"?: integer (characters, default 0), "limit"?: integer}"#
            }
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ExplainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ExplainError::Tool(format!("unknown tool '{s}'")))
    }
}

/// Render the catalog of `tools` for the system prompt.
pub fn describe_tools(tools: &[ToolName]) -> String {
    tools
        .iter()
        .map(|t| format!("- {}: {}\n  arguments: {}", t, t.description(), t.arguments()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One tool invocation as emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool wire name.
    pub tool: String,
    /// JSON arguments object.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Result of one tool call, ready to be shown to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// JSON envelope, or a preview when offloaded.
    pub text: String,
    /// Where the full output was stored, if it was offloaded.
    pub offloaded: Option<PathBuf>,
    /// `false` when the envelope carries `"status": "error"`.
    pub success: bool,
}

#[derive(Deserialize)]
struct RepoArgs {
    owner: String,
    repo: String,
}

#[derive(Deserialize)]
struct TreeArgs {
    owner: String,
    repo: String,
    #[serde(default)]
    path: String,
    #[serde(default = "default_tree_depth")]
    max_depth: usize,
}

fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}

#[derive(Deserialize)]
struct FileArgs {
    owner: String,
    repo: String,
    path: String,
}

#[derive(Deserialize)]
struct PageArgs {
    digest: String,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

/// One page of an offloaded output.
#[derive(Debug, Serialize)]
struct OffloadPage {
    digest: String,
    offset: usize,
    total_chars: usize,
    next_offset: Option<usize>,
    text: String,
}

#[derive(Deserialize)]
struct MermaidArgs {
    nodes: Vec<String>,
    #[serde(default)]
    edges: Vec<Vec<String>>,
}

fn parse_args<T: DeserializeOwned>(tool: ToolName, value: &serde_json::Value) -> explain_core::Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| ExplainError::Tool(format!("invalid arguments for {tool}: {e}")))
}

/// Alphanumeric characters of `label`, used as a Mermaid node id.
fn mermaid_id(label: &str) -> String {
    label.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// Make `text` safe inside a quoted label or an edge `|label|`.
fn mermaid_text(text: &str) -> String {
    text.replace('"', "#quot;").replace('|', "#124;")
}

/// Build a Mermaid `graph TD` definition.
///
/// Edges with fewer than two or more than three items are ignored.
///
/// # Examples
///
/// ```
/// use explain_agent::tools::generate_mermaid_diagram;
///
/// let nodes = vec!["CLI".to_string(), "Core Lib".to_string()];
/// let edges = vec![vec!["CLI".to_string(), "Core Lib".to_string(), "calls".to_string()]];
/// let graph = generate_mermaid_diagram(&nodes, &edges);
/// assert_eq!(graph, "graph TD\n    CLI[\"CLI\"]\n    CoreLib[\"Core Lib\"]\n    CLI -->|calls| CoreLib");
/// ```
pub fn generate_mermaid_diagram(nodes: &[String], edges: &[Vec<String>]) -> String {
    let mut lines = vec!["graph TD".to_string()];

    for node in nodes {
        let mut id = mermaid_id(node);
        if id.is_empty() {
            id = "node".into();
        }
        lines.push(format!("    {id}[\"{}\"]", mermaid_text(node)));
    }

    for edge in edges {
        let (source, target, label) = match edge.as_slice() {
            [s, t] => (s, t, None),
            [s, t, l] => (s, t, Some(l)),
            _ => continue,
        };
        let (s_id, t_id) = (mermaid_id(source), mermaid_id(target));
        match label.filter(|l| !l.is_empty()) {
            Some(label) => lines.push(format!("    {s_id} -->|{}| {t_id}", mermaid_text(label))),
            None => lines.push(format!("    {s_id} --> {t_id}")),
        }
    }

    lines.join("\n")
}

/// The fixed set of tools, shared read-only across agents.
pub struct ToolRegistry {
    api: Arc<dyn RepoApi>,
    offload: ToolOffload,
    storage_dir: Option<PathBuf>,
}

impl ToolRegistry {
    /// Build the registry; offloaded outputs go under `root/storage_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Io`] if the offload directory cannot be created.
    pub fn new(api: Arc<dyn RepoApi>, offload: ToolOffload, root: &Path) -> explain_core::Result<Self> {
        let storage_dir = match (offload.enabled, offload.storage_dir) {
            (true, Some(dir)) => {
                let dir = root.join(dir);
                std::fs::create_dir_all(&dir)?;
                Some(dir)
            }
            _ => None,
        };
        Ok(Self {
            api,
            offload,
            storage_dir,
        })
    }

    /// Directory receiving offloaded outputs, when offload is enabled.
    pub fn storage_dir(&self) -> Option<&Path> {
        self.storage_dir.as_deref()
    }

    /// The repository collaborator the tools delegate to.
    pub fn api(&self) -> &Arc<dyn RepoApi> {
        &self.api
    }

    /// Execute `call` and wrap the outcome in a status envelope.
    ///
    /// Tool failures are reported in the envelope and never returned as errors.
    pub async fn call(&self, call: &ToolCall) -> ToolOutput {
        let (name, result) = match call.tool.parse::<ToolName>() {
            Ok(tool) => (tool.as_str(), self.dispatch(tool, &call.arguments).await),
            Err(e) => (call.tool.as_str(), Err(e)),
        };

        let (envelope, success) = match result {
            Ok(data) => (serde_json::json!({ "status": "success", "data": data }), true),
            Err(e) => {
                debug!(tool = name, error = %e, "tool call failed");
                (
                    serde_json::json!({ "status": "error", "message": e.to_string() }),
                    false,
                )
            }
        };
        let text = envelope.to_string();
        if name == ToolName::ReadOffloaded.as_str() {
            return ToolOutput {
                text,
                offloaded: None,
                success,
            };
        }
        self.maybe_offload(text, success)
    }

    async fn dispatch(
        &self,
        tool: ToolName,
        arguments: &serde_json::Value,
    ) -> explain_core::Result<serde_json::Value> {
        match tool {
            ToolName::FetchRepo => {
                let args: RepoArgs = parse_args(tool, arguments)?;
                let meta = self.api.fetch_repo_metadata(&args.owner, &args.repo).await?;
                Ok(serde_json::to_value(meta)?)
            }
            ToolName::FetchReadme => {
                let args: RepoArgs = parse_args(tool, arguments)?;
                let readme = self.api.fetch_readme(&args.owner, &args.repo).await?;
                Ok(serde_json::to_value(readme)?)
            }
            ToolName::FetchFileTree => {
                let args: TreeArgs = parse_args(tool, arguments)?;
                let tree = self
                    .api
                    .fetch_file_tree(&args.owner, &args.repo, &args.path, args.max_depth.max(1))
                    .await?;
                Ok(serde_json::to_value(tree)?)
            }
            ToolName::FetchFileContent => {
                let args: FileArgs = parse_args(tool, arguments)?;
                let content = self
                    .api
                    .fetch_file_content(&args.owner, &args.repo, &args.path)
                    .await?;
                Ok(serde_json::Value::String(content))
            }
            ToolName::GenerateMermaidDiagram => {
                let args: MermaidArgs = parse_args(tool, arguments)?;
                Ok(serde_json::Value::String(generate_mermaid_diagram(
                    &args.nodes,
                    &args.edges,
                )))
            }
            ToolName::ReadOffloaded => {
                let args: PageArgs = parse_args(tool, arguments)?;
                Ok(serde_json::to_value(self.read_page(&args)?)?)
            }
        }
    }

    /// Largest page `read_offloaded` returns, in characters.
    ///
    /// Half the offload threshold, so a page is always shown inline.
    fn page_chars(&self) -> usize {
        (self.offload.threshold_tokens.unwrap_or(0) * 4 / 2).max(1)
    }

    fn read_page(&self, args: &PageArgs) -> explain_core::Result<OffloadPage> {
        let Some(dir) = &self.storage_dir else {
            return Err(ExplainError::Tool("tool output offload is disabled".into()));
        };
        let digest = args.digest.trim().to_ascii_lowercase();
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ExplainError::Tool(format!(
                "'{}' is not an offload digest",
                args.digest
            )));
        }

        let path = dir.join(format!("{digest}.txt"));
        let stored = std::fs::read_to_string(&path)
            .map_err(|e| ExplainError::Tool(format!("no offloaded output {digest}: {e}")))?;
        let total_chars = stored.chars().count();
        let limit = args.limit.unwrap_or(usize::MAX).clamp(1, self.page_chars());
        let text: String = stored.chars().skip(args.offset).take(limit).collect();
        let end = args.offset.saturating_add(limit);

        Ok(OffloadPage {
            digest,
            offset: args.offset,
            total_chars,
            next_offset: (end < total_chars).then_some(end),
            text,
        })
    }

    fn maybe_offload(&self, text: String, success: bool) -> ToolOutput {
        let (Some(dir), Some(threshold)) = (&self.storage_dir, self.offload.threshold_tokens) else {
            return ToolOutput {
                text,
                offloaded: None,
                success,
            };
        };
        if estimate_tokens(&text) <= threshold {
            return ToolOutput {
                text,
                offloaded: None,
                success,
            };
        }

        let digest = format!("{:x}", Sha256::digest(text.as_bytes()));
        let path = dir.join(format!("{digest}.txt"));
        if let Err(e) = std::fs::write(&path, &text) {
            warn!(path = %path.display(), error = %e, "tool offload failed, keeping output inline");
            return ToolOutput {
                text,
                offloaded: None,
                success,
            };
        }

        let preview_chars = self.offload.max_preview_tokens.unwrap_or(0) * 4;
        let preview: String = text.chars().take(preview_chars).collect();
        debug!(path = %path.display(), "offloaded large tool output");
        ToolOutput {
            text: format!(
                "{preview}\n[output truncated: {} estimated tokens; full result stored at {}. Call {} with {{\"digest\": \"{digest}\", \"offset\": {}}} to read the rest]",
                estimate_tokens(&text),
                path.display(),
                ToolName::ReadOffloaded,
                preview.chars().count(),
            ),
            offloaded: Some(path),
            success,
        }
    }
}
