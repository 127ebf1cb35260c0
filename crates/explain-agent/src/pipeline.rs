//! Single-shot explanation workflows shared by the CLI modes.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use explain_core::{DepthProfile, RepositoryRef};
use explain_signal::{
    detect_stack, extract_with, infer_languages, LocalTree, SignalLimits, SignalSet, StackReport,
    TreeSource,
};
use tracing::{debug, warn};

use crate::agent::AnalysisAgent;
use crate::github::{RemoteTree, RepoApi};
use crate::llm::{generate_explanation, ChatModel};
use crate::prompt::{self, SYSTEM_INSTRUCTION};
use crate::tools::ToolRegistry;

/// Which kind of explanation to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One sentence.
    Quick,
    /// Short bullet list.
    Simple,
    /// Sectioned Markdown report.
    Standard,
    /// Standard plus architecture and file roles.
    Detailed,
}

impl Mode {
    /// Whether the result is written to the output file rather than printed.
    pub fn writes_file(self) -> bool {
        matches!(self, Mode::Standard | Mode::Detailed)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Quick => write!(f, "quick"),
            Mode::Simple => write!(f, "simple"),
            Mode::Standard => write!(f, "standard"),
            Mode::Detailed => write!(f, "detailed"),
        }
    }
}

/// What is being explained.
pub enum Target<'a> {
    /// A hosted repository, walked at most `max_depth` levels deep.
    Remote {
        repo: &'a RepositoryRef,
        api: Arc<dyn RepoApi>,
        max_depth: usize,
    },
    /// A directory on disk.
    Local(&'a LocalTree),
}

impl Target<'_> {
    /// Name shown in prompts and reports.
    pub fn display_name(&self) -> String {
        match self {
            Target::Remote { repo, .. } => repo.to_string(),
            Target::Local(tree) => tree.name(),
        }
    }

    async fn extract(&self) -> explain_core::Result<SignalSet> {
        match self {
            Target::Remote {
                repo,
                api,
                max_depth,
            } => {
                let tree = RemoteTree::new(Arc::clone(api), (*repo).clone());
                extract_with(&tree, &SignalLimits::with_max_depth(*max_depth)).await
            }
            Target::Local(tree) => {
                extract_with(*tree as &dyn TreeSource, &SignalLimits::default()).await
            }
        }
    }
}

/// Extract signals, degrading failure to a warning.
pub async fn gather_signals(target: &Target<'_>) -> Option<SignalSet> {
    match target.extract().await {
        Ok(signals) => {
            debug!(files = signals.tree.len(), key_files = signals.key_files.len(), "signals extracted");
            Some(signals)
        }
        Err(e) => {
            warn!(target = %target.display_name(), error = %e, "signal extraction failed, continuing without it");
            None
        }
    }
}

/// Produce a `mode` explanation of `target` with `model`.
///
/// # Errors
///
/// Returns [`explain_core::ExplainError::GitHub`] if metadata or README
/// cannot be fetched, and [`explain_core::ExplainError::Generation`] if the
/// model fails or returns nothing.
pub async fn run_explanation(
    mode: Mode,
    target: &Target<'_>,
    model: &dyn ChatModel,
) -> explain_core::Result<String> {
    let prompt = build_explanation_prompt(mode, target).await?;
    generate_explanation(model, &prompt).await
}

/// Gather everything a `mode` explanation needs and assemble its prompt.
///
/// Remote targets fetch metadata and README first; local targets take the
/// README from the extracted key files. Quick mode on a remote target skips
/// extraction.
///
/// # Errors
///
/// Returns [`explain_core::ExplainError::GitHub`] if metadata or README
/// cannot be fetched.
pub async fn build_explanation_prompt(
    mode: Mode,
    target: &Target<'_>,
) -> explain_core::Result<String> {
    let (name, description, readme) = match target {
        Target::Remote { repo, api, .. } => {
            let meta = api.fetch_repo_metadata(&repo.owner, &repo.repo).await?;
            let readme = api.fetch_readme(&repo.owner, &repo.repo).await?;
            let name = if meta.full_name.is_empty() {
                repo.to_string()
            } else {
                meta.full_name
            };
            (name, meta.description, readme)
        }
        Target::Local(tree) => (tree.name(), None, None),
    };

    let needs_signals = !(mode == Mode::Quick && matches!(target, Target::Remote { .. }));
    let signals = if needs_signals {
        gather_signals(target).await
    } else {
        None
    };

    let readme = readme.or_else(|| {
        signals
            .as_ref()
            .and_then(|s| s.readme())
            .map(|f| f.content.clone())
    });
    let tree_text = signals.as_ref().map(|s| s.tree_text.as_str());
    let files_text = signals.as_ref().map(|s| s.files_text.as_str());

    let prompt = match mode {
        Mode::Quick => prompt::build_quick_prompt(&name, description.as_deref(), readme.as_deref()),
        Mode::Simple => {
            prompt::build_simple_prompt(&name, description.as_deref(), readme.as_deref(), tree_text)
        }
        Mode::Standard | Mode::Detailed => prompt::build_prompt(
            &name,
            description.as_deref(),
            readme.as_deref(),
            mode == Mode::Detailed,
            tree_text,
            files_text,
        ),
    };
    debug!(%mode, prompt_chars = prompt.len(), "prompt assembled");
    Ok(prompt)
}

/// Detect the technology stack of `target`.
///
/// # Errors
///
/// Unlike explanations, extraction or language lookup failures are fatal here.
pub async fn run_stack(target: &Target<'_>) -> explain_core::Result<StackReport> {
    let signals = target.extract().await?;
    let languages = match target {
        Target::Remote { repo, api, .. } => api.fetch_languages(&repo.owner, &repo.repo).await?,
        Target::Local(_) => infer_languages(&signals.tree),
    };
    Ok(detect_stack(&languages, &signals.tree, &signals.key_files))
}

/// Build the analysis agent for `repo`, with memory when `profile` has one.
///
/// # Errors
///
/// Returns an error if the tool registry or memory cannot be set up.
pub fn open_agent_session(
    model: Arc<dyn ChatModel>,
    api: Arc<dyn RepoApi>,
    profile: &'static DepthProfile,
    repo: &RepositoryRef,
    root: &Path,
) -> explain_core::Result<AnalysisAgent> {
    let tools = Arc::new(ToolRegistry::new(api, profile.tool_offload, root)?);
    AnalysisAgent::new(model, tools, profile, SYSTEM_INSTRUCTION).with_memory(repo)
}

/// Write `text` to `path`, ending with a newline.
///
/// # Examples
///
/// ```
/// use explain_agent::pipeline::write_output;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("EXPLAIN.md");
/// write_output(&path, "# Overview").unwrap();
/// assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Overview\n");
/// ```
pub fn write_output(path: &Path, text: &str) -> explain_core::Result<()> {
    let mut body = text.to_string();
    if !body.ends_with('\n') {
        body.push('\n');
    }
    std::fs::write(path, body)?;
    Ok(())
}

/// Whitespace-separated word count.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use explain_core::{EntryKind, ExplainError, RepoMetadata, TreeEntry};

    use super::*;
    use crate::llm::ChatMessage;

    /// Two-file repository: `README.md` and `src/main.rs`.
    struct FakeApi {
        fail_listing: bool,
    }

    #[async_trait]
    impl RepoApi for FakeApi {
        async fn fetch_repo_metadata(&self, owner: &str, repo: &str) -> explain_core::Result<RepoMetadata> {
            Ok(RepoMetadata {
                full_name: format!("{owner}/{repo}"),
                description: Some("A tiny demo".into()),
                ..RepoMetadata::default()
            })
        }

        async fn fetch_readme(&self, _: &str, _: &str) -> explain_core::Result<Option<String>> {
            Ok(Some("# Demo\nRemote readme.".into()))
        }

        async fn fetch_file_tree(&self, _: &str, _: &str, path: &str, _: usize) -> explain_core::Result<Vec<TreeEntry>> {
            if self.fail_listing {
                return Err(ExplainError::GitHub("403 rate limited".into()));
            }
            let entry = |name: &str, kind, path: &str| TreeEntry {
                name: name.into(),
                kind,
                path: path.into(),
            };
            Ok(match path {
                "" => vec![
                    entry("README.md", EntryKind::File, "README.md"),
                    entry("go.mod", EntryKind::File, "go.mod"),
                    entry("src", EntryKind::Dir, "src"),
                ],
                "src" => vec![entry("main.go", EntryKind::File, "src/main.go")],
                _ => vec![],
            })
        }

        async fn fetch_file_content(&self, _: &str, _: &str, path: &str) -> explain_core::Result<String> {
            Ok(match path {
                "go.mod" => "module example.com/demo\n\ngo 1.22\n".into(),
                _ => "# Demo\nRemote readme.".into(),
            })
        }

        async fn fetch_languages(&self, _: &str, _: &str) -> explain_core::Result<Vec<(String, u64)>> {
            Ok(vec![("Go".into(), 1000)])
        }
    }

    #[derive(Default)]
    struct Recorder {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for Recorder {
        async fn chat(&self, messages: &[ChatMessage]) -> explain_core::Result<String> {
            self.prompts.lock().unwrap().push(messages[0].content.clone());
            Ok(" Demo is a tiny Go service. ".into())
        }

        fn model(&self) -> &str {
            "recorder"
        }
    }

    fn remote(repo: &RepositoryRef, fail_listing: bool) -> Target<'_> {
        Target::Remote {
            repo,
            api: Arc::new(FakeApi { fail_listing }),
            max_depth: 3,
        }
    }

    #[tokio::test]
    async fn quick_remote_skips_the_tree() {
        let repo = RepositoryRef::new("a", "demo");
        let model = Recorder::default();
        let text = run_explanation(Mode::Quick, &remote(&repo, false), &model).await.unwrap();
        assert_eq!(text, "Demo is a tiny Go service.");

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("a/demo"));
        assert!(prompts[0].contains("Remote readme."));
        assert!(!prompts[0].contains("src/main.go"));
    }

    #[tokio::test]
    async fn standard_remote_includes_signals() {
        let repo = RepositoryRef::new("a", "demo");
        let model = Recorder::default();
        run_explanation(Mode::Standard, &remote(&repo, false), &model).await.unwrap();
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("src/main.go"));
        assert!(prompts[0].contains("module example.com/demo"));
    }

    #[tokio::test]
    async fn extraction_failure_degrades_to_placeholders() {
        let repo = RepositoryRef::new("a", "demo");
        let model = Recorder::default();
        run_explanation(Mode::Detailed, &remote(&repo, true), &model).await.unwrap();
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("No file tree provided"));
        assert!(prompts[0].contains("No code files provided"));
        assert!(prompts[0].contains("Remote readme."));
    }

    #[tokio::test]
    async fn local_target_reads_readme_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# Local\nOn-disk readme.").unwrap();
        std::fs::write(dir.path().join("main.py"), "print('hi')").unwrap();
        let tree = LocalTree::new(dir.path()).unwrap();

        let model = Recorder::default();
        run_explanation(Mode::Simple, &Target::Local(&tree), &model).await.unwrap();
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("On-disk readme."));
        assert!(prompts[0].contains("main.py"));
        assert!(prompts[0].contains("No description provided"));
    }

    #[tokio::test]
    async fn prompt_assembly_fetches_without_the_model() {
        let repo = RepositoryRef::new("a", "demo");
        let model = Recorder::default();
        let prompt = build_explanation_prompt(Mode::Standard, &remote(&repo, false))
            .await
            .unwrap();
        assert!(prompt.contains("Remote readme."));
        assert!(prompt.contains("src/main.go"));
        assert!(model.prompts.lock().unwrap().is_empty());

        let text = generate_explanation(&model, &prompt).await.unwrap();
        assert_eq!(text, "Demo is a tiny Go service.");
        assert_eq!(model.prompts.lock().unwrap()[0], prompt);
    }

    #[tokio::test]
    async fn stack_remote_uses_language_api() {
        let repo = RepositoryRef::new("a", "demo");
        let report = run_stack(&remote(&repo, false)).await.unwrap();
        assert_eq!(report.languages, vec!["Go"]);
        assert!(report.runtimes.iter().any(|r| r.starts_with("Go")));
    }

    #[tokio::test]
    async fn stack_failure_is_fatal() {
        let repo = RepositoryRef::new("a", "demo");
        assert!(run_stack(&remote(&repo, true)).await.is_err());
    }

    #[test]
    fn only_full_reports_go_to_files() {
        assert!(!Mode::Quick.writes_file());
        assert!(!Mode::Simple.writes_file());
        assert!(Mode::Standard.writes_file());
        assert!(Mode::Detailed.writes_file());
    }

    #[test]
    fn words_are_counted_by_whitespace() {
        assert_eq!(word_count("# Overview\n\nA  small\ttool."), 4);
        assert_eq!(word_count(""), 0);
    }
}
