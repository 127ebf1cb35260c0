//! Council end to end over in-memory collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use explain_agent::council::{Council, CouncilState, ReviewerRole, BANNER};
use explain_agent::github::RepoApi;
use explain_agent::llm::{ChatMessage, ChatModel};
use explain_core::{
    Depth, DepthProfile, EntryKind, ExplainError, RepoMetadata, RepositoryRef, TreeEntry,
};
use explain_signal::SignalSet;

struct FakeApi {
    reads: AtomicUsize,
}

#[async_trait]
impl RepoApi for FakeApi {
    async fn fetch_repo_metadata(&self, owner: &str, repo: &str) -> explain_core::Result<RepoMetadata> {
        Ok(RepoMetadata {
            full_name: format!("{owner}/{repo}"),
            ..RepoMetadata::default()
        })
    }

    async fn fetch_readme(&self, _: &str, _: &str) -> explain_core::Result<Option<String>> {
        Ok(None)
    }

    async fn fetch_file_tree(&self, _: &str, _: &str, _: &str, _: usize) -> explain_core::Result<Vec<TreeEntry>> {
        Ok(vec![TreeEntry {
            name: "app.py".into(),
            kind: EntryKind::File,
            path: "app.py".into(),
        }])
    }

    async fn fetch_file_content(&self, _: &str, _: &str, _: &str) -> explain_core::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok("API_KEY = 'sk-live-123'".into())
    }

    async fn fetch_languages(&self, _: &str, _: &str) -> explain_core::Result<Vec<(String, u64)>> {
        Ok(vec![("Python".into(), 10)])
    }
}

/// Picks its behaviour from the reviewer's system instruction.
struct Panel;

#[async_trait]
impl ChatModel for Panel {
    async fn chat(&self, messages: &[ChatMessage]) -> explain_core::Result<String> {
        let system = &messages[0].content;
        let saw_tool_result = messages.iter().any(|m| m.content.starts_with("Result of"));

        if system.contains("Performance Optimizer") {
            return Err(ExplainError::Llm("LLM API error 503: overloaded".into()));
        }
        if system.contains("Security Auditor") {
            if !saw_tool_result {
                return Ok(r#"{"tool": "fetch_file_content", "arguments": {"owner": "acme", "repo": "shop", "path": "app.py"}}"#.into());
            }
            return Ok("## 🛡️ Security Audit\n**Grade**: D\n\n### Critical Vulnerabilities\n* Hardcoded key in app.py".into());
        }
        Ok("## 🎨 Code Quality & Style\n**Grade**: B\n\n### The Verdict\n* Small and readable.".into())
    }

    fn model(&self) -> &str {
        "panel"
    }
}

#[tokio::test]
async fn failed_reviewer_becomes_placeholder_in_fixed_order() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(FakeApi {
        reads: AtomicUsize::new(0),
    });
    let profile = DepthProfile::for_depth(Depth::Standard);
    let mut council = Council::new(Arc::new(Panel), api.clone(), profile);
    assert_eq!(council.state(), CouncilState::Idle);

    let signals = SignalSet {
        tree: vec!["app.py".into()],
        key_files: vec![],
        tree_text: "app.py".into(),
        files_text: String::new(),
    };
    let repo = RepositoryRef::new("acme", "shop");
    let report = council.convene(&repo, Some(&signals), dir.path()).await.unwrap();

    assert_eq!(council.state(), CouncilState::Done);
    assert_eq!(api.reads.load(Ordering::SeqCst), 1);

    let roles: Vec<ReviewerRole> = report.findings.iter().map(|f| f.role).collect();
    assert_eq!(roles, ReviewerRole::ALL.to_vec());
    assert_eq!(report.failures(), 1);
    assert_eq!(report.findings[0].grade(), Some('D'));
    assert_eq!(report.findings[1].grade(), None);
    assert_eq!(report.findings[2].grade(), Some('B'));

    let md = report.to_markdown();
    let security = md.find("## 🛡️ Security Audit").unwrap();
    let performance = md.find("## ⚡ Performance Review").unwrap();
    let style = md.find("## 🎨 Code Quality & Style").unwrap();
    assert!(security < performance && performance < style);
    assert!(md.contains("Performance Optimizer failed:"));
    assert!(md.contains("503"));
    assert!(md.trim_end().ends_with(BANNER));
}

#[tokio::test]
async fn blocked_storage_fails_the_council() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".explain_cache"), "not a directory").unwrap();

    let api = Arc::new(FakeApi {
        reads: AtomicUsize::new(0),
    });
    let mut council = Council::new(Arc::new(Panel), api, DepthProfile::for_depth(Depth::Deep));
    let result = council
        .convene(&RepositoryRef::new("acme", "shop"), None, dir.path())
        .await;

    assert!(result.is_err());
    assert_eq!(council.state(), CouncilState::Idle);
}
