//! The Repository Council: three reviewers audit one repository.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use explain_core::{DepthProfile, ExplainError, RepositoryRef};
use explain_signal::SignalSet;
use serde::Serialize;
use tracing::{debug, warn};

use crate::agent::AnalysisAgent;
use crate::github::RepoApi;
use crate::llm::ChatModel;
use crate::prompt::{self, PERFORMANCE_PROMPT, SECURITY_PROMPT, STYLE_PROMPT};
use crate::tools::ToolRegistry;

/// Closing line of every audit.
pub const BANNER: &str = "**The Code Has Been Judged**";

/// Lifecycle of one council session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouncilState {
    /// Nothing built yet.
    Idle,
    /// Tool registry built.
    ToolsReady,
    /// Reviewers are working.
    ReviewersRunning,
    /// All reviewers returned.
    Aggregating,
    /// Report assembled.
    Done,
}

/// The three council seats, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    Security,
    Performance,
    Style,
}

impl ReviewerRole {
    /// Every seat, in the order sections appear in the report.
    pub const ALL: [ReviewerRole; 3] = [
        ReviewerRole::Security,
        ReviewerRole::Performance,
        ReviewerRole::Style,
    ];

    /// Display name.
    pub fn name(self) -> &'static str {
        match self {
            ReviewerRole::Security => "Security Auditor",
            ReviewerRole::Performance => "Performance Optimizer",
            ReviewerRole::Style => "Code Critic",
        }
    }

    /// Markdown heading of the reviewer's section.
    pub fn heading(self) -> &'static str {
        match self {
            ReviewerRole::Security => "## 🛡️ Security Audit",
            ReviewerRole::Performance => "## ⚡ Performance Review",
            ReviewerRole::Style => "## 🎨 Code Quality & Style",
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            ReviewerRole::Security => SECURITY_PROMPT,
            ReviewerRole::Performance => PERFORMANCE_PROMPT,
            ReviewerRole::Style => STYLE_PROMPT,
        }
    }
}

impl fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One reviewer's section of the audit.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewFinding {
    /// Seat that produced the section.
    pub role: ReviewerRole,
    /// Markdown section, or the failure placeholder.
    pub section: String,
    /// Why the reviewer failed, if it did.
    pub failure: Option<String>,
}

impl ReviewFinding {
    /// Placeholder section for a reviewer that failed.
    ///
    /// # Examples
    ///
    /// ```
    /// use explain_agent::council::{ReviewFinding, ReviewerRole};
    ///
    /// let finding = ReviewFinding::failed(ReviewerRole::Style, "timeout");
    /// assert!(finding.section.starts_with("## 🎨 Code Quality & Style"));
    /// assert!(finding.section.contains("Code Critic failed: timeout"));
    /// assert_eq!(finding.grade(), None);
    /// ```
    pub fn failed(role: ReviewerRole, reason: &str) -> Self {
        let failure = ExplainError::ReviewerFailure {
            reviewer: role.name().to_string(),
            reason: reason.to_string(),
        };
        Self {
            role,
            section: format!("{}\n**Grade**: N/A\n\n> ⚠️ {failure}", role.heading()),
            failure: Some(reason.to_string()),
        }
    }

    /// Letter grade from the section's `**Grade**:` line, if one is present.
    pub fn grade(&self) -> Option<char> {
        self.section
            .lines()
            .find_map(|line| line.trim().strip_prefix("**Grade**:"))
            .map(|rest| rest.trim().trim_start_matches('['))
            .and_then(|rest| rest.chars().next())
            .filter(|c| matches!(c, 'A' | 'B' | 'C' | 'D' | 'F'))
    }
}

/// The assembled audit.
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    /// Audited repository.
    pub repo: RepositoryRef,
    /// Sections in seat order.
    pub findings: Vec<ReviewFinding>,
}

impl AuditReport {
    /// Sections separated by blank lines, then the banner.
    pub fn to_markdown(&self) -> String {
        let sections: Vec<&str> = self
            .findings
            .iter()
            .map(|f| f.section.trim_end())
            .collect();
        format!("{}\n\n---\n\n{BANNER}\n", sections.join("\n\n"))
    }

    /// Number of reviewers that failed.
    pub fn failures(&self) -> usize {
        self.findings.iter().filter(|f| f.failure.is_some()).count()
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_markdown())
    }
}

/// Orchestrates the three reviewers over a shared tool registry.
pub struct Council {
    model: Arc<dyn ChatModel>,
    api: Arc<dyn RepoApi>,
    profile: &'static DepthProfile,
    state: CouncilState,
}

impl Council {
    /// Seat a council that will use `model` for every reviewer.
    pub fn new(
        model: Arc<dyn ChatModel>,
        api: Arc<dyn RepoApi>,
        profile: &'static DepthProfile,
    ) -> Self {
        Self {
            model,
            api,
            profile,
            state: CouncilState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CouncilState {
        self.state
    }

    fn transition(&mut self, next: CouncilState) {
        debug!(from = ?self.state, to = ?next, "council state");
        self.state = next;
    }

    /// Run all reviewers concurrently and assemble the audit.
    ///
    /// Reviewer failures become placeholder sections; `root` receives the
    /// offload directory.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Io`] only if the tool registry cannot be built.
    pub async fn convene(
        &mut self,
        repo: &RepositoryRef,
        signals: Option<&SignalSet>,
        root: &Path,
    ) -> explain_core::Result<AuditReport> {
        let tools = Arc::new(ToolRegistry::new(
            Arc::clone(&self.api),
            self.profile.tool_offload,
            root,
        )?);
        self.transition(CouncilState::ToolsReady);

        let task = prompt::build_council_task(repo, signals, self.profile.context_budget.token_value);
        let review = |role: ReviewerRole| {
            let agent = AnalysisAgent::new(
                Arc::clone(&self.model),
                Arc::clone(&tools),
                self.profile,
                role.instruction(),
            );
            run_reviewer(role, agent, &task)
        };
        let (security, performance, style) = (
            review(ReviewerRole::Security),
            review(ReviewerRole::Performance),
            review(ReviewerRole::Style),
        );

        self.transition(CouncilState::ReviewersRunning);
        let (security, performance, style) = tokio::join!(security, performance, style);

        self.transition(CouncilState::Aggregating);
        let report = AuditReport {
            repo: repo.clone(),
            findings: vec![security, performance, style],
        };

        self.transition(CouncilState::Done);
        Ok(report)
    }
}

async fn run_reviewer(role: ReviewerRole, mut agent: AnalysisAgent, task: &str) -> ReviewFinding {
    let outcome = agent.run(task).await;
    if let Err(e) = agent.close() {
        warn!(reviewer = role.name(), error = %e, "failed to close reviewer session");
    }
    match outcome {
        Ok(section) => ReviewFinding {
            role,
            section,
            failure: None,
        },
        Err(e) => {
            warn!(reviewer = role.name(), error = %e, "reviewer failed");
            ReviewFinding::failed(role, &e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(role: ReviewerRole, section: &str) -> ReviewFinding {
        ReviewFinding {
            role,
            section: section.to_string(),
            failure: None,
        }
    }

    #[test]
    fn grades_are_read_from_sections() {
        let f = finding(ReviewerRole::Security, "## 🛡️ Security Audit\n**Grade**: B\n");
        assert_eq!(f.grade(), Some('B'));
        let bracketed = finding(ReviewerRole::Style, "**Grade**: [A]");
        assert_eq!(bracketed.grade(), Some('A'));
        let missing = finding(ReviewerRole::Style, "no grade here");
        assert_eq!(missing.grade(), None);
    }

    #[test]
    fn markdown_keeps_seat_order_and_banner() {
        let report = AuditReport {
            repo: RepositoryRef::new("a", "b"),
            findings: vec![
                finding(ReviewerRole::Security, "S\n"),
                ReviewFinding::failed(ReviewerRole::Performance, "boom"),
                finding(ReviewerRole::Style, "C"),
            ],
        };
        let md = report.to_markdown();
        assert!(md.starts_with("S\n\n## ⚡ Performance Review\n**Grade**: N/A"));
        assert!(md.contains("Performance Optimizer failed: boom\n\nC\n\n---\n\n"));
        assert!(md.trim_end().ends_with(BANNER));
        assert_eq!(report.failures(), 1);
    }

    #[test]
    fn report_serializes_roles() {
        let report = AuditReport {
            repo: RepositoryRef::new("a", "b"),
            findings: vec![finding(ReviewerRole::Style, "C")],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["findings"][0]["role"], "style");
        assert_eq!(json["repo"]["owner"], "a");
    }

    #[test]
    fn seats_have_distinct_headings() {
        for role in ReviewerRole::ALL {
            assert!(role.instruction().contains(role.heading()));
        }
    }
}
