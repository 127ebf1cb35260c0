//! Bounded tool-calling agent.
//!
//! The model answers every turn with either a single JSON tool call or its
//! final answer. The number of tool calls per run, the tools on offer and
//! the transcript size are all fixed by the agent's [`DepthProfile`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use explain_core::{DepthProfile, ExplainError, RepositoryRef};
use tracing::{debug, warn};

use crate::llm::{ChatMessage, ChatModel, Role};
use crate::memory::ConversationMemory;
use crate::prompt::escape_data;
use crate::tools::{describe_tools, estimate_tokens, ToolCall, ToolName, ToolRegistry};

const ELIDED_OBSERVATION: &str = "[earlier tool output elided to fit the context budget]";

const FINAL_TURN: &str = "You have used every tool call available for this request. Do not call another tool; reply now with your final answer.";

/// What a transcript entry is, which decides how it is trimmed and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnKind {
    Prompt,
    Answer,
    ToolRequest,
    Observation,
    Nudge,
}

#[derive(Debug, Clone)]
struct Turn {
    kind: TurnKind,
    message: ChatMessage,
    elided: bool,
}

/// Tools offered under `profile`.
pub fn offered_tools(profile: &DepthProfile) -> Vec<ToolName> {
    ToolName::ALL
        .into_iter()
        .filter(|t| match t {
            ToolName::FetchFileContent => profile.analyze_files,
            ToolName::ReadOffloaded => profile.tool_offload.enabled,
            _ => true,
        })
        .collect()
}

/// Prompt/answer pairs of `turns`, newest kept first, within `budget` tokens.
///
/// Prompts without an answer are skipped.
fn persisted_messages(turns: &[Turn], budget: usize) -> Vec<ChatMessage> {
    let mut exchanges = Vec::new();
    let mut question = None;
    for turn in turns {
        match turn.kind {
            TurnKind::Prompt => question = Some(&turn.message),
            TurnKind::Answer => {
                if let Some(q) = question.take() {
                    exchanges.push((q, &turn.message));
                }
            }
            _ => {}
        }
    }

    let mut used = 0;
    let mut kept = Vec::new();
    for (q, a) in exchanges.into_iter().rev() {
        let cost = estimate_tokens(&q.content) + estimate_tokens(&a.content);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push((q, a));
    }
    kept.into_iter()
        .rev()
        .flat_map(|(q, a)| [q.clone(), a.clone()])
        .collect()
}

/// Read a tool call out of a model reply.
///
/// A reply is a tool call only if, after optional code fences, it is one
/// JSON object with a string `tool` field.
///
/// # Examples
///
/// ```
/// use explain_agent::agent::parse_tool_call;
///
/// let call = parse_tool_call("```json\n{\"tool\": \"fetch_readme\", \"arguments\": {}}\n```").unwrap();
/// assert_eq!(call.tool, "fetch_readme");
/// assert!(parse_tool_call("# Overview\nA CLI.").is_none());
/// ```
pub fn parse_tool_call(reply: &str) -> Option<ToolCall> {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        text = rest.strip_suffix("```")?.trim();
    }
    if !(text.starts_with('{') && text.ends_with('}')) {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let tool = value.get("tool")?.as_str()?.to_string();
    let arguments = value
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCall { tool, arguments })
}

fn error_envelope(message: &str) -> String {
    serde_json::json!({ "status": "error", "message": message }).to_string()
}

/// A bounded analysis agent over one tool registry.
///
/// # Examples
///
/// ```no_run
/// # async fn demo(
/// #     model: std::sync::Arc<dyn explain_agent::llm::ChatModel>,
/// #     tools: std::sync::Arc<explain_agent::tools::ToolRegistry>,
/// # ) -> explain_core::Result<()> {
/// use explain_agent::agent::AnalysisAgent;
/// use explain_agent::prompt::SYSTEM_INSTRUCTION;
/// use explain_core::{Depth, DepthProfile};
///
/// let profile = DepthProfile::for_depth(Depth::Standard);
/// let mut agent = AnalysisAgent::new(model, tools, profile, SYSTEM_INSTRUCTION);
/// let report = agent.run("Analyze octocat/hello-world").await?;
/// agent.close()?;
/// # Ok(())
/// # }
/// ```
pub struct AnalysisAgent {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    profile: &'static DepthProfile,
    offered: Vec<ToolName>,
    system: ChatMessage,
    turns: Vec<Turn>,
    memory: Option<(PathBuf, ConversationMemory)>,
    files_read: usize,
    /// Index of the prompt still waiting for an answer.
    pending: Option<usize>,
}

impl AnalysisAgent {
    /// Create an agent with `instruction` as its role.
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        profile: &'static DepthProfile,
        instruction: &str,
    ) -> Self {
        let offered = offered_tools(profile);
        let system = ChatMessage::system(format!(
            "{instruction}

Tool protocol:
- To call a tool, reply with exactly one JSON object and nothing else: {{\"tool\": \"<name>\", \"arguments\": {{...}}}}
- The tool result arrives in the next message.
- You may call at most {steps} tools per request.
- When you have enough information, reply with your final answer in Markdown instead of JSON.

Available tools:
{catalog}",
            steps = profile.max_steps,
            catalog = describe_tools(&offered),
        ));

        Self {
            model,
            tools,
            profile,
            offered,
            system,
            turns: Vec::new(),
            memory: None,
            files_read: 0,
            pending: None,
        }
    }

    /// Attach persisted conversation memory for `repo`.
    ///
    /// Only takes effect when the profile has a memory backend and the
    /// registry has a storage directory; earlier turns are replayed into
    /// the transcript.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Agent`] if an existing memory file cannot be read.
    pub fn with_memory(mut self, repo: &RepositoryRef) -> explain_core::Result<Self> {
        let storage = self.tools.storage_dir().map(Path::to_path_buf);
        let (Some(_), Some(storage)) = (self.profile.memory_backend, storage) else {
            return Ok(self);
        };

        let path = ConversationMemory::path_for(&storage, repo);
        let memory = ConversationMemory::load(&path)?
            .unwrap_or_else(|| ConversationMemory::new(repo.clone()));
        debug!(path = %path.display(), turns = memory.messages.len(), "loaded conversation memory");

        for message in &memory.messages {
            let kind = match message.role {
                Role::Assistant => TurnKind::Answer,
                _ => TurnKind::Prompt,
            };
            self.turns.push(Turn {
                kind,
                message: message.clone(),
                elided: false,
            });
        }
        self.memory = Some((path, memory));
        Ok(self)
    }

    /// Number of successful file reads so far.
    pub fn files_read(&self) -> usize {
        self.files_read
    }

    fn push(&mut self, kind: TurnKind, message: ChatMessage) {
        self.turns.push(Turn {
            kind,
            message,
            elided: false,
        });
    }

    fn messages(&self) -> Vec<ChatMessage> {
        std::iter::once(self.system.clone())
            .chain(self.turns.iter().map(|t| t.message.clone()))
            .collect()
    }

    fn transcript_tokens(&self) -> usize {
        estimate_tokens(&self.system.content)
            + self
                .turns
                .iter()
                .map(|t| estimate_tokens(&t.message.content))
                .sum::<usize>()
    }

    /// Drop the in-flight prompt and everything after it.
    ///
    /// Call this after a [`run`](Self::run) was cancelled or failed so the
    /// unanswered question is neither replayed nor persisted.
    pub fn discard_unanswered(&mut self) {
        if let Some(start) = self.pending.take() {
            debug!(dropped = self.turns.len() - start, "discarding unanswered turns");
            self.turns.truncate(start);
        }
    }

    /// Fit the transcript into the context budget.
    ///
    /// The oldest tool observations are elided first. If that is not
    /// enough, whole earlier exchanges are dropped, oldest first; the
    /// current prompt is always kept.
    fn fit_budget(&mut self) {
        let budget = self.profile.context_budget.token_value;
        let mut total = self.transcript_tokens();

        for turn in self.turns.iter_mut() {
            if total <= budget {
                break;
            }
            if turn.kind != TurnKind::Observation || turn.elided {
                continue;
            }
            total -= estimate_tokens(&turn.message.content);
            total += estimate_tokens(ELIDED_OBSERVATION);
            turn.message.content = ELIDED_OBSERVATION.to_string();
            turn.elided = true;
        }

        let current = self.pending.unwrap_or(0);
        let mut cut = 0;
        while total > budget && cut < current {
            total -= estimate_tokens(&self.turns[cut].message.content);
            cut += 1;
        }
        while cut < current && self.turns[cut].kind != TurnKind::Prompt {
            total -= estimate_tokens(&self.turns[cut].message.content);
            cut += 1;
        }
        if cut > 0 {
            debug!(dropped = cut, "dropped earlier exchanges to fit the context budget");
            self.turns.drain(..cut);
            self.pending = Some(current - cut);
        }

        if total > budget {
            warn!(total, budget, "transcript still over the context budget");
        }
    }

    async fn execute(&mut self, call: &ToolCall) -> String {
        let tool = match call.tool.parse::<ToolName>() {
            Ok(tool) => tool,
            Err(e) => return error_envelope(&e.to_string()),
        };
        if !self.offered.contains(&tool) {
            return error_envelope(&format!("tool '{tool}' is not available at this depth"));
        }
        if tool == ToolName::FetchFileContent {
            if let Some(limit) = self.profile.max_files {
                if self.files_read >= limit {
                    return error_envelope(&format!(
                        "file read limit of {limit} reached; answer with what you have"
                    ));
                }
            }
        }

        let output = self.tools.call(call).await;
        if output.success && tool == ToolName::FetchFileContent {
            self.files_read += 1;
        }
        output.text
    }

    /// Answer `task`, calling tools until the model produces a final reply.
    ///
    /// The transcript persists across calls, so later questions see earlier
    /// answers.
    ///
    /// # Errors
    ///
    /// Returns the model's error if a chat call fails, or
    /// [`ExplainError::Agent`] if the model asks for a tool on the forced
    /// final turn or replies with nothing.
    pub async fn run(&mut self, task: &str) -> explain_core::Result<String> {
        self.discard_unanswered();
        self.pending = Some(self.turns.len());
        self.push(TurnKind::Prompt, ChatMessage::user(task));
        let mut calls = 0;

        loop {
            let forced = calls == self.profile.max_steps;
            if forced {
                self.push(TurnKind::Nudge, ChatMessage::user(FINAL_TURN));
            }
            self.fit_budget();

            let reply = self.model.chat(&self.messages()).await?;
            let Some(call) = parse_tool_call(&reply) else {
                let answer = reply.trim().to_string();
                if answer.is_empty() {
                    return Err(ExplainError::Agent(format!(
                        "{} returned an empty answer",
                        self.model.model()
                    )));
                }
                self.push(TurnKind::Answer, ChatMessage::assistant(answer.clone()));
                self.pending = None;
                debug!(tool_calls = calls, "agent finished");
                return Ok(answer);
            };

            if forced {
                return Err(ExplainError::Agent(format!(
                    "model requested tool '{}' after the limit of {} tool calls",
                    call.tool, self.profile.max_steps
                )));
            }

            calls += 1;
            debug!(step = calls, tool = %call.tool, "agent tool call");
            self.push(TurnKind::ToolRequest, ChatMessage::assistant(reply));
            let result = self.execute(&call).await;
            self.push(
                TurnKind::Observation,
                ChatMessage::user(format!(
                    "Result of {}:\n<repository_data name=\"tool_result\">\n{}\n</repository_data>",
                    call.tool,
                    escape_data(&result)
                )),
            );
        }
    }

    /// End the session, flushing conversation memory if attached.
    ///
    /// Only answered exchanges are saved, newest first, within half of the
    /// context budget.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Agent`] if the memory file cannot be written.
    pub fn close(&mut self) -> explain_core::Result<()> {
        self.discard_unanswered();
        let Some((path, memory)) = self.memory.as_mut() else {
            return Ok(());
        };
        memory.messages =
            persisted_messages(&self.turns, self.profile.context_budget.token_value / 2);
        memory.save(path)?;
        debug!(path = %path.display(), "saved conversation memory");
        Ok(())
    }
}
