use std::time::Duration;

use async_trait::async_trait;
use explain_core::{ExplainError, LlmConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// First retry delay; doubles on every further attempt.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// A message in a chat conversation with the LLM.
///
/// # Examples
///
/// ```
/// use explain_agent::llm::{ChatMessage, Role};
///
/// let msg = ChatMessage::user("Explain this repository");
/// assert!(matches!(msg.role, Role::User));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender.
    pub role: Role,
    /// Text content of the message.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Role in the chat conversation.
///
/// # Examples
///
/// ```
/// use explain_agent::llm::Role;
///
/// let role = Role::System;
/// assert_eq!(serde_json::to_string(&role).unwrap(), "\"system\"");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions.
    System,
    /// User input.
    User,
    /// Assistant response.
    Assistant,
}

/// Anything that can answer a chat conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `messages` and return the model's text reply.
    async fn chat(&self, messages: &[ChatMessage]) -> explain_core::Result<String>;

    /// Model identifier, for logs and reports.
    fn model(&self) -> &str;
}

/// Supported LLM wire protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Google Gemini `generateContent`.
    Gemini,
    /// OpenAI-compatible `/v1/chat/completions`.
    OpenAi,
}

impl Provider {
    /// Parse the `[llm] provider` setting.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Config`] for unknown providers.
    pub fn from_name(name: &str) -> explain_core::Result<Self> {
        match name.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            other => Err(ExplainError::Config(format!(
                "unknown LLM provider '{other}' (expected gemini or openai)"
            ))),
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Provider::Gemini => GEMINI_BASE_URL,
            Provider::OpenAi => OPENAI_BASE_URL,
        }
    }
}

/// Base URL the client talks to for `config`, used by diagnostics.
///
/// # Examples
///
/// ```
/// use explain_core::LlmConfig;
/// use explain_agent::llm::endpoint_root;
///
/// assert_eq!(endpoint_root(&LlmConfig::default()), "https://generativelanguage.googleapis.com");
/// ```
pub fn endpoint_root(config: &LlmConfig) -> String {
    match &config.base_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => Provider::from_name(&config.provider)
            .map(|p| p.default_base_url())
            .unwrap_or(GEMINI_BASE_URL)
            .to_string(),
    }
}

/// How a failed attempt should be handled.
#[derive(Debug)]
enum AttemptError {
    /// Transport failure, 429 or 5xx.
    Transient(String),
    /// Anything a retry cannot fix.
    Fatal(String),
}

/// Whether an HTTP status is worth retrying.
fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Delay before retry number `attempt` (0-based).
fn backoff_delay(attempt: u32) -> Duration {
    BASE_BACKOFF * 2u32.saturating_pow(attempt)
}

/// HTTP chat client for Gemini and OpenAI-compatible endpoints.
///
/// Retries transient failures with exponential backoff, at most
/// `max_retries` times. Empty replies are returned as-is; callers decide
/// whether they are an error.
///
/// # Examples
///
/// ```
/// use explain_core::LlmConfig;
/// use explain_agent::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    provider: Provider,
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExplainError::Config`] for an unknown provider, or
    /// [`ExplainError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> explain_core::Result<Self> {
        let provider = Provider::from_name(&config.provider)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExplainError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
            provider,
        })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or(self.provider.default_base_url())
    }

    async fn attempt(&self, messages: &[ChatMessage]) -> Result<String, AttemptError> {
        let (url, body) = match self.provider {
            Provider::Gemini => (
                format!(
                    "{}/v1beta/models/{}:generateContent",
                    self.base_url(),
                    self.config.model
                ),
                gemini_body(messages),
            ),
            Provider::OpenAi => (
                format!("{}/v1/chat/completions", self.base_url()),
                openai_body(&self.config.model, messages),
            ),
        };

        let mut request = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            request = match self.provider {
                Provider::Gemini => request.header("x-goog-api-key", api_key),
                Provider::OpenAi => request.header("Authorization", format!("Bearer {api_key}")),
            };
        }
        request = request.header("Content-Type", "application/json");

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = format!("LLM API error {status}: {body_text}");
            return Err(if is_retryable_status(status) {
                AttemptError::Transient(message)
            } else {
                AttemptError::Fatal(message)
            });
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AttemptError::Fatal(format!("failed to parse response: {e}")))?;

        let text = match self.provider {
            Provider::Gemini => parse_gemini_text(&response_body),
            Provider::OpenAi => parse_openai_text(&response_body),
        };
        text.ok_or_else(|| {
            AttemptError::Fatal(format!("unexpected response structure: {response_body}"))
        })
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, messages: &[ChatMessage]) -> explain_core::Result<String> {
        let mut attempt = 0;
        loop {
            match self.attempt(messages).await {
                Ok(text) => {
                    debug!(model = %self.config.model, chars = text.len(), "LLM reply received");
                    return Ok(text);
                }
                Err(AttemptError::Transient(msg)) if attempt < self.config.max_retries => {
                    let delay = backoff_delay(attempt);
                    warn!(attempt = attempt + 1, ?delay, error = %msg, "retrying LLM request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(AttemptError::Transient(msg)) | Err(AttemptError::Fatal(msg)) => {
                    return Err(ExplainError::Llm(msg));
                }
            }
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Build a Gemini `generateContent` body; system messages become the system instruction.
fn gemini_body(messages: &[ChatMessage]) -> serde_json::Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let contents: Vec<serde_json::Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = match m.role {
                Role::Assistant => "model",
                _ => "user",
            };
            serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
        "generationConfig": { "temperature": 0.2 },
    });
    if !system.is_empty() {
        body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    body
}

fn openai_body(model: &str, messages: &[ChatMessage]) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": 0.2,
    })
}

/// Concatenate the text parts of the first Gemini candidate.
fn parse_gemini_text(body: &serde_json::Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array());
    // A candidate without parts (e.g. finishReason SAFETY) is an empty reply.
    let Some(parts) = parts else {
        return Some(String::new());
    };
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect(),
    )
}

fn parse_openai_text(body: &serde_json::Value) -> Option<String> {
    let message = body.get("choices")?.get(0)?.get("message")?;
    match message.get("content") {
        Some(serde_json::Value::Null) | None => Some(String::new()),
        Some(content) => content.as_str().map(str::to_string),
    }
}

/// Run one prompt through `model` and return the trimmed reply.
///
/// # Errors
///
/// Returns [`ExplainError::Generation`] if the call fails or the reply is
/// empty.
pub async fn generate_explanation(
    model: &dyn ChatModel,
    prompt: &str,
) -> explain_core::Result<String> {
    let reply = model
        .chat(&[ChatMessage::user(prompt)])
        .await
        .map_err(|e| ExplainError::Generation(e.to_string()))?;
    let text = reply.trim();
    if text.is_empty() {
        return Err(ExplainError::Generation(format!(
            "{} returned no text",
            model.model()
        )));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl ChatModel for Canned {
        async fn chat(&self, _messages: &[ChatMessage]) -> explain_core::Result<String> {
            Ok(self.0.to_string())
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn client_construction_succeeds() {
        let config = LlmConfig::default();
        assert!(LlmClient::new(&config).is_ok());
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            LlmClient::new(&config),
            Err(ExplainError::Config(_))
        ));
    }

    #[test]
    fn model_returns_config_model() {
        let config = LlmConfig {
            model: "gpt-4o-mini".into(),
            provider: "openai".into(),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn chat_message_serializes() {
        let json = serde_json::to_value(ChatMessage::system("hello")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2), Duration::from_millis(2000));
    }

    #[test]
    fn only_rate_limits_and_server_errors_retry() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(reqwest::StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(reqwest::StatusCode::NOT_FOUND));
    }

    #[test]
    fn gemini_body_maps_roles() {
        let body = gemini_body(&[
            ChatMessage::system("be terse"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn gemini_body_without_system_has_no_instruction() {
        let body = gemini_body(&[ChatMessage::user("hi")]);
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn parses_gemini_parts() {
        let body = serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "One " }, { "text": "two" }] } }]
        });
        assert_eq!(parse_gemini_text(&body).as_deref(), Some("One two"));
        assert!(parse_gemini_text(&serde_json::json!({ "error": {} })).is_none());
    }

    #[test]
    fn parses_openai_choice() {
        let body = serde_json::json!({ "choices": [{ "message": { "content": "ok" } }] });
        assert_eq!(parse_openai_text(&body).as_deref(), Some("ok"));
        let null = serde_json::json!({ "choices": [{ "message": { "content": null } }] });
        assert_eq!(parse_openai_text(&null).as_deref(), Some(""));
    }

    #[test]
    fn endpoint_root_prefers_base_url() {
        let config = LlmConfig {
            base_url: Some("http://localhost:11434/".into()),
            ..LlmConfig::default()
        };
        assert_eq!(endpoint_root(&config), "http://localhost:11434");
        let openai = LlmConfig {
            provider: "openai".into(),
            ..LlmConfig::default()
        };
        assert_eq!(endpoint_root(&openai), "https://api.openai.com");
    }

    #[tokio::test]
    async fn empty_reply_is_a_generation_error() {
        let err = generate_explanation(&Canned("   \n"), "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, ExplainError::Generation(_)));
    }

    #[tokio::test]
    async fn reply_is_trimmed() {
        let text = generate_explanation(&Canned("  A CLI tool.\n"), "prompt")
            .await
            .unwrap();
        assert_eq!(text, "A CLI tool.");
    }
}
