use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    /// Plain text content (convenience — concatenation of Text blocks).
    pub content: String,
    /// Structured content blocks (native tool use protocol).
    /// Empty means the message is plain text only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_blocks: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into(), content_blocks: vec![] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    System,
    User,
    Assistant,
}

// ── Tool use types ──

/// Tool definition sent in requests (name + description + JSON Schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A content block in a message: text or a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// Structured-output request attached to a completion.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    /// Any valid JSON.
    Json,
    /// JSON conforming to the given schema, where the engine supports it.
    JsonSchema(serde_json::Value),
}

/// A source reference attached by a search-grounded response, as the engine
/// reported it. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: Option<String>,
    pub uri: Option<String>,
}

/// LLM completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Tool definitions for native tool use (empty = no tools).
    pub tools: Vec<ToolDefinition>,
    pub response_format: Option<ResponseFormat>,
    /// Ask the engine to augment the answer with web search.
    pub grounding: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, max_tokens: u32, temperature: f32) -> Self {
        Self {
            messages,
            max_tokens,
            temperature,
            tools: vec![],
            response_format: None,
            grounding: false,
        }
    }
}

/// LLM completion response.
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Convenience: concatenation of all Text blocks.
    pub content: String,
    /// Structured content blocks from the model.
    pub content_blocks: Vec<ContentBlock>,
    /// Why the model stopped.
    pub stop_reason: StopReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Grounding sources, empty unless the request asked for grounding.
    pub sources: Vec<GroundingSource>,
}

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Trait for LLM providers (OpenAI-compatible, Anthropic, Gemini, local servers).
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>>;
}

pub(crate) fn join_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

/// Mock provider for testing — returns a fixed response and records requests.
#[derive(Debug)]
pub struct MockProvider {
    pub response: String,
    pub response_blocks: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub sources: Vec<GroundingSource>,
    /// When set, every call fails with `RequestFailed(failure)`.
    pub failure: Option<String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        let text = response.into();
        Self {
            response: text.clone(),
            response_blocks: vec![ContentBlock::Text { text }],
            stop_reason: StopReason::EndTurn,
            sources: vec![],
            failure: None,
            requests: Mutex::new(vec![]),
        }
    }

    /// Create a mock that returns specific content blocks and stop reason.
    pub fn with_blocks(blocks: Vec<ContentBlock>, stop_reason: StopReason) -> Self {
        let mut mock = Self::new(join_text(&blocks));
        mock.response_blocks = blocks;
        mock.stop_reason = stop_reason;
        mock
    }

    /// Create a mock whose every call fails.
    pub fn failing(message: impl Into<String>) -> Self {
        let mut mock = Self::new("");
        mock.failure = Some(message.into());
        mock
    }

    pub fn with_sources(mut self, sources: Vec<GroundingSource>) -> Self {
        self.sources = sources;
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }
        let result = match &self.failure {
            Some(msg) => Err(LlmError::RequestFailed(msg.clone())),
            None => Ok(CompletionResponse {
                content: self.response.clone(),
                content_blocks: self.response_blocks.clone(),
                stop_reason: self.stop_reason,
                input_tokens: 10,
                output_tokens: 20,
                sources: self.sources.clone(),
            }),
        };
        Box::pin(async move { result })
    }
}
