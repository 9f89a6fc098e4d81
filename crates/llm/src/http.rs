//! HTTP-based chat providers.
//!
//! Supports OpenAI-compatible APIs (OpenAI, DeepSeek, locally-deployed servers
//! such as Ollama or LM Studio) and Anthropic's native Messages API.
//! Gemini is spoken natively by [`crate::gemini::GeminiClient`].

use crate::provider::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmError, LlmProvider, ResponseFormat,
    Role, StopReason, ToolDefinition, join_text,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Inferred provider kind from model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    DeepSeek,
    /// Falls back to OpenAI-compatible format.
    Unknown,
}

impl ProviderKind {
    /// Infer provider from model name prefix.
    pub fn from_model(model: &str) -> Self {
        let m = model.to_lowercase();
        if m.starts_with("gpt-")
            || m.starts_with("o1-")
            || m.starts_with("o3-")
            || m.starts_with("o4-")
        {
            Self::OpenAi
        } else if m.starts_with("claude-") {
            Self::Anthropic
        } else if m.starts_with("deepseek-") {
            Self::DeepSeek
        } else {
            Self::Unknown
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Unknown => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::DeepSeek => "https://api.deepseek.com",
        }
    }

    fn is_anthropic(self) -> bool {
        matches!(self, Self::Anthropic)
    }
}

// ── OpenAI-compatible request/response types ──

#[derive(Serialize)]
struct OaiRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OaiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct OaiTool {
    r#type: &'static str,
    function: OaiFunction,
}

#[derive(Serialize)]
struct OaiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for OaiTool {
    fn from(td: &ToolDefinition) -> Self {
        Self {
            r#type: "function",
            function: OaiFunction {
                name: td.name.clone(),
                description: td.description.clone(),
                parameters: td.input_schema.clone(),
            },
        }
    }
}

fn oai_response_format(format: &ResponseFormat) -> serde_json::Value {
    match format {
        ResponseFormat::Json => serde_json::json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema(schema) => serde_json::json!({
            "type": "json_schema",
            "json_schema": { "name": "result", "schema": schema },
        }),
    }
}

#[derive(Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
    usage: Option<OaiUsage>,
}

#[derive(Deserialize)]
struct OaiChoice {
    message: OaiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OaiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<OaiToolCall>,
}

#[derive(Deserialize)]
struct OaiToolCall {
    id: String,
    function: OaiToolCallFunction,
}

#[derive(Deserialize)]
struct OaiToolCallFunction {
    name: String,
    /// JSON-encoded argument object.
    arguments: String,
}

#[derive(Deserialize)]
struct OaiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ── Anthropic Messages API types ──

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicToolDef>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicMessageContent,
}

/// Message content: either a plain string or an array of content blocks.
#[derive(Serialize)]
#[serde(untagged)]
enum AnthropicMessageContent {
    Text(String),
    Blocks(Vec<AnthropicBlock>),
}

/// A content block in an Anthropic message (request side).
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Serialize)]
struct AnthropicToolDef {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

impl From<&ToolDefinition> for AnthropicToolDef {
    fn from(td: &ToolDefinition) -> Self {
        Self {
            name: td.name.clone(),
            description: td.description.clone(),
            input_schema: td.input_schema.clone(),
        }
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
    usage: Option<AnthropicUsage>,
    stop_reason: Option<String>,
}

/// A content block in an Anthropic response.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Anthropic has no JSON mode; the request is steered through the system prompt.
const ANTHROPIC_JSON_DIRECTIVE: &str =
    "Respond with a single valid JSON value only. No markdown fences, no commentary.";

// ── Provider ──

/// HTTP-based LLM provider. Handles both OpenAI-compatible and Anthropic APIs.
pub struct HttpProvider {
    kind: ProviderKind,
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    /// Build from model name + API key + optional base URL override.
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let kind = ProviderKind::from_model(&model);
        let base = base_url.unwrap_or_else(|| kind.default_base_url().to_owned());
        Self {
            kind,
            model,
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        if self.kind.is_anthropic() {
            format!("{}/v1/messages", self.base_url)
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Parse error response, returning RateLimited for 429.
pub(crate) fn check_error(status: reqwest::StatusCode, body: String) -> LlmError {
    if status.as_u16() == 429 {
        LlmError::RateLimited
    } else {
        LlmError::RequestFailed(format!("{status}: {body}"))
    }
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        match self.kind {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Unknown => "openai-compatible",
        }
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        if request.grounding {
            tracing::debug!(provider = self.name(), "search grounding not available, ignoring");
        }
        if self.kind.is_anthropic() {
            Box::pin(self.complete_anthropic(request))
        } else {
            Box::pin(self.complete_openai(request))
        }
    }
}

impl HttpProvider {
    /// OpenAI-compatible completion with function calling and JSON mode.
    async fn complete_openai(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = OaiRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(|m| OaiMessage {
                role: role_str(&m.role),
                content: m.content.clone(),
            }).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools: request.tools.iter().map(OaiTool::from).collect(),
            response_format: request.response_format.as_ref().map(oai_response_format),
        };

        let mut req = self.client.post(self.endpoint()).json(&body);
        // Local servers usually run without a key.
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }

        let api: OaiResponse = resp.json().await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let (input_tokens, output_tokens) = api.usage
            .map(|u| (u.prompt_tokens, u.completion_tokens)).unwrap_or((0, 0));

        let Some(choice) = api.choices.into_iter().next() else {
            return Ok(CompletionResponse { input_tokens, output_tokens, ..Default::default() });
        };

        let mut content_blocks = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            content_blocks.push(ContentBlock::Text { text });
        }
        for call in choice.message.tool_calls {
            // Arguments arrive as a JSON string; keep the raw text if it does not parse.
            let input = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::String(call.function.arguments));
            content_blocks.push(ContentBlock::ToolUse { id: call.id, name: call.function.name, input });
        }

        let stop_reason = match choice.finish_reason.as_deref() {
            Some("tool_calls") => StopReason::ToolUse,
            Some("length") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };

        Ok(CompletionResponse {
            content: join_text(&content_blocks),
            content_blocks,
            stop_reason,
            input_tokens,
            output_tokens,
            sources: vec![],
        })
    }

    /// Anthropic Messages API completion with native tool use support.
    async fn complete_anthropic(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        // Extract system message separately (Anthropic puts it at top level).
        let mut system = None;
        let messages: Vec<AnthropicMessage> = request.messages.iter().filter_map(|m| {
            if m.role == Role::System {
                system = Some(m.content.clone());
                None
            } else if m.content_blocks.is_empty() {
                Some(AnthropicMessage {
                    role: role_str(&m.role),
                    content: AnthropicMessageContent::Text(m.content.clone()),
                })
            } else {
                let blocks: Vec<AnthropicBlock> = m.content_blocks.iter().map(|b| match b {
                    ContentBlock::Text { text } => AnthropicBlock::Text { text: text.clone() },
                    ContentBlock::ToolUse { id, name, input } => AnthropicBlock::ToolUse {
                        id: id.clone(), name: name.clone(), input: input.clone(),
                    },
                }).collect();
                Some(AnthropicMessage {
                    role: role_str(&m.role),
                    content: AnthropicMessageContent::Blocks(blocks),
                })
            }
        }).collect();

        if request.response_format.is_some() {
            system = Some(match system {
                Some(s) => format!("{s}\n\n{ANTHROPIC_JSON_DIRECTIVE}"),
                None => ANTHROPIC_JSON_DIRECTIVE.to_owned(),
            });
        }

        let tools: Vec<AnthropicToolDef> = request.tools.iter().map(AnthropicToolDef::from).collect();

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system,
            messages,
            temperature: request.temperature,
            tools,
        };

        let resp = self.client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }

        let api: AnthropicResponse = resp.json().await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let content_blocks: Vec<ContentBlock> = api.content.into_iter().map(|b| match b {
            AnthropicResponseBlock::Text { text } => ContentBlock::Text { text },
            AnthropicResponseBlock::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
        }).collect();

        let stop_reason = match api.stop_reason.as_deref() {
            Some("tool_use") => StopReason::ToolUse,
            Some("max_tokens") => StopReason::MaxTokens,
            _ => StopReason::EndTurn,
        };

        let (input_tokens, output_tokens) = api.usage
            .map(|u| (u.input_tokens, u.output_tokens)).unwrap_or((0, 0));

        Ok(CompletionResponse {
            content: join_text(&content_blocks),
            content_blocks,
            stop_reason,
            input_tokens,
            output_tokens,
            sources: vec![],
        })
    }
}
