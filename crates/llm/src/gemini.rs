//! Native Gemini REST client.
//!
//! Covers what the OpenAI-compatible surface cannot: search grounding,
//! inline image output, text-to-speech, and long-running video operations.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::http::check_error;
use crate::media::{
    ImageRequest, InlineImage, MediaProvider, SpeechRequest, VideoJob, VideoRequest, VideoStatus,
};
use crate::provider::{
    CompletionRequest, CompletionResponse, ContentBlock, GroundingSource, LlmError, LlmProvider,
    ResponseFormat, Role, StopReason, join_text,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Request types ──

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallPart>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Default::default() }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Deserialize)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<serde_json::Value>,
}

// ── Response types ──

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

/// A chunk comes from either web search or maps grounding.
#[derive(Deserialize)]
struct GroundingChunk {
    web: Option<GroundingRef>,
    maps: Option<GroundingRef>,
}

#[derive(Deserialize)]
struct GroundingRef {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<serde_json::Value>,
    error: Option<OperationError>,
}

#[derive(Deserialize)]
struct OperationError {
    #[serde(default)]
    message: String,
}

// ── Client ──

/// Gemini client for one model. Media calls take their model from the request.
pub struct GeminiClient {
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        Self {
            model,
            client: reqwest::Client::new(),
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    fn method_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        body: &B,
    ) -> Result<R, LlmError> {
        let resp = self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }

        resp.json().await.map_err(|e| LlmError::RequestFailed(e.to_string()))
    }

    async fn generate(&self, model: &str, body: GenerateRequest) -> Result<GenerateResponse, LlmError> {
        self.post(self.method_url(model, "generateContent"), &body).await
    }

    async fn complete_native(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut system = None;
        let mut contents = Vec::new();
        for m in &request.messages {
            match m.role {
                Role::System => system = Some(Content { role: None, parts: vec![Part::text(&m.content)] }),
                Role::User => contents.push(Content { role: Some("user".into()), parts: vec![Part::text(&m.content)] }),
                Role::Assistant => contents.push(Content { role: Some("model".into()), parts: vec![Part::text(&m.content)] }),
            }
        }

        let mut tools = Vec::new();
        if !request.tools.is_empty() {
            let decls: Vec<serde_json::Value> = request.tools.iter().map(|t| serde_json::json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.input_schema,
            })).collect();
            tools.push(serde_json::json!({ "functionDeclarations": decls }));
        }
        if request.grounding {
            tools.push(serde_json::json!({ "googleSearch": {} }));
        }

        let (response_mime_type, response_schema) = match &request.response_format {
            // Gemini rejects JSON mode combined with search grounding.
            Some(_) if request.grounding => (None, None),
            Some(ResponseFormat::Json) => (Some("application/json"), None),
            Some(ResponseFormat::JsonSchema(s)) => (Some("application/json"), Some(s.clone())),
            None => (None, None),
        };

        let body = GenerateRequest {
            system_instruction: system,
            contents,
            tools,
            generation_config: GenerationConfig {
                max_output_tokens: Some(request.max_tokens),
                temperature: Some(request.temperature),
                response_mime_type,
                response_schema,
                ..Default::default()
            },
        };

        let api = self.generate(&self.model, body).await?;
        Ok(into_completion(api))
    }
}

fn into_completion(api: GenerateResponse) -> CompletionResponse {
    let (input_tokens, output_tokens) = api.usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    let Some(candidate) = api.candidates.into_iter().next() else {
        return CompletionResponse { input_tokens, output_tokens, ..Default::default() };
    };

    let mut content_blocks = Vec::new();
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    for (i, part) in parts.into_iter().enumerate() {
        if let Some(text) = part.text {
            content_blocks.push(ContentBlock::Text { text });
        }
        if let Some(call) = part.function_call {
            // Gemini does not assign call ids; synthesize a positional one.
            content_blocks.push(ContentBlock::ToolUse { id: format!("call_{i}"), name: call.name, input: call.args });
        }
    }

    let has_tool_use = content_blocks.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    let stop_reason = if has_tool_use {
        StopReason::ToolUse
    } else if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
        StopReason::MaxTokens
    } else {
        StopReason::EndTurn
    };

    let sources = candidate.grounding_metadata
        .map(|g| g.grounding_chunks.into_iter()
            .filter_map(|c| c.web.or(c.maps))
            .map(|r| GroundingSource { title: r.title, uri: r.uri })
            .collect())
        .unwrap_or_default();

    CompletionResponse {
        content: join_text(&content_blocks),
        content_blocks,
        stop_reason,
        input_tokens,
        output_tokens,
        sources,
    }
}

/// First inline blob of the first candidate.
fn first_inline(api: GenerateResponse) -> Option<Blob> {
    api.candidates.into_iter().next()?
        .content?
        .parts.into_iter()
        .find_map(|p| p.inline_data)
}

/// Dig the video URI out of a finished operation's response payload.
fn video_uri(response: &serde_json::Value) -> Option<String> {
    response
        .pointer("/generateVideoResponse/generatedSamples/0/video/uri")
        .or_else(|| response.pointer("/generatedVideos/0/video/uri"))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

fn operation_status(op: Operation) -> VideoStatus {
    if let Some(err) = op.error {
        return VideoStatus::Failed { reason: err.message };
    }
    if !op.done {
        return VideoStatus::Pending;
    }
    match op.response.as_ref().and_then(video_uri) {
        Some(uri) => VideoStatus::Done { uri },
        None => VideoStatus::Failed { reason: format!("operation {} finished without a video", op.name) },
    }
}

impl LlmProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn complete(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + '_>> {
        Box::pin(self.complete_native(request))
    }
}

type MediaFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LlmError>> + Send + 'a>>;

impl MediaProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate_image(&self, request: ImageRequest) -> MediaFuture<'_, Option<InlineImage>> {
        Box::pin(async move {
            let mut parts = Vec::new();
            if let Some(reference) = request.reference {
                parts.push(Part {
                    inline_data: Some(Blob { mime_type: reference.mime_type, data: reference.data }),
                    ..Default::default()
                });
            }
            parts.push(Part::text(request.prompt));

            let body = GenerateRequest {
                contents: vec![Content { role: Some("user".into()), parts }],
                generation_config: GenerationConfig {
                    response_modalities: vec!["IMAGE"],
                    image_config: Some(serde_json::json!({ "aspectRatio": request.aspect_ratio })),
                    ..Default::default()
                },
                ..Default::default()
            };
            let api = self.generate(&request.model, body).await?;
            Ok(first_inline(api).map(|b| InlineImage { mime_type: b.mime_type, data: b.data }))
        })
    }

    fn generate_speech(&self, request: SpeechRequest) -> MediaFuture<'_, Option<String>> {
        Box::pin(async move {
            let speech_config = request.voice.map(|voice| serde_json::json!({
                "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": voice } }
            }));
            let body = GenerateRequest {
                contents: vec![Content { role: Some("user".into()), parts: vec![Part::text(request.text)] }],
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO"],
                    speech_config,
                    ..Default::default()
                },
                ..Default::default()
            };
            let api = self.generate(&request.model, body).await?;
            Ok(first_inline(api).map(|b| b.data))
        })
    }

    fn submit_video(&self, request: VideoRequest) -> MediaFuture<'_, VideoJob> {
        Box::pin(async move {
            let mut instance = serde_json::json!({ "prompt": request.prompt });
            if let Some(reference) = request.reference {
                instance["image"] = serde_json::json!({
                    "bytesBase64Encoded": reference.data,
                    "mimeType": reference.mime_type,
                });
            }
            let body = serde_json::json!({
                "instances": [instance],
                "parameters": { "aspectRatio": request.aspect_ratio },
            });
            let op: Operation = self.post(self.method_url(&request.model, "predictLongRunning"), &body).await?;
            tracing::debug!(operation = %op.name, "video job submitted");
            Ok(VideoJob { id: op.name })
        })
    }

    fn poll_video(&self, job: &VideoJob) -> MediaFuture<'_, VideoStatus> {
        let url = format!("{}/{}", self.base_url, job.id);
        Box::pin(async move {
            let resp = self.client
                .get(url)
                .header("x-goog-api-key", &self.api_key)
                .send()
                .await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(check_error(status, text));
            }

            let op: Operation = resp.json().await
                .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
            Ok(operation_status(op))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_url_shape() {
        let c = GeminiClient::new("gemini-2.5-flash".into(), "k".into(), None);
        assert_eq!(
            c.method_url("gemini-2.5-flash", "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn completion_extracts_text_calls_and_sources() {
        let raw = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Here you go."},
                    {"functionCall": {"name": "create_project", "args": {"title": "Pilot"}}}
                ]},
                "finishReason": "STOP",
                "groundingMetadata": {"groundingChunks": [
                    {"web": {"uri": "https://a.example", "title": "A"}},
                    {"maps": {"uri": "https://maps.example"}}
                ]}
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 7}
        }"#;
        let api: GenerateResponse = serde_json::from_str(raw).unwrap();
        let resp = into_completion(api);
        assert_eq!(resp.content, "Here you go.");
        assert_eq!(resp.stop_reason, StopReason::ToolUse);
        assert_eq!(resp.sources.len(), 2);
        assert_eq!(resp.sources[1].title, None);
        assert_eq!((resp.input_tokens, resp.output_tokens), (12, 7));
    }

    #[test]
    fn empty_candidates_yield_empty_completion() {
        let api: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        let resp = into_completion(api);
        assert!(resp.content.is_empty());
        assert!(resp.content_blocks.is_empty());
    }

    #[test]
    fn image_response_without_inline_data() {
        let api: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "I cannot draw that."}]}}]}"#,
        ).unwrap();
        assert!(first_inline(api).is_none());
    }

    #[test]
    fn operation_states() {
        let pending: Operation = serde_json::from_str(r#"{"name": "op/1"}"#).unwrap();
        assert_eq!(operation_status(pending), VideoStatus::Pending);

        let done: Operation = serde_json::from_str(r#"{"name": "op/1", "done": true, "response":
            {"generateVideoResponse": {"generatedSamples": [{"video": {"uri": "https://v/1"}}]}}}"#).unwrap();
        assert_eq!(operation_status(done), VideoStatus::Done { uri: "https://v/1".into() });

        let failed: Operation = serde_json::from_str(
            r#"{"name": "op/1", "done": true, "error": {"message": "blocked"}}"#,
        ).unwrap();
        assert_eq!(operation_status(failed), VideoStatus::Failed { reason: "blocked".into() });
    }
}
