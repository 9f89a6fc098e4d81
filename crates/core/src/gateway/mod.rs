//! Model gateway: picks an engine and performs one exchange with it.

pub mod poll;
pub mod select;

use std::sync::Arc;

use studio_llm::gemini::GeminiClient;
use studio_llm::http::HttpProvider;
use studio_llm::media::{ImageRequest, InlineImage, MediaProvider, SpeechRequest, VideoRequest};
use studio_llm::provider::{
    CompletionRequest, CompletionResponse, LlmError, LlmProvider, ResponseFormat, ToolDefinition,
};
use tokio_util::sync::CancellationToken;

use crate::config::StudioCfg;
use crate::error::GatewayError;
use crate::prompt::PromptPayload;
use crate::types::{EngineKind, ModelConfig};

pub use poll::PollPolicy;
pub use select::select_engine;

/// The untouched engine reply.
pub type RawResponse = CompletionResponse;

/// Per-call knobs on top of the assembled prompt.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub response_format: Option<ResponseFormat>,
    pub tools: Vec<ToolDefinition>,
    pub grounding: bool,
}

impl CallOptions {
    pub fn json() -> Self {
        Self { response_format: Some(ResponseFormat::Json), ..Default::default() }
    }

    pub fn with_tools(tools: Vec<ToolDefinition>) -> Self {
        Self { tools, ..Default::default() }
    }

    pub fn grounded(mut self) -> Self {
        self.grounding = true;
        self
    }
}

/// Turns a [`ModelConfig`] into a live provider.
pub trait EngineFactory: Send + Sync {
    fn build(&self, engine: &ModelConfig) -> Arc<dyn LlmProvider>;
}

/// Builds HTTP providers: native Gemini for `gemini-*` hosted models,
/// OpenAI-compatible or Anthropic otherwise. Blank engine credentials
/// fall back to `global_key`.
pub struct HttpEngineFactory {
    global_key: String,
    global_base_url: Option<String>,
}

impl HttpEngineFactory {
    pub fn new(global_key: String, global_base_url: Option<String>) -> Self {
        Self { global_key, global_base_url }
    }

    /// Reads `STUDIO_API_KEY` and optionally `STUDIO_BASE_URL`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("STUDIO_API_KEY").unwrap_or_default(),
            std::env::var("STUDIO_BASE_URL").ok(),
        )
    }

    pub fn gemini(&self, model: &str) -> GeminiClient {
        GeminiClient::new(model.to_owned(), self.global_key.clone(), None)
    }
}

impl EngineFactory for HttpEngineFactory {
    fn build(&self, engine: &ModelConfig) -> Arc<dyn LlmProvider> {
        let key = engine.credential_or(&self.global_key).to_owned();
        let model = engine.model_identifier.clone();
        let base_url = engine.base_url.clone().or_else(|| match engine.engine_kind {
            EngineKind::RemoteHosted => self.global_base_url.clone(),
            EngineKind::LocallyDeployed => None,
        });

        let is_gemini = model.to_lowercase().starts_with("gemini-");
        if engine.engine_kind == EngineKind::RemoteHosted && is_gemini {
            Arc::new(GeminiClient::new(model, key, base_url))
        } else {
            Arc::new(HttpProvider::new(model, key, base_url))
        }
    }
}

/// Always hands out the same provider, whatever engine is selected.
pub struct FixedEngine(pub Arc<dyn LlmProvider>);

impl EngineFactory for FixedEngine {
    fn build(&self, _engine: &ModelConfig) -> Arc<dyn LlmProvider> {
        self.0.clone()
    }
}

pub struct ModelGateway {
    engines: Arc<dyn EngineFactory>,
    media: Option<Arc<dyn MediaProvider>>,
    cfg: Arc<StudioCfg>,
}

impl ModelGateway {
    pub fn new(
        engines: Arc<dyn EngineFactory>,
        media: Option<Arc<dyn MediaProvider>>,
        cfg: Arc<StudioCfg>,
    ) -> Self {
        Self { engines, media, cfg }
    }

    /// One request/response exchange. Resolves to `Cancelled` if `cancel`
    /// fires first; the in-flight request is dropped.
    pub async fn call(
        &self,
        engine: &ModelConfig,
        payload: &PromptPayload,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, GatewayError> {
        let provider = self.engines.build(engine);
        let request = CompletionRequest {
            messages: payload.to_messages(),
            max_tokens: self.cfg.max_tokens,
            temperature: self.cfg.temperature,
            tools: options.tools,
            response_format: options.response_format,
            grounding: options.grounding,
        };

        tracing::debug!(
            engine = %engine.id,
            provider = provider.name(),
            model = %engine.model_identifier,
            tools = request.tools.len(),
            structured = request.response_format.is_some(),
            grounding = request.grounding,
            "model call started"
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(engine = %engine.id, "model call cancelled");
                return Err(GatewayError::Cancelled);
            }
            r = provider.complete(request) => r,
        };

        match response {
            Ok(r) => {
                tracing::debug!(
                    input_tokens = r.input_tokens,
                    output_tokens = r.output_tokens,
                    stop_reason = ?r.stop_reason,
                    "model call finished"
                );
                Ok(r)
            }
            Err(e) => {
                tracing::warn!(engine = %engine.id, error = %e, "model call failed");
                Err(e.into())
            }
        }
    }

    fn media(&self) -> Result<&dyn MediaProvider, GatewayError> {
        self.media
            .as_deref()
            .ok_or_else(|| LlmError::Unavailable("no media engine configured".into()).into())
    }

    /// `Ok(None)` when the engine returned no inline image.
    pub async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: &str,
        reference: Option<InlineImage>,
    ) -> Result<Option<InlineImage>, GatewayError> {
        let image = self.media()?.generate_image(ImageRequest {
            model: self.cfg.image_model.clone(),
            prompt: prompt.to_owned(),
            aspect_ratio: aspect_ratio.to_owned(),
            reference,
        }).await?;
        if image.is_none() {
            tracing::warn!(model = %self.cfg.image_model, "image response carried no inline data");
        }
        Ok(image)
    }

    pub async fn generate_speech(
        &self,
        text: &str,
        voice: Option<String>,
    ) -> Result<Option<String>, GatewayError> {
        Ok(self.media()?.generate_speech(SpeechRequest {
            model: self.cfg.speech_model.clone(),
            text: text.to_owned(),
            voice,
        }).await?)
    }

    /// Submit a video job, then poll under the configured backoff policy.
    pub async fn generate_video(
        &self,
        prompt: &str,
        aspect_ratio: &str,
        reference: Option<InlineImage>,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let media = self.media()?;
        let job = media.submit_video(VideoRequest {
            model: self.cfg.video_model.clone(),
            prompt: prompt.to_owned(),
            aspect_ratio: aspect_ratio.to_owned(),
            reference,
        }).await?;
        tracing::info!(job = %job.id, "video job submitted");
        poll::wait_for_video(media, &job, self.cfg.poll_policy(), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_llm::provider::MockProvider;

    fn payload() -> PromptPayload {
        PromptPayload { memory: vec![], instruction: "Persona.".into(), user_input: "hi".into() }
    }

    #[tokio::test]
    async fn call_forwards_options() {
        let mock = Arc::new(MockProvider::new("{}"));
        let gw = ModelGateway::new(Arc::new(FixedEngine(mock.clone())), None, Arc::new(StudioCfg::default()));
        let engine = ModelConfig::builtin("gemini-2.5-flash");
        gw.call(&engine, &payload(), CallOptions::json().grounded(), &CancellationToken::new())
            .await
            .unwrap();
        let seen = mock.requests();
        assert_eq!(seen[0].response_format, Some(ResponseFormat::Json));
        assert!(seen[0].grounding);
        assert_eq!(seen[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_call_does_not_reach_provider() {
        let mock = Arc::new(MockProvider::new("late"));
        let gw = ModelGateway::new(Arc::new(FixedEngine(mock.clone())), None, Arc::new(StudioCfg::default()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = gw
            .call(&ModelConfig::builtin("m"), &payload(), CallOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
    }

    #[tokio::test]
    async fn provider_failure_surfaces() {
        let gw = ModelGateway::new(
            Arc::new(FixedEngine(Arc::new(MockProvider::failing("quota")))),
            None,
            Arc::new(StudioCfg::default()),
        );
        let err = gw
            .call(&ModelConfig::builtin("m"), &payload(), CallOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Llm(LlmError::RequestFailed(_))));
    }

    #[tokio::test]
    async fn media_without_engine_is_unavailable() {
        let gw = ModelGateway::new(
            Arc::new(FixedEngine(Arc::new(MockProvider::new("")))),
            None,
            Arc::new(StudioCfg::default()),
        );
        let err = gw.generate_image("a cat", "1:1", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Llm(LlmError::Unavailable(_))));
    }

    #[test]
    fn factory_routes_by_engine() {
        let f = HttpEngineFactory::new("global".into(), None);
        let gemini = f.build(&ModelConfig::builtin("gemini-2.5-flash"));
        assert_eq!(gemini.name(), "gemini");

        let mut local = ModelConfig::builtin("gemini-2.5-flash");
        local.engine_kind = EngineKind::LocallyDeployed;
        local.base_url = Some("http://localhost:11434/v1".into());
        assert_eq!(f.build(&local).name(), "openai-compatible");

        assert_eq!(f.build(&ModelConfig::builtin("claude-sonnet-4-6")).name(), "anthropic");
    }
}
