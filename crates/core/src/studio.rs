use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::config::StudioCfg;
use crate::error::StudioError;
use crate::gateway::{CallOptions, ModelGateway, RawResponse, select_engine};
use crate::interpret::{self, Interpreted};
use crate::memory::MemoryStore;
use crate::prompt::PromptAssembler;
use crate::types::{MemoryKind, ModelConfig, SystemSettings};

/// Shared context handed to every feature: store, prompt assembly, and the
/// model gateway. Cheap to clone.
#[derive(Clone)]
pub struct Studio {
    pub cfg: Arc<StudioCfg>,
    pub store: Arc<dyn MemoryStore>,
    pub assembler: PromptAssembler,
    pub gateway: Arc<ModelGateway>,
}

impl Studio {
    pub fn new(cfg: Arc<StudioCfg>, store: Arc<dyn MemoryStore>, gateway: ModelGateway) -> Self {
        Self {
            cfg,
            assembler: PromptAssembler::new(store.clone()),
            store,
            gateway: Arc::new(gateway),
        }
    }

    /// Settings, or defaults if the store cannot be read.
    pub async fn settings(&self) -> SystemSettings {
        match self.store.read_settings().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "settings unreadable, using defaults");
                SystemSettings::default()
            }
        }
    }

    pub async fn primary_engine(&self) -> ModelConfig {
        select_engine(&self.settings().await, &self.cfg.default_model)
    }

    async fn exchange(
        &self,
        instruction: &str,
        kinds: &[MemoryKind],
        input: &str,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, StudioError> {
        if input.trim().is_empty() {
            return Err(StudioError::InvalidInput("prompt is empty".into()));
        }
        let engine = self.primary_engine().await;
        let payload = self.assembler.build(instruction, kinds, input).await;
        Ok(self.gateway.call(&engine, &payload, options, cancel).await?)
    }

    /// Assemble, call, and parse the reply as JSON shape `T`.
    pub async fn ask<T: DeserializeOwned>(
        &self,
        instruction: &str,
        kinds: &[MemoryKind],
        input: &str,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<Interpreted<T>, StudioError> {
        let raw = self.exchange(instruction, kinds, input, options, cancel).await?;
        Ok(interpret::parse(&raw))
    }

    /// Assemble, call, and keep the reply as free text.
    pub async fn ask_text(
        &self,
        instruction: &str,
        kinds: &[MemoryKind],
        input: &str,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<Interpreted<()>, StudioError> {
        let raw = self.exchange(instruction, kinds, input, options, cancel).await?;
        Ok(interpret::parse_text(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::FixedEngine;
    use crate::memory::InMemoryStore;
    use studio_llm::provider::MockProvider;

    fn studio(mock: Arc<MockProvider>) -> Studio {
        let cfg = Arc::new(StudioCfg::default());
        let gateway = ModelGateway::new(Arc::new(FixedEngine(mock)), None, cfg.clone());
        Studio::new(cfg, Arc::new(InMemoryStore::default()), gateway)
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_any_call() {
        let mock = Arc::new(MockProvider::new("unused"));
        let s = studio(mock.clone());
        let err = s
            .ask_text("Persona.", &[], "   ", CallOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::InvalidInput(_)));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn default_engine_without_settings() {
        let s = studio(Arc::new(MockProvider::new("")));
        let engine = s.primary_engine().await;
        assert_eq!(engine.id, ModelConfig::BUILTIN_ID);
        assert_eq!(engine.model_identifier, s.cfg.default_model);
    }
}
