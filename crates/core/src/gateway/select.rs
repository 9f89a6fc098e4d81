use crate::types::{EngineKind, ModelConfig, SystemSettings};

/// Pick the engine for general-purpose features.
///
/// 1. the config whose id equals `primary_brain_id`;
/// 2. else the active remote-hosted config with the lowest priority value
///    (first listed wins ties);
/// 3. else a built-in config for `default_model` using the global credential.
pub fn select_engine(settings: &SystemSettings, default_model: &str) -> ModelConfig {
    if let Some(primary) = settings.primary_brain_id.as_deref() {
        if let Some(found) = settings.models.iter().find(|m| m.id == primary) {
            return found.clone();
        }
        tracing::debug!(primary, "primary brain not configured, falling back");
    }

    settings
        .models
        .iter()
        .filter(|m| m.is_active && m.engine_kind == EngineKind::RemoteHosted)
        .min_by_key(|m| m.priority)
        .cloned()
        .unwrap_or_else(|| ModelConfig::builtin(default_model))
}
