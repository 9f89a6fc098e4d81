use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;

use crate::gateway::poll::PollPolicy;

/// All studio tunables. Loaded from `studio_config` table at startup.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioCfg {
    // memory retention windows (characters)
    pub retention_execution_learning: usize,
    pub retention_market_dna: usize,
    pub retention_channel_directory: usize,

    // engines
    pub default_model: String,
    pub image_model: String,
    pub video_model: String,
    pub speech_model: String,

    // completion
    pub max_tokens: u32,
    pub temperature: f32,

    // video polling
    pub poll_initial_ms: u64,
    pub poll_max_interval_ms: u64,
    pub poll_backoff_factor: f64,
    pub poll_max_wait_secs: u64,

    // startup
    pub db_connect_timeout_secs: u64,
}

impl Default for StudioCfg {
    fn default() -> Self {
        Self {
            retention_execution_learning: 5000,
            retention_market_dna: 3000,
            retention_channel_directory: 2000,
            default_model: "gemini-2.5-flash".into(),
            image_model: "gemini-2.5-flash-image".into(),
            video_model: "veo-3.0-fast-generate-001".into(),
            speech_model: "gemini-2.5-flash-preview-tts".into(),
            max_tokens: 2048,
            temperature: 0.7,
            poll_initial_ms: 5000,
            poll_max_interval_ms: 30_000,
            poll_backoff_factor: 1.5,
            poll_max_wait_secs: 600,
            db_connect_timeout_secs: 3,
        }
    }
}

impl StudioCfg {
    /// Load config from `studio_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM studio_config")
                .fetch_all(pool)
                .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `studio_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO studio_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            retention_execution_learning: get_or(m, "retention_execution_learning", d.retention_execution_learning),
            retention_market_dna: get_or(m, "retention_market_dna", d.retention_market_dna),
            retention_channel_directory: get_or(m, "retention_channel_directory", d.retention_channel_directory),
            default_model: get_or(m, "default_model", d.default_model),
            image_model: get_or(m, "image_model", d.image_model),
            video_model: get_or(m, "video_model", d.video_model),
            speech_model: get_or(m, "speech_model", d.speech_model),
            max_tokens: get_or(m, "max_tokens", d.max_tokens),
            temperature: get_or(m, "temperature", d.temperature),
            poll_initial_ms: get_or(m, "poll_initial_ms", d.poll_initial_ms),
            poll_max_interval_ms: get_or(m, "poll_max_interval_ms", d.poll_max_interval_ms),
            poll_backoff_factor: Some(get_or(m, "poll_backoff_factor", d.poll_backoff_factor))
                .filter(|f| f.is_finite() && (1.0..=MAX_BACKOFF_FACTOR).contains(f))
                .unwrap_or(d.poll_backoff_factor),
            poll_max_wait_secs: get_or(m, "poll_max_wait_secs", d.poll_max_wait_secs),
            db_connect_timeout_secs: get_or(m, "db_connect_timeout_secs", d.db_connect_timeout_secs),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("retention_execution_learning", self.retention_execution_learning.to_string(), "Execution learning retention window (chars)"),
            ("retention_market_dna", self.retention_market_dna.to_string(), "Market DNA retention window (chars)"),
            ("retention_channel_directory", self.retention_channel_directory.to_string(), "Channel directory retention window (chars)"),
            ("default_model", self.default_model.clone(), "Model used when no primary brain is configured"),
            ("image_model", self.image_model.clone(), "Image generation model"),
            ("video_model", self.video_model.clone(), "Video generation model"),
            ("speech_model", self.speech_model.clone(), "Speech synthesis model"),
            ("max_tokens", self.max_tokens.to_string(), "Completion token limit"),
            ("temperature", self.temperature.to_string(), "Completion temperature"),
            ("poll_initial_ms", self.poll_initial_ms.to_string(), "First video poll delay ms"),
            ("poll_max_interval_ms", self.poll_max_interval_ms.to_string(), "Video poll delay ceiling ms"),
            ("poll_backoff_factor", self.poll_backoff_factor.to_string(), "Video poll delay multiplier"),
            ("poll_max_wait_secs", self.poll_max_wait_secs.to_string(), "Give up on a video job after this many seconds"),
            ("db_connect_timeout_secs", self.db_connect_timeout_secs.to_string(), "Database connect timeout seconds"),
        ]
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial: Duration::from_millis(self.poll_initial_ms),
            max_interval: Duration::from_millis(self.poll_max_interval_ms),
            factor: self.poll_backoff_factor,
            max_wait: Duration::from_secs(self.poll_max_wait_secs),
        }
    }
}

/// Larger factors just mean "always wait `poll_max_interval_ms`".
const MAX_BACKOFF_FACTOR: f64 = 10.0;

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_map_overrides_and_falls_back() {
        let mut m = HashMap::new();
        m.insert("retention_market_dna".to_string(), "120".to_string());
        m.insert("temperature".to_string(), "not-a-number".to_string());
        m.insert("default_model".to_string(), "llama3.1".to_string());
        let cfg = StudioCfg::from_map(&m);
        assert_eq!(cfg.retention_market_dna, 120);
        assert_eq!(cfg.temperature, StudioCfg::default().temperature);
        assert_eq!(cfg.default_model, "llama3.1");
        assert_eq!(cfg.retention_execution_learning, 5000);
    }

    #[test]
    fn entries_cover_every_field() {
        let cfg = StudioCfg::default();
        let map: HashMap<String, String> = cfg
            .to_entries()
            .into_iter()
            .map(|(k, v, _)| (k.to_string(), v))
            .collect();
        let back = StudioCfg::from_map(&map);
        assert_eq!(back.poll_max_wait_secs, cfg.poll_max_wait_secs);
        assert_eq!(back.speech_model, cfg.speech_model);
        assert_eq!(map.len(), 14);
    }

    #[test]
    fn unusable_backoff_factor_falls_back() {
        let default = StudioCfg::default().poll_backoff_factor;
        for raw in ["inf", "NaN", "-2", "0.5", "1e300"] {
            let m = HashMap::from([("poll_backoff_factor".to_string(), raw.to_string())]);
            let cfg = StudioCfg::from_map(&m);
            assert_eq!(cfg.poll_backoff_factor, default, "{raw}");
            let p = cfg.poll_policy();
            assert!(p.next_interval(Duration::from_secs(5)) <= p.max_interval);
        }
        let m = HashMap::from([("poll_backoff_factor".to_string(), "2".to_string())]);
        assert_eq!(StudioCfg::from_map(&m).poll_backoff_factor, 2.0);
    }
}
