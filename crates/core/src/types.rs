use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ── Strategic memory ────────────────────────────────────────────

/// Which free-text memory blob a read or write addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Lessons distilled from audits and executed schedule days.
    ExecutionLearning,
    /// Audience and positioning patterns distilled from marketing runs.
    MarketDna,
    /// One line per registered publishing channel.
    ChannelDirectory,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 3] = [
        MemoryKind::ExecutionLearning,
        MemoryKind::MarketDna,
        MemoryKind::ChannelDirectory,
    ];

    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::ExecutionLearning => "execution_learning",
            Self::MarketDna => "market_dna",
            Self::ChannelDirectory => "channel_directory",
        }
    }

    /// Section heading used when the blob is placed into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Self::ExecutionLearning => "Execution learning",
            Self::MarketDna => "Market DNA",
            Self::ChannelDirectory => "Channel directory",
        }
    }
}

/// A named free-text memory record. `revision` starts at 0 for a blob that
/// has never been written and increments on every successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryBlob {
    pub kind: MemoryKind,
    pub content: String,
    pub revision: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MemoryBlob {
    pub fn empty(kind: MemoryKind) -> Self {
        Self { kind, content: String::new(), revision: 0, updated_at: None }
    }
}

/// Change notification broadcast by a store after each successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    MemoryChanged { kind: MemoryKind, revision: u64 },
    DocumentChanged { key: String },
}

// ── Engines and settings ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    RemoteHosted,
    LocallyDeployed,
}

/// One addressable AI engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,
    pub display_name: String,
    pub engine_kind: EngineKind,
    pub model_identifier: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub is_active: bool,
    /// Blank or absent falls back to the global credential.
    #[serde(default)]
    pub credentials: Option<String>,
    /// Endpoint for locally-deployed engines, or a proxy for hosted ones.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ModelConfig {
    pub const BUILTIN_ID: &'static str = "builtin-default";

    /// Engine used when settings name no usable primary brain.
    pub fn builtin(model_identifier: impl Into<String>) -> Self {
        Self {
            id: Self::BUILTIN_ID.into(),
            display_name: "Default".into(),
            engine_kind: EngineKind::RemoteHosted,
            model_identifier: model_identifier.into(),
            priority: 0,
            is_active: true,
            credentials: None,
            base_url: None,
        }
    }

    /// Own credential if set and non-blank, else the global one.
    pub fn credential_or<'a>(&'a self, global: &'a str) -> &'a str {
        self.credentials
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(global)
    }
}

/// User-editable settings persisted as a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemSettings {
    pub primary_brain_id: Option<String>,
    pub models: Vec<ModelConfig>,
    /// Prebuilt voice for speech synthesis.
    pub voice: Option<String>,
}

// ── Schedule ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
}

impl TaskStatus {
    /// Status only moves forward; staying put is allowed.
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        next >= self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleTask {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub channel_name: String,
    pub action: String,
    #[serde(default)]
    pub themes: BTreeSet<String>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl ScheduleTask {
    pub fn new(date: NaiveDate, channel_name: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            channel_name: channel_name.into(),
            action: action.into(),
            themes: BTreeSet::new(),
            status: TaskStatus::Pending,
        }
    }

    /// Key used to spot duplicates when merging generated tasks.
    pub fn merge_key(&self) -> (NaiveDate, &str) {
        (self.date, self.action.as_str())
    }
}

// ── AI-produced records ─────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketingVariant {
    pub channel: String,
    pub headline: String,
    pub body: String,
    pub call_to_action: String,
}

/// A marketing run: variants plus the directive to remember.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketingPlan {
    pub variants: Vec<MarketingVariant>,
    pub strategic_directive: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisResult {
    /// 0–100. Fractions round; strings and out-of-range values are coerced.
    #[serde(deserialize_with = "lenient_score")]
    pub score: u8,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub strategic_directive: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationInspiration {
    pub name: String,
    pub description: String,
    pub visual_notes: String,
    pub best_time: String,
}

/// Models return scores as `85`, `85.5`, `"85"` or `null`. Anything
/// unreadable becomes 0 rather than failing the whole record.
fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let raw = match serde_json::Value::deserialize(d)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    Ok(raw
        .filter(|f| f.is_finite())
        .map_or(0, |f| f.round().clamp(0.0, 100.0) as u8))
}

/// Normalized grounding reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

/// A tool invocation the model asked for. Never executed by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_coerced_not_rejected() {
        let score = |json: &str| serde_json::from_str::<AnalysisResult>(json).unwrap().score;
        assert_eq!(score(r#"{"score": 85.5}"#), 86);
        assert_eq!(score(r#"{"score": "72"}"#), 72);
        assert_eq!(score(r#"{"score": 300}"#), 100);
        assert_eq!(score(r#"{"score": -4}"#), 0);
        assert_eq!(score(r#"{"score": null}"#), 0);
        assert_eq!(score(r#"{"strengths": []}"#), 0);
    }

    #[test]
    fn status_only_moves_forward() {
        assert!(TaskStatus::Pending.can_advance_to(TaskStatus::InProgress));
        assert!(TaskStatus::Pending.can_advance_to(TaskStatus::Complete));
        assert!(TaskStatus::Complete.can_advance_to(TaskStatus::Complete));
        assert!(!TaskStatus::Complete.can_advance_to(TaskStatus::Pending));
        assert!(!TaskStatus::InProgress.can_advance_to(TaskStatus::Pending));
    }

    #[test]
    fn blank_credential_falls_back() {
        let mut cfg = ModelConfig::builtin("gemini-2.5-flash");
        assert_eq!(cfg.credential_or("global"), "global");
        cfg.credentials = Some("   ".into());
        assert_eq!(cfg.credential_or("global"), "global");
        cfg.credentials = Some("own".into());
        assert_eq!(cfg.credential_or("global"), "own");
    }

    #[test]
    fn schedule_task_from_model_json() {
        let task: ScheduleTask = serde_json::from_str(
            r#"{"date":"2024-01-05","channelName":"Shorts","action":"Post A","themes":["launch"]}"#,
        ).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.channel_name, "Shorts");
        assert!(task.themes.contains("launch"));
    }

    #[test]
    fn settings_tolerate_missing_fields() {
        let s: SystemSettings = serde_json::from_str("{}").unwrap();
        assert!(s.primary_brain_id.is_none());
        assert!(s.models.is_empty());
    }
}
