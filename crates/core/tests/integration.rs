//! End-to-end tests for the studio pipeline.
//!
//! These run without a database: an in-memory store, a mock text engine and
//! a mock media engine stand in for Postgres and the hosted API.

use std::sync::Arc;

use chrono::NaiveDate;
use studio_core::config::StudioCfg;
use studio_core::features::{audit, media, schedule};
use studio_core::gateway::{FixedEngine, ModelGateway, select_engine};
use studio_core::interpret::{self, Interpreted};
use studio_core::memory::{InMemoryStore, MemoryStore, Retention};
use studio_core::prompt::PromptAssembler;
use studio_core::studio::Studio;
use studio_core::types::{EngineKind, MemoryKind, ModelConfig, ScheduleTask, SystemSettings};
use studio_llm::media::{MediaProvider, MockMediaProvider, VideoStatus};
use studio_llm::provider::{CompletionResponse, MockProvider};
use tokio_util::sync::CancellationToken;

fn studio(reply: &str, media: Arc<MockMediaProvider>) -> (Studio, Arc<MockProvider>) {
    let cfg = Arc::new(StudioCfg {
        poll_initial_ms: 1,
        poll_max_interval_ms: 2,
        ..StudioCfg::default()
    });
    let mock = Arc::new(MockProvider::new(reply));
    let gateway = ModelGateway::new(
        Arc::new(FixedEngine(mock.clone())),
        Some(media as Arc<dyn MediaProvider>),
        cfg.clone(),
    );
    let store = Arc::new(InMemoryStore::new(Retention::from_cfg(&cfg)));
    (Studio::new(cfg, store, gateway), mock)
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

/// Every write stays within the window and keeps the suffix of the joined text.
#[tokio::test]
async fn retention_keeps_suffix_of_joined_content() {
    let retention = Retention { execution_learning: 12, market_dna: 3000, channel_directory: 2000 };
    let store = InMemoryStore::new(retention);

    let mut previous = String::new();
    for entry in ["first lesson", "second", "third one here"] {
        let blob = store.append(MemoryKind::ExecutionLearning, entry).await.unwrap();
        let joined = if previous.is_empty() { entry.to_owned() } else { format!("{previous}\n{entry}") };
        let expected: String = joined.chars().skip(joined.chars().count().saturating_sub(12)).collect();
        assert!(blob.content.chars().count() <= 12);
        assert_eq!(blob.content, expected);
        previous = blob.content;
    }
}

/// User input is the last segment and survives large memory untouched.
#[tokio::test]
async fn user_input_last_and_untruncated() {
    let store = Arc::new(InMemoryStore::default());
    store.write(MemoryKind::ExecutionLearning, &"x".repeat(10_000)).await.unwrap();
    store.write(MemoryKind::MarketDna, "Lead with ritual.").await.unwrap();

    let input = format!("Plan my launch.\n{}", "detail ".repeat(2_000));
    let payload = PromptAssembler::new(store)
        .build("Persona.", &[MemoryKind::ExecutionLearning, MemoryKind::MarketDna], &input)
        .await;

    assert!(payload.render().ends_with(&input));
    let messages = payload.to_messages();
    assert_eq!(messages.last().unwrap().content, input);
}

/// A prose reply to a list request becomes an empty list, flagged as malformed.
#[test]
fn malformed_list_reply_defaults_to_empty() {
    let raw = CompletionResponse { content: "Happy to help! What channels do you use?".into(), ..Default::default() };
    let out: Interpreted<Vec<ScheduleTask>> = interpret::parse(&raw);
    assert!(out.structured.is_malformed());
    assert_eq!(out.structured.or_default(), Vec::<ScheduleTask>::new());
}

/// An unknown primary brain falls back the same way every time.
#[test]
fn unknown_primary_brain_falls_back_deterministically() {
    let mut local = ModelConfig::builtin("llama3");
    local.id = "local".into();
    local.engine_kind = EngineKind::LocallyDeployed;
    let mut hosted = ModelConfig::builtin("gemini-2.5-pro");
    hosted.id = "hosted".into();
    hosted.priority = 5;

    let settings = SystemSettings {
        primary_brain_id: Some("does-not-exist".into()),
        models: vec![local, hosted],
        voice: None,
    };
    let first = select_engine(&settings, "gemini-2.5-flash");
    assert_eq!(first.id, "hosted");
    assert_eq!(select_engine(&settings, "gemini-2.5-flash"), first);

    let none = SystemSettings { primary_brain_id: Some("does-not-exist".into()), ..Default::default() };
    assert_eq!(select_engine(&none, "gemini-2.5-flash").id, ModelConfig::BUILTIN_ID);
}

/// 6000 chars against the 5000-char execution learning window.
#[tokio::test]
async fn oversized_execution_learning_is_cut_to_window() {
    let store = InMemoryStore::default();
    let input: String = (0..6000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let blob = store.write(MemoryKind::ExecutionLearning, &input).await.unwrap();
    assert_eq!(blob.content.chars().count(), 5000);
    assert_eq!(blob.content, input[1000..]);
}

#[test]
fn schedule_merge_drops_exact_duplicate() {
    let existing = vec![ScheduleTask::new(day(5), "Shorts", "Post A")];
    let generated = vec![
        ScheduleTask::new(day(5), "Shorts", "Post A"),
        ScheduleTask::new(day(6), "Shorts", "Post B"),
    ];
    let merged = schedule::merge_tasks(&existing, generated);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[1].action, "Post B");
}

#[tokio::test]
async fn image_without_inline_data_is_none() {
    let (s, _) = studio("", Arc::new(MockMediaProvider::new()));
    let image = media::generate_image(&s, "studio portrait", "1:1", None).await.unwrap();
    assert!(image.is_none());
}

#[tokio::test]
async fn video_returns_uri_after_three_polls() {
    let provider = Arc::new(MockMediaProvider::new().with_video_script(vec![
        VideoStatus::Pending,
        VideoStatus::Pending,
        VideoStatus::Done { uri: "https://media.example/v.mp4".into() },
    ]));
    let (s, _) = studio("", provider.clone());
    let uri = media::generate_video(&s, "sunrise timelapse", "16:9", None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(uri, "https://media.example/v.mp4");
    assert_eq!(provider.poll_count(), 3);
}

/// Audit feeds execution learning, which then shows up in the next week plan prompt.
#[tokio::test]
async fn audit_directive_reaches_later_prompts() {
    let (s, mock) = studio(
        r#"{"score": 64, "strengths": ["clear"], "weaknesses": ["slow open"], "strategicDirective": "Open on the result."}"#,
        Arc::new(MockMediaProvider::new()),
    );
    audit::audit_content(&s, "Our 3-minute intro video...", &CancellationToken::new()).await.unwrap();
    schedule::generate_week(&s, day(5), "launch week", &CancellationToken::new()).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].messages[0].content.contains("## Execution learning\nOpen on the result."));
}
