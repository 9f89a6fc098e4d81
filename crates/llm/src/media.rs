//! Media synthesis contracts: image, speech, and long-running video jobs.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::provider::LlmError;

type MediaFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LlmError>> + Send + 'a>>;

/// Reference image passed alongside a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: String,
    pub reference: Option<InlineImage>,
}

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub model: String,
    pub text: String,
    /// Prebuilt voice name; engine default when absent.
    pub voice: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub model: String,
    pub prompt: String,
    pub aspect_ratio: String,
    pub reference: Option<InlineImage>,
}

/// Handle to a submitted video job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: String,
}

/// Snapshot of a video job returned by one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoStatus {
    Pending,
    Done { uri: String },
    Failed { reason: String },
}

/// Engines that synthesize media. Image and speech are single exchanges;
/// video is submit-then-poll.
pub trait MediaProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the engine answered without inline image data.
    fn generate_image(&self, request: ImageRequest) -> MediaFuture<'_, Option<InlineImage>>;

    /// Base64 audio, `Ok(None)` when the engine answered without audio.
    fn generate_speech(&self, request: SpeechRequest) -> MediaFuture<'_, Option<String>>;

    fn submit_video(&self, request: VideoRequest) -> MediaFuture<'_, VideoJob>;

    fn poll_video(&self, job: &VideoJob) -> MediaFuture<'_, VideoStatus>;
}

/// Mock media engine for testing. Video polls walk through `script`;
/// once exhausted the last status repeats.
#[derive(Debug)]
pub struct MockMediaProvider {
    pub image: Option<InlineImage>,
    pub speech: Option<String>,
    script: Mutex<Vec<VideoStatus>>,
    polls: AtomicUsize,
}

impl MockMediaProvider {
    pub fn new() -> Self {
        Self {
            image: None,
            speech: None,
            script: Mutex::new(vec![VideoStatus::Pending]),
            polls: AtomicUsize::new(0),
        }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_speech(mut self, audio: impl Into<String>) -> Self {
        self.speech = Some(audio.into());
        self
    }

    pub fn with_video_script(self, script: Vec<VideoStatus>) -> Self {
        if let Ok(mut s) = self.script.lock() {
            *s = script;
        }
        self
    }

    /// Number of `poll_video` calls observed.
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl Default for MockMediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaProvider for MockMediaProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn generate_image(&self, _request: ImageRequest) -> MediaFuture<'_, Option<InlineImage>> {
        let image = self.image.clone();
        Box::pin(async move { Ok(image) })
    }

    fn generate_speech(&self, _request: SpeechRequest) -> MediaFuture<'_, Option<String>> {
        let audio = self.speech.clone();
        Box::pin(async move { Ok(audio) })
    }

    fn submit_video(&self, _request: VideoRequest) -> MediaFuture<'_, VideoJob> {
        Box::pin(async move { Ok(VideoJob { id: "operations/mock-video".into() }) })
    }

    fn poll_video(&self, _job: &VideoJob) -> MediaFuture<'_, VideoStatus> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        let status = self
            .script
            .lock()
            .ok()
            .and_then(|s| s.get(n).or_else(|| s.last()).cloned())
            .unwrap_or(VideoStatus::Pending);
        Box::pin(async move { Ok(status) })
    }
}
