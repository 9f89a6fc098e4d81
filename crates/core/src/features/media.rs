//! Image, speech and video synthesis.

use tokio_util::sync::CancellationToken;

use studio_llm::media::InlineImage;

use crate::error::StudioError;
use crate::studio::Studio;

/// `Ok(None)` when the engine answered without image data.
pub async fn generate_image(
    studio: &Studio,
    prompt: &str,
    aspect_ratio: &str,
    reference: Option<InlineImage>,
) -> Result<Option<InlineImage>, StudioError> {
    if prompt.trim().is_empty() {
        return Err(StudioError::InvalidInput("image prompt is empty".into()));
    }
    Ok(studio.gateway.generate_image(prompt, aspect_ratio, reference).await?)
}

/// Base64 audio in the voice picked in settings.
pub async fn generate_speech(studio: &Studio, text: &str) -> Result<Option<String>, StudioError> {
    if text.trim().is_empty() {
        return Err(StudioError::InvalidInput("speech text is empty".into()));
    }
    let voice = studio.settings().await.voice;
    Ok(studio.gateway.generate_speech(text, voice).await?)
}

/// Submit a video job and wait for its URI.
pub async fn generate_video(
    studio: &Studio,
    prompt: &str,
    aspect_ratio: &str,
    reference: Option<InlineImage>,
    cancel: &CancellationToken,
) -> Result<String, StudioError> {
    if prompt.trim().is_empty() {
        return Err(StudioError::InvalidInput("video prompt is empty".into()));
    }
    Ok(studio.gateway.generate_video(prompt, aspect_ratio, reference, cancel).await?)
}
