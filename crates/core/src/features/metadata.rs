use tokio_util::sync::CancellationToken;

use crate::error::StudioError;
use crate::gateway::CallOptions;
use crate::interpret::Interpreted;
use crate::prompt::personas;
use crate::studio::Studio;
use crate::types::{MemoryKind, VideoMetadata};

/// Title, description, tags and hashtags for a video on `topic`.
pub async fn generate_video_metadata(
    studio: &Studio,
    topic: &str,
    cancel: &CancellationToken,
) -> Result<Interpreted<VideoMetadata>, StudioError> {
    studio
        .ask::<VideoMetadata>(
            &personas::video_metadata(),
            &[MemoryKind::MarketDna],
            topic,
            CallOptions::json(),
            cancel,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::testing::studio_replying;
    use studio_llm::provider::ResponseFormat;

    #[tokio::test]
    async fn metadata_parsed() {
        let (studio, mock) = studio_replying(
            r##"{"title": "Pour-over in 60s", "description": "A quick ritual.", "tags": ["coffee"], "hashtags": ["#coffee"]}"##,
        );
        let out = generate_video_metadata(&studio, "pour-over", &CancellationToken::new()).await.unwrap();
        let meta = out.structured.value().unwrap();
        assert_eq!(meta.title, "Pour-over in 60s");
        assert_eq!(meta.hashtags, ["#coffee"]);
        assert_eq!(mock.requests()[0].response_format, Some(ResponseFormat::Json));
    }

    #[tokio::test]
    async fn partial_reply_fills_defaults() {
        let (studio, _) = studio_replying(r#"{"title": "Only a title"}"#);
        let out = generate_video_metadata(&studio, "anything", &CancellationToken::new()).await.unwrap();
        let meta = out.structured.or_default();
        assert_eq!(meta.title, "Only a title");
        assert!(meta.tags.is_empty());
    }
}
