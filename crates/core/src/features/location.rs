//! Filming location ideas, grounded with search.

use tokio_util::sync::CancellationToken;

use crate::error::StudioError;
use crate::gateway::CallOptions;
use crate::interpret::Interpreted;
use crate::prompt::personas;
use crate::studio::Studio;
use crate::types::LocationInspiration;

pub async fn inspire_locations(
    studio: &Studio,
    query: &str,
    cancel: &CancellationToken,
) -> Result<Interpreted<Vec<LocationInspiration>>, StudioError> {
    let out = studio
        .ask::<Vec<LocationInspiration>>(
            &personas::locations(),
            &[],
            query,
            CallOptions::json().grounded(),
            cancel,
        )
        .await?;
    tracing::debug!(citations = out.citations.len(), malformed = out.structured.is_malformed(), "locations returned");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::testing::studio_with;
    use crate::interpret::{PLACEHOLDER_TITLE, PLACEHOLDER_URI};
    use studio_llm::provider::{GroundingSource, MockProvider};

    #[tokio::test]
    async fn grounded_call_with_citations() {
        let mock = MockProvider::new(
            r#"[{"name": "Alfama", "description": "Old quarter", "visualNotes": "Tiled facades", "bestTime": "Golden hour"}]"#,
        )
        .with_sources(vec![
            GroundingSource { title: Some("Visit Lisboa".into()), uri: Some("https://visitlisboa.com".into()) },
            GroundingSource { title: None, uri: None },
        ]);
        let (studio, mock) = studio_with(mock);

        let out = inspire_locations(&studio, "old streets in Lisbon", &CancellationToken::new()).await.unwrap();
        assert!(mock.requests()[0].grounding);
        assert_eq!(out.structured.value().unwrap()[0].visual_notes, "Tiled facades");
        assert_eq!(out.citations.len(), 2);
        assert_eq!(out.citations[1].title, PLACEHOLDER_TITLE);
        assert_eq!(out.citations[1].uri, PLACEHOLDER_URI);
    }
}
