//! Content audit. The returned directive feeds execution learning.

use tokio_util::sync::CancellationToken;

use crate::error::StudioError;
use crate::gateway::CallOptions;
use crate::interpret::Interpreted;
use crate::memory::writer::distill_and_append;
use crate::prompt::personas;
use crate::studio::Studio;
use crate::types::{AnalysisResult, MemoryKind};

pub async fn audit_content(
    studio: &Studio,
    content: &str,
    cancel: &CancellationToken,
) -> Result<Interpreted<AnalysisResult>, StudioError> {
    let out = studio
        .ask::<AnalysisResult>(
            &personas::audit(),
            &[MemoryKind::ExecutionLearning],
            content,
            CallOptions::json(),
            cancel,
        )
        .await?;

    if let Some(result) = out.structured.value() {
        distill_and_append(studio.store.as_ref(), MemoryKind::ExecutionLearning, result).await;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::testing::studio_replying;

    #[tokio::test]
    async fn directive_lands_in_execution_learning() {
        let (studio, _) = studio_replying(
            r#"{"score": 72, "strengths": ["clear"], "weaknesses": ["slow open"], "strategicDirective": "Hook in the first 2 seconds."}"#,
        );
        let out = audit_content(&studio, "my script", &CancellationToken::new()).await.unwrap();
        assert_eq!(out.structured.value().unwrap().score, 72);
        let blob = studio.store.read(MemoryKind::ExecutionLearning).await.unwrap();
        assert_eq!(blob.content, "Hook in the first 2 seconds.");
    }

    #[tokio::test]
    async fn fractional_score_keeps_the_directive() {
        let (studio, _) = studio_replying(
            r#"{"score": 85.5, "strengths": [], "weaknesses": [], "strategicDirective": "Open on the result."}"#,
        );
        let out = audit_content(&studio, "my script", &CancellationToken::new()).await.unwrap();
        assert_eq!(out.structured.value().unwrap().score, 86);
        let blob = studio.store.read(MemoryKind::ExecutionLearning).await.unwrap();
        assert_eq!(blob.content, "Open on the result.");
    }

    #[tokio::test]
    async fn malformed_reply_writes_nothing() {
        let (studio, _) = studio_replying("I liked it!");
        let out = audit_content(&studio, "my script", &CancellationToken::new()).await.unwrap();
        assert!(out.structured.is_malformed());
        assert_eq!(out.structured.clone().or_default(), AnalysisResult::default());
        assert_eq!(studio.store.read(MemoryKind::ExecutionLearning).await.unwrap().revision, 0);
    }

    #[tokio::test]
    async fn past_learning_is_in_the_prompt() {
        let (studio, mock) = studio_replying("{}");
        studio.store.write(MemoryKind::ExecutionLearning, "Avoid stock music.").await.unwrap();
        audit_content(&studio, "my script", &CancellationToken::new()).await.unwrap();
        let system = &mock.requests()[0].messages[0].content;
        assert!(system.contains("## Execution learning\nAvoid stock music."));
    }
}
