//! Marketing variants. The returned directive feeds market DNA.

use tokio_util::sync::CancellationToken;

use crate::error::StudioError;
use crate::gateway::CallOptions;
use crate::interpret::Interpreted;
use crate::memory::writer::distill_and_append;
use crate::prompt::personas;
use crate::studio::Studio;
use crate::types::{MarketingPlan, MemoryKind};

pub async fn generate_variants(
    studio: &Studio,
    product: &str,
    audience: &str,
    cancel: &CancellationToken,
) -> Result<Interpreted<MarketingPlan>, StudioError> {
    if product.trim().is_empty() {
        return Err(StudioError::InvalidInput("product is empty".into()));
    }
    let input = format!("Product: {product}\nAudience: {audience}");
    let out = studio
        .ask::<MarketingPlan>(
            &personas::marketing(),
            &[MemoryKind::MarketDna, MemoryKind::ChannelDirectory],
            &input,
            CallOptions::json(),
            cancel,
        )
        .await?;

    if let Some(plan) = out.structured.value() {
        distill_and_append(studio.store.as_ref(), MemoryKind::MarketDna, plan).await;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::testing::studio_replying;

    const REPLY: &str = r#"```json
{"variants": [
  {"channel": "Instagram", "headline": "Brew slower", "body": "Pour-over kit.", "callToAction": "Shop now"},
  {"channel": "TikTok", "headline": "60s coffee ritual", "body": "Watch.", "callToAction": "Follow"}
],
"strategicDirective": "Lead with ritual, not price."}
```"#;

    #[tokio::test]
    async fn variants_parsed_and_directive_remembered() {
        let (studio, _) = studio_replying(REPLY);
        let out = generate_variants(&studio, "pour-over kit", "home baristas", &CancellationToken::new())
            .await
            .unwrap();
        let plan = out.structured.value().unwrap();
        assert_eq!(plan.variants.len(), 2);
        assert_eq!(plan.variants[1].call_to_action, "Follow");
        let dna = studio.store.read(MemoryKind::MarketDna).await.unwrap();
        assert_eq!(dna.content, "Lead with ritual, not price.");
    }

    #[tokio::test]
    async fn empty_product_is_rejected() {
        let (studio, mock) = studio_replying(REPLY);
        let err = generate_variants(&studio, " ", "anyone", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, StudioError::InvalidInput(_)));
        assert!(mock.requests().is_empty());
    }
}
