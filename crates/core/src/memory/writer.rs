//! Distill short directives out of feature results into strategic memory.

use crate::memory::store::MemoryStore;
use crate::types::{AnalysisResult, MarketingPlan, MemoryKind};

/// Results that carry a directive worth remembering.
pub trait Directive {
    fn directive(&self) -> Option<&str>;
}

impl Directive for AnalysisResult {
    fn directive(&self) -> Option<&str> {
        non_blank(&self.strategic_directive)
    }
}

impl Directive for MarketingPlan {
    fn directive(&self) -> Option<&str> {
        non_blank(&self.strategic_directive)
    }
}

impl Directive for str {
    fn directive(&self) -> Option<&str> {
        non_blank(self)
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let t = s.trim();
    (!t.is_empty()).then_some(t)
}

/// Append the result's directive to `kind`. Write failures are logged and
/// swallowed; returns whether something was stored.
pub async fn distill_and_append<D: Directive + ?Sized>(
    store: &dyn MemoryStore,
    kind: MemoryKind,
    result: &D,
) -> bool {
    let Some(directive) = result.directive() else {
        return false;
    };
    match store.append(kind, directive).await {
        Ok(blob) => {
            tracing::info!(?kind, revision = blob.revision, len = blob.content.len(), "memory directive appended");
            true
        }
        Err(e) => {
            tracing::warn!(?kind, error = %e, "failed to append memory directive");
            false
        }
    }
}
