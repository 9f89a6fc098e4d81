//! User-facing features. Each one follows the same shape: assemble a prompt
//! from strategic memory, make one model call, interpret the reply, and
//! optionally write a distilled directive back into memory.

pub mod audit;
pub mod channels;
pub mod chat;
pub mod location;
pub mod marketing;
pub mod media;
pub mod metadata;
pub mod schedule;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use studio_llm::provider::MockProvider;

    use crate::config::StudioCfg;
    use crate::gateway::{FixedEngine, ModelGateway};
    use crate::memory::InMemoryStore;
    use crate::studio::Studio;

    pub fn studio_replying(reply: &str) -> (Studio, Arc<MockProvider>) {
        studio_with(MockProvider::new(reply))
    }

    pub fn studio_with(mock: MockProvider) -> (Studio, Arc<MockProvider>) {
        let mock = Arc::new(mock);
        let cfg = Arc::new(StudioCfg::default());
        let gateway = ModelGateway::new(Arc::new(FixedEngine(mock.clone())), None, cfg.clone());
        (Studio::new(cfg, Arc::new(InMemoryStore::default()), gateway), mock)
    }
}
