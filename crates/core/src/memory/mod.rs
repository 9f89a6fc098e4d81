//! Strategic memory: retention-capped free-text blobs plus typed documents
//! (settings, schedule) behind one key-value store.

pub mod pg;
pub mod retention;
pub mod store;
pub mod writer;

pub use retention::Retention;
pub use store::{InMemoryStore, MemoryStore};
