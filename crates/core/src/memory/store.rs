use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, broadcast};

use crate::error::StoreError;
use crate::memory::retention::{Retention, join_entry};
use crate::types::{MemoryBlob, MemoryKind, ScheduleTask, StoreEvent, SystemSettings};

pub const SETTINGS_KEY: &str = "settings";
pub const SCHEDULE_KEY: &str = "schedule";

/// Compare-and-swap attempts made by [`MemoryStore::append`] before giving up.
const APPEND_ATTEMPTS: usize = 3;

pub(crate) const EVENT_CAPACITY: usize = 64;

/// Key-value persistence for memory blobs and JSON documents.
///
/// Every write applies the kind's retention window and broadcasts a
/// [`StoreEvent`] so open views can refresh.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Current blob, or an empty one at revision 0 if never written.
    async fn read(&self, kind: MemoryKind) -> Result<MemoryBlob, StoreError>;

    /// Overwrite unconditionally (last write wins).
    async fn write(&self, kind: MemoryKind, text: &str) -> Result<MemoryBlob, StoreError>;

    /// Overwrite only if the stored revision equals `expected_revision`.
    async fn write_if(
        &self,
        kind: MemoryKind,
        text: &str,
        expected_revision: u64,
    ) -> Result<MemoryBlob, StoreError>;

    async fn read_document(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn write_document(&self, key: &str, body: serde_json::Value) -> Result<(), StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;

    /// Append `entry` on its own line. The stored value becomes the retained
    /// suffix of `previous + "\n" + entry`. Retries on concurrent writers.
    async fn append(&self, kind: MemoryKind, entry: &str) -> Result<MemoryBlob, StoreError> {
        let mut last_err = None;
        for _ in 0..APPEND_ATTEMPTS {
            let current = self.read(kind).await?;
            let joined = join_entry(&current.content, entry);
            match self.write_if(kind, &joined, current.revision).await {
                Ok(blob) => return Ok(blob),
                Err(e @ StoreError::Conflict { .. }) => {
                    tracing::debug!(?kind, error = %e, "append lost a race, retrying");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(StoreError::Conflict { kind, expected: 0, actual: 0 }))
    }

    /// Settings document. A document of the wrong shape yields defaults.
    async fn read_settings(&self) -> Result<SystemSettings, StoreError> {
        let doc = self.read_document(SETTINGS_KEY).await?;
        Ok(decode_or_default(SETTINGS_KEY, doc))
    }

    async fn write_settings(&self, settings: &SystemSettings) -> Result<(), StoreError> {
        self.write_document(SETTINGS_KEY, encode(settings)?).await
    }

    /// Schedule document. A document of the wrong shape yields an empty list.
    async fn read_schedule(&self) -> Result<Vec<ScheduleTask>, StoreError> {
        let doc = self.read_document(SCHEDULE_KEY).await?;
        Ok(decode_or_default(SCHEDULE_KEY, doc))
    }

    async fn write_schedule(&self, tasks: &[ScheduleTask]) -> Result<(), StoreError> {
        self.write_document(SCHEDULE_KEY, encode(tasks)?).await
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

pub(crate) fn decode_or_default<T: DeserializeOwned + Default>(
    key: &str,
    doc: Option<serde_json::Value>,
) -> T {
    let Some(doc) = doc else {
        return T::default();
    };
    match serde_json::from_value(doc) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(key, error = %e, "stored document has unexpected shape, using defaults");
            T::default()
        }
    }
}

/// Process-local store. Used in ephemeral mode and in tests.
#[derive(Debug)]
pub struct InMemoryStore {
    retention: Retention,
    blobs: RwLock<HashMap<MemoryKind, MemoryBlob>>,
    documents: RwLock<HashMap<String, serde_json::Value>>,
    events: broadcast::Sender<StoreEvent>,
}

impl InMemoryStore {
    pub fn new(retention: Retention) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            retention,
            blobs: RwLock::new(HashMap::new()),
            documents: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn store_blob(
        &self,
        blobs: &mut HashMap<MemoryKind, MemoryBlob>,
        kind: MemoryKind,
        text: &str,
        revision: u64,
    ) -> MemoryBlob {
        let blob = MemoryBlob {
            kind,
            content: self.retention.apply(kind, text),
            revision,
            updated_at: Some(Utc::now()),
        };
        blobs.insert(kind, blob.clone());
        blob
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Retention::default())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn read(&self, kind: MemoryKind) -> Result<MemoryBlob, StoreError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(&kind).cloned().unwrap_or_else(|| MemoryBlob::empty(kind)))
    }

    async fn write(&self, kind: MemoryKind, text: &str) -> Result<MemoryBlob, StoreError> {
        let blob = {
            let mut blobs = self.blobs.write().await;
            let next = blobs.get(&kind).map_or(0, |b| b.revision) + 1;
            self.store_blob(&mut blobs, kind, text, next)
        };
        self.notify(StoreEvent::MemoryChanged { kind, revision: blob.revision });
        Ok(blob)
    }

    async fn write_if(
        &self,
        kind: MemoryKind,
        text: &str,
        expected_revision: u64,
    ) -> Result<MemoryBlob, StoreError> {
        let blob = {
            let mut blobs = self.blobs.write().await;
            let actual = blobs.get(&kind).map_or(0, |b| b.revision);
            if actual != expected_revision {
                return Err(StoreError::Conflict { kind, expected: expected_revision, actual });
            }
            self.store_blob(&mut blobs, kind, text, actual + 1)
        };
        self.notify(StoreEvent::MemoryChanged { kind, revision: blob.revision });
        Ok(blob)
    }

    async fn read_document(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn write_document(&self, key: &str, body: serde_json::Value) -> Result<(), StoreError> {
        self.documents.write().await.insert(key.to_owned(), body);
        self.notify(StoreEvent::DocumentChanged { key: key.to_owned() });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
