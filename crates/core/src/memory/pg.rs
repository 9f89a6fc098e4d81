//! Postgres-backed store: `memory_blob` and `studio_document` tables.

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::memory::retention::Retention;
use crate::memory::store::{EVENT_CAPACITY, MemoryStore};
use crate::types::{MemoryBlob, MemoryKind, StoreEvent};

/// Row type for sqlx deserialization from the `memory_blob` table.
#[derive(sqlx::FromRow)]
struct BlobRow {
    content: String,
    revision: i64,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl BlobRow {
    fn into_blob(self, kind: MemoryKind) -> MemoryBlob {
        MemoryBlob {
            kind,
            content: self.content,
            revision: self.revision.max(0) as u64,
            updated_at: Some(self.updated_at),
        }
    }
}

/// How a compare-and-swap write reaches `memory_blob`. Either statement
/// returns no row when another writer got there first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CasWrite {
    /// Revision 0: the row must not exist yet.
    InsertOnce,
    /// The row must still carry this revision.
    UpdateAt(i64),
}

impl CasWrite {
    fn for_revision(expected: u64) -> Self {
        match expected {
            0 => Self::InsertOnce,
            n => Self::UpdateAt(i64::try_from(n).unwrap_or(i64::MAX)),
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::InsertOnce => {
                "INSERT INTO memory_blob (kind, content, revision, updated_at) VALUES ($1, $2, 1, now()) \
                 ON CONFLICT (kind) DO NOTHING \
                 RETURNING content, revision, updated_at"
            }
            Self::UpdateAt(_) => {
                "UPDATE memory_blob SET content = $2, revision = revision + 1, updated_at = now() \
                 WHERE kind = $1 AND revision = $3 \
                 RETURNING content, revision, updated_at"
            }
        }
    }
}

fn lost_race(kind: MemoryKind, expected: u64, actual: u64) -> StoreError {
    tracing::debug!(?kind, expected, actual, "compare-and-swap lost");
    StoreError::Conflict { kind, expected, actual }
}

pub struct PgMemoryStore {
    pool: PgPool,
    retention: Retention,
    events: broadcast::Sender<StoreEvent>,
}

impl PgMemoryStore {
    pub fn new(pool: PgPool, retention: Retention) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { pool, retention, events }
    }

    fn notify(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl MemoryStore for PgMemoryStore {
    async fn read(&self, kind: MemoryKind) -> Result<MemoryBlob, StoreError> {
        let row: Option<BlobRow> = sqlx::query_as(
            "SELECT content, revision, updated_at FROM memory_blob WHERE kind = $1",
        )
        .bind(kind.as_db_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map_or_else(|| MemoryBlob::empty(kind), |r| r.into_blob(kind)))
    }

    async fn write(&self, kind: MemoryKind, text: &str) -> Result<MemoryBlob, StoreError> {
        let content = self.retention.apply(kind, text);
        let row: BlobRow = sqlx::query_as(
            "INSERT INTO memory_blob (kind, content, revision, updated_at) VALUES ($1, $2, 1, now()) \
             ON CONFLICT (kind) DO UPDATE SET content = EXCLUDED.content, \
             revision = memory_blob.revision + 1, updated_at = now() \
             RETURNING content, revision, updated_at",
        )
        .bind(kind.as_db_str())
        .bind(&content)
        .fetch_one(&self.pool)
        .await?;

        let blob = row.into_blob(kind);
        self.notify(StoreEvent::MemoryChanged { kind, revision: blob.revision });
        Ok(blob)
    }

    async fn write_if(
        &self,
        kind: MemoryKind,
        text: &str,
        expected_revision: u64,
    ) -> Result<MemoryBlob, StoreError> {
        let content = self.retention.apply(kind, text);
        let plan = CasWrite::for_revision(expected_revision);
        let mut query = sqlx::query_as::<_, BlobRow>(plan.sql())
            .bind(kind.as_db_str())
            .bind(&content);
        if let CasWrite::UpdateAt(revision) = plan {
            query = query.bind(revision);
        }
        let row = query.fetch_optional(&self.pool).await?;

        let Some(row) = row else {
            let actual = self.read(kind).await?.revision;
            return Err(lost_race(kind, expected_revision, actual));
        };

        let blob = row.into_blob(kind);
        self.notify(StoreEvent::MemoryChanged { kind, revision: blob.revision });
        Ok(blob)
    }

    async fn read_document(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT body FROM studio_document WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(body,)| body))
    }

    async fn write_document(&self, key: &str, body: serde_json::Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO studio_document (key, body, updated_at) VALUES ($1, $2, now()) \
             ON CONFLICT (key) DO UPDATE SET body = EXCLUDED.body, updated_at = now()",
        )
        .bind(key)
        .bind(&body)
        .execute(&self.pool)
        .await?;

        self.notify(StoreEvent::DocumentChanged { key: key.to_owned() });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
