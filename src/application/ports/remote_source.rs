use crate::domain::value_objects::{Collection, QueryFilter, QueryKey, RecordId, SortOrder};
use crate::shared::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;

/// Record as delivered by the remote source, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub id: String,
    pub fields: Value,
}

impl RawRecord {
    pub fn new(id: impl Into<String>, fields: Value) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Server-side acknowledgement of a committed write.
#[derive(Debug, Clone)]
pub struct WriteAck {
    pub id: RecordId,
    pub server_timestamp: DateTime<Utc>,
}

/// Cancellable registration of a live query. Cancelling must be idempotent;
/// deliveries made after cancellation are discarded by the store anyway.
pub trait LiveQueryHandle: Send + Sync {
    fn cancel(&self);
}

#[derive(Debug)]
pub(crate) enum SnapshotPayload {
    Records(Vec<RawRecord>),
    ChannelDown(String),
}

/// One delivery from a live query, tagged so the store can route it and
/// discard anything addressed to a torn-down or superseded subscription.
#[derive(Debug)]
pub struct SubscriptionSignal {
    pub(crate) query_key: QueryKey,
    pub(crate) generation: u64,
    pub(crate) payload: SnapshotPayload,
}

/// Handed to the remote source at subscription time; the source pushes every
/// full snapshot (and channel failures) through it.
pub struct SnapshotSink {
    query_key: QueryKey,
    generation: u64,
    tx: mpsc::UnboundedSender<SubscriptionSignal>,
}

impl SnapshotSink {
    pub(crate) fn new(
        query_key: QueryKey,
        generation: u64,
        tx: mpsc::UnboundedSender<SubscriptionSignal>,
    ) -> Self {
        Self {
            query_key,
            generation,
            tx,
        }
    }

    pub fn deliver(&self, records: Vec<RawRecord>) {
        let _ = self.tx.send(SubscriptionSignal {
            query_key: self.query_key.clone(),
            generation: self.generation,
            payload: SnapshotPayload::Records(records),
        });
    }

    pub fn fail(&self, error: &str) {
        let _ = self.tx.send(SubscriptionSignal {
            query_key: self.query_key.clone(),
            generation: self.generation,
            payload: SnapshotPayload::ChannelDown(error.to_string()),
        });
    }
}

/// The external document backend. Persistence, querying and auth live on the
/// other side of this trait and are not reimplemented here.
#[async_trait]
pub trait RemoteCollectionSource: Send + Sync {
    async fn read_one(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<RawRecord>, AppError>;

    async fn query(
        &self,
        collection: Collection,
        filter: &QueryFilter,
        sort: &SortOrder,
    ) -> Result<Vec<RawRecord>, AppError>;

    /// Registers a live query. The source delivers an initial full snapshot
    /// promptly, then a fresh full snapshot on every matching change.
    async fn subscribe_query(
        &self,
        collection: Collection,
        filter: QueryFilter,
        sort: SortOrder,
        sink: SnapshotSink,
    ) -> Result<Box<dyn LiveQueryHandle>, AppError>;

    async fn write(&self, collection: Collection, fields: Value) -> Result<WriteAck, AppError>;

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        partial: Value,
    ) -> Result<(), AppError>;

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<(), AppError>;
}
