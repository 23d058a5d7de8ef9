use crate::application::ports::{
    LiveQueryHandle, RawRecord, RemoteCollectionSource, SnapshotSink, WriteAck,
};
use crate::application::shared::normalizer::timestamp_field;
use crate::domain::value_objects::{Collection, QueryFilter, RecordId, SortOrder};
use crate::shared::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-memory stand-in for the managed document backend: ordered writes with
/// server-assigned ids and timestamps, filtered queries, and live queries
/// that redeliver a full snapshot on every matching change.
///
/// The store is built against the [`RemoteCollectionSource`] port, so this
/// implementation doubles as the injected fake for integration tests.
#[derive(Default)]
pub struct InMemoryRemoteSource {
    state: Mutex<SourceState>,
}

#[derive(Default)]
struct SourceState {
    collections: HashMap<Collection, BTreeMap<String, Value>>,
    live: Vec<LiveSub>,
    next_id: u64,
}

struct LiveSub {
    collection: Collection,
    filter: QueryFilter,
    sink: SnapshotSink,
    cancelled: Arc<AtomicBool>,
}

struct MemoryLiveHandle {
    cancelled: Arc<AtomicBool>,
}

impl LiveQueryHandle for MemoryLiveHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl InMemoryRemoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record with a caller-chosen id, bypassing id assignment.
    /// Live queries are notified like for any other change.
    pub async fn seed(&self, collection: Collection, id: &str, fields: Value) {
        let mut state = self.state.lock().await;
        state
            .collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), fields);
        notify(&mut state, collection);
    }

    /// Number of live queries that have not been cancelled.
    pub async fn live_subscription_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state
            .live
            .retain(|sub| !sub.cancelled.load(Ordering::SeqCst));
        state.live.len()
    }

    /// Simulates the live channel dropping for every open subscription.
    pub async fn drop_live_channels(&self, message: &str) {
        let mut state = self.state.lock().await;
        for sub in state.live.drain(..) {
            if !sub.cancelled.load(Ordering::SeqCst) {
                sub.sink.fail(message);
            }
        }
    }
}

fn matching_records(
    state: &SourceState,
    collection: Collection,
    filter: &QueryFilter,
) -> Vec<RawRecord> {
    state
        .collections
        .get(&collection)
        .map(|records| {
            records
                .iter()
                .filter(|(_, fields)| filter.matches(fields))
                .map(|(id, fields)| RawRecord::new(id.clone(), fields.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Redelivers a full snapshot to every live query over the collection, per
/// the subscribe-to-query contract.
fn notify(state: &mut SourceState, collection: Collection) {
    state
        .live
        .retain(|sub| !sub.cancelled.load(Ordering::SeqCst));
    let snapshots: Vec<(usize, Vec<RawRecord>)> = state
        .live
        .iter()
        .enumerate()
        .filter(|(_, sub)| sub.collection == collection)
        .map(|(index, sub)| (index, matching_records(state, collection, &sub.filter)))
        .collect();
    for (index, records) in snapshots {
        state.live[index].sink.deliver(records);
    }
}

#[async_trait]
impl RemoteCollectionSource for InMemoryRemoteSource {
    async fn read_one(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<Option<RawRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .collections
            .get(&collection)
            .and_then(|records| records.get(id.as_str()))
            .map(|fields| RawRecord::new(id.as_str(), fields.clone())))
    }

    async fn query(
        &self,
        collection: Collection,
        filter: &QueryFilter,
        _sort: &SortOrder,
    ) -> Result<Vec<RawRecord>> {
        let state = self.state.lock().await;
        Ok(matching_records(&state, collection, filter))
    }

    async fn subscribe_query(
        &self,
        collection: Collection,
        filter: QueryFilter,
        _sort: SortOrder,
        sink: SnapshotSink,
    ) -> Result<Box<dyn LiveQueryHandle>> {
        let mut state = self.state.lock().await;
        // Initial full snapshot, then one per change.
        sink.deliver(matching_records(&state, collection, &filter));
        let cancelled = Arc::new(AtomicBool::new(false));
        state.live.push(LiveSub {
            collection,
            filter,
            sink,
            cancelled: cancelled.clone(),
        });
        Ok(Box::new(MemoryLiveHandle { cancelled }))
    }

    async fn write(&self, collection: Collection, fields: Value) -> Result<WriteAck> {
        if !fields.is_object() {
            return Err(AppError::Validation(format!(
                "write payload must be an object, got {fields}"
            )));
        }
        let mut fields = fields;

        let mut state = self.state.lock().await;
        state.next_id += 1;
        let id = format!("{}-{}", collection, state.next_id);
        let server_timestamp = Utc::now();

        // Server-assigned timestamp, unless the caller set the field
        // explicitly (a chat is created with a null activity timestamp).
        let ts_field = timestamp_field(collection);
        if fields.get(ts_field).is_none() {
            fields[ts_field] = Value::from(server_timestamp.timestamp_millis());
        }

        state
            .collections
            .entry(collection)
            .or_default()
            .insert(id.clone(), fields);
        notify(&mut state, collection);

        Ok(WriteAck {
            id: RecordId::new(id).map_err(AppError::Internal)?,
            server_timestamp,
        })
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        partial: Value,
    ) -> Result<()> {
        let Value::Object(partial) = partial else {
            return Err(AppError::Validation(
                "update payload must be an object".to_string(),
            ));
        };

        let mut state = self.state.lock().await;
        let fields = state
            .collections
            .get_mut(&collection)
            .and_then(|records| records.get_mut(id.as_str()))
            .ok_or_else(|| AppError::NotFound(format!("{collection} record {id}")))?;
        if let Value::Object(existing) = fields {
            for (key, value) in partial {
                existing.insert(key, value);
            }
        }
        notify(&mut state, collection);
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<()> {
        let mut state = self.state.lock().await;
        let removed = state
            .collections
            .get_mut(&collection)
            .and_then(|records| records.remove(id.as_str()));
        if removed.is_none() {
            return Err(AppError::NotFound(format!("{collection} record {id}")));
        }
        notify(&mut state, collection);
        Ok(())
    }
}
