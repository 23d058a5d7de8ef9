use super::*;
use crate::application::ports::{
    LiveQueryHandle, ProfileResolver, RawRecord, SnapshotSink, WriteAck,
};
use crate::application::shared::SessionContext;
use crate::domain::entities::UserProfile;
use crate::domain::value_objects::{EntryStatus, MatchKey};
use crate::infrastructure::remote::{InMemoryRemoteSource, RemoteProfileResolver};
use crate::shared::config::AppConfig;
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

struct StaticResolver;

#[async_trait]
impl ProfileResolver for StaticResolver {
    async fn resolve_user(&self, id: &str) -> Result<UserProfile> {
        Ok(UserProfile::new(id.to_string(), format!("user-{id}"), None))
    }
}

/// Remote source that hands the captured sinks to the test, so snapshot
/// sequences can be crafted by hand.
#[derive(Default)]
struct StubSource {
    sinks: Mutex<Vec<SnapshotSink>>,
    cancelled: Arc<AtomicUsize>,
}

struct StubHandle {
    cancelled: Arc<AtomicUsize>,
    fired: AtomicBool,
}

impl LiveQueryHandle for StubHandle {
    fn cancel(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl RemoteCollectionSource for StubSource {
    async fn read_one(&self, _: Collection, _: &RecordId) -> Result<Option<RawRecord>> {
        Ok(None)
    }
    async fn query(&self, _: Collection, _: &QueryFilter, _: &SortOrder) -> Result<Vec<RawRecord>> {
        Ok(Vec::new())
    }
    async fn subscribe_query(
        &self,
        _: Collection,
        _: QueryFilter,
        _: SortOrder,
        sink: SnapshotSink,
    ) -> Result<Box<dyn LiveQueryHandle>> {
        self.sinks.lock().await.push(sink);
        Ok(Box::new(StubHandle {
            cancelled: self.cancelled.clone(),
            fired: AtomicBool::new(false),
        }))
    }
    async fn write(&self, _: Collection, _: serde_json::Value) -> Result<WriteAck> {
        Err(AppError::Internal("stub source takes no writes".to_string()))
    }
    async fn update(&self, _: Collection, _: &RecordId, _: serde_json::Value) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _: Collection, _: &RecordId) -> Result<()> {
        Ok(())
    }
}

fn stub_store(config: AppConfig) -> (SyncedCollectionStore, Arc<StubSource>) {
    let source = Arc::new(StubSource::default());
    let store = SyncedCollectionStore::new(
        source.clone(),
        Arc::new(StaticResolver),
        SessionContext::new("u1", "alice"),
        config,
    );
    (store, source)
}

fn memory_store() -> (SyncedCollectionStore, Arc<InMemoryRemoteSource>) {
    let source = Arc::new(InMemoryRemoteSource::new());
    let resolver = Arc::new(RemoteProfileResolver::new(source.clone()));
    let store = SyncedCollectionStore::new(
        source.clone(),
        resolver,
        SessionContext::new("u1", "alice"),
        AppConfig::default(),
    );
    (store, source)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn message_raw(id: &str, sender: &str, text: &str, millis: i64) -> RawRecord {
    RawRecord::new(
        id,
        json!({"chatId": "ch1", "senderId": sender, "text": text, "timestamp": millis}),
    )
}

async fn deliver(source: &StubSource, records: Vec<RawRecord>) {
    let sinks = source.sinks.lock().await;
    for sink in sinks.iter() {
        sink.deliver(records.clone());
    }
}

#[tokio::test]
async fn snapshot_yields_one_record_per_id_in_comparator_order() {
    let (store, source) = stub_store(AppConfig::default());
    let handle = store
        .subscribe(
            Collection::Message,
            QueryFilter::all().eq("chatId", "ch1"),
            SortOrder::oldest_first(),
        )
        .await
        .unwrap();

    deliver(
        &source,
        vec![
            message_raw("m2", "u2", "later", 2_000),
            message_raw("m1", "u1", "early", 1_000),
            // Same id delivered twice; the last occurrence wins.
            message_raw("m2", "u2", "later (edited)", 2_000),
        ],
    )
    .await;
    settle().await;

    let view = handle.current();
    let ids: Vec<_> = view.entries.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert_eq!(view.entries[1].field_str("text"), Some("later (edited)"));
}

#[tokio::test]
async fn optimistic_send_reconciles_to_the_authoritative_record() {
    let (store, source) = stub_store(AppConfig::default());
    let handle = store
        .subscribe(
            Collection::Message,
            QueryFilter::all().eq("chatId", "ch1"),
            SortOrder::oldest_first(),
        )
        .await
        .unwrap();

    let _local = store
        .apply_optimistic(
            Collection::Message,
            MatchKey::new("u1", "hi"),
            json!({"chatId": "ch1", "senderId": "u1", "text": "hi"}),
        )
        .await;

    let before = handle.current();
    assert_eq!(before.len(), 1);
    assert_eq!(before.entries[0].status, EntryStatus::Pending);

    deliver(
        &source,
        vec![message_raw("m42", "u1", "hi", Utc::now().timestamp_millis())],
    )
    .await;
    settle().await;

    // Exactly one entry for the logical action: the committed m42.
    let after = handle.current();
    assert_eq!(after.len(), 1);
    assert_eq!(after.entries[0].id.as_str(), "m42");
    assert_eq!(after.entries[0].status, EntryStatus::Committed);
    assert!(!after.entries[0].local_only);
}

#[tokio::test]
async fn remote_deletion_is_snapshot_diff_derived() {
    let (store, source) = stub_store(AppConfig::default());
    let handle = store
        .subscribe(
            Collection::Message,
            QueryFilter::all().eq("chatId", "ch1"),
            SortOrder::oldest_first(),
        )
        .await
        .unwrap();

    deliver(
        &source,
        vec![
            message_raw("m1", "u1", "one", 1_000),
            message_raw("m2", "u2", "two", 2_000),
        ],
    )
    .await;
    settle().await;
    assert_eq!(handle.current().len(), 2);

    deliver(&source, vec![message_raw("m2", "u2", "two", 2_000)]).await;
    settle().await;

    let view = handle.current();
    assert_eq!(view.len(), 1);
    assert!(!view.contains_id("m1"));
}

#[tokio::test]
async fn identical_tuple_shares_one_network_subscription() {
    let (store, source) = memory_store();
    let filter = QueryFilter::all().eq("chatId", "ch1");

    let first = store
        .subscribe(Collection::Message, filter.clone(), SortOrder::oldest_first())
        .await
        .unwrap();
    let second = store
        .subscribe(Collection::Message, filter, SortOrder::oldest_first())
        .await
        .unwrap();
    settle().await;

    assert_eq!(source.live_subscription_count().await, 1);

    // Dropping one consumer keeps the shared channel open; dropping the last
    // cancels exactly it. Unsubscribing twice is a no-op.
    store.unsubscribe(&first.token).await;
    assert_eq!(source.live_subscription_count().await, 1);
    store.unsubscribe(&first.token).await;
    assert_eq!(source.live_subscription_count().await, 1);
    store.unsubscribe(&second.token).await;
    assert_eq!(source.live_subscription_count().await, 0);
}

#[tokio::test]
async fn reattach_reuses_the_cached_view() {
    let (store, source) = memory_store();
    source
        .seed(
            Collection::Message,
            "m1",
            json!({"chatId": "ch1", "senderId": "u1", "text": "kept", "timestamp": 1_000}),
        )
        .await;

    let filter = QueryFilter::all().eq("chatId", "ch1");
    let first = store
        .subscribe(Collection::Message, filter.clone(), SortOrder::oldest_first())
        .await
        .unwrap();
    settle().await;
    assert_eq!(first.current().len(), 1);

    store.unsubscribe(&first.token).await;
    assert_eq!(source.live_subscription_count().await, 0);

    // The cached entries are visible before any fresh snapshot lands.
    let second = store
        .subscribe(Collection::Message, filter, SortOrder::oldest_first())
        .await
        .unwrap();
    assert!(second.current().contains_id("m1"));
    settle().await;
    assert_eq!(source.live_subscription_count().await, 1);
}

#[tokio::test]
async fn failed_write_keeps_the_entry_visible_and_retry_reuses_it() {
    let (store, source) = stub_store(AppConfig::default());
    let handle = store
        .subscribe(
            Collection::Message,
            QueryFilter::all().eq("chatId", "ch1"),
            SortOrder::oldest_first(),
        )
        .await
        .unwrap();

    let local = store
        .apply_optimistic(
            Collection::Message,
            MatchKey::new("u1", "hi"),
            json!({"chatId": "ch1", "senderId": "u1", "text": "hi"}),
        )
        .await;

    let attempts = Arc::new(AtomicUsize::new(0));
    let write_attempts = attempts.clone();
    let write: WriteFn = Arc::new(move || {
        let attempts = write_attempts.clone();
        async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AppError::Network("connection reset".to_string()))
            } else {
                Ok(WriteAck {
                    id: RecordId::new("m42".to_string()).map_err(AppError::Internal)?,
                    server_timestamp: Utc::now(),
                })
            }
        }
        .boxed()
    });

    let err = store
        .commit(Collection::Message, &local, write)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WriteFailure(_)));

    let view = handle.current();
    assert_eq!(view.len(), 1);
    assert_eq!(view.entries[0].status, EntryStatus::Failed);
    assert!(view.entries[0].error_message.is_some());

    // Retry re-issues the same write; still exactly one entry.
    store.retry(Collection::Message, &local).await.unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let view = handle.current();
    assert_eq!(view.len(), 1);
    assert_eq!(view.entries[0].status, EntryStatus::Pending);

    // The snapshot carrying the acknowledged id replaces the entry.
    deliver(
        &source,
        vec![message_raw("m42", "u1", "hi", Utc::now().timestamp_millis())],
    )
    .await;
    settle().await;
    let view = handle.current();
    assert_eq!(view.len(), 1);
    assert_eq!(view.entries[0].id.as_str(), "m42");
    assert_eq!(view.entries[0].status, EntryStatus::Committed);
}

#[tokio::test]
async fn pending_entry_times_out_to_failed() {
    let mut config = AppConfig::default();
    config.sync.reconcile_timeout_secs = 0;
    let (store, _source) = stub_store(config);

    store
        .apply_optimistic(
            Collection::Message,
            MatchKey::new("u1", "hello?"),
            json!({"chatId": "ch1", "senderId": "u1", "text": "hello?"}),
        )
        .await;

    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(store.expire_overdue(Collection::Message).await, 1);

    let handle = store
        .subscribe(
            Collection::Message,
            QueryFilter::all().eq("chatId", "ch1"),
            SortOrder::oldest_first(),
        )
        .await
        .unwrap();
    let view = handle.current();
    assert_eq!(view.len(), 1);
    assert_eq!(view.entries[0].status, EntryStatus::Failed);
}

#[tokio::test]
async fn duplicate_rapid_submission_matches_only_the_latest() {
    let (store, source) = stub_store(AppConfig::default());
    let handle = store
        .subscribe(
            Collection::Message,
            QueryFilter::all().eq("chatId", "ch1"),
            SortOrder::oldest_first(),
        )
        .await
        .unwrap();

    let fields = json!({"chatId": "ch1", "senderId": "u1", "text": "spam"});
    let first = store
        .apply_optimistic(Collection::Message, MatchKey::new("u1", "spam"), fields.clone())
        .await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let _second = store
        .apply_optimistic(Collection::Message, MatchKey::new("u1", "spam"), fields)
        .await;

    deliver(
        &source,
        vec![message_raw("m7", "u1", "spam", Utc::now().timestamp_millis())],
    )
    .await;
    settle().await;

    // The authoritative record replaced the most recent duplicate; the first
    // one is still pending (and will time out) instead of being dropped.
    let view = handle.current();
    assert_eq!(view.len(), 2);
    assert!(view.contains_id("m7"));
    assert!(view.contains_id(first.as_str()));
}

#[tokio::test]
async fn dropped_channel_goes_stale_and_recovers() {
    let source = Arc::new(InMemoryRemoteSource::new());
    let resolver = Arc::new(RemoteProfileResolver::new(source.clone()));
    let mut config = AppConfig::default();
    config.sync.resubscribe_interval_secs = 1;
    let store = SyncedCollectionStore::new(
        source.clone(),
        resolver,
        SessionContext::new("u1", "alice"),
        config,
    );

    source
        .seed(
            Collection::Message,
            "m1",
            json!({"chatId": "ch1", "senderId": "u1", "text": "kept", "timestamp": 1_000}),
        )
        .await;
    let handle = store
        .subscribe(
            Collection::Message,
            QueryFilter::all().eq("chatId", "ch1"),
            SortOrder::oldest_first(),
        )
        .await
        .unwrap();
    settle().await;
    assert_eq!(handle.current().len(), 1);

    source.drop_live_channels("simulated outage").await;
    settle().await;

    // Stale, but the last-known data is still shown.
    let stale_view = handle.current();
    assert!(stale_view.stale);
    assert_eq!(stale_view.len(), 1);

    // Backoff re-established the subscription; the next snapshot clears the flag.
    tokio::time::sleep(Duration::from_millis(1_300)).await;
    assert_eq!(source.live_subscription_count().await, 1);
    source
        .seed(
            Collection::Message,
            "m2",
            json!({"chatId": "ch1", "senderId": "u1", "text": "fresh", "timestamp": 2_000}),
        )
        .await;
    settle().await;
    let fresh = handle.current();
    assert!(!fresh.stale);
    assert_eq!(fresh.len(), 2);
}

#[tokio::test]
async fn snapshot_after_unsubscribe_is_discarded() {
    let (store, source) = stub_store(AppConfig::default());
    let handle = store
        .subscribe(
            Collection::Message,
            QueryFilter::all().eq("chatId", "ch1"),
            SortOrder::oldest_first(),
        )
        .await
        .unwrap();

    store.unsubscribe(&handle.token).await;
    deliver(&source, vec![message_raw("m1", "u1", "late", 1_000)]).await;
    settle().await;

    // The delivery raced teardown and was dropped; the cached view is empty.
    assert!(handle.current().is_empty());
}
