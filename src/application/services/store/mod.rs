use crate::application::ports::remote_source::{SnapshotPayload, SnapshotSink};
use crate::application::ports::{ProfileResolver, RemoteCollectionSource, SubscriptionSignal};
use crate::application::shared::{EntityNormalizer, SessionContext};
use crate::domain::value_objects::{Collection, QueryFilter, QueryKey, RecordId, SortOrder};
use crate::infrastructure::cache::CachedProfileResolver;
use crate::shared::config::{AppConfig, SyncConfig};
use crate::shared::error::{AppError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};

mod optimistic;
mod reconcile;
mod view;

#[cfg(test)]
mod tests;

pub use optimistic::WriteFn;
pub use view::ViewState;

use optimistic::OptimisticEntry;
use view::SubscriptionEntry;

/// Proof of an attached consumer; passed back to [`SyncedCollectionStore::unsubscribe`].
#[derive(Debug)]
pub struct SubscriptionToken {
    pub(crate) query_key: QueryKey,
    pub(crate) id: u64,
}

/// A live, ordered, deduplicated view of one subscribed query.
///
/// `updates` always holds the latest [`ViewState`]; the value present right
/// after subscribing is the initial view.
pub struct ViewHandle {
    pub token: SubscriptionToken,
    pub updates: watch::Receiver<ViewState>,
}

impl ViewHandle {
    pub fn current(&self) -> ViewState {
        self.updates.borrow().clone()
    }
}

#[derive(Default)]
pub(crate) struct StoreState {
    pub subscriptions: HashMap<QueryKey, SubscriptionEntry>,
    pub optimistic: HashMap<Collection, Vec<OptimisticEntry>>,
    /// Local tombstones: records removed from views ahead of the remote
    /// delete, keyed by id with the last-known fields kept for filter checks.
    pub suppressed: HashMap<Collection, HashMap<RecordId, Value>>,
    pub next_token: u64,
}

pub(crate) struct StoreInner {
    pub remote: Arc<dyn RemoteCollectionSource>,
    pub normalizer: EntityNormalizer,
    pub session: SessionContext,
    pub config: SyncConfig,
    pub state: RwLock<StoreState>,
    pub signal_tx: mpsc::UnboundedSender<SubscriptionSignal>,
}

/// Client-side cache mirroring remote collections: reference-counted live
/// subscriptions, optimistic local writes, snapshot reconciliation, ordered
/// read-only views.
///
/// All state mutation happens under one async lock, entered either from a
/// public operation or from the signal pump that serially drains snapshot
/// deliveries. One logical thread of control, no locks beyond it.
#[derive(Clone)]
pub struct SyncedCollectionStore {
    pub(crate) inner: Arc<StoreInner>,
}

impl SyncedCollectionStore {
    pub fn new(
        remote: Arc<dyn RemoteCollectionSource>,
        resolver: Arc<dyn ProfileResolver>,
        session: SessionContext,
        config: AppConfig,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let resolver: Arc<dyn ProfileResolver> = Arc::new(CachedProfileResolver::new(
            resolver,
            config.cache.profile_cache_capacity,
        ));
        let inner = Arc::new(StoreInner {
            remote,
            normalizer: EntityNormalizer::new(resolver, session.clone()),
            session,
            config: config.sync,
            state: RwLock::new(StoreState::default()),
            signal_tx,
        });
        spawn_signal_pump(&inner, signal_rx);
        Self { inner }
    }

    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    pub fn remote(&self) -> Arc<dyn RemoteCollectionSource> {
        Arc::clone(&self.inner.remote)
    }

    /// Registers interest in a (collection, filter, sort) tuple. An identical
    /// live subscription is shared: further consumers only bump its reference
    /// count and receive the current view immediately. A consumer attaching
    /// to a detached-but-cached tuple reopens the live channel without
    /// clearing the cached view.
    pub async fn subscribe(
        &self,
        collection: Collection,
        filter: QueryFilter,
        sort: SortOrder,
    ) -> Result<ViewHandle> {
        let key = QueryKey::derive(collection, &filter, &sort);
        let mut state = self.inner.state.write().await;
        let token_id = state.next_token;
        state.next_token += 1;

        let is_new = !state.subscriptions.contains_key(&key);
        if is_new {
            let (watch_tx, _) = watch::channel(ViewState::empty());
            state.subscriptions.insert(
                key.clone(),
                SubscriptionEntry::new(collection, filter, sort, watch_tx),
            );
            // Seed the view with any optimistic entries already pending.
            refresh_collection_views(&mut state, collection);
        }

        let needs_open = {
            let entry = state
                .subscriptions
                .get_mut(&key)
                .ok_or_else(|| AppError::Internal("subscription vanished".to_string()))?;
            entry.tokens.insert(token_id);
            entry.handle.is_none()
        };

        if needs_open {
            if let Err(err) = self.inner.open_live(&mut state, &key).await {
                if let Some(entry) = state.subscriptions.get_mut(&key) {
                    entry.tokens.remove(&token_id);
                }
                if is_new {
                    state.subscriptions.remove(&key);
                }
                return Err(err);
            }
        }

        let updates = state
            .subscriptions
            .get(&key)
            .map(|entry| entry.watch_tx.subscribe())
            .ok_or_else(|| AppError::Internal("subscription vanished".to_string()))?;

        Ok(ViewHandle {
            token: SubscriptionToken {
                query_key: key,
                id: token_id,
            },
            updates,
        })
    }

    /// Detaches one consumer. Idempotent; the underlying live handle is
    /// cancelled exactly once, when the last consumer leaves. The cached view
    /// is retained so a later subscriber reattaches without a cold start, and
    /// any in-flight snapshot for the old registration is discarded.
    pub async fn unsubscribe(&self, token: &SubscriptionToken) {
        let mut state = self.inner.state.write().await;
        let Some(entry) = state.subscriptions.get_mut(&token.query_key) else {
            return;
        };
        if !entry.tokens.remove(&token.id) {
            return;
        }
        if entry.tokens.is_empty() {
            if let Some(handle) = entry.handle.take() {
                handle.cancel();
            }
            entry.generation += 1;
        }
    }
}

impl StoreInner {
    /// Opens (or reopens) the live channel for an existing subscription
    /// entry. Caller holds the state lock, which serializes every open
    /// against unsubscribes and deliveries.
    pub(crate) async fn open_live(&self, state: &mut StoreState, key: &QueryKey) -> Result<()> {
        let (collection, filter, sort, generation) = {
            let entry = state
                .subscriptions
                .get_mut(key)
                .ok_or_else(|| AppError::Internal("subscription vanished".to_string()))?;
            entry.generation += 1;
            (
                entry.collection,
                entry.filter.clone(),
                entry.sort.clone(),
                entry.generation,
            )
        };

        let sink = SnapshotSink::new(key.clone(), generation, self.signal_tx.clone());
        let handle = self
            .remote
            .subscribe_query(collection, filter, sort, sink)
            .await
            .map_err(|err| AppError::Subscription(err.to_string()))?;

        match state.subscriptions.get_mut(key) {
            Some(entry) if entry.generation == generation => entry.handle = Some(handle),
            _ => handle.cancel(),
        }
        Ok(())
    }

    pub(crate) async fn dispatch(self: &Arc<Self>, signal: SubscriptionSignal) {
        match signal.payload {
            SnapshotPayload::Records(records) => {
                self.on_snapshot(signal.query_key, signal.generation, records)
                    .await;
            }
            SnapshotPayload::ChannelDown(message) => {
                self.on_channel_down(signal.query_key, signal.generation, &message)
                    .await;
            }
        }
    }
}

/// Recomputes and publishes the view of every subscription over the given
/// collection. The whole view is rebuilt per change; consumers only ever see
/// complete, consistently ordered snapshots.
pub(crate) fn refresh_collection_views(state: &mut StoreState, collection: Collection) {
    let StoreState {
        subscriptions,
        optimistic,
        suppressed,
        ..
    } = state;

    let pending: &[OptimisticEntry] = optimistic
        .get(&collection)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let no_tombstones = HashMap::new();
    let tombstones = suppressed.get(&collection).unwrap_or(&no_tombstones);

    for entry in subscriptions
        .values_mut()
        .filter(|entry| entry.collection == collection)
    {
        let view = entry.rebuild(pending, tombstones);
        entry.publish(view);
    }
}

fn spawn_signal_pump(
    inner: &Arc<StoreInner>,
    mut signal_rx: mpsc::UnboundedReceiver<SubscriptionSignal>,
) {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        while let Some(signal) = signal_rx.recv().await {
            let Some(inner) = weak.upgrade() else { break };
            inner.dispatch(signal).await;
        }
    });
}
