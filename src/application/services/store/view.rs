use super::optimistic::OptimisticEntry;
use crate::application::ports::LiveQueryHandle;
use crate::domain::entities::{compare_records, EntityRecord};
use crate::domain::value_objects::{Collection, QueryFilter, RecordId, SortOrder};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable snapshot of a subscribed view, handed to consumers through a
/// watch channel. The store never exposes its mutable entry vectors.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub entries: Arc<Vec<EntityRecord>>,
    /// Set while the live channel is down; last-known data stays visible.
    pub stale: bool,
}

impl ViewState {
    pub fn empty() -> Self {
        Self {
            entries: Arc::new(Vec::new()),
            stale: false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.entries.iter().any(|r| r.id.as_str() == id)
    }
}

/// One reference-counted live subscription and its materialized view.
pub(crate) struct SubscriptionEntry {
    pub collection: Collection,
    pub filter: QueryFilter,
    pub sort: SortOrder,
    /// Bumped on every cancel/reopen; deliveries tagged with an older
    /// generation are discarded.
    pub generation: u64,
    /// Outstanding consumer tokens; the live handle is released when the
    /// last one unsubscribes.
    pub tokens: HashSet<u64>,
    pub handle: Option<Box<dyn LiveQueryHandle>>,
    /// Latest normalized snapshot, already in comparator order.
    pub authoritative: Vec<EntityRecord>,
    pub stale: bool,
    pub watch_tx: watch::Sender<ViewState>,
}

impl SubscriptionEntry {
    pub fn new(
        collection: Collection,
        filter: QueryFilter,
        sort: SortOrder,
        watch_tx: watch::Sender<ViewState>,
    ) -> Self {
        Self {
            collection,
            filter,
            sort,
            generation: 1,
            tokens: HashSet::new(),
            handle: None,
            authoritative: Vec::new(),
            stale: false,
            watch_tx,
        }
    }

    /// Merges the authoritative snapshot (minus local tombstones) with the
    /// pending optimistic entries that match this view's filter, in
    /// comparator order.
    pub fn rebuild(
        &self,
        optimistic: &[OptimisticEntry],
        tombstones: &HashMap<RecordId, Value>,
    ) -> ViewState {
        let mut entries: Vec<EntityRecord> = self
            .authoritative
            .iter()
            .filter(|record| !tombstones.contains_key(&record.id))
            .cloned()
            .collect();

        entries.extend(
            optimistic
                .iter()
                .filter(|entry| self.filter.matches(&entry.record.fields))
                .map(|entry| entry.record.clone()),
        );

        entries.sort_by(|a, b| compare_records(a, b, &self.sort));

        ViewState {
            entries: Arc::new(entries),
            stale: self.stale,
        }
    }

    pub fn publish(&self, view: ViewState) {
        self.watch_tx.send_replace(view);
    }
}
