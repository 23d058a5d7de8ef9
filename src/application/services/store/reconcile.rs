use super::optimistic::{expire_overdue_locked, OptimisticEntry};
use super::{refresh_collection_views, StoreInner};
use crate::application::ports::RawRecord;
use crate::domain::entities::{compare_records, EntityRecord};
use crate::domain::value_objects::{EntryStatus, MatchKey, QueryKey};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

impl StoreInner {
    /// Continuation entry point for every snapshot the live channel delivers.
    /// Snapshots addressed to a torn-down or superseded subscription are
    /// discarded unconditionally.
    pub(crate) async fn on_snapshot(&self, key: QueryKey, generation: u64, raw: Vec<RawRecord>) {
        let (collection, filter) = {
            let state = self.state.read().await;
            match state.subscriptions.get(&key) {
                Some(entry) if entry.generation == generation => {
                    (entry.collection, entry.filter.clone())
                }
                _ => {
                    debug!("Discarding snapshot for inactive subscription {key}");
                    return;
                }
            }
        };

        // Normalize outside the lock; malformed records are dropped from the
        // view, never fatal.
        let mut normalized = Vec::with_capacity(raw.len());
        for record in raw {
            match self.normalizer.normalize(record, collection).await {
                Ok(record) => normalized.push(record),
                Err(err) => warn!("Dropping malformed {collection} record: {err}"),
            }
        }
        let authoritative = dedup_by_id(normalized);

        let mut state = self.state.write().await;
        match state.subscriptions.get(&key) {
            Some(entry) if entry.generation == generation => {}
            _ => {
                debug!("Discarding snapshot raced by teardown for {key}");
                return;
            }
        }

        expire_overdue_locked(&mut state, collection, self.config.reconcile_timeout_secs);

        // Pair incoming records with pending optimistic entries and drop the
        // matched entries; the authoritative records stand in their place.
        if let Some(pending) = state.optimistic.get_mut(&collection) {
            for record in &authoritative {
                take_optimistic_match(pending, record, self.config.match_window_secs);
            }
        }

        // A tombstone whose record this snapshot would have included but
        // omits is confirmed deleted remotely.
        let snapshot_ids: HashSet<&str> = authoritative
            .iter()
            .map(|record| record.id.as_str())
            .collect();
        if let Some(tombstones) = state.suppressed.get_mut(&collection) {
            tombstones
                .retain(|id, fields| !filter.matches(fields) || snapshot_ids.contains(id.as_str()));
        }

        if let Some(entry) = state.subscriptions.get_mut(&key) {
            let mut authoritative = authoritative;
            let sort = entry.sort.clone();
            authoritative.sort_by(|a, b| compare_records(a, b, &sort));
            entry.authoritative = authoritative;
            entry.stale = false;
        }

        refresh_collection_views(&mut state, collection);
    }

    /// The live channel dropped: flag the view stale (data stays visible),
    /// release the dead handle, and re-establish with bounded backoff.
    pub(crate) async fn on_channel_down(self: &Arc<Self>, key: QueryKey, generation: u64, message: &str) {
        {
            let mut state = self.state.write().await;
            let Some(entry) = state.subscriptions.get_mut(&key) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            warn!("Live subscription {key} dropped: {message}");
            if let Some(handle) = entry.handle.take() {
                handle.cancel();
            }
            entry.generation += 1;
            entry.stale = true;
            let collection = entry.collection;
            refresh_collection_views(&mut state, collection);
        }
        self.spawn_resubscribe(key);
    }

    fn spawn_resubscribe(self: &Arc<Self>, key: QueryKey) {
        let weak = Arc::downgrade(self);
        let max_attempts = self.config.max_resubscribe_attempts;
        let base_secs = self.config.resubscribe_interval_secs;
        tokio::spawn(async move {
            for attempt in 0..max_attempts {
                let delay = base_secs.saturating_mul(1u64 << attempt.min(16));
                tokio::time::sleep(Duration::from_secs(delay)).await;

                let Some(inner) = weak.upgrade() else { return };
                let mut state = inner.state.write().await;
                let Some(entry) = state.subscriptions.get(&key) else {
                    return;
                };
                if entry.tokens.is_empty() || entry.handle.is_some() {
                    return;
                }
                match inner.open_live(&mut state, &key).await {
                    Ok(()) => {
                        info!("Re-established live subscription {key}");
                        return;
                    }
                    Err(err) => {
                        warn!("Resubscribe attempt {} for {key} failed: {err}", attempt + 1);
                    }
                }
            }
            warn!("Giving up re-establishing live subscription {key}");
        });
    }
}

/// Keeps the last occurrence per id, preserving first-seen positions; the
/// view invariant is at most one record per remote id.
fn dedup_by_id(records: Vec<EntityRecord>) -> Vec<EntityRecord> {
    let mut index_of = HashMap::new();
    let mut deduped: Vec<EntityRecord> = Vec::with_capacity(records.len());
    for record in records {
        match index_of.entry(record.id.clone()) {
            Entry::Occupied(slot) => deduped[*slot.get()] = record,
            Entry::Vacant(slot) => {
                slot.insert(deduped.len());
                deduped.push(record);
            }
        }
    }
    deduped
}

/// Removes (and reports) the pending optimistic entry the incoming
/// authoritative record confirms, if any.
///
/// An acknowledged remote id is authoritative on its own. The content key is
/// the fallback for snapshots racing ahead of the write ack: author plus
/// content hash, with the server timestamp required to fall inside the match
/// window around submission. Among duplicate keys (rapid duplicate
/// submissions) only the most recently created entry is eligible; the older
/// one times out and fails rather than being silently dropped.
fn take_optimistic_match(
    pending: &mut Vec<OptimisticEntry>,
    record: &EntityRecord,
    window_secs: i64,
) -> bool {
    if let Some(position) = pending
        .iter()
        .position(|entry| entry.remote_id.as_ref() == Some(&record.id))
    {
        pending.remove(position);
        return true;
    }

    let Some(derived) = MatchKey::derive(record.collection, &record.fields) else {
        return false;
    };

    let candidate = pending
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            entry.record.status == EntryStatus::Pending && entry.match_key == derived
        })
        .max_by_key(|(_, entry)| entry.created_at)
        .map(|(position, _)| position);

    if let Some(position) = candidate {
        let within_window = record
            .server_timestamp
            .map(|ts| (ts - pending[position].created_at).num_seconds().abs() <= window_secs)
            .unwrap_or(true);
        if within_window {
            pending.remove(position);
            return true;
        }
    }
    false
}
