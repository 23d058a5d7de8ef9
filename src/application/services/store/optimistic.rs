use super::{refresh_collection_views, StoreState, SyncedCollectionStore};
use crate::application::ports::WriteAck;
use crate::domain::entities::{EntityRecord, UserProfile};
use crate::domain::value_objects::{Collection, EntryStatus, LocalId, MatchKey, RecordId};
use crate::shared::error::{AppError, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Caller-supplied remote write, kept by the store so a failed entry can be
/// retried without creating a second optimistic entry.
pub type WriteFn = Arc<dyn Fn() -> BoxFuture<'static, Result<WriteAck>> + Send + Sync>;

pub(crate) struct OptimisticEntry {
    pub local_id: LocalId,
    pub match_key: MatchKey,
    pub record: EntityRecord,
    pub created_at: DateTime<Utc>,
    /// Set once the write is acknowledged; reconciliation prefers this over
    /// the content-derived match key.
    pub remote_id: Option<RecordId>,
    pub write: Option<WriteFn>,
}

impl SyncedCollectionStore {
    /// Inserts a pending local-only record at its sorted position in every
    /// matching view. No network involved; returns the temporary id.
    pub async fn apply_optimistic(
        &self,
        collection: Collection,
        match_key: MatchKey,
        fields: Value,
    ) -> LocalId {
        let local_id = LocalId::generate();
        let author = UserProfile::new(
            self.inner.session.user_id.clone(),
            self.inner.session.username.clone(),
            None,
        );
        let record = EntityRecord::optimistic(&local_id, collection, fields, Some(author));

        let mut state = self.inner.state.write().await;
        state
            .optimistic
            .entry(collection)
            .or_default()
            .push(OptimisticEntry {
                local_id: local_id.clone(),
                match_key,
                record,
                created_at: Utc::now(),
                remote_id: None,
                write: None,
            });
        refresh_collection_views(&mut state, collection);
        local_id
    }

    /// Runs the remote write for an optimistic entry. On failure the entry
    /// stays visible, flipped to `failed` with the error retained; on success
    /// it stays `pending` until reconciliation replaces it with the
    /// authoritative record.
    pub async fn commit(
        &self,
        collection: Collection,
        local_id: &LocalId,
        write: WriteFn,
    ) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            let entry = find_entry_mut(&mut state, collection, local_id).ok_or_else(|| {
                AppError::NotFound(format!("optimistic entry {local_id} in {collection}"))
            })?;
            entry.write = Some(write);
        }
        self.run_write(collection, local_id).await
    }

    /// Re-issues the stored write for a failed entry. The entry flips back to
    /// `pending` and the reconciliation clock restarts; no second optimistic
    /// entry is created.
    pub async fn retry(&self, collection: Collection, local_id: &LocalId) -> Result<()> {
        {
            let mut state = self.inner.state.write().await;
            let entry = find_entry_mut(&mut state, collection, local_id).ok_or_else(|| {
                AppError::NotFound(format!("optimistic entry {local_id} in {collection}"))
            })?;
            if entry.write.is_none() {
                return Err(AppError::Validation(format!(
                    "optimistic entry {local_id} has no write to retry"
                )));
            }
            entry.record.mark_pending();
            entry.created_at = Utc::now();
            refresh_collection_views(&mut state, collection);
        }
        self.run_write(collection, local_id).await
    }

    /// Drops an optimistic entry from every view, e.g. after the user
    /// dismisses a failed action.
    pub async fn discard(&self, collection: Collection, local_id: &LocalId) -> Result<()> {
        let mut state = self.inner.state.write().await;
        let list = state.optimistic.entry(collection).or_default();
        let position = list
            .iter()
            .position(|entry| &entry.local_id == local_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("optimistic entry {local_id} in {collection}"))
            })?;
        list.remove(position);
        refresh_collection_views(&mut state, collection);
        Ok(())
    }

    /// Flips pending entries older than the reconciliation timeout to
    /// `failed`. Also swept on every snapshot delivery; exposed so the UI can
    /// run it from a timer while a collection is quiet.
    pub async fn expire_overdue(&self, collection: Collection) -> usize {
        let mut state = self.inner.state.write().await;
        expire_overdue_locked(
            &mut state,
            collection,
            self.inner.config.reconcile_timeout_secs,
        )
    }

    /// Hides an authoritative record from every view immediately, ahead of
    /// the remote delete. The tombstone survives until the remote deletion is
    /// confirmed by a snapshot that omits the record, or until
    /// [`Self::restore_local`] rolls it back.
    pub async fn remove_local(&self, collection: Collection, id: &RecordId) {
        let mut state = self.inner.state.write().await;
        let fields = state
            .subscriptions
            .values()
            .filter(|entry| entry.collection == collection)
            .flat_map(|entry| entry.authoritative.iter())
            .find(|record| &record.id == id)
            .map(|record| record.fields.clone())
            .unwrap_or(Value::Null);
        state
            .suppressed
            .entry(collection)
            .or_default()
            .insert(id.clone(), fields);
        refresh_collection_views(&mut state, collection);
    }

    /// Rolls back [`Self::remove_local`] after a failed remote delete.
    pub async fn restore_local(&self, collection: Collection, id: &RecordId) {
        let mut state = self.inner.state.write().await;
        let removed = state
            .suppressed
            .get_mut(&collection)
            .map(|tombstones| tombstones.remove(id).is_some())
            .unwrap_or(false);
        if removed {
            refresh_collection_views(&mut state, collection);
        }
    }

    async fn run_write(&self, collection: Collection, local_id: &LocalId) -> Result<()> {
        let write = {
            let state = self.inner.state.read().await;
            state
                .optimistic
                .get(&collection)
                .and_then(|list| list.iter().find(|entry| &entry.local_id == local_id))
                .and_then(|entry| entry.write.clone())
                .ok_or_else(|| {
                    AppError::NotFound(format!("optimistic entry {local_id} in {collection}"))
                })?
        };

        match write().await {
            Ok(ack) => {
                let mut state = self.inner.state.write().await;
                // The snapshot may already have delivered the authoritative
                // record; reconciliation then happened by content key and the
                // entry is gone, or the record landed unmatched and the entry
                // is now redundant.
                let already_authoritative = state
                    .subscriptions
                    .values()
                    .filter(|entry| entry.collection == collection)
                    .flat_map(|entry| entry.authoritative.iter())
                    .any(|record| record.id == ack.id);
                let list = state.optimistic.entry(collection).or_default();
                if let Some(position) = list.iter().position(|entry| &entry.local_id == local_id) {
                    if already_authoritative {
                        list.remove(position);
                    } else {
                        list[position].remote_id = Some(ack.id.clone());
                    }
                    refresh_collection_views(&mut state, collection);
                }
                Ok(())
            }
            Err(err) => {
                let mut state = self.inner.state.write().await;
                let list = state.optimistic.entry(collection).or_default();
                if let Some(entry) = list.iter_mut().find(|entry| &entry.local_id == local_id) {
                    entry.record.mark_failed(&err.to_string());
                }
                refresh_collection_views(&mut state, collection);
                Err(AppError::WriteFailure(err.to_string()))
            }
        }
    }
}

pub(crate) fn expire_overdue_locked(
    state: &mut StoreState,
    collection: Collection,
    timeout_secs: i64,
) -> usize {
    let now = Utc::now();
    let mut flipped = 0;
    if let Some(list) = state.optimistic.get_mut(&collection) {
        for entry in list.iter_mut() {
            if entry.record.status == EntryStatus::Pending
                && (now - entry.created_at).num_seconds() > timeout_secs
            {
                let reason = AppError::ReconciliationTimeout(format!(
                    "no authoritative match within {timeout_secs}s"
                ));
                entry.record.mark_failed(&reason.to_string());
                flipped += 1;
            }
        }
    }
    if flipped > 0 {
        refresh_collection_views(state, collection);
    }
    flipped
}

pub(crate) fn find_entry_mut<'a>(
    state: &'a mut StoreState,
    collection: Collection,
    local_id: &LocalId,
) -> Option<&'a mut OptimisticEntry> {
    state
        .optimistic
        .get_mut(&collection)?
        .iter_mut()
        .find(|entry| &entry.local_id == local_id)
}
