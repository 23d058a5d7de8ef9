use super::store::{SyncedCollectionStore, WriteFn};
use crate::application::ports::RemoteCollectionSource;
use crate::domain::value_objects::{Collection, MatchKey, QueryFilter, RecordId, SortOrder};
use crate::shared::error::{AppError, Result};
use futures::FutureExt;
use serde_json::json;
use std::sync::Arc;

/// Like toggles. A like is its own remote record keyed by (post, user); the
/// toggle flips optimistically and the remote write follows.
pub struct ReactionService {
    store: SyncedCollectionStore,
}

impl ReactionService {
    pub fn new(store: SyncedCollectionStore) -> Self {
        Self { store }
    }

    /// Creates the like record unless one already exists for this user, so a
    /// double-tap cannot double-count.
    pub async fn like_post(&self, post_id: &RecordId) -> Result<()> {
        if self.find_like(post_id).await?.is_some() {
            return Ok(());
        }

        let user_id = self.store.session().user_id.clone();
        let fields = json!({
            "postId": post_id.as_str(),
            "userId": user_id,
        });
        let match_key = MatchKey::new(&user_id, post_id.as_str());

        let local_id = self
            .store
            .apply_optimistic(Collection::Like, match_key, fields.clone())
            .await;

        let remote = self.store.remote();
        let write: WriteFn = Arc::new(move || {
            let remote = Arc::clone(&remote);
            let fields = fields.clone();
            async move { remote.write(Collection::Like, fields).await }.boxed()
        });
        self.store.commit(Collection::Like, &local_id, write).await
    }

    /// Deletes every like record this user holds on the post (duplicates
    /// included), removing each locally first and restoring on a rejected
    /// remote delete.
    pub async fn unlike_post(&self, post_id: &RecordId) -> Result<()> {
        let remote = self.store.remote();
        let likes = remote
            .query(
                Collection::Like,
                &self.own_like_filter(post_id),
                &SortOrder::default(),
            )
            .await?;

        for like in likes {
            let like_id = RecordId::new(like.id).map_err(AppError::Validation)?;
            self.store.remove_local(Collection::Like, &like_id).await;
            if let Err(err) = remote.delete(Collection::Like, &like_id).await {
                self.store.restore_local(Collection::Like, &like_id).await;
                return Err(err);
            }
        }
        Ok(())
    }

    pub async fn is_liked(&self, post_id: &RecordId) -> Result<bool> {
        Ok(self.find_like(post_id).await?.is_some())
    }

    pub async fn like_count(&self, post_id: &RecordId) -> Result<usize> {
        let likes = self
            .store
            .remote()
            .query(
                Collection::Like,
                &QueryFilter::all().eq("postId", post_id.as_str()),
                &SortOrder::default(),
            )
            .await?;
        Ok(likes.len())
    }

    async fn find_like(&self, post_id: &RecordId) -> Result<Option<RecordId>> {
        let likes = self
            .store
            .remote()
            .query(
                Collection::Like,
                &self.own_like_filter(post_id),
                &SortOrder::default(),
            )
            .await?;
        likes
            .into_iter()
            .next()
            .map(|like| RecordId::new(like.id).map_err(AppError::Validation))
            .transpose()
    }

    fn own_like_filter(&self, post_id: &RecordId) -> QueryFilter {
        QueryFilter::all()
            .eq("postId", post_id.as_str())
            .eq("userId", self.store.session().user_id.as_str())
    }
}
