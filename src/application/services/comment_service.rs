use super::store::{SyncedCollectionStore, ViewHandle, WriteFn};
use crate::application::ports::RemoteCollectionSource;
use crate::domain::value_objects::{Collection, LocalId, MatchKey, QueryFilter, RecordId, SortOrder};
use crate::shared::error::{AppError, Result};
use futures::FutureExt;
use serde_json::json;
use std::sync::Arc;

/// Comments under a post: live per-post view ordered oldest first, optimistic
/// appends.
pub struct CommentService {
    store: SyncedCollectionStore,
}

impl CommentService {
    pub fn new(store: SyncedCollectionStore) -> Self {
        Self { store }
    }

    pub async fn comments_for_post(&self, post_id: &RecordId) -> Result<ViewHandle> {
        self.store
            .subscribe(
                Collection::Comment,
                QueryFilter::all().eq("postId", post_id.as_str()),
                SortOrder::oldest_first(),
            )
            .await
    }

    pub async fn add_comment(&self, post_id: &RecordId, text: &str) -> Result<LocalId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Comment text is required".to_string()));
        }

        let user_id = self.store.session().user_id.clone();
        let fields = json!({
            "postId": post_id.as_str(),
            "userId": user_id,
            "text": text,
        });
        let match_key = MatchKey::new(&user_id, text);

        let local_id = self
            .store
            .apply_optimistic(Collection::Comment, match_key, fields.clone())
            .await;

        let remote = self.store.remote();
        let write: WriteFn = Arc::new(move || {
            let remote = Arc::clone(&remote);
            let fields = fields.clone();
            async move { remote.write(Collection::Comment, fields).await }.boxed()
        });
        self.store
            .commit(Collection::Comment, &local_id, write)
            .await?;
        Ok(local_id)
    }
}
