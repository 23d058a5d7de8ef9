use super::store::{SyncedCollectionStore, WriteFn};
use crate::application::ports::RemoteCollectionSource;
use crate::domain::value_objects::{Collection, MatchKey, QueryFilter, RecordId, SortOrder};
use crate::shared::error::{AppError, Result};
use futures::FutureExt;
use serde_json::json;
use std::sync::Arc;

/// Bookmark toggle: the bookmark either exists for (post, user) or it does
/// not. Returns the resulting state like the original toggle did.
pub struct BookmarkService {
    store: SyncedCollectionStore,
}

impl BookmarkService {
    pub fn new(store: SyncedCollectionStore) -> Self {
        Self { store }
    }

    /// Toggles the session user's bookmark on a post. `true` means the post
    /// is now bookmarked, `false` that the existing bookmark was removed.
    pub async fn toggle_bookmark(&self, post_id: &RecordId) -> Result<bool> {
        let remote = self.store.remote();
        let existing = remote
            .query(
                Collection::Bookmark,
                &self.own_bookmark_filter(post_id),
                &SortOrder::default(),
            )
            .await?;

        if let Some(bookmark) = existing.into_iter().next() {
            let bookmark_id = RecordId::new(bookmark.id).map_err(AppError::Validation)?;
            self.store
                .remove_local(Collection::Bookmark, &bookmark_id)
                .await;
            if let Err(err) = remote.delete(Collection::Bookmark, &bookmark_id).await {
                self.store
                    .restore_local(Collection::Bookmark, &bookmark_id)
                    .await;
                return Err(err);
            }
            return Ok(false);
        }

        let user_id = self.store.session().user_id.clone();
        let fields = json!({
            "postId": post_id.as_str(),
            "bookmarkedBy": user_id,
        });
        let match_key = MatchKey::new(&user_id, post_id.as_str());

        let local_id = self
            .store
            .apply_optimistic(Collection::Bookmark, match_key, fields.clone())
            .await;
        let write: WriteFn = Arc::new(move || {
            let remote = Arc::clone(&remote);
            let fields = fields.clone();
            async move { remote.write(Collection::Bookmark, fields).await }.boxed()
        });
        self.store
            .commit(Collection::Bookmark, &local_id, write)
            .await?;
        Ok(true)
    }

    /// Ids of every post the session user has bookmarked.
    pub async fn bookmarked_post_ids(&self) -> Result<Vec<String>> {
        let bookmarks = self
            .store
            .remote()
            .query(
                Collection::Bookmark,
                &QueryFilter::all()
                    .eq("bookmarkedBy", self.store.session().user_id.as_str()),
                &SortOrder::default(),
            )
            .await?;
        Ok(bookmarks
            .into_iter()
            .filter_map(|record| {
                record
                    .fields
                    .get("postId")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            })
            .collect())
    }

    fn own_bookmark_filter(&self, post_id: &RecordId) -> QueryFilter {
        QueryFilter::all()
            .eq("postId", post_id.as_str())
            .eq("bookmarkedBy", self.store.session().user_id.as_str())
    }
}
