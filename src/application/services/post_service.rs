use super::store::{SyncedCollectionStore, ViewHandle, WriteFn};
use crate::application::ports::RemoteCollectionSource;
use crate::domain::value_objects::{Collection, LocalId, MatchKey, QueryFilter, RecordId, SortOrder};
use crate::shared::error::{AppError, Result};
use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// Feed commands: create, edit, delete and hide posts. Reads go through the
/// store's live feed view; deletes and hides remove locally first and roll
/// back if the remote operation is rejected.
pub struct PostService {
    store: SyncedCollectionStore,
}

impl PostService {
    pub fn new(store: SyncedCollectionStore) -> Self {
        Self { store }
    }

    /// Live feed over every post, newest first.
    pub async fn feed(&self) -> Result<ViewHandle> {
        self.store
            .subscribe(
                Collection::Post,
                QueryFilter::all(),
                SortOrder::newest_first(),
            )
            .await
    }

    /// Posts of one author, newest first.
    pub async fn posts_by_user(&self, user_id: &str) -> Result<ViewHandle> {
        self.store
            .subscribe(
                Collection::Post,
                QueryFilter::all().eq("userId", user_id),
                SortOrder::newest_first(),
            )
            .await
    }

    pub async fn create_post(&self, text: &str, img_urls: Vec<String>) -> Result<LocalId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Post text is required".to_string()));
        }

        let user_id = self.store.session().user_id.clone();
        let fields = json!({
            "userId": user_id,
            "text": text,
            "img_urls": img_urls,
        });
        let match_key = MatchKey::new(&user_id, text);

        let local_id = self
            .store
            .apply_optimistic(Collection::Post, match_key, fields.clone())
            .await;

        let remote = self.store.remote();
        let write: WriteFn = Arc::new(move || {
            let remote = Arc::clone(&remote);
            let fields = fields.clone();
            async move { remote.write(Collection::Post, fields).await }.boxed()
        });
        self.store.commit(Collection::Post, &local_id, write).await?;
        Ok(local_id)
    }

    pub async fn update_post(&self, id: &RecordId, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Post text is required".to_string()));
        }
        self.store
            .remote()
            .update(Collection::Post, id, json!({ "text": text }))
            .await
    }

    /// Removes the post from every view immediately, then issues the remote
    /// delete plus a cascade over the post's like records. A rejected delete
    /// restores the post and surfaces the error.
    pub async fn delete_post(&self, id: &RecordId) -> Result<()> {
        self.store.remove_local(Collection::Post, id).await;

        if let Err(err) = self.store.remote().delete(Collection::Post, id).await {
            self.store.restore_local(Collection::Post, id).await;
            return Err(err);
        }

        if let Err(err) = self.delete_likes_for_post(id).await {
            // The post itself is gone; orphaned likes are not worth failing
            // the action over.
            warn!("Failed to clean up likes for deleted post {id}: {err}");
        }
        Ok(())
    }

    /// Appends the post to the session user's hidden list and suppresses it
    /// locally right away. Rolls the suppression back if the profile update
    /// is rejected.
    pub async fn hide_post(&self, id: &RecordId) -> Result<()> {
        self.store.remove_local(Collection::Post, id).await;

        if let Err(err) = self.append_hidden_post(id).await {
            self.store.restore_local(Collection::Post, id).await;
            return Err(err);
        }
        Ok(())
    }

    pub async fn hidden_posts(&self) -> Result<Vec<String>> {
        let user_id = self.session_record_id()?;
        let record = self
            .store
            .remote()
            .read_one(Collection::User, &user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;
        Ok(hidden_post_ids(&record.fields))
    }

    async fn append_hidden_post(&self, id: &RecordId) -> Result<()> {
        let user_id = self.session_record_id()?;
        let remote = self.store.remote();
        let record = remote
            .read_one(Collection::User, &user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;

        let mut hidden = hidden_post_ids(&record.fields);
        if hidden.iter().any(|existing| existing == id.as_str()) {
            return Ok(());
        }
        hidden.push(id.as_str().to_string());
        remote
            .update(Collection::User, &user_id, json!({ "hiddenPosts": hidden }))
            .await
    }

    async fn delete_likes_for_post(&self, id: &RecordId) -> Result<()> {
        let remote = self.store.remote();
        let likes = remote
            .query(
                Collection::Like,
                &QueryFilter::all().eq("postId", id.as_str()),
                &SortOrder::default(),
            )
            .await?;
        for like in likes {
            let like_id = RecordId::new(like.id).map_err(AppError::Validation)?;
            remote.delete(Collection::Like, &like_id).await?;
        }
        Ok(())
    }

    fn session_record_id(&self) -> Result<RecordId> {
        RecordId::new(self.store.session().user_id.clone()).map_err(AppError::Validation)
    }
}

fn hidden_post_ids(fields: &Value) -> Vec<String> {
    fields
        .get("hiddenPosts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
