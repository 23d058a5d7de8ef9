use super::store::SyncedCollectionStore;
use crate::application::ports::{RawRecord, RemoteCollectionSource};
use crate::domain::value_objects::{Collection, QueryFilter, RecordId, SortOrder};
use crate::shared::error::{AppError, Result};
use serde_json::{json, Value};

/// Account records: registration, lookup and profile updates. The friends
/// page is just `all_users` minus the session user.
pub struct UserService {
    store: SyncedCollectionStore,
}

impl UserService {
    pub fn new(store: SyncedCollectionStore) -> Self {
        Self { store }
    }

    pub async fn register_user(
        &self,
        username: &str,
        profile_url: Option<String>,
    ) -> Result<RecordId> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AppError::Validation("Username is required".to_string()));
        }
        let ack = self
            .store
            .remote()
            .write(
                Collection::User,
                json!({
                    "username": username,
                    "profile_url": profile_url,
                    "hiddenPosts": [],
                }),
            )
            .await?;
        Ok(ack.id)
    }

    pub async fn get_user(&self, id: &RecordId) -> Result<Option<RawRecord>> {
        self.store.remote().read_one(Collection::User, id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<RawRecord>> {
        let mut matches = self
            .store
            .remote()
            .query(
                Collection::User,
                &QueryFilter::all().eq("username", username),
                &SortOrder::default(),
            )
            .await?;
        Ok(if matches.is_empty() {
            None
        } else {
            Some(matches.remove(0))
        })
    }

    pub async fn all_users(&self) -> Result<Vec<RawRecord>> {
        self.store
            .remote()
            .query(Collection::User, &QueryFilter::all(), &SortOrder::default())
            .await
    }

    pub async fn update_profile(&self, id: &RecordId, partial: Value) -> Result<()> {
        if !partial.is_object() {
            return Err(AppError::Validation(
                "Profile update must be an object".to_string(),
            ));
        }
        self.store
            .remote()
            .update(Collection::User, id, partial)
            .await
    }

    pub async fn delete_user(&self, id: &RecordId) -> Result<()> {
        self.store.remote().delete(Collection::User, id).await
    }
}
