use crate::application::ports::{ProfileResolver, RemoteCollectionSource};
use crate::domain::entities::UserProfile;
use crate::domain::value_objects::{Collection, RecordId};
use crate::shared::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Resolves profiles by reading the `users` collection off the remote
/// source. Wrapped in [`CachedProfileResolver`] by the store.
///
/// [`CachedProfileResolver`]: crate::infrastructure::cache::CachedProfileResolver
pub struct RemoteProfileResolver {
    remote: Arc<dyn RemoteCollectionSource>,
}

impl RemoteProfileResolver {
    pub fn new(remote: Arc<dyn RemoteCollectionSource>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl ProfileResolver for RemoteProfileResolver {
    async fn resolve_user(&self, id: &str) -> Result<UserProfile> {
        let record_id = RecordId::new(id.to_string()).map_err(AppError::Validation)?;
        let record = self
            .remote
            .read_one(Collection::User, &record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;

        let display_name = record
            .fields
            .get("username")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Normalization(format!("user {id} has no username")))?
            .to_string();
        let avatar_url = record
            .fields
            .get("profile_url")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(UserProfile::new(id.to_string(), display_name, avatar_url))
    }
}
