use crate::domain::entities::UserProfile;
use crate::shared::error::AppError;
use async_trait::async_trait;

/// Resolves a user id to a display profile. Implementations are expected to
/// be cheap to call repeatedly; the store wraps them in a per-id cache.
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    async fn resolve_user(&self, id: &str) -> Result<UserProfile, AppError>;
}
