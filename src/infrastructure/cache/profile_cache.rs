use crate::application::ports::ProfileResolver;
use crate::domain::entities::UserProfile;
use crate::shared::error::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Decorator caching profile resolutions per user id, so repeated
/// normalization of the same author costs one backend lookup per store
/// lifetime.
pub struct CachedProfileResolver {
    inner: Arc<dyn ProfileResolver>,
    cache: Mutex<LruCache<String, UserProfile>>,
}

impl CachedProfileResolver {
    pub fn new(inner: Arc<dyn ProfileResolver>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn invalidate(&self, id: &str) {
        self.cache.lock().await.pop(id);
    }
}

#[async_trait]
impl ProfileResolver for CachedProfileResolver {
    async fn resolve_user(&self, id: &str) -> Result<UserProfile> {
        if let Some(profile) = self.cache.lock().await.get(id) {
            return Ok(profile.clone());
        }
        let profile = self.inner.resolve_user(id).await?;
        self.cache
            .lock()
            .await
            .put(id.to_string(), profile.clone());
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProfileResolver for CountingResolver {
        async fn resolve_user(&self, id: &str) -> Result<UserProfile> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(UserProfile::new(id.to_string(), format!("user-{id}"), None))
        }
    }

    #[tokio::test]
    async fn resolves_each_id_once() {
        let inner = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedProfileResolver::new(inner.clone(), 8);

        for _ in 0..3 {
            cached.resolve_user("u1").await.unwrap();
        }
        cached.resolve_user("u2").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_lookup() {
        let inner = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedProfileResolver::new(inner.clone(), 8);

        cached.resolve_user("u1").await.unwrap();
        cached.invalidate("u1").await;
        cached.resolve_user("u1").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
