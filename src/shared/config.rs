use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds a pending optimistic entry may wait for its authoritative
    /// match before it is flipped to failed.
    pub reconcile_timeout_secs: i64,
    /// Half-width of the window, in seconds, within which a server timestamp
    /// still counts as matching an optimistic entry's submission instant.
    pub match_window_secs: i64,
    pub max_resubscribe_attempts: u32,
    pub resubscribe_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub profile_cache_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconcile_timeout_secs: 30,
            match_window_secs: 120,
            max_resubscribe_attempts: 3,
            resubscribe_interval_secs: 5,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            profile_cache_capacity: 1024,
        }
    }
}
