pub mod config;
pub mod error;

pub use config::{AppConfig, CacheConfig, SyncConfig};
pub use error::{AppError, Result};
