pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::ports::{
    LiveQueryHandle, ProfileResolver, RawRecord, RemoteCollectionSource, SnapshotSink,
    UploadTransport, UploadedFile, WriteAck,
};
pub use application::services::{
    BookmarkService, ChatService, CommentService, PostService, ReactionService,
    SubscriptionToken, SyncedCollectionStore, UploadService, UserService, ViewHandle, ViewState,
    WriteFn,
};
pub use application::shared::SessionContext;
pub use domain::entities::{EntityRecord, UserProfile};
pub use domain::value_objects::{
    Collection, EntryStatus, LocalId, MatchKey, QueryFilter, QueryKey, RecordId, SortOrder,
};
pub use shared::config::AppConfig;
pub use shared::error::{AppError, Result};

/// Initializes structured logging with an env-driven filter.
///
/// # Panics
///
/// Panics if a global subscriber is already installed.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thira_client=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
