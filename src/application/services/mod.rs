pub mod bookmark_service;
pub mod chat_service;
pub mod comment_service;
pub mod post_service;
pub mod reaction_service;
pub mod store;
pub mod upload_service;
pub mod user_service;

pub use bookmark_service::BookmarkService;
pub use chat_service::ChatService;
pub use comment_service::CommentService;
pub use post_service::PostService;
pub use reaction_service::ReactionService;
pub use store::{SubscriptionToken, SyncedCollectionStore, ViewHandle, ViewState, WriteFn};
pub use upload_service::UploadService;
pub use user_service::UserService;
