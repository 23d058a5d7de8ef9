use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote collection a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Post,
    Comment,
    Message,
    Chat,
    User,
    Like,
    Bookmark,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Post => "posts",
            Collection::Comment => "comments",
            Collection::Message => "messages",
            Collection::Chat => "chats",
            Collection::User => "users",
            Collection::Like => "likes",
            Collection::Bookmark => "bookmarks",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "posts" => Some(Collection::Post),
            "comments" => Some(Collection::Comment),
            "messages" => Some(Collection::Message),
            "chats" => Some(Collection::Chat),
            "users" => Some(Collection::User),
            "likes" => Some(Collection::Like),
            "bookmarks" => Some(Collection::Bookmark),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
