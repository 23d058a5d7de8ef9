use super::Collection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Content-derived key used to pair an optimistic entry with the
/// authoritative record the live snapshot eventually delivers.
///
/// The key is the author id plus a hash of the normalized (trimmed) content;
/// the submission-time window check lives with the reconciler, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchKey {
    author: String,
    content_hash: String,
}

impl MatchKey {
    pub fn new(author: &str, content: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.trim().as_bytes());
        Self {
            author: author.to_string(),
            content_hash: format!("{:x}", hasher.finalize()),
        }
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    /// Derives the key an authoritative record of this kind would pair with.
    /// Returns `None` for kinds that carry no author/content pair (chats).
    pub fn derive(kind: Collection, fields: &Value) -> Option<Self> {
        let author = fields.get(author_field(kind)?)?.as_str()?;
        let content = fields.get(content_field(kind))?.as_str()?;
        Some(Self::new(author, content))
    }
}

fn author_field(kind: Collection) -> Option<&'static str> {
    match kind {
        Collection::Message => Some("senderId"),
        Collection::Bookmark => Some("bookmarkedBy"),
        Collection::Chat => None,
        _ => Some("userId"),
    }
}

fn content_field(kind: Collection) -> &'static str {
    match kind {
        Collection::Like | Collection::Bookmark => "postId",
        Collection::User => "username",
        Collection::Chat => "lastMessage",
        _ => "text",
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.author, self.content_hash)
    }
}
