use serde::{Deserialize, Serialize};

pub const FALLBACK_DISPLAY_NAME: &str = "Unknown User";
pub const FALLBACK_AVATAR_URL: &str = "/defaultProfile.webp";

/// Resolved author profile attached to normalized records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub avatar_url: String,
}

impl UserProfile {
    pub fn new(id: String, display_name: String, avatar_url: Option<String>) -> Self {
        Self {
            id,
            display_name,
            avatar_url: avatar_url.unwrap_or_else(|| FALLBACK_AVATAR_URL.to_string()),
        }
    }

    /// Placeholder used when the resolver cannot produce a profile; the view
    /// still renders rather than dropping the record.
    pub fn fallback(id: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: FALLBACK_DISPLAY_NAME.to_string(),
            avatar_url: FALLBACK_AVATAR_URL.to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.display_name == FALLBACK_DISPLAY_NAME
    }
}
