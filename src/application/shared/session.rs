use serde::{Deserialize, Serialize};

/// Identity of the signed-in user, injected at store construction. Kept
/// explicit (no ambient globals) so the store is testable with a fake
/// remote source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionContext {
    pub user_id: String,
    pub username: String,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
        }
    }

    pub fn is_current_user(&self, id: &str) -> bool {
        self.user_id == id
    }
}
