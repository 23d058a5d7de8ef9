use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// Comparator specification for a subscribed view. Ordering is always by the
/// record's effective timestamp (server timestamp, falling back to the
/// provisional local one), with ties broken by id so repeated renders are
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub direction: SortDirection,
}

impl SortOrder {
    /// Default feed order: newest first.
    pub fn newest_first() -> Self {
        Self {
            direction: SortDirection::Descending,
        }
    }

    /// Conversation order: oldest first.
    pub fn oldest_first() -> Self {
        Self {
            direction: SortDirection::Ascending,
        }
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::newest_first()
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ts:{}", self.direction.as_str())
    }
}
