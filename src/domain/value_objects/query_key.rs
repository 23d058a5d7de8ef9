use super::{Collection, QueryFilter, SortOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical identity of a live subscription. Two consumers asking for the
/// same (collection, filter, sort) tuple share one network subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn derive(collection: Collection, filter: &QueryFilter, sort: &SortOrder) -> Self {
        Self(format!("{}|{}|{}", collection, filter, sort))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
