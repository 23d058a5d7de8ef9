use super::profile::UserProfile;
use crate::domain::value_objects::{Collection, EntryStatus, LocalId, RecordId, SortOrder};
use crate::domain::value_objects::sort_order::SortDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Canonical in-memory shape of a remote record after normalization, and of
/// an optimistic local entry before its write is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub id: RecordId,
    pub collection: Collection,
    pub fields: Value,
    pub author: Option<UserProfile>,
    /// Absent while the record is local-only, and tolerated absent on
    /// authoritative records that have never carried one.
    pub server_timestamp: Option<DateTime<Utc>>,
    pub local_timestamp: DateTime<Utc>,
    pub local_only: bool,
    pub status: EntryStatus,
    pub error_message: Option<String>,
}

impl EntityRecord {
    pub fn authoritative(
        id: RecordId,
        collection: Collection,
        fields: Value,
        author: Option<UserProfile>,
        server_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        let local_timestamp = server_timestamp.unwrap_or_else(Utc::now);
        Self {
            id,
            collection,
            fields,
            author,
            server_timestamp,
            local_timestamp,
            local_only: false,
            status: EntryStatus::Committed,
            error_message: None,
        }
    }

    pub fn optimistic(
        local_id: &LocalId,
        collection: Collection,
        fields: Value,
        author: Option<UserProfile>,
    ) -> Self {
        Self {
            id: RecordId::from(local_id),
            collection,
            fields,
            author,
            server_timestamp: None,
            local_timestamp: Utc::now(),
            local_only: true,
            status: EntryStatus::Pending,
            error_message: None,
        }
    }

    /// Server timestamp when committed, provisional local timestamp while
    /// pending, so an entry keeps its display position across commit.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.server_timestamp.unwrap_or(self.local_timestamp)
    }

    pub fn mark_failed(&mut self, message: &str) {
        self.status = EntryStatus::Failed;
        self.error_message = Some(message.to_string());
    }

    pub fn mark_pending(&mut self) {
        self.status = EntryStatus::Pending;
        self.error_message = None;
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Total order over view entries: effective timestamp in the subscription's
/// direction, id ascending on ties.
pub fn compare_records(a: &EntityRecord, b: &EntityRecord, order: &SortOrder) -> Ordering {
    let by_time = a.effective_timestamp().cmp(&b.effective_timestamp());
    let by_time = match order.direction {
        SortDirection::Ascending => by_time,
        SortDirection::Descending => by_time.reverse(),
    };
    by_time.then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record_at(id: &str, millis: i64) -> EntityRecord {
        EntityRecord::authoritative(
            RecordId::new(id.to_string()).unwrap(),
            Collection::Post,
            json!({}),
            None,
            Some(Utc.timestamp_millis_opt(millis).unwrap()),
        )
    }

    #[test]
    fn newest_first_orders_descending_by_timestamp() {
        let older = record_at("a", 1_000);
        let newer = record_at("b", 2_000);
        assert_eq!(
            compare_records(&newer, &older, &SortOrder::newest_first()),
            Ordering::Less
        );
    }

    #[test]
    fn ties_break_by_id_regardless_of_direction() {
        let a = record_at("a", 1_000);
        let b = record_at("b", 1_000);
        assert_eq!(
            compare_records(&a, &b, &SortOrder::newest_first()),
            Ordering::Less
        );
        assert_eq!(
            compare_records(&a, &b, &SortOrder::oldest_first()),
            Ordering::Less
        );
    }

    #[test]
    fn pending_entry_sorts_by_provisional_timestamp() {
        let committed = record_at("a", 1_000);
        let pending = EntityRecord::optimistic(
            &LocalId::generate(),
            Collection::Post,
            json!({"content": "hi"}),
            None,
        );
        // The pending entry was created now, far later than the committed one.
        assert_eq!(
            compare_records(&pending, &committed, &SortOrder::newest_first()),
            Ordering::Less
        );
    }
}
