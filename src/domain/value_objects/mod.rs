pub mod collection;
pub mod entry_status;
pub mod local_id;
pub mod match_key;
pub mod query_filter;
pub mod query_key;
pub mod record_id;
pub mod sort_order;

pub use collection::Collection;
pub use entry_status::EntryStatus;
pub use local_id::LocalId;
pub use match_key::MatchKey;
pub use query_filter::{FilterCondition, FilterOp, QueryFilter};
pub use query_key::QueryKey;
pub use record_id::RecordId;
pub use sort_order::{SortDirection, SortOrder};
