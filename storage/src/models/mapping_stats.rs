//! Aggregate statistics for the mapping table.
//!
//! Returned by MappingStore::stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStats {
    /// Records linked to a target message.
    pub ready: i64,
    /// Placeholders waiting for linkage.
    pub pending: i64,
    /// Distinct source messages with at least one record.
    pub source_messages: i64,
    pub last_update: Option<DateTime<Utc>>,
}
