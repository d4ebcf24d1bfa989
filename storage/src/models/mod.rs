//! Persistence models.

mod mapping_stats;
mod message_record;

pub use mapping_stats::MappingStats;
pub use message_record::MessageRecord;
