//! Storage crate: source-to-target message mapping persistence.
//!
//! ## Modules
//!
//! - [`error`] – Storage error types
//! - [`models`] – MessageRecord, MappingStats
//! - [`repository`] – MappingStore trait
//! - [`mapping_repo`] – SqliteMappingStore (SQLite)
//! - [`inmemory`] – InMemoryMappingStore
//! - [`sqlite_pool`] – SqlitePoolManager

mod error;
mod inmemory;
mod mapping_repo;
mod models;
mod repository;
mod sqlite_pool;


pub use error::StorageError;
pub use inmemory::InMemoryMappingStore;
pub use mapping_repo::SqliteMappingStore;
pub use models::{MappingStats, MessageRecord};
pub use repository::MappingStore;
pub use sqlite_pool::SqlitePoolManager;
