// ABOUTME: SQLite persistence layer for revisor's field-level versioning.
// ABOUTME: Provides the version store, version assignment, transactional saves, and history reads.

pub mod assigner;
pub mod config;
pub mod db;
pub mod error;
mod owning;
pub mod reader;
pub mod table;
pub mod version_store;

pub use assigner::next_version_id;
pub use config::{StoreConfig, StoreConfigError};
pub use db::{open_database, open_in_memory};
pub use error::StoreError;
pub use reader::VersionQuery;
pub use table::VersionedTable;
pub use version_store::{SnapshotFilter, VersionStore};
