// ABOUTME: Core library for revisor, the field-level versioning engine.
// ABOUTME: Storage-independent types: values, schemas, entities, configuration, snapshot building, history grouping.

pub mod config;
pub mod entity;
pub mod history;
pub mod interceptor;
pub mod schema;
pub mod snapshot;
pub mod value;
pub mod versioning;

pub use config::{ConfigError, VersionConfig};
pub use entity::Entity;
pub use history::{VersionHistory, group_snapshots};
pub use interceptor::{Interceptor, InterceptorChain};
pub use schema::{Column, ColumnKind, TableSchema};
pub use snapshot::{StoredSnapshot, VersionRow};
pub use value::{CodecError, Value};
pub use versioning::{SnapshotError, Versioning};
