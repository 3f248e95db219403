// ABOUTME: Process configuration for revisor's storage, loaded from environment variables.
// ABOUTME: Validates the version table name before any connection is opened.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum StoreConfigError {
    #[error("REVISOR_VERSION_TABLE must be a non-empty identifier of letters, digits and underscores, got {0:?}")]
    InvalidVersionTable(String),
}

/// Storage configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub version_table: String,
}

impl StoreConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - REVISOR_DB: database file (default: revisor.db)
    /// - REVISOR_VERSION_TABLE: version store table name (default: version)
    pub fn from_env() -> Result<Self, StoreConfigError> {
        let db_path = std::env::var("REVISOR_DB")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("revisor.db"));

        let version_table =
            std::env::var("REVISOR_VERSION_TABLE").unwrap_or_else(|_| "version".to_string());
        if !is_identifier(&version_table) {
            return Err(StoreConfigError::InvalidVersionTable(version_table));
        }

        Ok(Self {
            db_path,
            version_table,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
