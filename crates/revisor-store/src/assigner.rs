// ABOUTME: Assigns the next version number for an owning record from its newest snapshot.
// ABOUTME: Must run inside the saving transaction so the read and the writes commit together.

use revisor_core::Value;
use rusqlite::Connection;

use crate::error::StoreError;
use crate::version_store::VersionStore;

/// Next `version_id` for (`model`, `foreign_key`): one past the highest
/// recorded version, or 1 for a record without history.
///
/// The read is only race-free when the caller holds a write lock, as
/// [`crate::VersionedTable::save`] does with an IMMEDIATE transaction. A
/// racing writer that slips through is caught by the store's uniqueness
/// constraint and reported as [`StoreError::VersionConflict`].
pub fn next_version_id(
    store: &VersionStore,
    conn: &Connection,
    model: &str,
    foreign_key: &Value,
) -> Result<i64, StoreError> {
    let next = store
        .latest_version_id(conn, model, foreign_key)?
        .map_or(1, |latest| latest + 1);
    tracing::debug!("assigned version {} to {} {:?}", next, model, foreign_key);
    Ok(next)
}
