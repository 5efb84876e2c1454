//! Schema installation, migration, and the user-version counter.
//!
//! `unsafe_reset_database` and `migrate` are exposed on `Connection`
//! (they need the transaction coordinator and identity cache together); this
//! module holds the pieces that only need the raw connection.

use crate::error::EngineError;
use crate::raw::{RawConnection, StepResult};

/// Read `PRAGMA user_version`. SQLite always returns exactly one row for
/// this pragma, so no empty-result handling is needed here (contrast with
/// `Connection::count`, which can legitimately see zero rows).
pub(crate) fn get_user_version(raw: &RawConnection) -> Result<i64, EngineError> {
    let mut stmt = raw
        .prepare_cached("pragma user_version;")
        .map_err(|e| EngineError::db("config", e))?;
    match stmt.step().map_err(|e| EngineError::db("step", e))? {
        StepResult::Row => Ok(stmt.column_int64(0)),
        StepResult::Done => Err(EngineError::DbError {
            phase: "config",
            message: "PRAGMA user_version returned no row".to_string(),
            code: None,
        }),
    }
}

/// Set `PRAGMA user_version`. SQLite does not accept a bound parameter in a
/// pragma statement, so `version` is inlined directly — safe because it is
/// always an integer, never host-supplied text.
pub(crate) fn set_user_version(raw: &RawConnection, version: i64) -> Result<(), EngineError> {
    raw.execute_batch(&format!("pragma user_version = {version};"))
        .map_err(|e| EngineError::db("config", e))
}
