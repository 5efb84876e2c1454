//! Begin/commit/rollback with a disciplined rollback-on-throw policy.
//!
//! At most one transaction is open on a connection at any time; nothing here
//! enforces that beyond the fact that SQLite itself will reject a nested
//! `BEGIN`, which surfaces as a `DbError`.

use crate::error::EngineError;
use crate::logging::Logger;
use crate::raw::RawConnection;

pub(crate) fn begin(raw: &RawConnection) -> Result<(), EngineError> {
    raw.execute_batch("begin exclusive transaction;")
        .map_err(|e| EngineError::db("begin", e))
}

pub(crate) fn commit(raw: &RawConnection) -> Result<(), EngineError> {
    raw.execute_batch("commit transaction;")
        .map_err(|e| EngineError::db("commit", e))
}

/// Roll back, logging loudly — a rollback is always treated as an abnormal
/// event worth surfacing to the host's log, not just its error channel.
///
/// If the rollback itself fails, the failure is logged and swallowed: the
/// underlying engine may already have rolled back automatically after
/// certain I/O or out-of-memory errors, and retrying here would raise a
/// spurious second error that buries the original cause.
pub(crate) fn rollback(raw: &RawConnection, logger: &dyn Logger) {
    logger.error("rolling back transaction after error");
    if let Err(e) = raw.execute_batch("rollback transaction;") {
        logger.error(&format!("rollback also failed (harmless, ignoring): {e}"));
    }
}

/// Run `body` inside `begin; …; commit`, rolling back on any error it
/// returns. Callers that need to apply cache deltas after a successful
/// commit do so in the `Ok` branch, outside this function, since cache
/// mutation must never be visible before the commit it depends on returns.
pub(crate) fn with_transaction<T>(
    raw: &RawConnection,
    logger: &dyn Logger,
    body: impl FnOnce() -> Result<T, EngineError>,
) -> Result<T, EngineError> {
    begin(raw)?;
    match body() {
        Ok(value) => {
            commit(raw)?;
            Ok(value)
        }
        Err(err) => {
            rollback(raw, logger);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NullLogger;

    #[test]
    fn commits_on_success() {
        let raw = RawConnection::open_in_memory().unwrap();
        raw.execute_batch("create table t(v text);").unwrap();
        with_transaction(&raw, &NullLogger, || {
            raw.execute_batch("insert into t values('a');")
                .map_err(|e| EngineError::db("exec", e))
        })
        .unwrap();

        let mut stmt = raw.prepare_cached("select count(*) from t;").unwrap();
        stmt.step().unwrap();
        assert_eq!(stmt.column_int64(0), 1);
    }

    #[test]
    fn rolls_back_on_error_and_leaves_no_trace() {
        let raw = RawConnection::open_in_memory().unwrap();
        raw.execute_batch("create table t(v text);").unwrap();
        let result: Result<(), EngineError> = with_transaction(&raw, &NullLogger, || {
            raw.execute_batch("insert into t values('a');")
                .map_err(|e| EngineError::db("exec", e))?;
            Err(EngineError::MissingId)
        });
        assert!(result.is_err());

        let mut stmt = raw.prepare_cached("select count(*) from t;").unwrap();
        stmt.step().unwrap();
        assert_eq!(stmt.column_int64(0), 0);
    }
}
