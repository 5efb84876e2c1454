//! Binds an ordered list of `HostValue` arguments to a prepared statement's
//! placeholders, enforcing the strict type rules the host contract relies
//! on.

use crate::error::EngineError;
use crate::raw::CachedStmt;
use crate::value::HostValue;

/// Bind `args` to `stmt`, in order, starting at SQLite's 1-based parameter
/// index. The caller is expected to hold `stmt` behind a reset-on-drop guard
/// (see `crate::connection::StmtGuard`) so that any error here leaves the
/// statement resettable for its next use.
pub(crate) fn bind_args(stmt: &mut CachedStmt<'_>, args: &[HostValue]) -> Result<(), EngineError> {
    let expected = stmt.param_count();
    if args.len() != expected {
        return Err(EngineError::ArgMismatch {
            expected,
            actual: args.len(),
        });
    }

    for (i, arg) in args.iter().enumerate() {
        let idx = (i + 1) as i32;
        let result = match arg {
            HostValue::Null => stmt.bind_null(idx),
            HostValue::Str(s) => stmt.bind_text(idx, s),
            HostValue::Num(n) => stmt.bind_double(idx, *n),
            HostValue::Bool(b) => stmt.bind_int64(idx, if *b { 1 } else { 0 }),
            HostValue::Arr(_) | HostValue::Obj(_) => return Err(EngineError::InvalidArgType),
        };
        result.map_err(|e| EngineError::db("bind", e))?;
    }

    Ok(())
}
