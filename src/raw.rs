//! Safe(ish) wrapper over `rusqlite::ffi` — the raw C API `rusqlite` re-exports
//! from the bundled SQLite it links.
//!
//! `RawConnection` owns an unbounded, never-evicting cache of compiled
//! statements keyed by SQL text. A `rusqlite::Statement<'conn>` cannot live
//! in the same struct as the `Connection` that produced it without
//! self-referential borrows, so the cache instead stores raw `sqlite3_stmt`
//! pointers and manages their lifetime by hand — the same technique the
//! WASM SQLite wrapper this module is grounded on uses against
//! `sqlite-wasm-rs`'s FFI surface.
//!
//! # Safety
//!
//! Every raw pointer here is owned by exactly one `RawConnection` and never
//! escapes it. `RawConnection` is `!Send + !Sync`: SQLite connections (and
//! the statements compiled against them) are not safe to share across
//! threads without external synchronization, and this crate's contract is
//! that the host serializes all calls onto one thread (see the crate's
//! concurrency notes).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::{c_char, c_int};
use std::path::Path;

use rusqlite::ffi;

#[derive(Debug)]
pub struct SqliteError {
    pub code: c_int,
    pub message: String,
}

impl std::fmt::Display for SqliteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SQLite error ({}): {}", self.code, self.message)
    }
}

impl std::error::Error for SqliteError {}

pub type SqlResult<T> = std::result::Result<T, SqliteError>;

#[derive(Debug, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Blob,
    Null,
}

// ============================================================================
// RawConnection
// ============================================================================

pub struct RawConnection {
    raw: *mut ffi::sqlite3,
    stmt_cache: RefCell<HashMap<String, *mut ffi::sqlite3_stmt>>,
    closed: Cell<bool>,
    _not_send_sync: PhantomData<*mut ()>,
}

impl RawConnection {
    /// Open a database at `path`, creating it if it doesn't exist.
    pub fn open(path: &Path) -> SqlResult<Self> {
        let path_str = path.to_string_lossy();
        Self::open_raw(&path_str)
    }

    /// Open a private, in-memory database.
    pub fn open_in_memory() -> SqlResult<Self> {
        Self::open_raw(":memory:")
    }

    fn open_raw(path: &str) -> SqlResult<Self> {
        let c_path = CString::new(path).map_err(|e| SqliteError {
            code: ffi::SQLITE_ERROR,
            message: format!("invalid path (contains a null byte): {e}"),
        })?;

        let mut db: *mut ffi::sqlite3 = std::ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
                std::ptr::null(),
            )
        };

        if rc != ffi::SQLITE_OK {
            let msg = if !db.is_null() {
                unsafe { errmsg(db) }
            } else {
                "failed to open database".to_string()
            };
            if !db.is_null() {
                unsafe { ffi::sqlite3_close(db) };
            }
            return Err(SqliteError {
                code: rc,
                message: msg,
            });
        }

        Ok(RawConnection {
            raw: db,
            stmt_cache: RefCell::new(HashMap::new()),
            closed: Cell::new(false),
            _not_send_sync: PhantomData,
        })
    }

    /// Execute one or more semicolon-separated statements with no result rows.
    pub fn execute_batch(&self, sql: &str) -> SqlResult<()> {
        let c_sql = CString::new(sql).map_err(|e| SqliteError {
            code: ffi::SQLITE_ERROR,
            message: format!("invalid SQL (contains a null byte): {e}"),
        })?;

        let rc = unsafe {
            ffi::sqlite3_exec(
                self.raw,
                c_sql.as_ptr(),
                None,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(SqliteError {
                code: rc,
                message: unsafe { errmsg(self.raw) },
            });
        }
        Ok(())
    }

    /// Toggle `SQLITE_DBCONFIG_RESET_DATABASE`, the defensive reset mode that
    /// makes a subsequent `VACUUM` drop every object in the schema.
    pub fn set_reset_database_mode(&self, on: bool) -> SqlResult<()> {
        let mut result: c_int = 0;
        let rc = unsafe {
            ffi::sqlite3_db_config(
                self.raw,
                ffi::SQLITE_DBCONFIG_RESET_DATABASE,
                if on { 1 } else { 0 },
                &mut result as *mut c_int,
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(SqliteError {
                code: rc,
                message: unsafe { errmsg(self.raw) },
            });
        }
        Ok(())
    }

    /// Prepare a statement, reusing a cached compiled version keyed on exact
    /// SQL text when available. The cache never evicts: it grows with the
    /// number of distinct SQL texts the caller issues and is torn down only
    /// when the connection itself is closed or dropped.
    pub fn prepare_cached(&self, sql: &str) -> SqlResult<CachedStmt<'_>> {
        let mut cache = self.stmt_cache.borrow_mut();
        let raw_stmt = if let Some(&raw) = cache.get(sql) {
            reset_raw(raw, self.raw)?;
            clear_bindings_raw(raw, self.raw)?;
            raw
        } else {
            let c_sql = CString::new(sql).map_err(|e| SqliteError {
                code: ffi::SQLITE_ERROR,
                message: format!("invalid SQL (contains a null byte): {e}"),
            })?;

            let mut stmt: *mut ffi::sqlite3_stmt = std::ptr::null_mut();
            let rc = unsafe {
                ffi::sqlite3_prepare_v2(
                    self.raw,
                    c_sql.as_ptr(),
                    -1,
                    &mut stmt,
                    std::ptr::null_mut(),
                )
            };

            if rc != ffi::SQLITE_OK {
                if !stmt.is_null() {
                    unsafe { ffi::sqlite3_finalize(stmt) };
                }
                return Err(SqliteError {
                    code: rc,
                    message: unsafe { errmsg(self.raw) },
                });
            }

            cache.insert(sql.to_string(), stmt);
            stmt
        };

        Ok(CachedStmt {
            raw: raw_stmt,
            conn: self,
        })
    }

    /// Close the connection, finalizing every cached statement first.
    pub fn close(&self) -> SqlResult<()> {
        self.finalize_and_close()
    }

    fn finalize_and_close(&self) -> SqlResult<()> {
        if self.closed.get() {
            return Ok(());
        }
        self.closed.set(true);

        let mut cache = self.stmt_cache.borrow_mut();
        for (_, stmt) in cache.drain() {
            if !stmt.is_null() {
                unsafe { ffi::sqlite3_finalize(stmt) };
            }
        }
        drop(cache);

        let rc = unsafe { ffi::sqlite3_close(self.raw) };
        if rc != ffi::SQLITE_OK {
            return Err(SqliteError {
                code: rc,
                message: format!("failed to close database: error code {rc}"),
            });
        }
        Ok(())
    }
}

impl Drop for RawConnection {
    fn drop(&mut self) {
        let _ = self.finalize_and_close();
    }
}

// ============================================================================
// CachedStmt
// ============================================================================

/// A prepared statement borrowed from the connection's statement cache.
/// Does not finalize on drop — the raw pointer stays owned by the cache.
pub struct CachedStmt<'conn> {
    raw: *mut ffi::sqlite3_stmt,
    conn: &'conn RawConnection,
}

impl<'conn> CachedStmt<'conn> {
    pub fn param_count(&self) -> usize {
        unsafe { ffi::sqlite3_bind_parameter_count(self.raw) as usize }
    }

    pub fn bind_text(&mut self, idx: c_int, val: &str) -> SqlResult<()> {
        let rc = unsafe {
            ffi::sqlite3_bind_text(
                self.raw,
                idx,
                val.as_ptr() as *const c_char,
                val.len() as c_int,
                ffi::SQLITE_TRANSIENT(),
            )
        };
        self.check(rc)
    }

    pub fn bind_int64(&mut self, idx: c_int, val: i64) -> SqlResult<()> {
        let rc = unsafe { ffi::sqlite3_bind_int64(self.raw, idx, val) };
        self.check(rc)
    }

    pub fn bind_double(&mut self, idx: c_int, val: f64) -> SqlResult<()> {
        let rc = unsafe { ffi::sqlite3_bind_double(self.raw, idx, val) };
        self.check(rc)
    }

    pub fn bind_null(&mut self, idx: c_int) -> SqlResult<()> {
        let rc = unsafe { ffi::sqlite3_bind_null(self.raw, idx) };
        self.check(rc)
    }

    pub fn step(&mut self) -> SqlResult<StepResult> {
        let rc = unsafe { ffi::sqlite3_step(self.raw) };
        match rc {
            ffi::SQLITE_ROW => Ok(StepResult::Row),
            ffi::SQLITE_DONE => Ok(StepResult::Done),
            _ => Err(SqliteError {
                code: rc,
                message: unsafe { errmsg(self.conn.raw) },
            }),
        }
    }

    pub fn column_count(&self) -> usize {
        unsafe { ffi::sqlite3_column_count(self.raw) as usize }
    }

    pub fn column_name(&self, idx: c_int) -> String {
        unsafe {
            let ptr = ffi::sqlite3_column_name(self.raw, idx);
            if ptr.is_null() {
                return String::new();
            }
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }

    pub fn column_type(&self, idx: c_int) -> ColumnType {
        let t = unsafe { ffi::sqlite3_column_type(self.raw, idx) };
        match t {
            ffi::SQLITE_INTEGER => ColumnType::Integer,
            ffi::SQLITE_FLOAT => ColumnType::Float,
            ffi::SQLITE_TEXT => ColumnType::Text,
            ffi::SQLITE_BLOB => ColumnType::Blob,
            _ => ColumnType::Null,
        }
    }

    pub fn column_int64(&self, idx: c_int) -> i64 {
        unsafe { ffi::sqlite3_column_int64(self.raw, idx) }
    }

    pub fn column_double(&self, idx: c_int) -> f64 {
        unsafe { ffi::sqlite3_column_double(self.raw, idx) }
    }

    /// Returns `None` if the column's text pointer is null (the spec's
    /// TEXT-with-null-pointer edge case), `Some` with an owned copy otherwise
    /// — SQLite's internal buffer is invalidated by the next `step`/`reset`,
    /// so Rust lifetimes cannot safely borrow it.
    pub fn column_text(&self, idx: c_int) -> Option<String> {
        unsafe {
            let ptr = ffi::sqlite3_column_text(self.raw, idx);
            if ptr.is_null() {
                return None;
            }
            let len = ffi::sqlite3_column_bytes(self.raw, idx) as usize;
            let bytes = std::slice::from_raw_parts(ptr, len);
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }

    pub fn reset(&mut self) -> SqlResult<()> {
        reset_raw(self.raw, self.conn.raw)
    }

    pub fn clear_bindings(&mut self) -> SqlResult<()> {
        clear_bindings_raw(self.raw, self.conn.raw)
    }

    fn check(&self, rc: c_int) -> SqlResult<()> {
        if rc != ffi::SQLITE_OK {
            return Err(SqliteError {
                code: rc,
                message: unsafe { errmsg(self.conn.raw) },
            });
        }
        Ok(())
    }
}

/// Resets `stmt` and swallows the reset failure, reporting only the error
/// already in flight. Used by the reset-on-all-paths guard (`StmtGuard`)
/// where a second, unrelated error from `reset()` would hide the original
/// cause.
pub(crate) fn reset_ignoring_error(stmt: &mut CachedStmt<'_>) {
    let _ = stmt.reset();
    let _ = stmt.clear_bindings();
}

fn reset_raw(stmt: *mut ffi::sqlite3_stmt, db: *mut ffi::sqlite3) -> SqlResult<()> {
    let rc = unsafe { ffi::sqlite3_reset(stmt) };
    if rc != ffi::SQLITE_OK {
        return Err(SqliteError {
            code: rc,
            message: unsafe { errmsg(db) },
        });
    }
    Ok(())
}

fn clear_bindings_raw(stmt: *mut ffi::sqlite3_stmt, db: *mut ffi::sqlite3) -> SqlResult<()> {
    let rc = unsafe { ffi::sqlite3_clear_bindings(stmt) };
    if rc != ffi::SQLITE_OK {
        return Err(SqliteError {
            code: rc,
            message: unsafe { errmsg(db) },
        });
    }
    Ok(())
}

unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    let ptr = ffi::sqlite3_errmsg(db);
    if ptr.is_null() {
        return "unknown error".to_string();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_prepare_roundtrip() {
        let conn = RawConnection::open_in_memory().unwrap();
        conn.execute_batch("create table t(id text primary key, v text);")
            .unwrap();

        let mut stmt = conn.prepare_cached("insert into t values(?, ?);").unwrap();
        stmt.bind_text(1, "a").unwrap();
        stmt.bind_text(2, "x").unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Done);

        let mut select = conn.prepare_cached("select id, v from t;").unwrap();
        assert_eq!(select.step().unwrap(), StepResult::Row);
        assert_eq!(select.column_text(0), Some("a".to_string()));
        assert_eq!(select.column_text(1), Some("x".to_string()));
        assert_eq!(select.step().unwrap(), StepResult::Done);
    }

    #[test]
    fn prepare_cached_returns_same_statement_pointer() {
        let conn = RawConnection::open_in_memory().unwrap();
        conn.execute_batch("create table t(id text);").unwrap();
        let first = conn.prepare_cached("select * from t;").unwrap().raw;
        let second = conn.prepare_cached("select * from t;").unwrap().raw;
        assert_eq!(first, second);
    }

    #[test]
    fn arg_count_mismatch_surfaces_as_a_plain_bind_error() {
        let conn = RawConnection::open_in_memory().unwrap();
        conn.execute_batch("create table t(id text);").unwrap();
        let stmt = conn.prepare_cached("select * from t where id = ?;").unwrap();
        assert_eq!(stmt.param_count(), 1);
    }
}
