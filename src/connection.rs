//! The public `Connection` type: the single-owner handle to one database,
//! and the Query Façade (`find`, `query`, `query_as_array`, `query_ids`,
//! `unsafe_query_raw`, `count`, `get_local`) plus `batch`,
//! `unsafe_reset_database`, and `migrate`.
//!
//! Every public method takes `&self`: mutation of the statement cache and
//! identity cache happens through interior mutability (`RefCell`), the same
//! shape the WASM database class this crate is grounded on uses for its own
//! CRUD surface — a single embedder-held handle where "read" operations
//! still need to update internal caches.

use std::cell::RefCell;

use crate::batch::{BatchOperation, CacheBehavior};
use crate::binder::bind_args;
use crate::config::{ConnectionPath, OpenOptions};
use crate::error::EngineError;
use crate::identity_cache::IdentityCache;
use crate::logging::Logger;
use crate::raw::{reset_ignoring_error, CachedStmt, RawConnection, StepResult};
use crate::schema;
use crate::shaper::{shape_column_headers, shape_dictionary, shape_positional_array};
use crate::transaction::with_transaction;
use crate::value::HostValue;

pub struct Connection {
    raw: RawConnection,
    identity_cache: RefCell<IdentityCache>,
    logger: Box<dyn Logger>,
}

/// Resets the wrapped statement on drop, regardless of which exit path was
/// taken — success, a logical failure the caller converts to `Err`, or a
/// propagated error via `?`. This is the crate's answer to "every prepared
/// statement used in a fallible path must be reset on every exit path."
struct StmtGuard<'conn>(CachedStmt<'conn>);

impl<'conn> std::ops::Deref for StmtGuard<'conn> {
    type Target = CachedStmt<'conn>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'conn> std::ops::DerefMut for StmtGuard<'conn> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Drop for StmtGuard<'_> {
    fn drop(&mut self) {
        reset_ignoring_error(&mut self.0);
    }
}

fn validate_table_name(table: &str) -> Result<(), EngineError> {
    if table.contains('`') || table.contains('$') {
        return Err(EngineError::InvalidTableName {
            table: table.to_string(),
        });
    }
    Ok(())
}

/// The spec's `id`-column contract: the first column of a query result must
/// be named exactly `id` and must not be null.
fn first_column_id(stmt: &CachedStmt<'_>) -> Result<String, EngineError> {
    if stmt.column_count() == 0 || stmt.column_name(0) != "id" {
        return Err(EngineError::MissingId);
    }
    stmt.column_text(0).ok_or(EngineError::MissingId)
}

impl Connection {
    pub fn open(options: OpenOptions) -> Result<Self, EngineError> {
        let raw = match &options.path {
            ConnectionPath::Memory => RawConnection::open_in_memory(),
            ConnectionPath::File(path) => RawConnection::open(path),
        }
        .map_err(|e| EngineError::db("open", e))?;

        raw.execute_batch("pragma journal_mode = WAL;")
            .map_err(|e| EngineError::db("config", e))?;
        if options.platform.android {
            raw.execute_batch("pragma temp_store = memory;")
                .map_err(|e| EngineError::db("config", e))?;
        }

        options.logger.log("connection opened");

        Ok(Self {
            raw,
            identity_cache: RefCell::new(IdentityCache::new()),
            logger: options.logger,
        })
    }

    pub fn open_memory() -> Result<Self, EngineError> {
        Self::open(OpenOptions::memory())
    }

    /// Finalize every cached statement and close the underlying handle.
    /// Dropping a `Connection` without calling this does the same thing —
    /// `close` exists for callers that want the result of that teardown.
    pub fn close(self) -> Result<(), EngineError> {
        self.raw.close().map_err(|e| EngineError::db("close", e))
    }

    fn prepare(&self, sql: &str) -> Result<StmtGuard<'_>, EngineError> {
        let stmt = self
            .raw
            .prepare_cached(sql)
            .map_err(|e| EngineError::db("prepare", e))?;
        Ok(StmtGuard(stmt))
    }

    fn run_query(&self, sql: &str, args: &[HostValue]) -> Result<StmtGuard<'_>, EngineError> {
        let mut stmt = self.prepare(sql)?;
        bind_args(&mut stmt, args)?;
        Ok(stmt)
    }

    /// Whether `table`/`id` has already been fully materialized to the host.
    pub fn is_cached(&self, table: &str, id: &str) -> bool {
        self.identity_cache
            .borrow()
            .is_cached(&IdentityCache::cache_key(table, id))
    }

    // ========================================================================
    // Query Façade
    // ========================================================================

    pub fn find(&self, table: &str, id: &str) -> Result<HostValue, EngineError> {
        validate_table_name(table)?;
        let key = IdentityCache::cache_key(table, id);
        if self.identity_cache.borrow().is_cached(&key) {
            return Ok(HostValue::str(id));
        }

        let sql = format!("select * from `{table}` where id == ? limit 1");
        let mut stmt = self.run_query(&sql, &[HostValue::str(id)])?;
        match stmt.step().map_err(|e| EngineError::db("step", e))? {
            StepResult::Done => Ok(HostValue::Null),
            StepResult::Row => {
                let dict = shape_dictionary(&stmt)?;
                self.identity_cache.borrow_mut().mark_as_cached(key);
                Ok(dict)
            }
        }
    }

    pub fn query(&self, table: &str, sql: &str, args: &[HostValue]) -> Result<HostValue, EngineError> {
        let mut stmt = self.run_query(sql, args)?;
        let mut rows = Vec::new();
        loop {
            match stmt.step().map_err(|e| EngineError::db("step", e))? {
                StepResult::Done => break,
                StepResult::Row => {
                    let id = first_column_id(&stmt)?;
                    let key = IdentityCache::cache_key(table, &id);
                    if self.identity_cache.borrow().is_cached(&key) {
                        rows.push(HostValue::str(id));
                    } else {
                        let dict = shape_dictionary(&stmt)?;
                        self.identity_cache.borrow_mut().mark_as_cached(key);
                        rows.push(dict);
                    }
                }
            }
        }
        Ok(HostValue::Arr(rows))
    }

    pub fn query_as_array(
        &self,
        table: &str,
        sql: &str,
        args: &[HostValue],
    ) -> Result<HostValue, EngineError> {
        let mut stmt = self.run_query(sql, args)?;
        let mut out = vec![shape_column_headers(&stmt)];
        loop {
            match stmt.step().map_err(|e| EngineError::db("step", e))? {
                StepResult::Done => break,
                StepResult::Row => {
                    let id = first_column_id(&stmt)?;
                    let key = IdentityCache::cache_key(table, &id);
                    if self.identity_cache.borrow().is_cached(&key) {
                        out.push(HostValue::str(id));
                    } else {
                        let row = shape_positional_array(&stmt)?;
                        self.identity_cache.borrow_mut().mark_as_cached(key);
                        out.push(row);
                    }
                }
            }
        }
        Ok(HostValue::Arr(out))
    }

    pub fn query_ids(&self, sql: &str, args: &[HostValue]) -> Result<HostValue, EngineError> {
        let mut stmt = self.run_query(sql, args)?;
        let mut ids = Vec::new();
        loop {
            match stmt.step().map_err(|e| EngineError::db("step", e))? {
                StepResult::Done => break,
                StepResult::Row => ids.push(HostValue::str(first_column_id(&stmt)?)),
            }
        }
        Ok(HostValue::Arr(ids))
    }

    /// No Identity Cache interaction — diagnostics and ad-hoc queries only.
    pub fn unsafe_query_raw(&self, sql: &str, args: &[HostValue]) -> Result<HostValue, EngineError> {
        let mut stmt = self.run_query(sql, args)?;
        let mut rows = Vec::new();
        loop {
            match stmt.step().map_err(|e| EngineError::db("step", e))? {
                StepResult::Done => break,
                StepResult::Row => rows.push(shape_dictionary(&stmt)?),
            }
        }
        Ok(HostValue::Arr(rows))
    }

    pub fn count(&self, sql: &str, args: &[HostValue]) -> Result<HostValue, EngineError> {
        let mut stmt = self.run_query(sql, args)?;
        match stmt.step().map_err(|e| EngineError::db("step", e))? {
            StepResult::Done => Err(EngineError::DbError {
                phase: "count",
                message: "query returned no rows".to_string(),
                code: None,
            }),
            StepResult::Row => {
                if stmt.column_count() != 1 {
                    return Err(EngineError::DbError {
                        phase: "count",
                        message: format!(
                            "expected exactly one column, got {}",
                            stmt.column_count()
                        ),
                        code: None,
                    });
                }
                Ok(HostValue::Num(stmt.column_int64(0) as f64))
            }
        }
    }

    pub fn get_local(&self, key: &str) -> Result<HostValue, EngineError> {
        let mut stmt = self.run_query(
            "select value from local_storage where key = ?;",
            &[HostValue::str(key)],
        )?;
        match stmt.step().map_err(|e| EngineError::db("step", e))? {
            StepResult::Done => Ok(HostValue::Null),
            StepResult::Row => Ok(match stmt.column_text(0) {
                Some(s) => HostValue::Str(s),
                None => HostValue::Null,
            }),
        }
    }

    // ========================================================================
    // Batch
    // ========================================================================

    pub fn batch(&self, operations: &[BatchOperation]) -> Result<(), EngineError> {
        let mut to_add = Vec::new();
        let mut to_remove = Vec::new();

        with_transaction(&self.raw, self.logger.as_ref(), || {
            for op in operations {
                for args in &op.args_batches {
                    let mut stmt = self.prepare(&op.sql)?;
                    bind_args(&mut stmt, args)?;
                    match stmt.step().map_err(|e| EngineError::db("step", e))? {
                        StepResult::Done => {}
                        StepResult::Row => {
                            return Err(EngineError::DbError {
                                phase: "batch",
                                message: "expected statement to complete without returning rows"
                                    .to_string(),
                                code: None,
                            })
                        }
                    }

                    if op.cache_behavior != CacheBehavior::None {
                        let id = args.first().and_then(HostValue::as_str).ok_or(EngineError::MissingId)?;
                        let key = IdentityCache::cache_key(&op.table, id);
                        match op.cache_behavior {
                            CacheBehavior::MarkCached => to_add.push(key),
                            CacheBehavior::RemoveFromCache => to_remove.push(key),
                            CacheBehavior::None => unreachable!(),
                        }
                    }
                }
            }
            Ok(())
        })?;

        self.identity_cache.borrow_mut().apply_delta(to_add, to_remove);
        Ok(())
    }

    // ========================================================================
    // Schema / migration
    // ========================================================================

    pub fn unsafe_reset_database(&self, schema_sql: &str, version: i64) -> Result<(), EngineError> {
        self.raw
            .set_reset_database_mode(true)
            .map_err(|e| EngineError::db("config", e))?;
        let vacuum_result = self
            .raw
            .execute_batch("vacuum;")
            .map_err(|e| EngineError::db("exec", e));
        self.raw
            .set_reset_database_mode(false)
            .map_err(|e| EngineError::db("config", e))?;
        vacuum_result?;

        with_transaction(&self.raw, self.logger.as_ref(), || {
            self.identity_cache.borrow_mut().clear();
            self.raw
                .execute_batch(schema_sql)
                .map_err(|e| EngineError::db("exec", e))?;
            schema::set_user_version(&self.raw, version)
        })
    }

    pub fn migrate(
        &self,
        migration_sql: &str,
        from_version: i64,
        to_version: i64,
    ) -> Result<(), EngineError> {
        with_transaction(&self.raw, self.logger.as_ref(), || {
            let current = schema::get_user_version(&self.raw)?;
            if current != from_version {
                return Err(EngineError::MigrationPrecondition {
                    expected: from_version,
                    actual: current,
                });
            }
            self.raw
                .execute_batch(migration_sql)
                .map_err(|e| EngineError::db("exec", e))?;
            schema::set_user_version(&self.raw, to_version)
        })
    }

    pub fn get_user_version(&self) -> Result<i64, EngineError> {
        schema::get_user_version(&self.raw)
    }

    pub fn set_user_version(&self, version: i64) -> Result<(), EngineError> {
        schema::set_user_version(&self.raw, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(schema_sql: &str, version: i64) -> Connection {
        let conn = Connection::open_memory().unwrap();
        conn.unsafe_reset_database(schema_sql, version).unwrap();
        conn
    }

    const SCHEMA: &str = "create table t(id text primary key, v text); \
                           create table local_storage(key text primary key, value text);";

    #[test]
    fn fresh_install_reports_version_and_empty_table() {
        let conn = fresh(SCHEMA, 7);
        assert_eq!(conn.get_user_version().unwrap(), 7);
        let rows = conn.query("t", "select * from t", &[]).unwrap();
        assert_eq!(rows, HostValue::Arr(vec![]));
    }

    #[test]
    fn insert_then_find_via_batch_cache_flag() {
        let conn = fresh(SCHEMA, 1);
        conn.batch(&[BatchOperation::new(
            CacheBehavior::MarkCached,
            "t",
            "insert into t values(?, ?)",
            vec![vec![HostValue::str("a"), HostValue::str("x")]],
        )])
        .unwrap();

        assert_eq!(conn.find("t", "a").unwrap(), HostValue::str("a"));

        let raw = conn.unsafe_query_raw("select v from t", &[]).unwrap();
        let mut expected = HostValue::empty_object();
        expected.set_property("v", HostValue::str("x"));
        assert_eq!(raw, HostValue::Arr(vec![expected]));
    }

    #[test]
    fn rollback_preserves_identity_cache_and_row() {
        let conn = fresh(SCHEMA, 1);
        conn.batch(&[BatchOperation::new(
            CacheBehavior::MarkCached,
            "t",
            "insert into t values(?, ?)",
            vec![vec![HostValue::str("a"), HostValue::str("x")]],
        )])
        .unwrap();
        conn.find("t", "a").unwrap();
        assert!(conn.is_cached("t", "a"));

        let failing = conn.batch(&[BatchOperation::new(
            CacheBehavior::RemoveFromCache,
            "t",
            "delete from nonexistent_table where id = ?",
            vec![vec![HostValue::str("a")]],
        )]);
        assert!(failing.is_err());

        assert!(conn.is_cached("t", "a"));
        let row = conn.find("t", "a").unwrap();
        assert_eq!(row, HostValue::str("a"));
    }

    #[test]
    fn migration_moves_user_version_and_adds_column() {
        let conn = fresh(SCHEMA, 3);
        conn.migrate("alter table t add column w text;", 3, 4).unwrap();
        assert_eq!(conn.get_user_version().unwrap(), 4);
        conn.unsafe_query_raw("insert into t(id, w) values('z', 'ok')", &[])
            .unwrap();
    }

    #[test]
    fn migration_wrong_from_version_fails_without_side_effects() {
        let conn = fresh(SCHEMA, 3);
        let err = conn.migrate("alter table t add column w text;", 99, 4).unwrap_err();
        assert!(matches!(err, EngineError::MigrationPrecondition { .. }));
        assert_eq!(conn.get_user_version().unwrap(), 3);
    }

    #[test]
    fn bind_mismatch_resets_statement_for_next_use() {
        let conn = fresh(SCHEMA, 1);
        let err = conn
            .query("t", "select * from t where id = ?", &[])
            .unwrap_err();
        assert!(matches!(err, EngineError::ArgMismatch { .. }));

        let rows = conn
            .query("t", "select * from t where id = ?", &[HostValue::str("missing")])
            .unwrap();
        assert_eq!(rows, HostValue::Arr(vec![]));
    }

    #[test]
    fn unsupported_column_type_is_rejected() {
        let conn = Connection::open_memory().unwrap();
        conn.unsafe_reset_database("create table t(id text primary key, v blob);", 1)
            .unwrap();
        conn.unsafe_query_raw("insert into t values('a', x'00')", &[])
            .unwrap();
        let err = conn.query("t", "select * from t", &[]).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedColumnType { .. }));
    }

    #[test]
    fn find_on_unknown_id_returns_null() {
        let conn = fresh(SCHEMA, 1);
        assert_eq!(conn.find("t", "nope").unwrap(), HostValue::Null);
    }

    #[test]
    fn count_of_empty_result_is_a_db_error_not_zero() {
        let conn = fresh(SCHEMA, 1);
        let err = conn
            .count("select v from t where id = 'nope'", &[])
            .unwrap_err();
        assert!(matches!(err, EngineError::DbError { phase: "count", .. }));

        // A `count(*)`-shaped query always returns one row and is safe.
        let zero = conn.count("select count(*) from t", &[]).unwrap();
        assert_eq!(zero, HostValue::Num(0.0));
    }

    #[test]
    fn local_storage_round_trips_utf8_and_null() {
        let conn = fresh(SCHEMA, 1);
        conn.unsafe_query_raw(
            "insert into local_storage values('greeting', 'héllo wörld 🎉')",
            &[],
        )
        .unwrap();
        assert_eq!(
            conn.get_local("greeting").unwrap(),
            HostValue::str("héllo wörld 🎉")
        );
        assert_eq!(conn.get_local("missing").unwrap(), HostValue::Null);
    }

    #[test]
    fn find_rejects_unsafe_table_names() {
        let conn = fresh(SCHEMA, 1);
        let err = conn.find("t`; drop table t; --", "a").unwrap_err();
        assert!(matches!(err, EngineError::InvalidTableName { .. }));
    }

    #[test]
    fn query_as_array_leads_with_column_headers() {
        let conn = fresh(SCHEMA, 1);
        conn.batch(&[BatchOperation::new(
            CacheBehavior::None,
            "t",
            "insert into t values(?, ?)",
            vec![vec![HostValue::str("a"), HostValue::str("x")]],
        )])
        .unwrap();

        let shaped = conn.query_as_array("t", "select * from t", &[]).unwrap();
        let items = match shaped {
            HostValue::Arr(items) => items,
            _ => panic!("expected array"),
        };
        assert_eq!(items[0], HostValue::array(vec![HostValue::str("id"), HostValue::str("v")]));
        assert_eq!(
            items[1],
            HostValue::array(vec![HostValue::str("a"), HostValue::str("x")])
        );
    }

    #[test]
    fn query_ids_returns_bare_ids() {
        let conn = fresh(SCHEMA, 1);
        conn.batch(&[BatchOperation::new(
            CacheBehavior::None,
            "t",
            "insert into t values(?, ?)",
            vec![
                vec![HostValue::str("a"), HostValue::str("x")],
                vec![HostValue::str("b"), HostValue::str("y")],
            ],
        )])
        .unwrap();

        let ids = conn.query_ids("select id from t order by id", &[]).unwrap();
        assert_eq!(
            ids,
            HostValue::Arr(vec![HostValue::str("a"), HostValue::str("b")])
        );
    }
}
