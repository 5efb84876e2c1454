//! Error kinds surfaced to the host. Every fallible layer converges on
//! `EngineError` so callers can propagate with `?`.

use crate::raw::SqliteError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("argument count mismatch: statement expects {expected} argument(s), got {actual}")]
    ArgMismatch { expected: usize, actual: usize },

    #[error("invalid argument type: only null, string, number, and boolean host values can be bound")]
    InvalidArgType,

    #[error("unsupported column type on column `{column}` (blob and other non-scalar types are not supported)")]
    UnsupportedColumnType { column: String },

    #[error("{phase}: {message}")]
    DbError {
        phase: &'static str,
        message: String,
        code: Option<i32>,
    },

    #[error("row is missing a non-null `id` column")]
    MissingId,

    #[error("migration precondition failed: expected user_version {expected}, found {actual}")]
    MigrationPrecondition { expected: i64, actual: i64 },

    #[error("invalid table name `{table}`: must not contain '`' or '$'")]
    InvalidTableName { table: String },
}

impl EngineError {
    pub(crate) fn db(phase: &'static str, err: SqliteError) -> Self {
        EngineError::DbError {
            phase,
            message: err.message,
            code: Some(err.code),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
