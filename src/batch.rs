//! The batch wire format: an ordered list of parameterized mutations grouped
//! inside a single transaction, with optional identity-cache annotations.
//!
//! Execution lives on `Connection` (it needs the statement cache, binder,
//! transaction coordinator, and identity cache together); this module owns
//! the data types and their JSON wire parsing.

use serde_json::Value as JsonValue;

use crate::error::EngineError;
use crate::value::HostValue;

/// Whether a successful mutation should update the identity cache, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBehavior {
    None,
    MarkCached,
    RemoveFromCache,
}

impl CacheBehavior {
    fn from_wire(code: i64) -> Result<Self, EngineError> {
        match code {
            0 => Ok(CacheBehavior::None),
            1 => Ok(CacheBehavior::MarkCached),
            -1 => Ok(CacheBehavior::RemoveFromCache),
            other => Err(EngineError::DbError {
                phase: "batch",
                message: format!("invalid cache behavior code: {other} (expected -1, 0, or 1)"),
                code: None,
            }),
        }
    }
}

/// One entry of a batch: the same SQL applied to each of `args_batches` in
/// order, with a single cache-behavior annotation shared across all of them.
#[derive(Debug, Clone)]
pub struct BatchOperation {
    pub cache_behavior: CacheBehavior,
    pub table: String,
    pub sql: String,
    pub args_batches: Vec<Vec<HostValue>>,
}

impl BatchOperation {
    pub fn new(
        cache_behavior: CacheBehavior,
        table: impl Into<String>,
        sql: impl Into<String>,
        args_batches: Vec<Vec<HostValue>>,
    ) -> Self {
        Self {
            cache_behavior,
            table: table.into(),
            sql: sql.into(),
            args_batches,
        }
    }

    /// Parse one `[cacheBehavior, table, sql, argsBatches]` wire entry.
    fn from_wire(entry: &JsonValue) -> Result<Self, EngineError> {
        let wire_error = || EngineError::DbError {
            phase: "batch",
            message: "each batch operation must be a 4-element array: \
                      [cacheBehavior, table, sql, argsBatches]"
                .to_string(),
            code: None,
        };

        let items = entry.as_array().ok_or_else(wire_error)?;
        if items.len() != 4 {
            return Err(wire_error());
        }

        let cache_behavior = CacheBehavior::from_wire(items[0].as_i64().ok_or_else(wire_error)?)?;
        let table = items[1].as_str().ok_or_else(wire_error)?.to_string();
        let sql = items[2].as_str().ok_or_else(wire_error)?.to_string();
        let args_batches = items[3]
            .as_array()
            .ok_or_else(wire_error)?
            .iter()
            .map(|batch| {
                batch
                    .as_array()
                    .ok_or_else(wire_error)
                    .map(|args| args.iter().map(HostValue::from_json).collect())
            })
            .collect::<Result<Vec<Vec<HostValue>>, EngineError>>()?;

        Ok(BatchOperation {
            cache_behavior,
            table,
            sql,
            args_batches,
        })
    }

    /// Parse a full batch wire payload (a JSON array of operations).
    pub fn parse_wire(json: &str) -> Result<Vec<BatchOperation>, EngineError> {
        let parsed: JsonValue = serde_json::from_str(json).map_err(|e| EngineError::DbError {
            phase: "batch",
            message: format!("invalid batch JSON: {e}"),
            code: None,
        })?;
        let entries = parsed.as_array().ok_or_else(|| EngineError::DbError {
            phase: "batch",
            message: "batch payload must be a JSON array of operations".to_string(),
            code: None,
        })?;
        entries.iter().map(BatchOperation::from_wire).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_batch() {
        let json = r#"[
            [1, "t", "insert into t values(?, ?)", [["a", "x"]]],
            [-1, "t", "delete from t where id = ?", [["b"]]],
            [0, "t", "update t set v = ? where id = ?", [["y", "a"], ["z", "b"]]]
        ]"#;
        let ops = BatchOperation::parse_wire(json).unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].cache_behavior, CacheBehavior::MarkCached);
        assert_eq!(ops[1].cache_behavior, CacheBehavior::RemoveFromCache);
        assert_eq!(ops[2].args_batches.len(), 2);
        assert_eq!(ops[0].args_batches[0][0], HostValue::str("a"));
    }

    #[test]
    fn rejects_an_invalid_cache_behavior_code() {
        let json = r#"[[7, "t", "select 1", []]]"#;
        assert!(BatchOperation::parse_wire(json).is_err());
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert!(BatchOperation::parse_wire(r#"[[1, "t", "sql"]]"#).is_err());
        assert!(BatchOperation::parse_wire(r#"{"not": "an array"}"#).is_err());
    }
}
