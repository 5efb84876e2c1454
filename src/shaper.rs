//! Converts a positioned result row into one of the three shapes the host
//! demands: a dictionary, a positional array, or a column-header array.

use crate::error::EngineError;
use crate::raw::{CachedStmt, ColumnType};
use crate::value::HostValue;

/// One column's value, following the spec's column-type mapping. INTEGER and
/// FLOAT both widen to `HostValue::Num`; precision loss above 2^53 for large
/// integers is accepted, not guarded against.
fn column_value(stmt: &CachedStmt<'_>, idx: i32) -> Result<HostValue, EngineError> {
    match stmt.column_type(idx) {
        ColumnType::Integer => Ok(HostValue::Num(stmt.column_int64(idx) as f64)),
        ColumnType::Float => Ok(HostValue::Num(stmt.column_double(idx))),
        ColumnType::Text => Ok(match stmt.column_text(idx) {
            Some(s) => HostValue::Str(s),
            None => HostValue::Null,
        }),
        ColumnType::Null => Ok(HostValue::Null),
        ColumnType::Blob => Err(EngineError::UnsupportedColumnType {
            column: stmt.column_name(idx),
        }),
    }
}

/// Shape the current row as a dictionary keyed by column name, in column
/// order.
pub(crate) fn shape_dictionary(stmt: &CachedStmt<'_>) -> Result<HostValue, EngineError> {
    let count = stmt.column_count() as i32;
    let mut obj = HostValue::empty_object();
    for idx in 0..count {
        let value = column_value(stmt, idx)?;
        obj.set_property(stmt.column_name(idx), value);
    }
    Ok(obj)
}

/// Shape the current row as a positional array, values in column order.
pub(crate) fn shape_positional_array(stmt: &CachedStmt<'_>) -> Result<HostValue, EngineError> {
    let count = stmt.column_count() as i32;
    let mut values = Vec::with_capacity(count as usize);
    for idx in 0..count {
        values.push(column_value(stmt, idx)?);
    }
    Ok(HostValue::Arr(values))
}

/// The column-name header row, used as the first element of
/// `query_as_array`'s result.
pub(crate) fn shape_column_headers(stmt: &CachedStmt<'_>) -> HostValue {
    let count = stmt.column_count() as i32;
    let mut names = Vec::with_capacity(count as usize);
    for idx in 0..count {
        names.push(HostValue::str(stmt.column_name(idx)));
    }
    HostValue::Arr(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::{RawConnection, StepResult};

    fn row_stmt(conn: &RawConnection) -> crate::raw::CachedStmt<'_> {
        let mut stmt = conn.prepare_cached("select id, v from t;").unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        stmt
    }

    #[test]
    fn dictionary_and_positional_array_agree_by_column_name() {
        let conn = RawConnection::open_in_memory().unwrap();
        conn.execute_batch("create table t(id text, v real); insert into t values('a', 3.0);")
            .unwrap();
        let stmt = row_stmt(&conn);
        let dict = shape_dictionary(&stmt).unwrap();
        let arr = shape_positional_array(&stmt).unwrap();

        let names = match shape_column_headers(&stmt) {
            HostValue::Arr(names) => names,
            _ => unreachable!(),
        };
        let positional = match arr {
            HostValue::Arr(values) => values,
            _ => unreachable!(),
        };

        for (i, name) in names.iter().enumerate() {
            let key = name.as_str().unwrap();
            assert_eq!(dict.get_property(key), Some(&positional[i]));
        }
    }

    #[test]
    fn blob_column_is_rejected() {
        let conn = RawConnection::open_in_memory().unwrap();
        conn.execute_batch("create table t(id text, v blob); insert into t values('a', x'00');")
            .unwrap();
        let mut stmt = conn.prepare_cached("select id, v from t;").unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        let err = shape_dictionary(&stmt).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedColumnType { .. }));
    }

    #[test]
    fn null_text_column_shapes_to_host_null() {
        let conn = RawConnection::open_in_memory().unwrap();
        conn.execute_batch("create table t(id text, v text); insert into t values('a', null);")
            .unwrap();
        let mut stmt = conn.prepare_cached("select id, v from t;").unwrap();
        assert_eq!(stmt.step().unwrap(), StepResult::Row);
        let dict = shape_dictionary(&stmt).unwrap();
        assert_eq!(dict.get_property("v"), Some(&HostValue::Null));
    }
}
