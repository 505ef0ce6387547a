//! MySQL/TiDB-backed executor.

use mysql::prelude::Queryable;
use mysql::{Conn, Opts, Value};
use tracing::debug;

use crate::cancel::Cancellation;
use crate::error::ExecError;
use crate::{Executor, ResultSet, Row, Signature};

/// Executor over a single MySQL text-protocol connection.
///
/// Connection pooling belongs to the caller; each worker owns one
/// executor for the lifetime of its run.
pub struct MysqlExecutor {
    conn: Conn,
}

impl MysqlExecutor {
    pub fn connect(url: &str) -> Result<Self, ExecError> {
        let opts = Opts::from_url(url).map_err(|e| ExecError::Connection(e.to_string()))?;
        let conn = Conn::new(opts).map_err(map_mysql_err)?;
        Ok(Self { conn })
    }

    /// Caps every statement on this connection at `millis`. Tokens only
    /// gate calls before they are issued; this is what bounds a call
    /// already in flight.
    pub fn set_statement_timeout(&mut self, millis: u64) -> Result<(), ExecError> {
        self.conn
            .query_drop(statement_timeout_sql(millis))
            .map_err(map_mysql_err)
    }

    fn fetch(
        &mut self,
        cancel: &Cancellation,
        sql: &str,
        max_rows: usize,
    ) -> Result<ResultSet, ExecError> {
        cancel.check()?;
        debug!(sql, "query");
        let mut result = self.conn.query_iter(sql).map_err(map_mysql_err)?;

        let mut set = ResultSet::default();
        for column in result.columns().as_ref() {
            set.columns.push(column.name_str().into_owned());
        }
        for row in result.by_ref() {
            let row = row.map_err(map_mysql_err)?;
            if max_rows != 0 && set.rows.len() >= max_rows {
                set.truncated = true;
                break;
            }
            set.rows.push(convert_row(&row));
        }
        Ok(set)
    }
}

fn statement_timeout_sql(millis: u64) -> String {
    format!("SET SESSION max_execution_time = {millis}")
}

fn map_mysql_err(err: mysql::Error) -> ExecError {
    match err {
        mysql::Error::MySqlError(e) => ExecError::Server {
            code: e.code,
            message: e.message,
        },
        other => ExecError::Connection(other.to_string()),
    }
}

fn convert_row(row: &mysql::Row) -> Row {
    (0..row.len())
        .map(|i| row.as_ref(i).and_then(value_to_text))
        .collect()
}

/// Renders a protocol value the way the text protocol would.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Int(v) => Some(v.to_string()),
        Value::UInt(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Double(v) => Some(v.to_string()),
        Value::Date(y, mo, d, h, mi, s, us) => {
            if *us == 0 {
                Some(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}"))
            } else {
                Some(format!(
                    "{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:{s:02}.{us:06}"
                ))
            }
        }
        Value::Time(neg, d, h, mi, s, us) => {
            let sign = if *neg { "-" } else { "" };
            let hours = u32::from(*h) + d * 24;
            if *us == 0 {
                Some(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
            } else {
                Some(format!("{sign}{hours:02}:{mi:02}:{s:02}.{us:06}"))
            }
        }
    }
}

fn parse_cell<T: std::str::FromStr>(row: &Row, idx: usize, what: &str) -> Result<T, ExecError> {
    let cell = row
        .get(idx)
        .and_then(Option::as_ref)
        .ok_or_else(|| ExecError::Decode(format!("{what}: NULL or missing column {idx}")))?;
    cell.parse()
        .map_err(|_| ExecError::Decode(format!("{what}: unparsable value {cell:?}")))
}

impl Executor for MysqlExecutor {
    fn query_count(&mut self, cancel: &Cancellation, sql: &str) -> Result<i64, ExecError> {
        let set = self.fetch(cancel, sql, 1)?;
        let row = set
            .rows
            .first()
            .ok_or_else(|| ExecError::Decode("count query returned no rows".into()))?;
        parse_cell(row, 0, "count")
    }

    fn query_plan_rows(&mut self, cancel: &Cancellation, sql: &str) -> Result<f64, ExecError> {
        let set = self.fetch(cancel, &format!("EXPLAIN {sql}"), 0)?;
        // TiDB names the estimate column estRows; stock MySQL calls it
        // rows. The root operator is the first row either way.
        let idx = set
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case("estRows") || c.eq_ignore_ascii_case("rows"))
            .ok_or_else(|| ExecError::Decode("EXPLAIN output lacks an estRows column".into()))?;
        let row = set
            .rows
            .first()
            .ok_or_else(|| ExecError::Decode("EXPLAIN returned no rows".into()))?;
        parse_cell(row, idx, "estRows")
    }

    fn query_signature(&mut self, cancel: &Cancellation, sql: &str) -> Result<Signature, ExecError> {
        let set = self.fetch(cancel, sql, 1)?;
        let row = set
            .rows
            .first()
            .ok_or_else(|| ExecError::Decode("signature query returned no rows".into()))?;
        Ok(Signature {
            count: parse_cell(row, 0, "signature count")?,
            checksum: parse_cell(row, 1, "signature checksum")?,
        })
    }

    fn query_row(&mut self, cancel: &Cancellation, sql: &str) -> Result<Option<Row>, ExecError> {
        let mut set = self.fetch(cancel, sql, 1)?;
        Ok(if set.rows.is_empty() {
            None
        } else {
            Some(set.rows.swap_remove(0))
        })
    }

    fn query_rows(
        &mut self,
        cancel: &Cancellation,
        sql: &str,
        max_rows: usize,
    ) -> Result<ResultSet, ExecError> {
        self.fetch(cancel, sql, max_rows)
    }

    fn exec(&mut self, cancel: &Cancellation, sql: &str) -> Result<u64, ExecError> {
        cancel.check()?;
        debug!(sql, "exec");
        let result = self.conn.query_iter(sql).map_err(map_mysql_err)?;
        Ok(result.affected_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_rendering() {
        assert_eq!(value_to_text(&Value::NULL), None);
        assert_eq!(value_to_text(&Value::Int(-3)), Some("-3".into()));
        assert_eq!(
            value_to_text(&Value::Bytes(b"abc".to_vec())),
            Some("abc".into())
        );
        assert_eq!(
            value_to_text(&Value::Date(2024, 1, 31, 0, 0, 0, 0)),
            Some("2024-01-31 00:00:00".into())
        );
        assert_eq!(
            value_to_text(&Value::Time(true, 1, 2, 3, 4, 0)),
            Some("-26:03:04".into())
        );
    }

    #[test]
    fn parse_cell_rejects_null() {
        let row: Row = vec![None];
        assert!(parse_cell::<i64>(&row, 0, "x").is_err());
        let row: Row = vec![Some("12".into())];
        assert_eq!(parse_cell::<i64>(&row, 0, "x").unwrap(), 12);
    }

    #[test]
    fn statement_timeout_statement_shape() {
        assert_eq!(
            statement_timeout_sql(750),
            "SET SESSION max_execution_time = 750"
        );
    }

    #[test]
    fn fractional_temporal_values_keep_microseconds() {
        assert_eq!(
            value_to_text(&Value::Date(2024, 2, 29, 13, 30, 1, 42)),
            Some("2024-02-29 13:30:01.000042".into())
        );
        assert_eq!(
            value_to_text(&Value::Time(false, 0, 1, 2, 3, 500_000)),
            Some("01:02:03.500000".into())
        );
    }
}
