//! Signature and EXPLAIN services.

use peridot_ast::SelectQuery;
use peridot_exec::{Cancellation, ExecError, Executor, Signature};

pub use peridot_ast::signature_sql_for;

/// Computes the `(count, checksum)` signature of a query.
pub fn query_signature(
    executor: &mut dyn Executor,
    cancel: &Cancellation,
    query: &SelectQuery,
) -> Result<Signature, ExecError> {
    executor.query_signature(cancel, &query.signature_sql())
}

/// Runs `EXPLAIN <sql>` and renders the plan as tab-separated text,
/// `NULL` for null cells. The text goes into bug reports verbatim.
pub fn explain_sql(
    executor: &mut dyn Executor,
    cancel: &Cancellation,
    sql: &str,
) -> Result<String, ExecError> {
    let set = executor.query_rows(cancel, &format!("EXPLAIN {sql}"), 0)?;
    let mut out = String::new();
    for (i, row) in set.rows.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for (j, cell) in row.iter().enumerate() {
            if j > 0 {
                out.push('\t');
            }
            match cell {
                Some(v) => out.push_str(v),
                None => out.push_str("NULL"),
            }
        }
    }
    Ok(out)
}

/// `explain_sql` with the error folded into a string, in the shape
/// [`crate::report::Report::with_explains`] consumes.
pub fn explain_or_error(
    executor: &mut dyn Executor,
    cancel: &Cancellation,
    sql: &str,
) -> Result<String, String> {
    explain_sql(executor, cancel, sql).map_err(|e| e.to_string())
}
