//! DQE: differential query execution over DML.
//!
//! The rows a DML statement reports as affected must equal what a
//! SELECT predicts. For `UPDATE t SET c = e WHERE p` the prediction is
//! `COUNT(*) WHERE p AND NOT (c <=> e)` — MySQL does not count rows
//! whose assignment is a no-op, and `<=>` keeps NULL assignments
//! honest. For DELETE the prediction is the plain predicate count.

use peridot_ast::{BinaryOp, DmlStmt, Expr};

use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};

const ORACLE: &str = "dqe";

#[derive(Debug, Default)]
pub struct Dqe;

fn expected_count_sql(stmt: &DmlStmt) -> String {
    match stmt {
        DmlStmt::Update(update) => {
            let mut unchanged: Option<Expr> = None;
            for (col, value) in &update.assignments {
                let eq = Expr::binary(
                    BinaryOp::NullSafeEq,
                    Expr::Column(col.clone()),
                    value.clone(),
                );
                unchanged = Some(match unchanged.take() {
                    Some(acc) => Expr::and(acc, eq),
                    None => eq,
                });
            }
            let changed = unchanged.map(Expr::not);
            let predicate = match (update.where_clause.clone(), changed) {
                (Some(p), Some(c)) => Some(Expr::and(p, c)),
                (None, Some(c)) => Some(c),
                (p, None) => p,
            };
            match predicate {
                Some(p) => format!("SELECT COUNT(*) FROM {} WHERE {}", update.table, p.sql()),
                None => format!("SELECT COUNT(*) FROM {}", update.table),
            }
        }
        DmlStmt::Delete(delete) => match &delete.where_clause {
            Some(p) => format!("SELECT COUNT(*) FROM {} WHERE {}", delete.table, p.sql()),
            None => format!("SELECT COUNT(*) FROM {}", delete.table),
        },
    }
}

impl Oracle for Dqe {
    fn name(&self) -> &'static str {
        ORACLE
    }

    fn check(&mut self, cx: &mut OracleCx<'_>) -> Report {
        let stmt = match cx.generator.generate_dml() {
            Ok(stmt) => stmt,
            Err(err) => {
                return Report::skip(ORACLE, skip_reason(ORACLE, &err.reason.as_token()))
                    .with_detail("builder_attempts", i64::from(err.attempts));
            }
        };

        if !stmt.is_deterministic() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "nondeterministic"));
        }

        let count_sql = expected_count_sql(&stmt);
        let dml_sql = stmt.sql();

        // Predict first: the DML mutates the rows it is predicted over.
        let expected = match cx.executor.query_count(cx.cancel, &count_sql) {
            Ok(n) => n,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };
        let affected = match cx.executor.exec(cx.cancel, &dml_sql) {
            Ok(n) => n as i64,
            Err(e) => return Report::from_exec_error(ORACLE, &e),
        };

        if expected == affected {
            return Report::pass(ORACLE)
                .with_sql(count_sql)
                .with_sql(dml_sql)
                .with_metric("rows_affected", affected);
        }

        Report::bug(
            ORACLE,
            "rows_affected",
            format!("{expected} rows affected"),
            format!("{affected} rows affected"),
            count_sql,
            dml_sql,
        )
        .with_metric("rows_affected", affected)
    }
}
