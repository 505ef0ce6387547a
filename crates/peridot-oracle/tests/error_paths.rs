//! Error-taxonomy and bug-contract conformance across the oracles.
//!
//! Every oracle must fold executor failures into the shared taxonomy:
//! cancellation → `<oracle>:timeout` skip, whitelisted server errors →
//! benign skip, generic server errors → OK with an `error_reason`, and
//! every `ok = false` report must carry full replay material.

use peridot_exec::{Cancellation, ExecError, ResultSet, Signature};
use peridot_oracle::{oracle_by_name, OracleCx, Report};
use peridot_testkit::{
    simple_filtered_query, two_table_state, Response, ScriptedExecutor, ScriptedGenerator,
};
use test_case::test_case;

fn server_error(code: u16, message: &str) -> Response {
    Response::Error(ExecError::Server {
        code,
        message: message.into(),
    })
}

fn run(name: &str, generator: &mut ScriptedGenerator, executor: &mut ScriptedExecutor) -> Report {
    let cancel = Cancellation::unbounded();
    let mut cx = OracleCx {
        generator,
        executor,
        cancel: &cancel,
    };
    let mut oracle = oracle_by_name(name).expect("oracle exists");
    oracle.check(&mut cx)
}

/// Signature-comparing oracles take their query from the builder and
/// hit the executor with a first probe we can fail deterministically.
#[test_case("norec")]
#[test_case("tlp")]
#[test_case("eet")]
fn cancellation_maps_to_timeout_skip(name: &str) {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new();
    let cancel = Cancellation::unbounded();
    cancel.cancel();
    let mut cx = OracleCx {
        generator: &mut generator,
        executor: &mut executor,
        cancel: &cancel,
    };
    let mut oracle = oracle_by_name(name).expect("oracle exists");
    let report = oracle.check(&mut cx);
    assert!(report.ok, "{name}: cancellation is never a bug");
    assert_eq!(report.skip_reason(), Some(format!("{name}:timeout").as_str()));
}

#[test_case(1064, true ; "parser error is whitelisted")]
#[test_case(1292, true ; "overflow is whitelisted")]
#[test_case(1451, true ; "fk parent violation is whitelisted")]
#[test_case(1452, true ; "fk child violation is whitelisted")]
#[test_case(1690, false ; "out of range is a plain sql error")]
fn norec_server_error_taxonomy(code: u16, whitelisted: bool) {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new().on(
        "SELECT COUNT(*) FROM (SELECT",
        server_error(code, "server said no"),
    );
    let report = run("norec", &mut generator, &mut executor);
    assert!(report.ok, "server errors are never bugs");
    let reason = format!("norec:sql_error_{code}");
    if whitelisted {
        assert_eq!(report.skip_reason(), Some(reason.as_str()));
        assert!(report.error_reason().is_none());
    } else {
        assert_eq!(report.error_reason(), Some(reason.as_str()));
        assert!(report.skip_reason().is_none());
    }
}

#[test]
fn eet_missing_column_sets_bug_hint() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new().on(
        "CONCAT_WS",
        server_error(1054, "Unknown column 't0.b' in 'field list'"),
    );
    let report = run("eet", &mut generator, &mut executor);
    assert!(report.ok);
    assert_eq!(report.error_reason(), Some("eet:signature_missing_column"));
    assert_eq!(
        report.details.get("bug_hint").and_then(serde_json::Value::as_str),
        Some("tidb:schema_column_missing")
    );
}

#[test]
fn dqe_whitelisted_dml_error_skips() {
    let stmt = peridot_ast::DmlStmt::Delete(peridot_ast::DeleteStmt {
        table: "t0".into(),
        where_clause: Some(peridot_ast::Expr::binary(
            peridot_ast::BinaryOp::Gt,
            peridot_ast::Expr::Column(peridot_ast::ColumnRef::new(
                "t0",
                "a",
                peridot_schema::DataType::Int,
            )),
            peridot_ast::Expr::lit(peridot_ast::Literal::Int(0)),
        )),
    });
    let mut generator = ScriptedGenerator::new(two_table_state()).with_dml(stmt);
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM t0", Response::Count(3))
        .on(
            "DELETE FROM t0",
            server_error(1451, "Cannot delete or update a parent row"),
        );
    let report = run("dqe", &mut generator, &mut executor);
    assert!(report.ok);
    assert_eq!(report.skip_reason(), Some("dqe:sql_error_1451"));
}

// ============================================================================
// Bug contract
// ============================================================================

/// Drives each oracle into a witnessed divergence and checks the §bug
/// contract: replay kind, both replay SQLs, at least two statements.
fn assert_bug_contract(report: &Report) {
    assert!(!report.ok);
    let kind = report.replay_kind().expect("replay_kind present");
    assert!(!kind.is_empty());
    let expected_sql = report
        .details
        .get("replay_expected_sql")
        .and_then(serde_json::Value::as_str)
        .expect("replay_expected_sql present");
    let actual_sql = report
        .details
        .get("replay_actual_sql")
        .and_then(serde_json::Value::as_str)
        .expect("replay_actual_sql present");
    assert!(!expected_sql.is_empty());
    assert!(!actual_sql.is_empty());
    assert!(report.sql.len() >= 2, "replay needs both statements");
}

#[test]
fn norec_bug_contract() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM (SELECT", Response::Count(1))
        .on("IFNULL(SUM(CASE WHEN", Response::Count(2))
        .on(
            "EXPLAIN",
            Response::Rows(ResultSet {
                columns: vec!["id".into()],
                rows: vec![vec![Some("plan".into())]],
                truncated: false,
            }),
        );
    let report = run("norec", &mut generator, &mut executor);
    assert_bug_contract(&report);
}

#[test]
fn tlp_bug_contract() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("UNION ALL", Response::Signature(Signature { count: 1, checksum: 2 }))
        .on("CONCAT_WS", Response::Signature(Signature { count: 3, checksum: 4 }))
        .on(
            "EXPLAIN",
            Response::Rows(ResultSet {
                columns: vec!["id".into()],
                rows: vec![vec![None]],
                truncated: false,
            }),
        );
    let report = run("tlp", &mut generator, &mut executor);
    assert_bug_contract(&report);
    // EXPLAIN renders NULL cells with the NULL sentinel.
    assert_eq!(
        report.details.get("explain_expected").and_then(serde_json::Value::as_str),
        Some("NULL")
    );
}

#[test]
fn dqe_bug_contract() {
    let stmt = peridot_ast::DmlStmt::Delete(peridot_ast::DeleteStmt {
        table: "t0".into(),
        where_clause: Some(peridot_ast::Expr::binary(
            peridot_ast::BinaryOp::Gt,
            peridot_ast::Expr::Column(peridot_ast::ColumnRef::new(
                "t0",
                "b",
                peridot_schema::DataType::Int,
            )),
            peridot_ast::Expr::lit(peridot_ast::Literal::Int(5)),
        )),
    });
    let mut generator = ScriptedGenerator::new(two_table_state()).with_dml(stmt);
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM t0", Response::Count(4))
        .on("DELETE FROM t0", Response::Affected(3));
    let report = run("dqe", &mut generator, &mut executor);
    assert_bug_contract(&report);
    assert_eq!(report.replay_kind(), Some("rows_affected"));
}
