//! End-to-end oracle tests against the scripted testkit.

use peridot_ast::{
    BinaryOp, ColumnRef, DmlStmt, Expr, Join, Literal, SelectItem, SelectQuery, UpdateStmt,
};
use peridot_exec::{Cancellation, ExecError, ResultSet, Signature};
use peridot_oracle::{all_oracles, oracle_by_name, OracleCx};
use peridot_schema::DataType;
use peridot_testkit::{
    empty_state, simple_filtered_query, two_table_state, Response, ScriptedExecutor,
    ScriptedGenerator,
};

fn check(
    name: &str,
    generator: &mut ScriptedGenerator,
    executor: &mut ScriptedExecutor,
) -> peridot_oracle::Report {
    let cancel = Cancellation::unbounded();
    let mut cx = OracleCx {
        generator,
        executor,
        cancel: &cancel,
    };
    let mut oracle = oracle_by_name(name).expect("oracle exists");
    oracle.check(&mut cx)
}

fn sig(count: i64, checksum: u64) -> Response {
    Response::Signature(Signature { count, checksum })
}

fn rows(columns: &[&str], data: &[&[Option<&str>]]) -> ResultSet {
    ResultSet {
        columns: columns.iter().map(|c| (*c).to_string()).collect(),
        rows: data
            .iter()
            .map(|r| r.iter().map(|c| c.map(String::from)).collect())
            .collect(),
        truncated: false,
    }
}

fn valid_skip_reason(reason: &str) -> bool {
    let Some((oracle, rest)) = reason.split_once(':') else {
        return false;
    };
    let token_ok = |s: &str| {
        !s.is_empty()
            && s.chars().next().is_some_and(|c| c.is_ascii_lowercase())
            && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };
    token_ok(oracle) && token_ok(rest)
}

// ============================================================================
// Universal invariants
// ============================================================================

#[test]
fn every_oracle_skips_on_empty_schema() {
    peridot_oracle::reset_hint_bandit();
    for mut oracle in all_oracles() {
        let mut generator = ScriptedGenerator::new(empty_state());
        let mut executor = ScriptedExecutor::new();
        let cancel = Cancellation::unbounded();
        let mut cx = OracleCx {
            generator: &mut generator,
            executor: &mut executor,
            cancel: &cancel,
        };
        let report = oracle.check(&mut cx);
        assert!(report.ok, "{} must not claim a bug", oracle.name());
        let reason = report
            .skip_reason()
            .unwrap_or_else(|| panic!("{} must carry a skip reason", oracle.name()));
        assert!(
            valid_skip_reason(reason),
            "{}: malformed skip reason {reason:?}",
            oracle.name()
        );
        assert!(
            reason.starts_with(oracle.name()),
            "{}: reason {reason:?} lacks oracle prefix",
            oracle.name()
        );
        assert!(
            executor.executed.is_empty(),
            "{} issued SQL against an empty schema",
            oracle.name()
        );
    }
}

#[test]
fn cancelled_token_yields_timeout_skip() {
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new();
    let cancel = Cancellation::unbounded();
    cancel.cancel();
    let mut cx = OracleCx {
        generator: &mut generator,
        executor: &mut executor,
        cancel: &cancel,
    };
    let mut oracle = oracle_by_name("norec").unwrap();
    let report = oracle.check(&mut cx);
    assert!(report.ok);
    assert_eq!(report.skip_reason(), Some("norec:timeout"));
}

// ============================================================================
// NoREC
// ============================================================================

#[test]
fn norec_agreement_passes() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM (SELECT", Response::Count(2))
        .on("IFNULL(SUM(CASE WHEN", Response::Count(2));
    let report = check("norec", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip());
    assert_eq!(report.metrics.get("rows"), Some(&2));
}

#[test]
fn norec_count_divergence_is_a_bug() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM (SELECT", Response::Count(2))
        .on("IFNULL(SUM(CASE WHEN", Response::Count(3))
        .on("EXPLAIN", Response::Rows(rows(&["id"], &[&[Some("plan")]])));
    let report = check("norec", &mut generator, &mut executor);
    assert!(!report.ok);
    assert_eq!(report.replay_kind(), Some("count"));
    assert_eq!(report.expected, "count 2");
    assert_eq!(report.actual, "count 3");
    assert!(report.sql.len() >= 2);
    assert!(report.details.contains_key("replay_expected_sql"));
    assert!(report.details.contains_key("replay_actual_sql"));
}

#[test]
fn norec_whitelisted_error_is_benign() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new().on(
        "SELECT COUNT(*) FROM (SELECT",
        Response::Error(ExecError::Server {
            code: 1292,
            message: "Truncated incorrect DOUBLE value".into(),
        }),
    );
    let report = check("norec", &mut generator, &mut executor);
    assert!(report.ok);
    assert_eq!(report.skip_reason(), Some("norec:sql_error_1292"));
}

// ============================================================================
// TLP
// ============================================================================

#[test]
fn tlp_partition_union_matches_base() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("UNION ALL", sig(4, 77))
        .on("CONCAT_WS", sig(4, 77));
    let report = check("tlp", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip());
    // Base signature is computed over the WHERE-free ordered query.
    assert!(executor.executed.iter().any(|s| s.contains("ORDER BY t0.a, t0.b")));
    assert!(executor
        .executed
        .iter()
        .any(|s| s.contains("IS NULL") && s.contains("UNION ALL")));
}

#[test]
fn tlp_signature_divergence_is_a_bug() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("UNION ALL", sig(3, 99))
        .on("CONCAT_WS", sig(4, 77))
        .on("EXPLAIN", Response::Rows(rows(&["id"], &[&[Some("plan")]])));
    let report = check("tlp", &mut generator, &mut executor);
    assert!(!report.ok);
    assert_eq!(report.replay_kind(), Some("signature"));
    assert!(report.sql.len() >= 2);
}

#[test]
fn tlp_guard_rejection_uses_custom_reason() {
    // Every retry serves a predicate outside the guard's shape.
    let mut bad = simple_filtered_query();
    bad.where_clause = Some(Expr::func("ABS", vec![Expr::lit(Literal::Int(1))]));
    let mut generator = ScriptedGenerator::new(two_table_state());
    for _ in 0..8 {
        generator.queries.push_back(Ok(bad.clone()));
    }
    let mut executor = ScriptedExecutor::new();
    let report = check("tlp", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("tlp:unsupported_predicate"));
}

#[test]
fn tlp_skips_on_limit() {
    let mut query = simple_filtered_query();
    query.limit = Some(10);
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(query);
    let mut executor = ScriptedExecutor::new();
    let report = check("tlp", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("tlp:limit"));
}

#[test]
fn tlp_normalizes_using_joins_to_on() {
    let mut query = simple_filtered_query();
    query.from.joins.push(Join {
        join_type: peridot_ast::JoinType::Inner,
        natural: false,
        table: "t1".into(),
        table_alias: None,
        table_query: None,
        on: None,
        using: vec!["id".into()],
    });
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(query);
    let mut executor = ScriptedExecutor::new()
        .on("UNION ALL", sig(4, 77))
        .on("CONCAT_WS", sig(4, 77));
    let report = check("tlp", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(
        executor.executed.iter().all(|s| !s.contains("USING (")),
        "USING joins must be rewritten: {:?}",
        executor.executed
    );
    assert!(executor
        .executed
        .iter()
        .any(|s| s.contains("JOIN t1 ON (t0.id = t1.id)")));
}

#[test]
fn tlp_ambiguous_using_reference_skips() {
    let mut query = simple_filtered_query();
    // The select list references the merged column through the right
    // table's qualifier.
    query.items.push(SelectItem {
        expr: Expr::Column(ColumnRef::new("t1", "id", DataType::BigInt)),
        alias: "a2".into(),
    });
    query.from.joins.push(Join {
        join_type: peridot_ast::JoinType::Inner,
        natural: false,
        table: "t1".into(),
        table_alias: None,
        table_query: None,
        on: None,
        using: vec!["id".into()],
    });
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(query);
    let mut executor = ScriptedExecutor::new();
    let report = check("tlp", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("tlp:ambiguous_using_column"));
}

// ============================================================================
// DQP
// ============================================================================

fn joined_query() -> SelectQuery {
    let mut q = SelectQuery::from_table("t0");
    q.items = vec![SelectItem {
        expr: Expr::Column(ColumnRef::new("t0", "id", DataType::BigInt)),
        alias: "a0".into(),
    }];
    q.from.joins.push(Join::inner(
        "t1",
        Expr::binary(
            BinaryOp::Eq,
            Expr::Column(ColumnRef::new("t0", "id", DataType::BigInt)),
            Expr::Column(ColumnRef::new("t1", "id", DataType::BigInt)),
        ),
    ));
    q
}

#[test]
fn dqp_hint_variants_agree() {
    peridot_oracle::reset_hint_bandit();
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(joined_query());
    let mut executor = ScriptedExecutor::new().on("CONCAT_WS", sig(5, 123));
    let report = check("dqp", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip());
    assert!(report.metrics.get("variants_checked").copied().unwrap_or(0) >= 1);
    // Hints land inside a comment block after the top-level SELECT.
    assert!(executor.executed.iter().any(|s| s.contains("/*+ ")));
}

#[test]
fn dqp_variant_divergence_is_a_bug() {
    peridot_oracle::reset_hint_bandit();
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(joined_query());
    let mut executor = ScriptedExecutor::new()
        .on("/*+ ", sig(4, 99))
        .on("CONCAT_WS", sig(5, 123))
        .on("EXPLAIN", Response::Rows(rows(&["id"], &[&[Some("plan")]])));
    let report = check("dqp", &mut generator, &mut executor);
    assert!(!report.ok);
    assert_eq!(report.replay_kind(), Some("signature"));
    assert!(report.details.contains_key("hint"));
    assert!(report.sql.len() >= 2);
}

#[test]
fn dqp_user_hints_join_the_pool() {
    peridot_oracle::reset_hint_bandit();
    let mut config = peridot_gen::FuzzConfig::default();
    config.oracles.dqp_user_hints = vec![
        "MAX_EXECUTION_TIME(500)".into(),
        "evil */ injection".into(),
    ];
    // A large pick budget guarantees the surviving user hint is chosen.
    config.oracles.dqp_base_hint_pick = 64;
    let mut generator = ScriptedGenerator::new(two_table_state())
        .with_config(config)
        .with_query(joined_query());
    let mut executor = ScriptedExecutor::new().on("CONCAT_WS", sig(5, 123));
    let report = check("dqp", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(
        executor.executed.iter().any(|s| s.contains("MAX_EXECUTION_TIME(500)")),
        "accepted user hint must be exercised"
    );
    assert!(
        executor.executed.iter().all(|s| !s.contains("evil")),
        "rejected user hint must never reach the wire"
    );
}

#[test]
fn dqp_skips_without_plan_surface() {
    // Single unindexed table, no joins, no aggregates, no subqueries.
    let mut state = peridot_schema::State::new();
    state.add_table(peridot_schema::TableMeta::new(
        "plain",
        vec![peridot_schema::ColumnMeta::new("x", DataType::Int)],
    ));
    let mut q = SelectQuery::from_table("plain");
    q.items = vec![SelectItem {
        expr: Expr::Column(ColumnRef::new("plain", "x", DataType::Int)),
        alias: "a0".into(),
    }];
    let mut generator = ScriptedGenerator::new(state).with_query(q);
    let mut executor = ScriptedExecutor::new();
    let report = check("dqp", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("dqp:insufficient_plan_surface"));
}

// ============================================================================
// DQE
// ============================================================================

fn update_stmt() -> DmlStmt {
    let a = ColumnRef::new("t0", "a", DataType::Int);
    DmlStmt::Update(UpdateStmt {
        table: "t0".into(),
        assignments: vec![(
            a.clone(),
            Expr::binary(BinaryOp::Add, Expr::Column(a), Expr::lit(Literal::Int(1))),
        )],
        where_clause: Some(Expr::binary(
            BinaryOp::Gt,
            Expr::Column(ColumnRef::new("t0", "b", DataType::Int)),
            Expr::lit(Literal::Int(5)),
        )),
    })
}

#[test]
fn dqe_matching_rows_affected_passes() {
    let mut generator = ScriptedGenerator::new(two_table_state()).with_dml(update_stmt());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM t0", Response::Count(3))
        .on("UPDATE t0 SET", Response::Affected(3));
    let report = check("dqe", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip());
    // Prediction must run before the DML mutates the table.
    assert!(executor.executed[0].starts_with("SELECT COUNT(*)"));
}

#[test]
fn dqe_mismatch_is_a_bug() {
    let mut generator = ScriptedGenerator::new(two_table_state()).with_dml(update_stmt());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM t0", Response::Count(3))
        .on("UPDATE t0 SET", Response::Affected(2));
    let report = check("dqe", &mut generator, &mut executor);
    assert!(!report.ok);
    assert_eq!(report.replay_kind(), Some("rows_affected"));
    assert_eq!(report.expected, "3 rows affected");
    assert_eq!(report.actual, "2 rows affected");
}

#[test]
fn dqe_skips_nondeterministic_dml() {
    let stmt = DmlStmt::Delete(peridot_ast::DeleteStmt {
        table: "t0".into(),
        where_clause: Some(Expr::binary(
            BinaryOp::Lt,
            Expr::Column(ColumnRef::new("t0", "a", DataType::Int)),
            Expr::func("RAND", vec![]),
        )),
    });
    let mut generator = ScriptedGenerator::new(two_table_state()).with_dml(stmt);
    let mut executor = ScriptedExecutor::new();
    let report = check("dqe", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("dqe:nondeterministic"));
}

// ============================================================================
// CERT
// ============================================================================

#[test]
fn cert_estimate_growth_is_a_bug() {
    let restriction = Expr::binary(
        BinaryOp::Eq,
        Expr::Column(ColumnRef::new("t0", "a", DataType::Int)),
        Expr::lit(Literal::Int(1)),
    );
    let mut generator = ScriptedGenerator::new(two_table_state())
        .with_query(simple_filtered_query())
        .with_column_literal_predicate(restriction);
    let mut executor = ScriptedExecutor::new()
        .on("AND (t0.a = 1)", Response::PlanRows(1000.0))
        .on("FROM t0", Response::PlanRows(100.0))
        .on("EXPLAIN", Response::Rows(rows(&["id"], &[&[Some("plan")]])));
    let report = check("cert", &mut generator, &mut executor);
    assert!(!report.ok, "{report:?}");
    assert_eq!(report.replay_kind(), Some("plan_rows"));
    assert_eq!(report.expected, "restricted estRows <= 100.00");
    assert_eq!(report.actual, "restricted estRows 1000.00");
}

#[test]
fn cert_within_tolerance_passes() {
    let restriction = Expr::binary(
        BinaryOp::Eq,
        Expr::Column(ColumnRef::new("t0", "a", DataType::Int)),
        Expr::lit(Literal::Int(1)),
    );
    let mut generator = ScriptedGenerator::new(two_table_state())
        .with_query(simple_filtered_query())
        .with_column_literal_predicate(restriction);
    let mut executor = ScriptedExecutor::new()
        .on("AND (t0.a = 1)", Response::PlanRows(105.0))
        .on("FROM t0", Response::PlanRows(100.0));
    let report = check("cert", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip());
}

#[test]
fn cert_base_from_covers_predicate_tables() {
    // The base query may anchor on the CTE or on concrete tables (the
    // layout is randomized); the invariant is only that every table the
    // WHERE references shows up in FROM.
    let mut query = simple_filtered_query();
    query.with.push(peridot_ast::Cte {
        name: "w0".into(),
        columns: vec![],
        query: simple_filtered_query(),
    });
    query.where_clause = Some(Expr::and(
        Expr::binary(
            BinaryOp::Gt,
            Expr::Column(ColumnRef::new("t0", "a", DataType::Int)),
            Expr::lit(Literal::Int(2)),
        ),
        Expr::binary(
            BinaryOp::Gt,
            Expr::Column(ColumnRef::new("t1", "id", DataType::BigInt)),
            Expr::lit(Literal::Int(0)),
        ),
    ));
    let restriction = Expr::binary(
        BinaryOp::Eq,
        Expr::Column(ColumnRef::new("t0", "a", DataType::Int)),
        Expr::lit(Literal::Int(1)),
    );
    let mut generator = ScriptedGenerator::new(two_table_state())
        .with_query(query)
        .with_column_literal_predicate(restriction);
    let mut executor = ScriptedExecutor::new()
        .on("AND (t0.a = 1)", Response::PlanRows(100.0))
        .on("FROM", Response::PlanRows(100.0));
    let report = check("cert", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    let base_sql = &executor.executed[0];
    assert!(base_sql.contains("WITH w0 AS"), "CTE survives: {base_sql}");
    assert!(base_sql.contains("t1"), "WHERE-referenced table joined in: {base_sql}");
    assert!(base_sql.contains("t0"), "{base_sql}");
}

#[test]
fn cert_small_base_skips() {
    let restriction = Expr::binary(
        BinaryOp::Eq,
        Expr::Column(ColumnRef::new("t0", "a", DataType::Int)),
        Expr::lit(Literal::Int(1)),
    );
    let mut generator = ScriptedGenerator::new(two_table_state())
        .with_query(simple_filtered_query())
        .with_column_literal_predicate(restriction);
    let mut executor = ScriptedExecutor::new().on("FROM t0", Response::PlanRows(3.0));
    let report = check("cert", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("cert:small_base"));
}

// ============================================================================
// EET
// ============================================================================

#[test]
fn eet_identity_rewrite_keeps_signature() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new().on("CONCAT_WS", sig(2, 42));
    let report = check("eet", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip());
    let rewrite = report.details.get("rewrite").and_then(serde_json::Value::as_str);
    assert!(rewrite.is_some(), "rewrite detail missing: {report:?}");
    // The two signature probes differ only by the rewrite.
    assert_eq!(executor.executed.len(), 2);
    assert_ne!(executor.executed[0], executor.executed[1]);
}

#[test]
fn eet_signature_divergence_is_a_bug() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .once("CONCAT_WS", sig(2, 42))
        .on("CONCAT_WS", sig(3, 43))
        .on("EXPLAIN", Response::Rows(rows(&["id"], &[&[Some("plan")]])));
    let report = check("eet", &mut generator, &mut executor);
    assert!(!report.ok);
    assert_eq!(report.replay_kind(), Some("signature"));
    assert!(report.details.contains_key("rewrite"));
}

#[test]
fn eet_order_by_distinct_error_skips() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new().on(
        "CONCAT_WS",
        Response::Error(ExecError::Server {
            code: 3065,
            message: "Expression #1 of ORDER BY clause is not in SELECT list".into(),
        }),
    );
    let report = check("eet", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("eet:order_by_distinct"));
}

#[test]
fn eet_unstable_ranking_window_skips() {
    let mut query = simple_filtered_query();
    query.items.push(SelectItem {
        expr: Expr::Window {
            name: "ROW_NUMBER".into(),
            args: vec![],
            partition_by: vec![Expr::Column(ColumnRef::new("t0", "a", DataType::Int))],
            order_by: vec![],
            window_name: None,
        },
        alias: "rn".into(),
    });
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(query);
    let mut executor = ScriptedExecutor::new();
    let report = check("eet", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("eet:unstable_window"));
}

#[test]
fn eet_complexity_guard_skips() {
    let mut query = simple_filtered_query();
    for i in 0..6 {
        query.from.joins.push(Join::inner(
            format!("t{i}"),
            Expr::trivially_true(),
        ));
    }
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(query);
    let mut executor = ScriptedExecutor::new();
    let report = check("eet", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("eet:too_complex"));
}

// ============================================================================
// CODDTest
// ============================================================================

#[test]
fn codd_dependent_fold_matches() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("IS NULL), 0) FROM t0", Response::Count(0))
        .on(
            "AS v FROM t0 LIMIT",
            Response::Rows(rows(
                &["a", "v"],
                &[&[Some("1"), Some("0")], &[Some("3"), Some("1")]],
            )),
        )
        .on("SELECT COUNT(*) FROM t0", Response::Count(2))
        .on("CONCAT_WS", sig(1, 7));
    let report = check("codd", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip());
    // The folded query carries a CASE mapping with null-safe guards.
    assert!(executor
        .executed
        .iter()
        .any(|s| s.contains("CASE WHEN") && s.contains("<=>")));
}

#[test]
fn codd_fold_divergence_is_a_bug() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("IS NULL), 0) FROM t0", Response::Count(0))
        .on(
            "AS v FROM t0 LIMIT",
            Response::Rows(rows(&["a", "v"], &[&[Some("1"), Some("1")]])),
        )
        .on("SELECT COUNT(*) FROM t0", Response::Count(1))
        .once("CONCAT_WS", sig(2, 42))
        .on("CONCAT_WS", sig(1, 42));
    let report = check("codd", &mut generator, &mut executor);
    assert!(!report.ok);
    assert_eq!(report.replay_kind(), Some("signature"));
}

#[test]
fn codd_nullable_column_with_nulls_skips() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor =
        ScriptedExecutor::new().on("IS NULL), 0) FROM t0", Response::Count(2));
    let report = check("codd", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("codd:nullable_column"));
}

// ============================================================================
// PQS
// ============================================================================

fn single_table_state() -> peridot_schema::State {
    let mut state = peridot_schema::State::new();
    let mut t0 = peridot_schema::TableMeta::new(
        "t0",
        vec![
            peridot_schema::ColumnMeta::new("id", DataType::BigInt)
                .not_null()
                .indexed(),
            peridot_schema::ColumnMeta::new("a", DataType::Int),
        ],
    );
    t0.has_pk = true;
    state.add_table(t0);
    state
}

#[test]
fn pqs_pivot_row_present_passes() {
    peridot_oracle::pqs::reset_pqs_bandit();
    let mut generator = ScriptedGenerator::new(single_table_state());
    let mut executor = ScriptedExecutor::new()
        .on("MIN(id)", Response::Row(Some(vec![Some("1".into()), Some("9".into())])))
        .on("LIMIT 1", Response::Row(Some(vec![Some("5".into()), Some("42".into())])));
    let report = check("pqs", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip(), "{report:?}");
    // The containment probe wraps the synthesized query.
    assert!(executor
        .executed
        .iter()
        .any(|s| s.starts_with("SELECT 1 FROM (") && s.contains(") pqs WHERE")));
}

#[test]
fn pqs_missing_pivot_row_is_a_bug() {
    peridot_oracle::pqs::reset_pqs_bandit();
    let mut generator = ScriptedGenerator::new(single_table_state());
    let mut executor = ScriptedExecutor::new()
        .on("MIN(id)", Response::Row(Some(vec![Some("1".into()), Some("9".into())])))
        .on("SELECT 1 FROM (", Response::Row(None))
        .on("LIMIT 1", Response::Row(Some(vec![Some("5".into()), Some("42".into())])));
    let report = check("pqs", &mut generator, &mut executor);
    assert!(!report.ok, "{report:?}");
    assert_eq!(report.replay_kind(), Some("exists"));
    assert_eq!(report.expected, "pivot_row_present");
    assert_eq!(report.actual, "pivot_row_missing");
    assert!(report.details.contains_key("pivot_values"));
}

// ============================================================================
// Impo
// ============================================================================

#[test]
fn impo_consistent_mutations_pass() {
    let base = rows(&["a0", "a1"], &[&[Some("3"), Some("1")], &[Some("4"), Some("2")]]);
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM (", Response::Count(2))
        .on("FROM t0", Response::Rows(base));
    let report = check("impo", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip(), "{report:?}");
    assert!(report.metrics.get("mutations_checked").copied().unwrap_or(0) >= 1);
}

#[test]
fn impo_upper_violation_is_a_bug() {
    let base = rows(&["a0", "a1"], &[&[Some("3"), Some("1")], &[Some("4"), Some("2")]]);
    // The first mutation relaxes `>` to `>=`; script it to LOSE a row.
    let smaller = rows(&["a0", "a1"], &[&[Some("3"), Some("1")]]);
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT COUNT(*) FROM (", Response::Count(2))
        .on("(t0.a >= 2)", Response::Rows(smaller))
        .on("FROM t0", Response::Rows(base));
    let report = check("impo", &mut generator, &mut executor);
    assert!(!report.ok, "{report:?}");
    assert_eq!(report.replay_kind(), Some("row_set"));
    assert_eq!(
        report.details.get("impo_mutation").and_then(serde_json::Value::as_str),
        Some("relax_compare")
    );
}

#[test]
fn impo_row_budget_skips() {
    let mut generator =
        ScriptedGenerator::new(two_table_state()).with_query(simple_filtered_query());
    let mut executor =
        ScriptedExecutor::new().on("SELECT COUNT(*) FROM (", Response::Count(1_000_000));
    let report = check("impo", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("impo:row_budget"));
}

// ============================================================================
// GroundTruth
// ============================================================================

fn truth_query() -> SelectQuery {
    let mut q = SelectQuery::from_table("t0");
    q.items = vec![SelectItem {
        expr: Expr::Column(ColumnRef::new("t0", "id", DataType::BigInt)),
        alias: "a0".into(),
    }];
    q.from.joins.push(Join::inner(
        "t1",
        Expr::binary(
            BinaryOp::Eq,
            Expr::Column(ColumnRef::new("t0", "id", DataType::BigInt)),
            Expr::Column(ColumnRef::new("t1", "id", DataType::BigInt)),
        ),
    ));
    q
}

#[test]
fn ground_truth_agreement_passes() {
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(truth_query());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT id FROM t0", Response::Rows(rows(&["id"], &[&[Some("1")], &[Some("2")]])))
        .on("SELECT id FROM t1", Response::Rows(rows(&["id"], &[&[Some("1")]])))
        .on("SELECT COUNT(*) FROM (", Response::Count(1));
    let report = check("ground_truth", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    assert!(!report.is_skip(), "{report:?}");
    let truth = report.truth.expect("truth payload");
    assert!(!truth.mismatch);
    assert_eq!(truth.join_sig, "t0->INNER:t1");
    assert_eq!(truth.row_count, 1);
}

#[test]
fn ground_truth_count_mismatch_is_a_bug() {
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(truth_query());
    let mut executor = ScriptedExecutor::new()
        .on("SELECT id FROM t0", Response::Rows(rows(&["id"], &[&[Some("1")], &[Some("2")]])))
        .on("SELECT id FROM t1", Response::Rows(rows(&["id"], &[&[Some("1")]])))
        .on("SELECT COUNT(*) FROM (", Response::Count(7));
    let report = check("ground_truth", &mut generator, &mut executor);
    assert!(!report.ok);
    assert_eq!(report.replay_kind(), Some("count"));
    let truth = report.truth.expect("truth payload");
    assert!(truth.mismatch);
    assert_eq!(truth.row_count, 1);
}

#[test]
fn ground_truth_uses_registered_truth_executor() {
    let mut state = two_table_state();
    let mut truth = peridot_schema::JoinTruth::new();
    let mut t0 = peridot_schema::KeyTable::new(vec!["id".into()]);
    t0.push_row(vec![Some(1)]);
    t0.push_row(vec![Some(2)]);
    let mut t1 = peridot_schema::KeyTable::new(vec!["id".into()]);
    t1.push_row(vec![Some(1)]);
    truth.add_table("t0", t0);
    truth.add_table("t1", t1);
    state.set_join_truth(truth);

    let mut generator = ScriptedGenerator::new(state).with_query(truth_query());
    let mut executor =
        ScriptedExecutor::new().on("SELECT COUNT(*) FROM (", Response::Count(1));
    let report = check("ground_truth", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    let truth = report.truth.expect("truth payload");
    assert!(truth.enabled, "truth executor path must be taken");
    // Only the server-side count was issued; keys came from the truth.
    assert_eq!(executor.executed.len(), 1);
}

#[test]
fn ground_truth_left_chain_counts_unmatched_rows() {
    let mut q = truth_query();
    q.from.joins[0].join_type = peridot_ast::JoinType::Left;
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(q);
    // t0 has keys {1, 2}; t1 only {1}: LEFT keeps the unmatched row.
    let mut executor = ScriptedExecutor::new()
        .on("SELECT id FROM t0", Response::Rows(rows(&["id"], &[&[Some("1")], &[Some("2")]])))
        .on("SELECT id FROM t1", Response::Rows(rows(&["id"], &[&[Some("1")]])))
        .on("SELECT COUNT(*) FROM (", Response::Count(2));
    let report = check("ground_truth", &mut generator, &mut executor);
    assert!(report.ok, "{report:?}");
    let truth = report.truth.expect("truth payload");
    assert_eq!(truth.join_sig, "t0->LEFT:t1");
    assert_eq!(truth.row_count, 2);
}

#[test]
fn ground_truth_dsg_mode_rejects_off_convention_keys() {
    let mut config = peridot_gen::FuzzConfig::default();
    config.oracles.truth_dsg_mode = true;
    // Joined on `id`, which is neither k0 nor k(idx-1).
    let mut generator = ScriptedGenerator::new(two_table_state())
        .with_config(config)
        .with_query(truth_query());
    let mut executor = ScriptedExecutor::new();
    let report = check("ground_truth", &mut generator, &mut executor);
    assert_eq!(report.skip_reason(), Some("ground_truth:dsg_key_convention"));
}

#[test]
fn ground_truth_missing_column_is_a_bug() {
    let mut generator = ScriptedGenerator::new(two_table_state()).with_query(truth_query());
    let mut executor = ScriptedExecutor::new().on(
        "SELECT id FROM t0",
        Response::Error(ExecError::Server {
            code: 1054,
            message: "Unknown column 'id' in 'field list'".into(),
        }),
    );
    let report = check("ground_truth", &mut generator, &mut executor);
    assert!(!report.ok, "catalog inconsistency must be surfaced: {report:?}");
    assert_eq!(report.replay_kind(), Some("missing_column"));
}
