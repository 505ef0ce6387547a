//! EET: equivalent expression transformation.
//!
//! Parse the generated SQL, apply a semantics-preserving identity to a
//! predicate (WHERE, HAVING, or a join's ON), restore, and demand the
//! signature is unchanged. Rewrites:
//!
//! | kind | action |
//! |------|--------|
//! | `double_not` | `p` → `NOT NOT (p)` |
//! | `and_true` | `p` → `(p) AND 1` |
//! | `or_false` | `p` → `(p) OR 0` |
//! | `numeric_identity` | `x` → `(x + 0)` |
//! | `string_identity` | `'s'` → `CONCAT('s', '')` |
//! | `date_identity` | `'d'` → `DATE_ADD('d', INTERVAL 0 DAY)` |

use rand::seq::SliceRandom;
use rand::Rng;

use sqlparser::ast::{
    BinaryOperator, Expr as PExpr, JoinConstraint, JoinOperator, Query as PQuery, SelectItem,
    SetExpr, Statement, UnaryOperator, Value as PValue, ValueWithSpan,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use peridot_ast::{Expr, SelectQuery};

use crate::helpers::{normalize_using_joins, query_has_window, UsingNormalize};
use crate::policy::PredicatePolicy;
use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};
use crate::signature::{explain_or_error, signature_sql_for};
use crate::spec::{build_query_with_spec, QuerySpec};

const ORACLE: &str = "eet";

/// MySQL error 3065: ORDER BY expression not in SELECT list under
/// DISTINCT. The transform can legally surface it; it is noise.
const ER_ORDERBY_DISTINCT: u16 = 3065;

#[derive(Debug, Default)]
pub struct Eet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RewriteKind {
    DoubleNot,
    AndTrue,
    OrFalse,
    NumericIdentity,
    StringIdentity,
    DateIdentity,
}

impl RewriteKind {
    fn label(self) -> &'static str {
        match self {
            RewriteKind::DoubleNot => "double_not",
            RewriteKind::AndTrue => "and_true",
            RewriteKind::OrFalse => "or_false",
            RewriteKind::NumericIdentity => "numeric_identity",
            RewriteKind::StringIdentity => "string_identity",
            RewriteKind::DateIdentity => "date_identity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Where,
    Having,
    JoinOn { table: usize, join: usize },
}

// ============================================================================
// AST-side guards
// ============================================================================

/// Applies the ORDER BY stability rules; `Err(reason)` means skip.
fn settle_order_by(query: &mut SelectQuery) -> Result<(), &'static str> {
    if query.order_by.is_empty() {
        return Ok(());
    }
    let non_constant: Vec<String> = query
        .order_by
        .iter()
        .filter(|o| !o.expr.is_constant())
        .map(|o| o.expr.sql())
        .collect();
    if non_constant.is_empty() {
        if query.limit.is_some() {
            return Err("constant_order_limit");
        }
        query.order_by.clear();
        return Ok(());
    }
    let mut distinct_keys = non_constant.clone();
    distinct_keys.sort();
    distinct_keys.dedup();
    if distinct_keys.len() < 2 {
        if query.limit.is_some() {
            return Err("unstable_order_limit");
        }
        query.order_by.clear();
    }
    Ok(())
}

/// Under DISTINCT every ORDER BY key must be an in-range ordinal, a
/// select alias, or an expression textually matching a select item.
fn distinct_order_compatible(query: &SelectQuery) -> bool {
    if !query.distinct || query.order_by.is_empty() {
        return true;
    }
    let item_sqls: Vec<String> = query.items.iter().map(|i| i.expr.sql()).collect();
    query.order_by.iter().all(|o| match &o.expr {
        Expr::GroupByOrdinal { n, .. } => *n >= 1 && *n <= query.items.len(),
        Expr::Column(col) => {
            query.items.iter().any(|i| i.alias == col.name) || item_sqls.contains(&o.expr.sql())
        }
        other => item_sqls.contains(&other.sql()),
    })
}

/// Windows whose effective PARTITION/ORDER is constant, and ranking
/// functions without a usable order, are evaluation-order unstable.
fn windows_stable(query: &SelectQuery) -> bool {
    let mut stable = true;
    let mut check_window =
        |name: &str, partition: &[Expr], order: &[peridot_ast::OrderByItem], named: Option<&str>| {
            let (partition, order): (Vec<&Expr>, Vec<&Expr>) = match named {
                Some(w) => match query.window_defs.iter().find(|d| d.name == w) {
                    Some(def) => (
                        def.partition_by.iter().collect(),
                        def.order_by.iter().map(|o| &o.expr).collect(),
                    ),
                    None => return false,
                },
                None => (
                    partition.iter().collect(),
                    order.iter().map(|o| &o.expr).collect(),
                ),
            };
            let all_constant = partition.iter().chain(order.iter()).all(|e| e.is_constant());
            if !partition.is_empty() || !order.is_empty() {
                if all_constant {
                    return false;
                }
            }
            let ranking = matches!(
                name.to_ascii_uppercase().as_str(),
                "RANK" | "DENSE_RANK" | "ROW_NUMBER"
            );
            if ranking && (order.is_empty() || order.iter().all(|e| e.is_constant())) {
                return false;
            }
            true
        };
    let mut visit = |e: &Expr| {
        if let Expr::Window {
            name,
            partition_by,
            order_by,
            window_name,
            ..
        } = e
        {
            stable &= check_window(name, partition_by, order_by, window_name.as_deref());
        }
    };
    query.visit_own_exprs(&mut visit);
    stable
}

// ============================================================================
// sqlparser-side rewriting
// ============================================================================

fn parse_expr_fragment(fragment: &str) -> Option<PExpr> {
    let sql = format!("SELECT {fragment}");
    let statements = Parser::parse_sql(&MySqlDialect {}, &sql).ok()?;
    match statements.into_iter().next()? {
        Statement::Query(q) => match *q.body {
            SetExpr::Select(select) => match select.projection.into_iter().next()? {
                SelectItem::UnnamedExpr(e) => Some(e),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn looks_like_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() >= 10
        && bytes[0..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[7] == b'-'
        && bytes[8..10].iter().all(u8::is_ascii_digit)
}

#[derive(Debug, Default, Clone, Copy)]
struct LiteralKinds {
    numeric: bool,
    string: bool,
    date: bool,
    column: bool,
}

fn scan_literal_kinds(expr: &PExpr, kinds: &mut LiteralKinds) {
    match expr {
        PExpr::Value(ValueWithSpan {
            value: PValue::Number(_, _),
            ..
        }) => kinds.numeric = true,
        PExpr::Value(ValueWithSpan {
            value: PValue::SingleQuotedString(s),
            ..
        }) => {
            if looks_like_date(s) {
                kinds.date = true;
            } else {
                kinds.string = true;
            }
        }
        PExpr::Identifier(_) | PExpr::CompoundIdentifier(_) => kinds.column = true,
        PExpr::BinaryOp { left, right, .. } => {
            scan_literal_kinds(left, kinds);
            scan_literal_kinds(right, kinds);
        }
        PExpr::UnaryOp { expr, .. } => scan_literal_kinds(expr, kinds),
        PExpr::Nested(e) => scan_literal_kinds(e, kinds),
        PExpr::IsNull(e) | PExpr::IsNotNull(e) => scan_literal_kinds(e, kinds),
        PExpr::InList { expr, list, .. } => {
            scan_literal_kinds(expr, kinds);
            for item in list {
                scan_literal_kinds(item, kinds);
            }
        }
        PExpr::Between {
            expr, low, high, ..
        } => {
            scan_literal_kinds(expr, kinds);
            scan_literal_kinds(low, kinds);
            scan_literal_kinds(high, kinds);
        }
        _ => {}
    }
}

/// Replaces the first subexpression `pred` accepts with `make`'s
/// output. Returns whether a replacement happened.
fn replace_first(
    expr: &mut PExpr,
    pred: &dyn Fn(&PExpr) -> bool,
    make: &dyn Fn(&PExpr) -> Option<PExpr>,
) -> bool {
    if pred(expr) {
        if let Some(new) = make(expr) {
            *expr = new;
            return true;
        }
    }
    match expr {
        PExpr::BinaryOp { left, right, .. } => {
            replace_first(left, pred, make) || replace_first(right, pred, make)
        }
        PExpr::UnaryOp { expr, .. } => replace_first(expr, pred, make),
        PExpr::Nested(e) => replace_first(e, pred, make),
        PExpr::IsNull(e) | PExpr::IsNotNull(e) => replace_first(e, pred, make),
        PExpr::InList { expr, list, .. } => {
            if replace_first(expr, pred, make) {
                return true;
            }
            list.iter_mut().any(|item| replace_first(item, pred, make))
        }
        PExpr::Between {
            expr, low, high, ..
        } => {
            replace_first(expr, pred, make)
                || replace_first(low, pred, make)
                || replace_first(high, pred, make)
        }
        _ => false,
    }
}

fn apply_rewrite(target: &mut PExpr, kind: RewriteKind) -> bool {
    match kind {
        RewriteKind::DoubleNot => {
            let inner = std::mem::replace(target, PExpr::Value(PValue::Null.into()));
            *target = PExpr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(PExpr::UnaryOp {
                    op: UnaryOperator::Not,
                    expr: Box::new(PExpr::Nested(Box::new(inner))),
                }),
            };
            true
        }
        RewriteKind::AndTrue | RewriteKind::OrFalse => {
            let (op, lit) = if kind == RewriteKind::AndTrue {
                (BinaryOperator::And, "1")
            } else {
                (BinaryOperator::Or, "0")
            };
            let inner = std::mem::replace(target, PExpr::Value(PValue::Null.into()));
            *target = PExpr::BinaryOp {
                left: Box::new(PExpr::Nested(Box::new(inner))),
                op,
                right: Box::new(PExpr::Value(
                    PValue::Number(lit.to_string(), false).into(),
                )),
            };
            true
        }
        RewriteKind::NumericIdentity => {
            let replaced = replace_first(
                target,
                &|e| {
                    matches!(
                        e,
                        PExpr::Value(ValueWithSpan {
                            value: PValue::Number(_, _),
                            ..
                        })
                    )
                },
                &|e| parse_expr_fragment(&format!("({e} + 0)")),
            );
            if replaced {
                return true;
            }
            // No numeric literal in the target: pad a column instead.
            replace_first(
                target,
                &|e| matches!(e, PExpr::Identifier(_) | PExpr::CompoundIdentifier(_)),
                &|e| parse_expr_fragment(&format!("({e} + 0)")),
            )
        }
        RewriteKind::StringIdentity => replace_first(
            target,
            &|e| {
                matches!(
                    e,
                    PExpr::Value(ValueWithSpan {
                        value: PValue::SingleQuotedString(s),
                        ..
                    }) if !looks_like_date(s)
                )
            },
            &|e| parse_expr_fragment(&format!("CONCAT({e}, '')")),
        ),
        RewriteKind::DateIdentity => replace_first(
            target,
            &|e| {
                matches!(
                    e,
                    PExpr::Value(ValueWithSpan {
                        value: PValue::SingleQuotedString(s),
                        ..
                    }) if looks_like_date(s)
                )
            },
            &|e| parse_expr_fragment(&format!("DATE_ADD({e}, INTERVAL 0 DAY)")),
        ),
    }
}

/// A mutable borrow of the target expression inside the parsed query.
fn target_expr<'a>(query: &'a mut PQuery, target: Target) -> Option<&'a mut PExpr> {
    let SetExpr::Select(select) = query.body.as_mut() else {
        return None;
    };
    match target {
        Target::Where => select.selection.as_mut(),
        Target::Having => select.having.as_mut(),
        Target::JoinOn { table, join } => {
            let j = select.from.get_mut(table)?.joins.get_mut(join)?;
            match &mut j.join_operator {
                JoinOperator::Inner(JoinConstraint::On(e))
                | JoinOperator::LeftOuter(JoinConstraint::On(e))
                | JoinOperator::RightOuter(JoinConstraint::On(e))
                | JoinOperator::FullOuter(JoinConstraint::On(e)) => Some(e),
                _ => None,
            }
        }
    }
}

fn available_targets(query: &PQuery) -> Vec<Target> {
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Vec::new();
    };
    let mut targets = Vec::new();
    if select.selection.is_some() {
        targets.push(Target::Where);
    }
    if select.having.is_some() {
        targets.push(Target::Having);
    }
    for (ti, twj) in select.from.iter().enumerate() {
        for (ji, join) in twj.joins.iter().enumerate() {
            let on = matches!(
                &join.join_operator,
                JoinOperator::Inner(JoinConstraint::On(_))
                    | JoinOperator::LeftOuter(JoinConstraint::On(_))
                    | JoinOperator::RightOuter(JoinConstraint::On(_))
                    | JoinOperator::FullOuter(JoinConstraint::On(_))
            );
            if on {
                targets.push(Target::JoinOn {
                    table: ti,
                    join: ji,
                });
            }
        }
    }
    targets
}

/// Weighted pick of the preferred kind, then the fallback order.
fn kind_order(
    rng: &mut dyn rand::RngCore,
    kinds: LiteralKinds,
    cfg: &peridot_gen::OracleConfig,
) -> Vec<RewriteKind> {
    let mut weighted: Vec<(RewriteKind, u32)> = vec![
        (RewriteKind::DoubleNot, cfg.eet_weight_double_not),
        (RewriteKind::AndTrue, cfg.eet_weight_and_true),
        (RewriteKind::OrFalse, cfg.eet_weight_or_false),
    ];
    if kinds.numeric || kinds.column {
        weighted.push((RewriteKind::NumericIdentity, cfg.eet_weight_numeric_identity));
    }
    if kinds.string {
        weighted.push((RewriteKind::StringIdentity, cfg.eet_weight_string_identity));
    }
    if kinds.date {
        weighted.push((RewriteKind::DateIdentity, cfg.eet_weight_date_identity));
    }
    let total: u32 = weighted.iter().map(|(_, w)| w.max(&1)).sum();
    let mut roll = rng.gen_range(0..total);
    let mut preferred = weighted[0].0;
    for (kind, weight) in &weighted {
        let weight = (*weight).max(1);
        if roll < weight {
            preferred = *kind;
            break;
        }
        roll -= weight;
    }
    let mut order = vec![preferred];
    for (kind, _) in &weighted {
        if *kind != preferred {
            order.push(*kind);
        }
    }
    order
}

impl Oracle for Eet {
    fn name(&self) -> &'static str {
        ORACLE
    }

    fn check(&mut self, cx: &mut OracleCx<'_>) -> Report {
        let cfg = cx.config().oracles.clone();
        let level = cfg.predicate_level;
        let retries = cfg.eet_transform_retry_max.max(1);

        for attempt in 0..retries {
            let spec = QuerySpec {
                oracle: ORACLE,
                constraints: peridot_gen::BuildConstraints {
                    require_where: true,
                    require_deterministic: true,
                    disallow_set_ops: true,
                    ..peridot_gen::BuildConstraints::default()
                },
                profile: crate::profile::profile_by_name(ORACLE),
                max_tries: 8,
                predicate_guard: true,
                guard_policy: PredicatePolicy::from_level(level),
                ..QuerySpec::default()
            };
            let mut query = match build_query_with_spec(cx.generator, &spec).into_report(ORACLE) {
                Ok(q) => q,
                Err(report) => return report,
            };

            if query.table_factor_count_with_cte() > cfg.eet_max_table_factors {
                return Report::skip(ORACLE, skip_reason(ORACLE, "too_complex"));
            }
            match normalize_using_joins(&mut query, cx.state()) {
                UsingNormalize::Ambiguous => {
                    return Report::skip(ORACLE, skip_reason(ORACLE, "ambiguous_using_column"));
                }
                UsingNormalize::Unchanged | UsingNormalize::Normalized => {}
            }
            if let Err(reason) = settle_order_by(&mut query) {
                return Report::skip(ORACLE, skip_reason(ORACLE, reason));
            }
            if !distinct_order_compatible(&query) {
                return Report::skip(ORACLE, skip_reason(ORACLE, "distinct_order_mismatch"));
            }
            if query_has_window(&query) && !windows_stable(&query) {
                return Report::skip(ORACLE, skip_reason(ORACLE, "unstable_window"));
            }

            let sql = query.sql_string();
            let aliases = query.column_aliases();
            let Some(transformed) = self.transform(cx, &sql, &cfg) else {
                // No transform applied; regenerate and try again.
                if attempt + 1 == retries {
                    return Report::skip(ORACLE, skip_reason(ORACLE, "no_transform"));
                }
                continue;
            };
            let (rewritten_sql, rewrite_label) = transformed;

            let base_sig_sql = query.signature_sql();
            let rewritten_sig_sql = signature_sql_for(&rewritten_sql, &aliases);

            let base_sig = match cx.executor.query_signature(cx.cancel, &base_sig_sql) {
                Ok(s) => s,
                Err(e) => return classify_eet_error(&e),
            };
            let rewritten_sig = match cx.executor.query_signature(cx.cancel, &rewritten_sig_sql) {
                Ok(s) => s,
                Err(e) => return classify_eet_error(&e),
            };

            if base_sig == rewritten_sig {
                return Report::pass(ORACLE)
                    .with_sql(base_sig_sql)
                    .with_sql(rewritten_sig_sql)
                    .with_detail("rewrite", rewrite_label)
                    .with_metric("rows", base_sig.count);
            }
            let explain_base = explain_or_error(cx.executor, cx.cancel, &sql);
            let explain_rewritten = explain_or_error(cx.executor, cx.cancel, &rewritten_sql);
            return Report::bug(
                ORACLE,
                "signature",
                base_sig.to_string(),
                rewritten_sig.to_string(),
                base_sig_sql,
                rewritten_sig_sql,
            )
            .with_sql(sql)
            .with_sql(rewritten_sql)
            .with_detail("rewrite", rewrite_label)
            .with_explains(explain_base, explain_rewritten);
        }
        Report::skip(ORACLE, skip_reason(ORACLE, "no_transform"))
    }
}

impl Eet {
    /// Parses, rewrites one target, restores. `None` when parsing fails
    /// or no rewrite applied.
    fn transform(
        &self,
        cx: &mut OracleCx<'_>,
        sql: &str,
        cfg: &peridot_gen::OracleConfig,
    ) -> Option<(String, &'static str)> {
        let mut statements = Parser::parse_sql(&MySqlDialect {}, sql).ok()?;
        let label = {
            let Statement::Query(query) = statements.first_mut()? else {
                return None;
            };
            let mut targets = available_targets(query);
            targets.shuffle(cx.generator.rng());

            let mut applied = None;
            'targets: for target in targets {
                let kinds = {
                    let Some(expr) = target_expr(query, target) else {
                        continue;
                    };
                    let mut kinds = LiteralKinds::default();
                    scan_literal_kinds(expr, &mut kinds);
                    kinds
                };
                for kind in kind_order(cx.generator.rng(), kinds, cfg) {
                    let Some(expr) = target_expr(query, target) else {
                        continue 'targets;
                    };
                    if apply_rewrite(expr, kind) {
                        applied = Some(kind.label());
                        break 'targets;
                    }
                }
            }
            applied
        }?;
        let restored = statements.first()?.to_string();
        Some((restored, label))
    }
}

fn classify_eet_error(err: &peridot_exec::ExecError) -> Report {
    if err.server_code() == Some(ER_ORDERBY_DISTINCT) {
        return Report::skip(ORACLE, skip_reason(ORACLE, "order_by_distinct"));
    }
    let reason = peridot_exec::sql_error_reason(ORACLE, err);
    if reason.ends_with("missing_column") || reason.ends_with("plan_ref_missing") {
        return Report::sql_error(ORACLE, "eet:signature_missing_column")
            .with_detail("bug_hint", "tidb:schema_column_missing");
    }
    Report::from_exec_error(ORACLE, err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use peridot_ast::{BinaryOp, ColumnRef, Literal, OrderByItem, SelectItem};
    use peridot_schema::DataType;

    fn col(t: &str, n: &str) -> Expr {
        Expr::Column(ColumnRef::new(t, n, DataType::Int))
    }

    fn parsed(sql: &str) -> Vec<Statement> {
        Parser::parse_sql(&MySqlDialect {}, sql).unwrap()
    }

    #[test]
    fn double_not_wraps_predicate() {
        let mut stmts = parsed("SELECT a FROM t WHERE a > 1");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let expr = target_expr(q, Target::Where).unwrap();
        assert!(apply_rewrite(expr, RewriteKind::DoubleNot));
        let restored = stmts[0].to_string();
        assert!(restored.contains("NOT NOT (a > 1)"), "{restored}");
    }

    #[test]
    fn and_true_appends_literal() {
        let mut stmts = parsed("SELECT a FROM t WHERE a > 1");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let expr = target_expr(q, Target::Where).unwrap();
        assert!(apply_rewrite(expr, RewriteKind::AndTrue));
        assert!(stmts[0].to_string().contains("(a > 1) AND 1"));
    }

    #[test]
    fn numeric_identity_pads_literal() {
        let mut stmts = parsed("SELECT a FROM t WHERE a > 1");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let expr = target_expr(q, Target::Where).unwrap();
        assert!(apply_rewrite(expr, RewriteKind::NumericIdentity));
        assert!(stmts[0].to_string().contains("(1 + 0)"));
    }

    #[test]
    fn string_identity_uses_concat_with_empty_string() {
        let mut stmts = parsed("SELECT a FROM t WHERE a = 'abc'");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let expr = target_expr(q, Target::Where).unwrap();
        assert!(apply_rewrite(expr, RewriteKind::StringIdentity));
        assert!(stmts[0].to_string().contains("CONCAT('abc', '')"));
    }

    #[test]
    fn date_identity_targets_date_literals_only() {
        let mut stmts = parsed("SELECT a FROM t WHERE a = '2024-01-31'");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let expr = target_expr(q, Target::Where).unwrap();
        assert!(apply_rewrite(expr, RewriteKind::DateIdentity));
        assert!(stmts[0]
            .to_string()
            .contains("DATE_ADD('2024-01-31', INTERVAL 0 DAY)"));
    }

    #[test]
    fn or_false_appends_literal() {
        let mut stmts = parsed("SELECT a FROM t WHERE a > 1");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let expr = target_expr(q, Target::Where).unwrap();
        assert!(apply_rewrite(expr, RewriteKind::OrFalse));
        assert!(stmts[0].to_string().contains("(a > 1) OR 0"));
    }

    #[test]
    fn numeric_identity_falls_back_to_columns() {
        // No numeric literal in the target, only column references.
        let mut stmts = parsed("SELECT a FROM t WHERE a > b");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let expr = target_expr(q, Target::Where).unwrap();
        assert!(apply_rewrite(expr, RewriteKind::NumericIdentity));
        assert!(stmts[0].to_string().contains("(a + 0)"));
    }

    #[test]
    fn string_identity_skips_date_shaped_literals() {
        let mut stmts = parsed("SELECT a FROM t WHERE a = '2024-01-31'");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let expr = target_expr(q, Target::Where).unwrap();
        assert!(!apply_rewrite(expr, RewriteKind::StringIdentity));
    }

    #[test]
    fn join_on_is_a_rewrite_target() {
        let mut stmts = parsed("SELECT t.a FROM t INNER JOIN u ON t.a = u.a WHERE t.a > 1");
        let Statement::Query(q) = stmts.first_mut().unwrap() else {
            panic!()
        };
        let targets = available_targets(q);
        assert!(targets.contains(&Target::Where));
        assert!(targets.contains(&Target::JoinOn { table: 0, join: 0 }));
        let expr = target_expr(q, Target::JoinOn { table: 0, join: 0 }).unwrap();
        assert!(apply_rewrite(expr, RewriteKind::DoubleNot));
        assert!(stmts[0].to_string().contains("ON NOT NOT (t.a = u.a)"));
    }

    #[test]
    fn kind_order_puts_preferred_first_and_covers_all() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let cfg = peridot_gen::OracleConfig::default();
        let kinds = LiteralKinds {
            numeric: true,
            string: true,
            date: true,
            column: true,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let order = kind_order(&mut rng, kinds, &cfg);
        assert_eq!(order.len(), 6, "every applicable kind appears once");
        let mut dedup = order.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), order.len());
    }

    #[test]
    fn settle_order_by_drops_constant_keys() {
        let mut q = SelectQuery::from_table("t0");
        q.items = vec![SelectItem {
            expr: col("t0", "a"),
            alias: "a0".into(),
        }];
        q.order_by = vec![OrderByItem::asc(Expr::lit(Literal::Int(1)))];
        assert!(settle_order_by(&mut q).is_ok());
        assert!(q.order_by.is_empty());

        q.order_by = vec![OrderByItem::asc(Expr::lit(Literal::Int(1)))];
        q.limit = Some(5);
        assert_eq!(settle_order_by(&mut q), Err("constant_order_limit"));
    }

    #[test]
    fn settle_order_by_requires_two_distinct_keys() {
        let mut q = SelectQuery::from_table("t0");
        q.order_by = vec![
            OrderByItem::asc(col("t0", "a")),
            OrderByItem::asc(col("t0", "a")),
        ];
        assert!(settle_order_by(&mut q).is_ok());
        assert!(q.order_by.is_empty(), "single distinct key is dropped");

        q.order_by = vec![
            OrderByItem::asc(col("t0", "a")),
            OrderByItem::asc(col("t0", "b")),
        ];
        assert!(settle_order_by(&mut q).is_ok());
        assert_eq!(q.order_by.len(), 2, "two distinct keys survive");
    }

    #[test]
    fn distinct_order_compatibility() {
        let mut q = SelectQuery::from_table("t0");
        q.distinct = true;
        q.items = vec![SelectItem {
            expr: col("t0", "a"),
            alias: "a0".into(),
        }];
        q.order_by = vec![OrderByItem::asc(col("t0", "a"))];
        assert!(distinct_order_compatible(&q));

        q.order_by = vec![OrderByItem::asc(col("t0", "z"))];
        assert!(!distinct_order_compatible(&q));

        q.order_by = vec![OrderByItem::asc(Expr::GroupByOrdinal { n: 1, expr: None })];
        assert!(distinct_order_compatible(&q));
        q.order_by = vec![OrderByItem::asc(Expr::GroupByOrdinal { n: 9, expr: None })];
        assert!(!distinct_order_compatible(&q));
    }

    #[test]
    fn eet_3065_is_benign() {
        let err = peridot_exec::ExecError::Server {
            code: 3065,
            message: "Expression #1 of ORDER BY clause is not in SELECT list".into(),
        };
        let report = classify_eet_error(&err);
        assert_eq!(report.skip_reason(), Some("eet:order_by_distinct"));
    }
}
