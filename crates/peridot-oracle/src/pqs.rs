//! PQS: pivoted query synthesis.
//!
//! Pick a concrete row (the pivot), synthesize a query whose predicate
//! provably holds on that row, and assert the row shows up in the
//! result. The predicate is either assembled from the pivot's own
//! values or generated at random and then *rectified*: evaluated
//! abstractly under SQL's three-valued logic and wrapped so the pivot
//! satisfies it (`TRUE` keep, `FALSE` negate, `NULL` wrap in IS NULL).

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use rand::seq::SliceRandom;
use rand::Rng;

use peridot_ast::{
    BinaryOp, ColumnRef, Expr, FromClause, Join, JoinType, Literal, SelectItem, SelectQuery,
    UnaryOp,
};
use peridot_schema::{DataType, TableMeta, TypeCategory};

use crate::bandit::HintBandit;
use crate::registry::{Oracle, OracleCx};
use crate::report::{skip_reason, Report};

const ORACLE: &str = "pqs";

const ARM_RECTIFY: &str = "rectify_random";
const ARM_SINGLE: &str = "pivot_single";
const ARM_MULTI: &str = "pivot_multi";

const REWARD_BUG: f64 = 1.0;
const REWARD_ERROR: f64 = 0.5;
const REWARD_SKIP: f64 = -0.2;

static PQS_BANDIT: LazyLock<Mutex<HintBandit>> = LazyLock::new(|| {
    Mutex::new(HintBandit::new(0, std::f64::consts::SQRT_2).with_reward_floor(0.0))
});

fn bandit(window: usize, exploration: f64) -> std::sync::MutexGuard<'static, HintBandit> {
    let mut guard = PQS_BANDIT
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.reconfigure(window, exploration);
    guard
}

/// Test hook.
pub fn reset_pqs_bandit() {
    PQS_BANDIT
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .reset();
}

// ============================================================================
// Three-valued logic
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Truth {
    True,
    False,
    Null,
    /// The evaluator cannot decide; rectification falls back.
    Unknown,
}

/// The pivot row: cell text by `table.column`, plus declared types.
#[derive(Debug, Default)]
struct PivotEnv {
    values: HashMap<String, Option<String>>,
    types: HashMap<String, DataType>,
}

impl PivotEnv {
    fn insert(&mut self, col: &ColumnRef, value: Option<String>) {
        self.values.insert(col.qualified(), value);
        self.types.insert(col.qualified(), col.ty);
    }

    fn scalar(&self, col: &ColumnRef) -> Option<Scalar> {
        let cell = self.values.get(&col.qualified())?;
        let Some(text) = cell else {
            return Some(Scalar::Null);
        };
        let ty = self.types.get(&col.qualified()).copied().unwrap_or(col.ty);
        Some(match ty.category() {
            TypeCategory::Integer => text
                .parse::<i64>()
                .map_or_else(|_| Scalar::Text(text.clone()), Scalar::Int),
            TypeCategory::Float | TypeCategory::Decimal => text
                .parse::<f64>()
                .map_or_else(|_| Scalar::Text(text.clone()), Scalar::Float),
            _ => Scalar::Text(text.clone()),
        })
    }
}

fn eval_scalar(expr: &Expr, env: &PivotEnv) -> Option<Scalar> {
    match expr {
        Expr::Column(col) => env.scalar(col),
        Expr::Literal(lit) => Some(match lit {
            Literal::Null => Scalar::Null,
            Literal::Bool(b) => Scalar::Int(i64::from(*b)),
            Literal::Int(v) => Scalar::Int(*v),
            Literal::Uint(v) => i64::try_from(*v).map_or(Scalar::Float(*v as f64), Scalar::Int),
            Literal::Float(v) => Scalar::Float(*v),
            Literal::Str(s) | Literal::Date(s) | Literal::Time(s) | Literal::Datetime(s) => {
                Scalar::Text(s.clone())
            }
        }),
        Expr::Unary {
            op: UnaryOp::Neg,
            expr,
        } => match eval_scalar(expr, env)? {
            Scalar::Int(v) => Some(Scalar::Int(-v)),
            Scalar::Float(v) => Some(Scalar::Float(-v)),
            _ => None,
        },
        _ => None,
    }
}

/// SQL comparison of two scalars; `None` when the coercion is outside
/// the evaluator's competence.
fn compare_scalars(a: &Scalar, b: &Scalar) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Scalar::Int(x), Scalar::Int(y)) => Some(x.cmp(y)),
        (Scalar::Int(x), Scalar::Float(y)) => (*x as f64).partial_cmp(y),
        (Scalar::Float(x), Scalar::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Scalar::Float(x), Scalar::Float(y)) => x.partial_cmp(y),
        (Scalar::Text(x), Scalar::Text(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn truth_of(b: bool) -> Truth {
    if b {
        Truth::True
    } else {
        Truth::False
    }
}

pub(crate) fn eval_truth(expr: &Expr, env: &PivotEnv) -> Truth {
    match expr {
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => match (eval_truth(left, env), eval_truth(right, env)) {
                (Truth::Unknown, _) | (_, Truth::Unknown) => Truth::Unknown,
                (Truth::False, _) | (_, Truth::False) => Truth::False,
                (Truth::Null, _) | (_, Truth::Null) => Truth::Null,
                _ => Truth::True,
            },
            BinaryOp::Or => match (eval_truth(left, env), eval_truth(right, env)) {
                (Truth::Unknown, _) | (_, Truth::Unknown) => Truth::Unknown,
                (Truth::True, _) | (_, Truth::True) => Truth::True,
                (Truth::Null, _) | (_, Truth::Null) => Truth::Null,
                _ => Truth::False,
            },
            op if op.is_comparison() => {
                let (Some(a), Some(b)) = (eval_scalar(left, env), eval_scalar(right, env)) else {
                    return Truth::Unknown;
                };
                if *op == BinaryOp::NullSafeEq {
                    return match (&a, &b) {
                        (Scalar::Null, Scalar::Null) => Truth::True,
                        (Scalar::Null, _) | (_, Scalar::Null) => Truth::False,
                        _ => match compare_scalars(&a, &b) {
                            Some(ord) => truth_of(ord == std::cmp::Ordering::Equal),
                            None => Truth::Unknown,
                        },
                    };
                }
                if a == Scalar::Null || b == Scalar::Null {
                    return Truth::Null;
                }
                let Some(ord) = compare_scalars(&a, &b) else {
                    return Truth::Unknown;
                };
                truth_of(match op {
                    BinaryOp::Eq => ord == std::cmp::Ordering::Equal,
                    BinaryOp::Ne => ord != std::cmp::Ordering::Equal,
                    BinaryOp::Lt => ord == std::cmp::Ordering::Less,
                    BinaryOp::Le => ord != std::cmp::Ordering::Greater,
                    BinaryOp::Gt => ord == std::cmp::Ordering::Greater,
                    BinaryOp::Ge => ord != std::cmp::Ordering::Less,
                    _ => return Truth::Unknown,
                })
            }
            _ => Truth::Unknown,
        },
        Expr::Unary {
            op: UnaryOp::Not,
            expr,
        } => match eval_truth(expr, env) {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Null => Truth::Null,
            Truth::Unknown => Truth::Unknown,
        },
        Expr::Unary {
            op: UnaryOp::IsNull,
            expr,
        } => match eval_scalar(expr, env) {
            Some(s) => truth_of(s == Scalar::Null),
            None => Truth::Unknown,
        },
        Expr::Unary {
            op: UnaryOp::IsNotNull,
            expr,
        } => match eval_scalar(expr, env) {
            Some(s) => truth_of(s != Scalar::Null),
            None => Truth::Unknown,
        },
        Expr::In {
            left,
            list,
            negated,
        } => {
            let Some(needle) = eval_scalar(left, env) else {
                return Truth::Unknown;
            };
            if needle == Scalar::Null {
                return Truth::Null;
            }
            let mut saw_null = false;
            for item in list {
                let Some(value) = eval_scalar(item, env) else {
                    return Truth::Unknown;
                };
                if value == Scalar::Null {
                    saw_null = true;
                    continue;
                }
                if compare_scalars(&needle, &value) == Some(std::cmp::Ordering::Equal) {
                    return truth_of(!negated);
                }
            }
            if saw_null {
                Truth::Null
            } else {
                truth_of(*negated)
            }
        }
        _ => Truth::Unknown,
    }
}

/// Wraps `expr` so it holds on the pivot, or `None` when the truth
/// value could not be decided.
fn rectify(expr: Expr, env: &PivotEnv) -> Option<Expr> {
    match eval_truth(&expr, env) {
        Truth::True => Some(expr),
        Truth::False => Some(Expr::not(expr)),
        Truth::Null => Some(Expr::is_null(expr)),
        Truth::Unknown => None,
    }
}

// ============================================================================
// Pivot selection
// ============================================================================

#[derive(Debug, Clone)]
struct PivotCol {
    col: ColumnRef,
    alias: String,
    value: Option<String>,
}

fn has_id(meta: &TableMeta) -> bool {
    meta.column("id").is_some()
}

fn column_list(meta: &TableMeta) -> String {
    meta.columns
        .iter()
        .map(|c| c.name.clone())
        .collect::<Vec<_>>()
        .join(", ")
}

fn id_range(
    cx: &mut OracleCx<'_>,
    table: &str,
) -> Result<Option<(i64, i64)>, Report> {
    let sql = format!("SELECT MIN(id), MAX(id) FROM {table}");
    match cx.executor.query_row(cx.cancel, &sql) {
        Ok(Some(row)) => {
            let lo = row.first().and_then(|c| c.as_ref()).and_then(|v| v.parse().ok());
            let hi = row.get(1).and_then(|c| c.as_ref()).and_then(|v| v.parse().ok());
            Ok(lo.zip(hi))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(Report::from_exec_error(ORACLE, &e)),
    }
}

/// Fetches one concrete row of `meta`, preferring deterministic
/// `id >= ?` sampling over `ORDER BY RAND()`.
fn fetch_pivot_row(
    cx: &mut OracleCx<'_>,
    meta: &TableMeta,
    at_id: Option<i64>,
) -> Result<Option<Vec<Option<String>>>, Report> {
    let cols = column_list(meta);
    let sql = match at_id {
        Some(id) if has_id(meta) => format!(
            "SELECT {cols} FROM {} WHERE id >= {id} ORDER BY id LIMIT 1",
            meta.name
        ),
        _ => format!("SELECT {cols} FROM {} ORDER BY RAND() LIMIT 1", meta.name),
    };
    cx.executor
        .query_row(cx.cancel, &sql)
        .map_err(|e| Report::from_exec_error(ORACLE, &e))
}

// ============================================================================
// The oracle
// ============================================================================

#[derive(Debug, Default)]
pub struct Pqs;

struct Synthesized {
    query: SelectQuery,
    pivot: Vec<PivotCol>,
    arm: &'static str,
}

impl Oracle for Pqs {
    fn name(&self) -> &'static str {
        ORACLE
    }

    fn check(&mut self, cx: &mut OracleCx<'_>) -> Report {
        let adaptive = cx.config().adaptive.clone();
        let report = self.run(cx);

        // Arm reward: divergence pays best, a benign error still paid
        // attention, a skip wasted the invocation.
        if let Some(arm) = report
            .details
            .get("predicate_arm")
            .and_then(serde_json::Value::as_str)
        {
            let reward = if !report.ok {
                REWARD_BUG
            } else if report.error_reason().is_some() {
                REWARD_ERROR
            } else if report.skip_reason().is_some() {
                REWARD_SKIP
            } else {
                0.0
            };
            bandit(adaptive.pqs_bandit_window, adaptive.pqs_bandit_exploration)
                .record(arm, reward);
        }
        report
    }
}

impl Pqs {
    fn run(&mut self, cx: &mut OracleCx<'_>) -> Report {
        if !cx.state().has_base_tables() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_tables"));
        }
        let synthesized = match self.synthesize(cx) {
            Ok(Some(s)) => s,
            Ok(None) => return Report::skip(ORACLE, skip_reason(ORACLE, "no_pivot")),
            Err(report) => return report,
        };

        let query_sql = synthesized.query.sql_string();
        let mut matches: Vec<String> = Vec::new();
        let mut pivot_values = serde_json::Map::new();
        for p in &synthesized.pivot {
            if !p.col.ty.text_roundtrip_safe() {
                continue;
            }
            let clause = match &p.value {
                Some(v) => match p.col.ty.category() {
                    TypeCategory::Integer => format!("pqs.{} = {v}", p.alias),
                    _ => format!("pqs.{} = {}", p.alias, Literal::Str(v.clone())),
                },
                None => format!("pqs.{} IS NULL", p.alias),
            };
            matches.push(clause);
            pivot_values.insert(
                p.alias.clone(),
                match &p.value {
                    Some(v) => serde_json::Value::String(v.clone()),
                    None => serde_json::Value::Null,
                },
            );
        }
        if matches.is_empty() {
            return Report::skip(ORACLE, skip_reason(ORACLE, "no_matchable_columns"))
                .with_detail("predicate_arm", synthesized.arm);
        }
        let containment_sql = format!(
            "SELECT 1 FROM ({query_sql}) pqs WHERE {} LIMIT 1",
            matches.join(" AND ")
        );

        let found = match cx.executor.query_row(cx.cancel, &containment_sql) {
            Ok(row) => row.is_some(),
            Err(e) => {
                return Report::from_exec_error(ORACLE, &e)
                    .with_detail("predicate_arm", synthesized.arm);
            }
        };

        if found {
            return Report::pass(ORACLE)
                .with_sql(query_sql)
                .with_sql(containment_sql)
                .with_detail("predicate_arm", synthesized.arm);
        }
        Report::bug(
            ORACLE,
            "exists",
            "pivot_row_present",
            "pivot_row_missing",
            query_sql,
            containment_sql,
        )
        .with_detail("predicate_arm", synthesized.arm)
        .with_detail("pivot_values", serde_json::Value::Object(pivot_values))
    }

    fn synthesize(&mut self, cx: &mut OracleCx<'_>) -> Result<Option<Synthesized>, Report> {
        let cfg = cx.config().oracles.clone();
        let adaptive = cx.config().adaptive.clone();
        let features = cx.config().features.clone();

        let tables: Vec<TableMeta> = cx.state().base_tables().into_iter().cloned().collect();
        let with_id: Vec<&TableMeta> = tables.iter().filter(|t| has_id(t)).collect();

        let join_pivot = with_id.len() >= 2
            && cx.generator.rng().gen_bool(cfg.pqs_join_pivot_prob.clamp(0.0, 1.0));

        let mut env = PivotEnv::default();
        let mut pivot: Vec<PivotCol> = Vec::new();
        let mut query;

        if join_pivot {
            let a = with_id[cx.generator.rng().gen_range(0..with_id.len())].clone();
            let b = loop {
                let candidate = with_id[cx.generator.rng().gen_range(0..with_id.len())].clone();
                if candidate.name != a.name {
                    break candidate;
                }
            };
            let (Some((lo_a, hi_a)), Some((lo_b, hi_b))) =
                (id_range(cx, &a.name)?, id_range(cx, &b.name)?)
            else {
                return Ok(None);
            };
            let (lo, hi) = (lo_a.max(lo_b), hi_a.min(hi_b));
            if lo > hi {
                return Ok(None);
            }
            let at = cx.generator.rng().gen_range(lo..=hi);
            let (Some(row_a), Some(row_b)) = (
                fetch_pivot_row(cx, &a, Some(at))?,
                fetch_pivot_row(cx, &b, Some(at))?,
            ) else {
                return Ok(None);
            };

            query = SelectQuery::from_table(a.name.clone());
            let join_on = cx.generator.rng().gen_bool(cfg.pqs_join_on_prob.clamp(0.0, 1.0));
            let id_ty = a.column("id").map_or(DataType::BigInt, |c| c.ty);
            query.from.joins.push(Join {
                join_type: JoinType::Inner,
                natural: false,
                table: b.name.clone(),
                table_alias: None,
                table_query: None,
                on: join_on.then(|| {
                    Expr::binary(
                        BinaryOp::Eq,
                        Expr::Column(ColumnRef::new(a.name.clone(), "id", id_ty)),
                        Expr::Column(ColumnRef::new(b.name.clone(), "id", id_ty)),
                    )
                }),
                using: if join_on { Vec::new() } else { vec!["id".into()] },
            });
            for (i, (meta, row)) in [(&a, &row_a), (&b, &row_b)].into_iter().enumerate() {
                for (j, cm) in meta.columns.iter().enumerate() {
                    let col = ColumnRef::new(meta.name.clone(), cm.name.clone(), cm.ty);
                    let alias = format!("t{i}_{}", cm.name);
                    let value = row.get(j).cloned().flatten();
                    env.insert(&col, value.clone());
                    pivot.push(PivotCol { col: col.clone(), alias: alias.clone(), value });
                    query.items.push(SelectItem {
                        expr: Expr::Column(col),
                        alias,
                    });
                }
            }
            // A rewritten ON may carry an extra rectified conjunct; it
            // must still hold on the pivot pair.
            if join_on && cx.generator.rng().gen_bool(0.5) {
                let extra = pivot_conjunction(cx.generator.rng(), &pivot, 1);
                if let (Some(extra), Some(on)) =
                    (extra, query.from.joins[0].on.as_mut())
                {
                    let joined = Expr::and(on.clone(), extra);
                    *on = joined;
                }
            }
        } else {
            let Some(meta) = tables.choose(cx.generator.rng()).cloned() else {
                return Ok(None);
            };
            let at = if has_id(&meta) {
                match id_range(cx, &meta.name)? {
                    Some((lo, hi)) if lo <= hi => Some(cx.generator.rng().gen_range(lo..=hi)),
                    _ => None,
                }
            } else {
                None
            };
            let Some(row) = fetch_pivot_row(cx, &meta, at)? else {
                return Ok(None);
            };

            // Optionally address the table through a derived wrapper.
            let derive = features.derived_tables && cx.generator.rng().gen_bool(0.3);
            let qualifier = if derive { "d0".to_string() } else { meta.name.clone() };
            query = SelectQuery::default();
            if derive {
                let mut inner = SelectQuery::from_table(meta.name.clone());
                inner.items = meta
                    .columns
                    .iter()
                    .map(|c| SelectItem {
                        expr: Expr::Column(ColumnRef::new(meta.name.clone(), c.name.clone(), c.ty)),
                        alias: c.name.clone(),
                    })
                    .collect();
                query.from = FromClause {
                    base_table: "d0".into(),
                    base_alias: None,
                    base_query: Some(Box::new(inner)),
                    joins: Vec::new(),
                };
            } else {
                query.from = FromClause::table(meta.name.clone());
            }
            for (j, cm) in meta.columns.iter().enumerate() {
                let col = ColumnRef::new(qualifier.clone(), cm.name.clone(), cm.ty);
                let value = row.get(j).cloned().flatten();
                env.insert(&col, value.clone());
                pivot.push(PivotCol {
                    col: col.clone(),
                    alias: cm.name.clone(),
                    value,
                });
                query.items.push(SelectItem {
                    expr: Expr::Column(col),
                    alias: cm.name.clone(),
                });
            }
        }

        // Predicate arm via the bandit.
        let candidates = vec![
            ARM_RECTIFY.to_string(),
            ARM_SINGLE.to_string(),
            ARM_MULTI.to_string(),
        ];
        let arm = {
            let guard = bandit(adaptive.pqs_bandit_window, adaptive.pqs_bandit_exploration);
            guard
                .pick(cx.generator.rng(), &candidates, 1)
                .into_iter()
                .next()
                .unwrap_or_else(|| ARM_SINGLE.to_string())
        };
        let arm: &'static str = match arm.as_str() {
            ARM_RECTIFY => ARM_RECTIFY,
            ARM_MULTI => ARM_MULTI,
            _ => ARM_SINGLE,
        };

        let predicate = match arm {
            ARM_RECTIFY => {
                let scope = cx.generator.tables_for_query_scope(&query);
                let scope_refs: Vec<&TableMeta> = scope.iter().collect();
                let raw = cx.generator.generate_simple_predicate(
                    &scope_refs,
                    peridot_gen::PredicateLevel::Moderate,
                    2,
                );
                raw.and_then(|p| rectify(p, &env))
                    .or_else(|| pivot_conjunction(cx.generator.rng(), &pivot, 1))
            }
            ARM_SINGLE => pivot_conjunction(cx.generator.rng(), &pivot, 1),
            _ => pivot_conjunction(cx.generator.rng(), &pivot, cfg.pqs_max_pred_cols.max(2)),
        };
        let Some(mut predicate) = predicate else {
            return Ok(None);
        };

        // Optional subquery conjunct sampled from the pivot.
        if features.subqueries && cx.generator.rng().gen_bool(cfg.pqs_subquery_prob.clamp(0.0, 1.0))
        {
            if let Some(sub) = subquery_conjunct(cx, &pivot, features.quantified_subqueries) {
                predicate = Expr::and(predicate, sub);
            }
        }

        query.where_clause = Some(predicate);
        Ok(Some(Synthesized { query, pivot, arm }))
    }
}

fn literal_for(col: &ColumnRef, value: &str) -> Expr {
    match col.ty.category() {
        TypeCategory::Integer => value
            .parse::<i64>()
            .map(|v| Expr::lit(Literal::Int(v)))
            .unwrap_or_else(|_| Expr::lit(Literal::Str(value.to_string()))),
        _ => Expr::lit(Literal::Str(value.to_string())),
    }
}

/// `col = v AND ...` over up to `max_cols` pivot columns; floats are
/// excluded for round-trip safety, NULL cells become IS NULL.
fn pivot_conjunction(
    rng: &mut dyn rand::RngCore,
    pivot: &[PivotCol],
    max_cols: usize,
) -> Option<Expr> {
    let eligible: Vec<&PivotCol> = pivot
        .iter()
        .filter(|p| p.col.ty.text_roundtrip_safe())
        .collect();
    if eligible.is_empty() {
        return None;
    }
    let want = rng.gen_range(1..=max_cols.max(1)).min(eligible.len());
    let mut chosen: Vec<&PivotCol> = eligible.clone();
    chosen.shuffle(rng);
    chosen.truncate(want);

    let mut out: Option<Expr> = None;
    for p in chosen {
        let conjunct = match &p.value {
            Some(v) => Expr::binary(
                BinaryOp::Eq,
                Expr::Column(p.col.clone()),
                literal_for(&p.col, v),
            ),
            None => Expr::is_null(Expr::Column(p.col.clone())),
        };
        out = Some(match out.take() {
            Some(acc) => Expr::and(acc, conjunct),
            None => conjunct,
        });
    }
    out
}

/// An EXISTS / IN / `= ANY` conjunct guaranteed true for the pivot.
fn subquery_conjunct(
    cx: &mut OracleCx<'_>,
    pivot: &[PivotCol],
    quantified: bool,
) -> Option<Expr> {
    // The inner query names the anchor's table directly, so pivots
    // addressed through a derived wrapper are not usable here.
    let anchor = pivot.iter().find(|p| {
        p.value.is_some()
            && p.col.ty.text_roundtrip_safe()
            && cx.state().table_by_name(&p.col.table).is_some()
    })?;
    let value = literal_for(&anchor.col, anchor.value.as_deref()?);
    let source_table = anchor.col.table.clone();

    let mut inner = SelectQuery::from_table(source_table.clone());
    inner.items = vec![SelectItem {
        expr: Expr::Column(anchor.col.clone()),
        alias: "sq0".into(),
    }];
    inner.where_clause = Some(Expr::binary(
        BinaryOp::Eq,
        Expr::Column(anchor.col.clone()),
        value.clone(),
    ));

    let choice = cx.generator.rng().gen_range(0..3);
    Some(match choice {
        0 => Expr::Exists {
            query: Box::new(inner),
            negated: false,
        },
        1 => Expr::In {
            left: Box::new(Expr::Column(anchor.col.clone())),
            list: vec![Expr::Subquery(Box::new(inner))],
            negated: false,
        },
        _ if quantified => {
            // The inner query only returns rows equal to the pivot's
            // value, so both = ANY and = ALL hold on the pivot.
            let quantifier = if cx.generator.rng().gen_bool(0.5) {
                peridot_ast::Quantifier::Any
            } else {
                peridot_ast::Quantifier::All
            };
            Expr::CompareSubquery {
                left: Box::new(Expr::Column(anchor.col.clone())),
                op: BinaryOp::Eq,
                quantifier,
                query: Box::new(inner),
            }
        }
        _ => Expr::Exists {
            query: Box::new(inner),
            negated: false,
        },
    })
}
