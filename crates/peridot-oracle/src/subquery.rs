//! IN/EXISTS feature detection over raw SQL.
//!
//! Oracles and report routing ask whether a statement uses IN-subquery
//! shapes. Parsing every statement would dominate the hot path, so a
//! lexical pre-scan (string- and comment-aware) gates the parser, and
//! results are memoized in a bounded LRU keyed on the raw SQL.

use std::num::NonZeroUsize;
use std::sync::{LazyLock, Mutex};

use lru::LruCache;
use sqlparser::ast::{
    Expr, Join, JoinConstraint, JoinOperator, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

const CACHE_ENTRIES: usize = 256;

/// Which membership/existence shapes a statement uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubqueryFeatures {
    pub has_in_subquery: bool,
    pub has_not_in_subquery: bool,
    pub has_in_list: bool,
    pub has_not_in_list: bool,
    pub has_exists: bool,
    pub has_not_exists: bool,
}

impl SubqueryFeatures {
    pub fn any(&self) -> bool {
        self.has_in_subquery
            || self.has_not_in_subquery
            || self.has_in_list
            || self.has_not_in_list
            || self.has_exists
            || self.has_not_exists
    }
}

static CACHE: LazyLock<Mutex<LruCache<String, SubqueryFeatures>>> = LazyLock::new(|| {
    let cap = NonZeroUsize::new(CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(cap))
});

/// Detects IN/EXISTS features in `sql`, memoized.
pub fn detect_subquery_features(sql: &str) -> SubqueryFeatures {
    if let Ok(mut cache) = CACHE.lock() {
        if let Some(hit) = cache.get(sql) {
            return *hit;
        }
    }
    let features = detect_uncached(sql);
    if let Ok(mut cache) = CACHE.lock() {
        cache.put(sql.to_string(), features);
    }
    features
}

fn detect_uncached(sql: &str) -> SubqueryFeatures {
    if !prescan_may_match(sql) {
        return SubqueryFeatures::default();
    }
    let dialect = MySqlDialect {};
    let Ok(statements) = Parser::parse_sql(&dialect, sql) else {
        return SubqueryFeatures::default();
    };
    let mut features = SubqueryFeatures::default();
    for stmt in &statements {
        if let Statement::Query(q) = stmt {
            walk_query(q, &mut features);
        }
    }
    features
}

/// Cheap token scan skipping single-quoted strings, line comments and
/// block comments. Only statements containing an `IN` or `EXISTS`
/// token reach the parser.
fn prescan_may_match(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut i = 0;
    let mut token = String::new();
    let mut found = false;
    let mut flush = |token: &mut String, found: &mut bool| {
        if token.eq_ignore_ascii_case("in") || token.eq_ignore_ascii_case("exists") {
            *found = true;
        }
        token.clear();
    };
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\'' => {
                flush(&mut token, &mut found);
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\\' {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == b'\'' {
                        if bytes.get(i + 1) == Some(&b'\'') {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                flush(&mut token, &mut found);
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'#' => {
                flush(&mut token, &mut found);
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                flush(&mut token, &mut found);
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            c if c.is_ascii_alphanumeric() || c == b'_' => token.push(c as char),
            _ => flush(&mut token, &mut found),
        }
        if found {
            return true;
        }
        i += 1;
    }
    flush(&mut token, &mut found);
    found
}

fn walk_query(query: &Query, features: &mut SubqueryFeatures) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            walk_query(&cte.query, features);
        }
    }
    walk_set_expr(&query.body, features);
}

fn walk_set_expr(body: &SetExpr, features: &mut SubqueryFeatures) {
    match body {
        SetExpr::Select(select) => walk_select(select, features),
        SetExpr::Query(q) => walk_query(q, features),
        SetExpr::SetOperation { left, right, .. } => {
            walk_set_expr(left, features);
            walk_set_expr(right, features);
        }
        _ => {}
    }
}

fn walk_select(select: &Select, features: &mut SubqueryFeatures) {
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(e) | SelectItem::ExprWithAlias { expr: e, .. } => {
                walk_expr(e, features);
            }
            _ => {}
        }
    }
    for twj in &select.from {
        walk_table_factor(&twj.relation, features);
        for join in &twj.joins {
            walk_join(join, features);
        }
    }
    if let Some(selection) = &select.selection {
        walk_expr(selection, features);
    }
    if let Some(having) = &select.having {
        walk_expr(having, features);
    }
}

fn walk_table_factor(factor: &TableFactor, features: &mut SubqueryFeatures) {
    if let TableFactor::Derived { subquery, .. } = factor {
        walk_query(subquery, features);
    }
}

fn walk_join(join: &Join, features: &mut SubqueryFeatures) {
    walk_table_factor(&join.relation, features);
    let constraint = match &join.join_operator {
        JoinOperator::Inner(c)
        | JoinOperator::LeftOuter(c)
        | JoinOperator::RightOuter(c)
        | JoinOperator::FullOuter(c) => Some(c),
        _ => None,
    };
    if let Some(JoinConstraint::On(expr)) = constraint {
        walk_expr(expr, features);
    }
}

fn walk_expr(expr: &Expr, features: &mut SubqueryFeatures) {
    match expr {
        Expr::InSubquery {
            expr,
            subquery,
            negated,
        } => {
            if *negated {
                features.has_not_in_subquery = true;
            } else {
                features.has_in_subquery = true;
            }
            walk_expr(expr, features);
            walk_query(subquery, features);
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            if *negated {
                features.has_not_in_list = true;
            } else {
                features.has_in_list = true;
            }
            walk_expr(expr, features);
            for item in list {
                walk_expr(item, features);
            }
        }
        Expr::Exists { subquery, negated } => {
            if *negated {
                features.has_not_exists = true;
            } else {
                features.has_exists = true;
            }
            walk_query(subquery, features);
        }
        Expr::Subquery(q) => walk_query(q, features),
        Expr::Nested(e) => walk_expr(e, features),
        Expr::BinaryOp { left, right, .. } => {
            walk_expr(left, features);
            walk_expr(right, features);
        }
        Expr::UnaryOp { expr, .. } => walk_expr(expr, features),
        Expr::IsNull(e) | Expr::IsNotNull(e) => walk_expr(e, features),
        Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr(expr, features);
            walk_expr(low, features);
            walk_expr(high, features);
        }
        _ => {}
    }
}
