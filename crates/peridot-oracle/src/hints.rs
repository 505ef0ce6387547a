//! Hint construction for DQP.
//!
//! Hint strings are exact SQL fragments destined for a `/*+ ... */`
//! block; nothing here may ever emit `*/`.

use peridot_ast::SelectQuery;

// ============================================================================
// Catalog
// ============================================================================

/// Join hints taking the full table list as arguments.
pub(crate) const JOIN_HINTS_TABLES: &[&str] = &[
    "HASH_JOIN",
    "NO_HASH_JOIN",
    "MERGE_JOIN",
    "INL_JOIN",
    "INL_HASH_JOIN",
    "INL_MERGE_JOIN",
    "LEADING",
];

/// Join hints taking a single table argument.
pub(crate) const JOIN_HINTS_SINGLE: &[&str] = &["HASH_JOIN_BUILD", "HASH_JOIN_PROBE"];

/// Join hints without arguments; emitted with `()`.
pub(crate) const JOIN_HINTS_NO_ARG: &[&str] = &["STRAIGHT_JOIN"];

pub(crate) const AGG_HINTS: &[&str] = &["HASH_AGG", "STREAM_AGG", "AGG_TO_COP"];

struct SetVarToggle {
    name: &'static str,
    on: &'static str,
    off: &'static str,
    /// Requires TiFlash replicas.
    mpp: bool,
}

const SET_VAR_TOGGLES: &[SetVarToggle] = &[
    SetVarToggle {
        name: "tidb_opt_enable_hash_join",
        on: "ON",
        off: "OFF",
        mpp: false,
    },
    SetVarToggle {
        name: "tidb_allow_mpp",
        on: "ON",
        off: "OFF",
        mpp: true,
    },
    SetVarToggle {
        name: "tidb_enforce_mpp",
        on: "ON",
        off: "OFF",
        mpp: true,
    },
    SetVarToggle {
        name: "tidb_opt_insubq_to_join_and_agg",
        on: "ON",
        off: "OFF",
        mpp: false,
    },
    SetVarToggle {
        name: "tidb_opt_enable_semi_join_rewrite",
        on: "ON",
        off: "OFF",
        mpp: false,
    },
    SetVarToggle {
        name: "tidb_opt_enable_non_eval_scalar_subquery",
        on: "ON",
        off: "OFF",
        mpp: false,
    },
    SetVarToggle {
        name: "tidb_opt_force_inline_cte",
        on: "ON",
        off: "OFF",
        mpp: false,
    },
    SetVarToggle {
        name: "tidb_partition_prune_mode",
        on: "dynamic",
        off: "static",
        mpp: false,
    },
    SetVarToggle {
        name: "tidb_opt_derive_topn",
        on: "ON",
        off: "OFF",
        mpp: false,
    },
];

const FIX_CONTROL_IDS: &[u32] = &[44262, 44389, 45132];

pub(crate) fn set_var(name: &str, value: &str) -> String {
    format!("SET_VAR({name}={value})")
}

/// The SET_VAR hint pool for a query over `table_count` factors.
/// MPP toggles are emitted only when `mpp_allowed`.
pub(crate) fn set_var_hints(table_count: usize, mpp_allowed: bool) -> Vec<String> {
    let mut out = Vec::new();
    for toggle in SET_VAR_TOGGLES {
        if toggle.mpp && !mpp_allowed {
            continue;
        }
        out.push(set_var(toggle.name, toggle.on));
        out.push(set_var(toggle.name, toggle.off));
    }
    for id in FIX_CONTROL_IDS {
        out.push(set_var("tidb_opt_fix_control", &format!("'{id}:ON'")));
        out.push(set_var("tidb_opt_fix_control", &format!("'{id}:OFF'")));
    }
    // Join-reorder threshold bracketing the actual factor count.
    for delta in [-1_i64, 0, 1] {
        let n = (table_count as i64 + delta).max(0);
        out.push(set_var("tidb_opt_join_reorder_threshold", &n.to_string()));
    }
    out
}

/// The on/off partner(s) of a SET_VAR toggle. `tidb_enforce_mpp=ON`
/// additionally pairs with `tidb_allow_mpp=OFF`: probing the
/// inconsistent enforce-without-allow server state is intentional.
pub(crate) fn set_var_partners(hint: &str) -> Vec<String> {
    let Some(inner) = hint
        .strip_prefix("SET_VAR(")
        .and_then(|s| s.strip_suffix(')'))
    else {
        return Vec::new();
    };
    let Some((name, value)) = inner.split_once('=') else {
        return Vec::new();
    };
    let mut out = Vec::new();
    if let Some(toggle) = SET_VAR_TOGGLES.iter().find(|t| t.name == name) {
        if value == toggle.on {
            out.push(set_var(name, toggle.off));
        } else if value == toggle.off {
            out.push(set_var(name, toggle.on));
        }
    }
    if name == "tidb_enforce_mpp" && value == "ON" {
        out.push(set_var("tidb_allow_mpp", "OFF"));
    }
    out
}

pub(crate) fn is_set_var_hint(hint: &str) -> bool {
    hint.starts_with("SET_VAR(")
}

/// Completes on/off pairs among picked SET_VAR hints. Partners are only
/// added while they exist in the pool and the expanded budget (twice
/// the pick budget) is not exhausted.
pub(crate) fn complete_set_var_pairs(picked: &mut Vec<String>, pool: &[String], pick_budget: usize) {
    let cap = pick_budget.max(1) * 2;
    let mut i = 0;
    while i < picked.len() && picked.len() < cap {
        for partner in set_var_partners(&picked[i]) {
            if picked.len() >= cap {
                break;
            }
            if !picked.contains(&partner) && pool.contains(&partner) {
                picked.push(partner);
            }
        }
        i += 1;
    }
}

/// Cross product of SET_VAR and base hints, capped.
pub(crate) fn combine_hints(set_vars: &[String], bases: &[String], cap: usize) -> Vec<String> {
    let mut out = Vec::new();
    for sv in set_vars {
        for base in bases {
            if out.len() >= cap {
                return out;
            }
            out.push(format!("{sv} {base}"));
        }
    }
    out
}

/// Renders a base hint with its table arguments.
pub(crate) fn hint_with_tables(name: &str, tables: &[&str]) -> String {
    format!("{name}({})", tables.join(", "))
}

/// The base (non-SET_VAR) hint pool for a query.
pub(crate) fn base_hints(
    query: &SelectQuery,
    has_aggregate: bool,
    semi_join: bool,
    correlated: bool,
    indexed_tables: &[&str],
) -> Vec<String> {
    let mut out = Vec::new();
    let tables = query.concrete_from_tables();
    if query.has_joins() && !tables.is_empty() {
        for name in JOIN_HINTS_TABLES {
            out.push(hint_with_tables(name, &tables));
        }
        for name in JOIN_HINTS_SINGLE {
            out.push(hint_with_tables(name, &tables[..1]));
        }
        for name in JOIN_HINTS_NO_ARG {
            out.push(format!("{name}()"));
        }
    }
    if has_aggregate {
        for name in AGG_HINTS {
            out.push(format!("{name}()"));
        }
    }
    if semi_join {
        out.push("SEMI_JOIN_REWRITE()".to_string());
    }
    if correlated {
        out.push("NO_DECORRELATE()".to_string());
    }
    for t in indexed_tables {
        out.push(format!("USE_INDEX({t})"));
        out.push(format!("USE_INDEX_MERGE({t})"));
    }
    out
}

// ============================================================================
// User hints
// ============================================================================

/// Classifies one externally supplied hint: anything containing `*/`
/// is rejected outright, a bare `name=value` is wrapped into SET_VAR,
/// a malformed SET_VAR body is dropped, anything else passes through.
pub(crate) fn classify_user_hint(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains("*/") {
        return None;
    }
    if let Some(body) = trimmed
        .strip_prefix("SET_VAR(")
        .and_then(|s| s.strip_suffix(')'))
    {
        if body.contains('=') {
            return Some(trimmed.to_string());
        }
        return None;
    }
    if !trimmed.contains('(') && trimmed.matches('=').count() == 1 {
        return Some(format!("SET_VAR({trimmed})"));
    }
    Some(trimmed.to_string())
}

// ============================================================================
// SELECT scanner and injection
// ============================================================================

/// Byte offsets just past each top-level `SELECT` keyword: quoted
/// strings are skipped and anything inside parentheses (subqueries,
/// CTE bodies) is ignored.
pub(crate) fn top_level_select_offsets(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut offsets = Vec::new();
    let mut depth = 0_i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\\' && quote != b'`' {
                        i += 2;
                        continue;
                    }
                    if bytes[i] == quote {
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'S' | b's' if depth == 0 => {
                let end = i + 6;
                let boundary_before =
                    i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_');
                let boundary_after = end >= bytes.len()
                    || !(bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_');
                if boundary_before
                    && boundary_after
                    && end <= bytes.len()
                    && bytes[i..end].eq_ignore_ascii_case(b"SELECT")
                {
                    offsets.push(end);
                    i = end;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    offsets
}

/// Injects `/*+ hint */` after the first top-level SELECT. `None` when
/// the statement has no hintable SELECT or the hint is unsafe.
pub(crate) fn inject_hint(sql: &str, hint: &str) -> Option<String> {
    if hint.contains("*/") {
        return None;
    }
    let offset = top_level_select_offsets(sql).into_iter().next()?;
    let mut out = String::with_capacity(sql.len() + hint.len() + 8);
    out.push_str(&sql[..offset]);
    out.push_str(" /*+ ");
    out.push_str(hint);
    out.push_str(" */");
    out.push_str(&sql[offset..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn scanner_skips_subqueries_and_cte_bodies() {
        let sql = "WITH w AS (SELECT 1) SELECT a FROM (SELECT b FROM t) d";
        let offsets = top_level_select_offsets(sql);
        assert_eq!(offsets.len(), 1);
        assert_eq!(&sql[offsets[0] - 6..offsets[0]], "SELECT");
        assert!(offsets[0] > sql.find(')').unwrap());
    }

    #[test]
    fn scanner_skips_string_literals() {
        let sql = "SELECT 'select nested' FROM t";
        assert_eq!(top_level_select_offsets(sql).len(), 1);
    }

    #[test]
    fn injection_lands_after_top_level_select() {
        let sql = "WITH w AS (SELECT 1) SELECT a FROM t";
        let hinted = inject_hint(sql, "HASH_JOIN(t0, t1)").unwrap();
        assert_eq!(
            hinted,
            "WITH w AS (SELECT 1) SELECT /*+ HASH_JOIN(t0, t1) */ a FROM t"
        );
    }

    #[test]
    fn injection_rejects_comment_closers() {
        assert!(inject_hint("SELECT 1", "X */ DROP TABLE t").is_none());
    }

    #[test_case("HASH_JOIN(t0)", Some("HASH_JOIN(t0)"))]
    #[test_case("tidb_allow_mpp=OFF", Some("SET_VAR(tidb_allow_mpp=OFF)"))]
    #[test_case("SET_VAR(tidb_allow_mpp=OFF)", Some("SET_VAR(tidb_allow_mpp=OFF)"))]
    #[test_case("SET_VAR(garbage)", None)]
    #[test_case("evil */ injection", None)]
    #[test_case("", None)]
    fn user_hint_classification(raw: &str, want: Option<&str>) {
        assert_eq!(classify_user_hint(raw).as_deref(), want);
    }

    #[test]
    fn mpp_toggles_gated() {
        let with_mpp = set_var_hints(2, true);
        let without = set_var_hints(2, false);
        assert!(with_mpp.iter().any(|h| h.contains("tidb_allow_mpp")));
        assert!(!without.iter().any(|h| h.contains("tidb_allow_mpp")));
        assert!(without.iter().any(|h| h.contains("tidb_opt_enable_hash_join")));
    }

    #[test]
    fn enforce_mpp_pairs_with_allow_off() {
        let partners = set_var_partners("SET_VAR(tidb_enforce_mpp=ON)");
        assert!(partners.contains(&"SET_VAR(tidb_enforce_mpp=OFF)".to_string()));
        assert!(partners.contains(&"SET_VAR(tidb_allow_mpp=OFF)".to_string()));
    }

    #[test]
    fn plain_toggle_pairs_flip() {
        let partners = set_var_partners("SET_VAR(tidb_partition_prune_mode=dynamic)");
        assert_eq!(
            partners,
            vec!["SET_VAR(tidb_partition_prune_mode=static)".to_string()]
        );
    }

    #[test]
    fn pair_completion_adds_partner_within_budget() {
        let pool = set_var_hints(2, false);
        let mut picked = vec![set_var("tidb_opt_force_inline_cte", "ON")];
        complete_set_var_pairs(&mut picked, &pool, 2);
        assert!(picked.contains(&set_var("tidb_opt_force_inline_cte", "OFF")));
    }

    #[test]
    fn pair_completion_respects_cap() {
        let pool = set_var_hints(2, true);
        let mut picked = vec![
            set_var("tidb_opt_force_inline_cte", "ON"),
            set_var("tidb_allow_mpp", "ON"),
        ];
        complete_set_var_pairs(&mut picked, &pool, 1);
        assert!(picked.len() <= 2, "cap is twice the pick budget: {picked:?}");
    }

    #[test]
    fn pair_completion_skips_partners_outside_pool() {
        // MPP partners are absent from a non-MPP pool.
        let pool = set_var_hints(2, false);
        let mut picked = vec![set_var("tidb_enforce_mpp", "ON")];
        complete_set_var_pairs(&mut picked, &pool, 4);
        assert_eq!(picked.len(), 1);
    }

    #[test]
    fn combined_hints_capped() {
        let set_vars = vec![set_var("a", "ON"), set_var("b", "ON")];
        let bases = vec!["HASH_JOIN(t0)".to_string(), "STRAIGHT_JOIN()".to_string()];
        let combined = combine_hints(&set_vars, &bases, 3);
        assert_eq!(combined.len(), 3);
        assert_eq!(combined[0], "SET_VAR(a=ON) HASH_JOIN(t0)");
    }

    #[test]
    fn join_reorder_threshold_brackets_table_count() {
        let hints = set_var_hints(3, false);
        for n in [2, 3, 4] {
            assert!(hints.contains(&set_var("tidb_opt_join_reorder_threshold", &n.to_string())));
        }
    }
}
