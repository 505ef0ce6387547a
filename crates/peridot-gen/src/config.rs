//! Run configuration read by the oracles.
//!
//! Loading (CLI flags, TOML files) happens elsewhere; these structs are
//! the contract. Every field has a serde default so partial configs
//! deserialize cleanly.

use serde::{Deserialize, Serialize};

/// How adventurous generated predicates may be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateLevel {
    /// Conjunctions of simple comparisons only.
    Strict,
    /// Adds disjunction.
    #[default]
    Moderate,
    /// Adds NOT and IS [NOT] NULL.
    Loose,
}

/// Top-level fuzzer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    pub oracles: OracleConfig,
    pub features: Features,
    pub adaptive: Adaptive,
}

/// Per-oracle knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub predicate_level: PredicateLevel,

    /// Dispatch weights by oracle name; unlisted oracles weigh 1,
    /// weight 0 disables. Empty means uniform.
    pub weights: std::collections::BTreeMap<String, u32>,

    /// Cap on deterministic ORDER BY columns TLP adds to the base query.
    pub tlp_max_order_by_cols: usize,

    /// CERT skips when the unrestricted estimate is below this.
    pub cert_min_base_rows: f64,
    /// Allowed relative growth of estRows under an added AND filter.
    pub cert_tolerance: f64,
    /// Attempts at finding a scope-valid restrictive predicate.
    pub cert_restrict_tries: usize,

    /// DQP: base (join/agg/index) hints picked per invocation.
    pub dqp_base_hint_pick: usize,
    /// DQP: SET_VAR hints picked per invocation.
    pub dqp_set_var_hint_pick: usize,
    /// DQP: cap on combined SET_VAR + base hint strings.
    pub dqp_combined_hint_max: usize,
    /// Extra user-supplied hints, classified and merged into the pool.
    pub dqp_user_hints: Vec<String>,

    /// EET: retries of the generate-and-transform path.
    pub eet_transform_retry_max: usize,
    /// EET: complexity guard on table factors (CTE bodies included).
    pub eet_max_table_factors: usize,
    /// EET: rewrite-kind weights (boolean, numeric, string, date).
    pub eet_weight_double_not: u32,
    pub eet_weight_and_true: u32,
    pub eet_weight_or_false: u32,
    pub eet_weight_numeric_identity: u32,
    pub eet_weight_string_identity: u32,
    pub eet_weight_date_identity: u32,

    /// CODD: cap on CASE arms in the dependent branch.
    pub codd_case_when_max: usize,
    /// CODD: LIMIT on the sampling probe.
    pub codd_sample_limit: usize,

    /// PQS: probability of a two-table join pivot.
    pub pqs_join_pivot_prob: f64,
    /// PQS: probability of rewriting USING(id) into an explicit ON.
    pub pqs_join_on_prob: f64,
    /// PQS: probability of AND-ing a subquery predicate.
    pub pqs_subquery_prob: f64,
    /// PQS: max columns drawn into a pivot conjunction.
    pub pqs_max_pred_cols: usize,

    /// Impo: row-count precheck ceiling.
    pub impo_max_rows: u64,
    /// Impo: mutation units examined per seed.
    pub impo_mutation_budget: usize,
    /// Impo: deadline for the mutation-enumeration loop.
    pub impo_timeout_ms: u64,

    /// GroundTruth: per-table fetch ceiling for the in-process join.
    pub truth_max_rows: usize,
    /// GroundTruth: enforce dimension/key naming conventions.
    pub truth_dsg_mode: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            predicate_level: PredicateLevel::default(),
            weights: std::collections::BTreeMap::new(),
            tlp_max_order_by_cols: 3,
            cert_min_base_rows: 10.0,
            cert_tolerance: 0.1,
            cert_restrict_tries: 8,
            dqp_base_hint_pick: 4,
            dqp_set_var_hint_pick: 4,
            dqp_combined_hint_max: 6,
            dqp_user_hints: Vec::new(),
            eet_transform_retry_max: 3,
            eet_max_table_factors: 5,
            eet_weight_double_not: 3,
            eet_weight_and_true: 3,
            eet_weight_or_false: 3,
            eet_weight_numeric_identity: 2,
            eet_weight_string_identity: 2,
            eet_weight_date_identity: 1,
            codd_case_when_max: 2,
            codd_sample_limit: 50,
            pqs_join_pivot_prob: 0.3,
            pqs_join_on_prob: 0.5,
            pqs_subquery_prob: 0.2,
            pqs_max_pred_cols: 3,
            impo_max_rows: 1_000,
            impo_mutation_budget: 32,
            impo_timeout_ms: 5_000,
            truth_max_rows: 10_000,
            truth_dsg_mode: false,
        }
    }
}

/// Generator feature toggles plus the deployment facts oracles gate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub cte: bool,
    pub views: bool,
    pub derived_tables: bool,
    pub set_ops: bool,
    pub natural_joins: bool,
    pub aggregates: bool,
    pub group_by: bool,
    pub having: bool,
    pub distinct: bool,
    pub order_by: bool,
    pub limit: bool,
    pub window: bool,
    pub subqueries: bool,
    pub not_exists: bool,
    pub not_in: bool,
    pub quantified_subqueries: bool,
    /// Whether any table under test carries a TiFlash replica.
    pub tiflash_replica: bool,
    /// Operator opt-out of MPP probing even with replicas present.
    pub disable_mpp: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            cte: true,
            views: true,
            derived_tables: true,
            set_ops: true,
            natural_joins: true,
            aggregates: true,
            group_by: true,
            having: true,
            distinct: true,
            order_by: true,
            limit: true,
            window: true,
            subqueries: true,
            not_exists: true,
            not_in: true,
            quantified_subqueries: false,
            tiflash_replica: false,
            disable_mpp: false,
        }
    }
}

/// Bandit tuning shared by DQP hint selection and PQS arm selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Adaptive {
    /// Sliding-window length; 0 means unbounded history.
    pub hint_bandit_window: usize,
    /// UCB1 exploration constant.
    pub hint_bandit_exploration: f64,
    pub pqs_bandit_window: usize,
    pub pqs_bandit_exploration: f64,
}

impl Default for Adaptive {
    fn default() -> Self {
        Self {
            hint_bandit_window: 64,
            hint_bandit_exploration: std::f64::consts::SQRT_2,
            pqs_bandit_window: 64,
            pqs_bandit_exploration: std::f64::consts::SQRT_2,
        }
    }
}
