//! The common oracle result type.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// GroundTruth's extra payload describing the in-process evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruthInfo {
    pub enabled: bool,
    pub mismatch: bool,
    /// Chain signature, e.g. `t0->INNER:t1->LEFT:t2`.
    pub join_sig: String,
    pub row_count: u64,
}

/// Formats the canonical `<oracle>:<reason>` skip string.
pub fn skip_reason(oracle: &str, reason: &str) -> String {
    format!("{oracle}:{reason}")
}

/// Outcome of one oracle invocation.
///
/// Three shapes, per the engine's result contract:
///
/// - pass: `ok = true`, no `skip_reason` detail;
/// - benign skip: `ok = true` plus a `skip_reason` (or `error_reason`)
///   detail;
/// - witnessed bug: `ok = false`, with `replay_kind`, both replay SQLs
///   and at least two entries in `sql`.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub ok: bool,
    pub oracle: &'static str,
    /// Every statement the oracle issued, in order.
    pub sql: Vec<String>,
    pub expected: String,
    pub actual: String,
    pub details: BTreeMap<String, Value>,
    pub metrics: BTreeMap<String, i64>,
    pub truth: Option<TruthInfo>,
    pub err: Option<String>,
}

impl Report {
    fn empty(oracle: &'static str) -> Self {
        Self {
            ok: true,
            oracle,
            sql: Vec::new(),
            expected: String::new(),
            actual: String::new(),
            details: BTreeMap::new(),
            metrics: BTreeMap::new(),
            truth: None,
            err: None,
        }
    }

    /// The property held.
    pub fn pass(oracle: &'static str) -> Self {
        Self::empty(oracle)
    }

    /// Preconditions unmet; `reason` must already carry the oracle
    /// prefix (see [`skip_reason`]).
    pub fn skip(oracle: &'static str, reason: impl Into<String>) -> Self {
        let mut r = Self::empty(oracle);
        r.details
            .insert("skip_reason".into(), Value::String(reason.into()));
        r
    }

    /// A non-fatal SQL error: the invocation is abandoned without
    /// judgement.
    pub fn sql_error(oracle: &'static str, reason: impl Into<String>) -> Self {
        let mut r = Self::empty(oracle);
        r.details
            .insert("error_reason".into(), Value::String(reason.into()));
        r
    }

    /// A witnessed divergence. The constructor takes everything the
    /// bug contract requires so no `ok = false` report can be built
    /// without replay material.
    pub fn bug(
        oracle: &'static str,
        replay_kind: &str,
        expected: impl Into<String>,
        actual: impl Into<String>,
        expected_sql: impl Into<String>,
        actual_sql: impl Into<String>,
    ) -> Self {
        let expected_sql = expected_sql.into();
        let actual_sql = actual_sql.into();
        let mut r = Self::empty(oracle);
        r.ok = false;
        r.expected = expected.into();
        r.actual = actual.into();
        r.details
            .insert("replay_kind".into(), Value::String(replay_kind.into()));
        r.details.insert(
            "replay_expected_sql".into(),
            Value::String(expected_sql.clone()),
        );
        r.details
            .insert("replay_actual_sql".into(), Value::String(actual_sql.clone()));
        r.sql.push(expected_sql);
        r.sql.push(actual_sql);
        r
    }

    // ------------------------------------------------------------------
    // Builder-style extras
    // ------------------------------------------------------------------

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql.push(sql.into());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_metric(mut self, key: &str, value: i64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }

    pub fn with_truth(mut self, truth: TruthInfo) -> Self {
        self.truth = Some(truth);
        self
    }

    /// Attaches `EXPLAIN` text (or the error that replaced it) for both
    /// replay statements.
    pub fn with_explains(
        mut self,
        expected: Result<String, String>,
        actual: Result<String, String>,
    ) -> Self {
        match expected {
            Ok(text) => self.details.insert("explain_expected".into(), Value::String(text)),
            Err(e) => self
                .details
                .insert("explain_expected_error".into(), Value::String(e)),
        };
        match actual {
            Ok(text) => self.details.insert("explain_actual".into(), Value::String(text)),
            Err(e) => self
                .details
                .insert("explain_actual_error".into(), Value::String(e)),
        };
        self
    }

    /// Folds an executor error into a report per the engine taxonomy:
    /// timeout/cancel and whitelisted SQL errors become benign skips,
    /// anything else an OK-with-error-reason.
    pub fn from_exec_error(oracle: &'static str, err: &peridot_exec::ExecError) -> Self {
        let reason = peridot_exec::sql_error_reason(oracle, err);
        if err.is_timeout() || peridot_exec::is_whitelisted_sql_error(err) {
            Self::skip(oracle, reason)
        } else {
            Self::sql_error(oracle, reason)
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn skip_reason(&self) -> Option<&str> {
        self.details.get("skip_reason").and_then(Value::as_str)
    }

    pub fn error_reason(&self) -> Option<&str> {
        self.details.get("error_reason").and_then(Value::as_str)
    }

    pub fn replay_kind(&self) -> Option<&str> {
        self.details.get("replay_kind").and_then(Value::as_str)
    }

    pub fn is_skip(&self) -> bool {
        self.ok && (self.skip_reason().is_some() || self.error_reason().is_some())
    }
}
