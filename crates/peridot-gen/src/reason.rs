//! Builder failure reasons.
//!
//! The generator reports why a build could not satisfy its constraints
//! through a closed set of reasons. Oracles translate these into skip
//! reasons; the mapping is part of the observable surface of a fuzzing
//! run, so the set stays closed and any free-form detail rides along
//! separately.

use thiserror::Error;

/// Why the builder declined to produce a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildReason {
    /// The schema holds no tables at all.
    NoTables,
    /// Only views exist; a base table was required.
    NoBaseTables,
    /// No column satisfied the type/index requirements.
    NoEligibleColumns,
    /// The generated predicate failed the oracle's guard.
    PredicateRejected,
    /// Could not assemble the requested join width.
    JoinScopeExhausted,
    /// A required feature is disabled in the run configuration.
    FeatureDisabled,
    /// The builder gave up after its retry budget.
    MaxTriesExceeded,
    /// Generator-specific detail that has no closed variant.
    Other(String),
}

impl BuildReason {
    /// Stable snake_case token. `Other` payloads are sanitized so the
    /// token stays safe inside a `<oracle>:<reason>` skip string.
    pub fn as_token(&self) -> String {
        match self {
            BuildReason::NoTables => "no_tables".into(),
            BuildReason::NoBaseTables => "no_base_tables".into(),
            BuildReason::NoEligibleColumns => "no_eligible_columns".into(),
            BuildReason::PredicateRejected => "predicate_rejected".into(),
            BuildReason::JoinScopeExhausted => "join_scope_exhausted".into(),
            BuildReason::FeatureDisabled => "feature_disabled".into(),
            BuildReason::MaxTriesExceeded => "max_tries_exceeded".into(),
            BuildReason::Other(s) => sanitize_reason(s),
        }
    }
}

/// Replaces `:` and spaces so a free-form reason cannot break the
/// `<oracle>:<reason>` grammar, and lowercases the rest.
pub(crate) fn sanitize_reason(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            ':' | ' ' => out.push('_'),
            c if c.is_ascii_alphanumeric() || c == '_' => out.push(c.to_ascii_lowercase()),
            _ => out.push('_'),
        }
    }
    if out.is_empty() {
        out.push_str("unknown");
    }
    out
}

/// A failed build: the reason plus how many attempts were burned.
#[derive(Debug, Clone, Error)]
#[error("query build failed after {attempts} attempts: {}", .reason.as_token())]
pub struct BuildError {
    pub reason: BuildReason,
    pub attempts: u32,
}

impl BuildError {
    pub fn new(reason: BuildReason, attempts: u32) -> Self {
        Self { reason, attempts }
    }
}
