//! # peridot-exec: database access for the oracle engine
//!
//! Oracles speak to the server under test exclusively through the
//! [`Executor`] trait: typed entry points for the handful of query
//! shapes the engine issues (counts, signatures, row fetches, EXPLAIN
//! estimates, DML). Every call takes a [`Cancellation`] token; a token
//! that has fired maps to the benign timeout classification rather than
//! a bug.
//!
//! [`MysqlExecutor`] is the production implementation over one pooled
//! MySQL/TiDB connection. Tests use the scripted executor from
//! `peridot-testkit` instead.

mod cancel;
mod error;
mod mysql_exec;

pub use cancel::Cancellation;
pub use error::{is_whitelisted_sql_error, sql_error_reason, ExecError, WHITELISTED_SQL_ERRORS};
pub use mysql_exec::MysqlExecutor;

/// The `(count, checksum)` pair canonically summarizing a result set.
///
/// `count` captures shape, `checksum` content; equality requires both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    pub count: i64,
    pub checksum: u64,
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cnt={} checksum={}", self.count, self.checksum)
    }
}

/// One result row in text-protocol form, `None` for SQL NULL.
pub type Row = Vec<Option<String>>;

/// A captured result set with a truncation marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Set when the fetch stopped at the caller's row cap; comparisons
    /// over a truncated capture are meaningless and must be abandoned.
    pub truncated: bool,
}

/// Database entry points used by the oracles.
pub trait Executor {
    /// Runs a query expected to return a single integer (a `COUNT(*)`).
    fn query_count(&mut self, cancel: &Cancellation, sql: &str) -> Result<i64, ExecError>;

    /// Returns the optimizer's estimated rows for the query's root
    /// operator, via `EXPLAIN`.
    fn query_plan_rows(&mut self, cancel: &Cancellation, sql: &str) -> Result<f64, ExecError>;

    /// Runs a signature-shaped query (`cnt`, `checksum`).
    fn query_signature(&mut self, cancel: &Cancellation, sql: &str) -> Result<Signature, ExecError>;

    /// Fetches at most one row.
    fn query_row(&mut self, cancel: &Cancellation, sql: &str) -> Result<Option<Row>, ExecError>;

    /// Fetches up to `max_rows` rows (0 = unbounded), flagging
    /// truncation.
    fn query_rows(
        &mut self,
        cancel: &Cancellation,
        sql: &str,
        max_rows: usize,
    ) -> Result<ResultSet, ExecError>;

    /// Executes DML, returning the server's affected-row count.
    fn exec(&mut self, cancel: &Cancellation, sql: &str) -> Result<u64, ExecError>;
}
