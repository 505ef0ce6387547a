//! Executor error taxonomy and classification helpers.

use thiserror::Error;

/// MySQL error codes treated as benign across all oracles: parser
/// errors (1064), out-of-range/truncation (1292) and FK violations
/// (1451/1452). EET additionally whitelists 3065 on its own.
pub const WHITELISTED_SQL_ERRORS: &[u16] = &[1064, 1292, 1451, 1452];

/// Errors surfaced by an [`crate::Executor`].
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// The cancellation token fired before the call.
    #[error("call cancelled")]
    Cancelled,

    /// The token's deadline passed.
    #[error("deadline exceeded")]
    Timeout,

    /// The server rejected the statement.
    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },

    /// Transport-level failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// The result shape did not match what the caller expected.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ExecError {
    pub fn server_code(&self) -> Option<u16> {
        match self {
            ExecError::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Cancellation and deadline both classify as a benign timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Cancelled | ExecError::Timeout)
    }

    fn message(&self) -> Option<&str> {
        match self {
            ExecError::Server { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Whether the error is on the benign whitelist.
pub fn is_whitelisted_sql_error(err: &ExecError) -> bool {
    err.server_code()
        .is_some_and(|c| WHITELISTED_SQL_ERRORS.contains(&c))
}

/// Maps an executor error to the closed reason set used in oracle
/// results, prefixed with the oracle (or service) name:
///
/// - `<prefix>:timeout` for cancellation/deadline;
/// - `<prefix>:missing_column` when the server reports an unknown
///   column (error 1054 or an "Unknown column" message);
/// - `<prefix>:plan_ref_missing` for TiDB's "Can't find column" planner
///   inconsistency;
/// - `<prefix>:sql_error_<code>` for any other server error;
/// - `<prefix>:sql_error` as the last resort.
pub fn sql_error_reason(prefix: &str, err: &ExecError) -> String {
    if err.is_timeout() {
        return format!("{prefix}:timeout");
    }
    if let Some(msg) = err.message() {
        if err.server_code() == Some(1054) || msg.contains("Unknown column") {
            return format!("{prefix}:missing_column");
        }
        if msg.contains("Can't find column") {
            return format!("{prefix}:plan_ref_missing");
        }
    }
    match err.server_code() {
        Some(code) => format!("{prefix}:sql_error_{code}"),
        None => format!("{prefix}:sql_error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn server(code: u16, message: &str) -> ExecError {
        ExecError::Server {
            code,
            message: message.into(),
        }
    }

    #[test_case(1064, true)]
    #[test_case(1292, true)]
    #[test_case(1451, true)]
    #[test_case(1452, true)]
    #[test_case(1054, false)]
    #[test_case(3065, false)]
    fn whitelist(code: u16, want: bool) {
        assert_eq!(is_whitelisted_sql_error(&server(code, "x")), want);
    }

    #[test]
    fn reason_classification() {
        assert_eq!(sql_error_reason("dqp", &ExecError::Timeout), "dqp:timeout");
        assert_eq!(sql_error_reason("dqp", &ExecError::Cancelled), "dqp:timeout");
        assert_eq!(
            sql_error_reason("eet", &server(1054, "Unknown column 'x' in 'field list'")),
            "eet:missing_column"
        );
        assert_eq!(
            sql_error_reason("eet", &server(1105, "Can't find column t0.c1 in schema")),
            "eet:plan_ref_missing"
        );
        assert_eq!(
            sql_error_reason("tlp", &server(1690, "BIGINT value out of range")),
            "tlp:sql_error_1690"
        );
        assert_eq!(
            sql_error_reason("tlp", &ExecError::Connection("broken pipe".into())),
            "tlp:sql_error"
        );
    }
}
