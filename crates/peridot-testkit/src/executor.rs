//! Substring-scripted executor.

use peridot_exec::{Cancellation, ExecError, Executor, ResultSet, Row, Signature};

/// One canned answer.
#[derive(Debug, Clone)]
pub enum Response {
    Count(i64),
    PlanRows(f64),
    Signature(Signature),
    Row(Option<Row>),
    Rows(ResultSet),
    Affected(u64),
    Error(ExecError),
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    response: Response,
    once: bool,
}

/// Executor double: rules match issued SQL by substring, first match
/// wins, one-shot rules are consumed. Every statement is recorded in
/// `executed` for assertions.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Vec<Rule>,
    pub executed: Vec<String>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a sticky rule.
    #[must_use]
    pub fn on(mut self, pattern: impl Into<String>, response: Response) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            response,
            once: false,
        });
        self
    }

    /// Registers a rule consumed by its first match.
    #[must_use]
    pub fn once(mut self, pattern: impl Into<String>, response: Response) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            response,
            once: true,
        });
        self
    }

    fn lookup(&mut self, sql: &str) -> Result<Response, ExecError> {
        self.executed.push(sql.to_string());
        let Some(idx) = self.rules.iter().position(|r| sql.contains(&r.pattern)) else {
            return Err(ExecError::Decode(format!("unscripted sql: {sql}")));
        };
        let response = self.rules[idx].response.clone();
        if self.rules[idx].once {
            self.rules.remove(idx);
        }
        match response {
            Response::Error(e) => Err(e),
            other => Ok(other),
        }
    }
}

fn type_error(sql: &str, want: &str, got: &Response) -> ExecError {
    ExecError::Decode(format!("scripted {got:?} where {want} expected for: {sql}"))
}

impl Executor for ScriptedExecutor {
    fn query_count(&mut self, cancel: &Cancellation, sql: &str) -> Result<i64, ExecError> {
        cancel.check()?;
        match self.lookup(sql)? {
            Response::Count(n) => Ok(n),
            other => Err(type_error(sql, "Count", &other)),
        }
    }

    fn query_plan_rows(&mut self, cancel: &Cancellation, sql: &str) -> Result<f64, ExecError> {
        cancel.check()?;
        match self.lookup(sql)? {
            Response::PlanRows(rows) => Ok(rows),
            other => Err(type_error(sql, "PlanRows", &other)),
        }
    }

    fn query_signature(&mut self, cancel: &Cancellation, sql: &str) -> Result<Signature, ExecError> {
        cancel.check()?;
        match self.lookup(sql)? {
            Response::Signature(s) => Ok(s),
            other => Err(type_error(sql, "Signature", &other)),
        }
    }

    fn query_row(&mut self, cancel: &Cancellation, sql: &str) -> Result<Option<Row>, ExecError> {
        cancel.check()?;
        match self.lookup(sql)? {
            Response::Row(row) => Ok(row),
            Response::Rows(set) => Ok(set.rows.into_iter().next()),
            other => Err(type_error(sql, "Row", &other)),
        }
    }

    fn query_rows(
        &mut self,
        cancel: &Cancellation,
        sql: &str,
        max_rows: usize,
    ) -> Result<ResultSet, ExecError> {
        cancel.check()?;
        match self.lookup(sql)? {
            Response::Rows(mut set) => {
                if max_rows != 0 && set.rows.len() > max_rows {
                    set.rows.truncate(max_rows);
                    set.truncated = true;
                }
                Ok(set)
            }
            Response::Row(row) => Ok(ResultSet {
                columns: Vec::new(),
                rows: row.into_iter().collect(),
                truncated: false,
            }),
            other => Err(type_error(sql, "Rows", &other)),
        }
    }

    fn exec(&mut self, cancel: &Cancellation, sql: &str) -> Result<u64, ExecError> {
        cancel.check()?;
        match self.lookup(sql)? {
            Response::Affected(n) => Ok(n),
            other => Err(type_error(sql, "Affected", &other)),
        }
    }
}
