//! UPDATE / DELETE statements exercised by the DQE oracle.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::expr::{ColumnRef, Expr};

/// `UPDATE t SET c = e, ... WHERE p`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(ColumnRef, Expr)>,
    pub where_clause: Option<Expr>,
}

impl UpdateStmt {
    pub fn sql(&self) -> String {
        let mut out = format!("UPDATE {} SET ", self.table);
        for (i, (col, expr)) in self.assignments.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{} = ", col.name);
            expr.write_sql(&mut out);
        }
        if let Some(w) = &self.where_clause {
            out.push_str(" WHERE ");
            w.write_sql(&mut out);
        }
        out
    }

    pub fn is_deterministic(&self) -> bool {
        self.assignments.iter().all(|(_, e)| e.is_deterministic())
            && self.where_clause.as_ref().is_none_or(Expr::is_deterministic)
    }
}

/// `DELETE FROM t WHERE p`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStmt {
    pub table: String,
    pub where_clause: Option<Expr>,
}

impl DeleteStmt {
    pub fn sql(&self) -> String {
        let mut out = format!("DELETE FROM {}", self.table);
        if let Some(w) = &self.where_clause {
            out.push_str(" WHERE ");
            w.write_sql(&mut out);
        }
        out
    }

    pub fn is_deterministic(&self) -> bool {
        self.where_clause.as_ref().is_none_or(Expr::is_deterministic)
    }
}

/// Either DML statement, as handed to the DQE oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DmlStmt {
    Update(UpdateStmt),
    Delete(DeleteStmt),
}

impl DmlStmt {
    pub fn sql(&self) -> String {
        match self {
            DmlStmt::Update(u) => u.sql(),
            DmlStmt::Delete(d) => d.sql(),
        }
    }

    pub fn table(&self) -> &str {
        match self {
            DmlStmt::Update(u) => &u.table,
            DmlStmt::Delete(d) => &d.table,
        }
    }

    pub fn where_clause(&self) -> Option<&Expr> {
        match self {
            DmlStmt::Update(u) => u.where_clause.as_ref(),
            DmlStmt::Delete(d) => d.where_clause.as_ref(),
        }
    }

    pub fn is_deterministic(&self) -> bool {
        match self {
            DmlStmt::Update(u) => u.is_deterministic(),
            DmlStmt::Delete(d) => d.is_deterministic(),
        }
    }
}
