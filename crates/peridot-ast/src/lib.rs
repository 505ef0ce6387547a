//! # peridot-ast: the query AST the fuzzer generates and the oracles rewrite
//!
//! The generator produces [`SelectQuery`] values; oracles clone them
//! freely, rewrite clauses, and emit SQL through [`SelectQuery::sql_string`]
//! or the signature wrapper [`SelectQuery::signature_sql`].
//!
//! Two invariants hold for every generated query:
//!
//! - every select item carries an alias, and the alias list is dense
//!   (`column_aliases` never returns an empty name);
//! - expressions are immutable under evaluation — a subquery owns its
//!   `SelectQuery` outright, so cloning a predicate clones the whole
//!   subtree and no rewrite can alias another oracle's state.

mod dml;
mod expr;
mod literal;
mod query;

pub use dml::{DeleteStmt, DmlStmt, UpdateStmt};
pub use expr::{BinaryOp, ColumnRef, Expr, Quantifier, UnaryOp};
pub use literal::{Literal, LiteralKind};
pub use query::{
    signature_sql_for, Analysis, Cte, FromClause, Join, JoinType, OrderByItem, SelectItem,
    SelectQuery, SetOp, SetOpType, WindowDef,
};
