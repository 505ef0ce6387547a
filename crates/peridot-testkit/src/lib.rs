//! # peridot-testkit: hermetic doubles for oracle tests
//!
//! Oracles talk to two collaborators: the generator and the executor.
//! The doubles here script both so every oracle control path (skips,
//! error taxonomy, divergence reporting) is testable without a server.
//!
//! The executor matches issued SQL by substring rules in registration
//! order; the generator pops pre-loaded outcomes from queues. Both
//! record what was asked of them.

mod executor;
mod generator;

pub use executor::{Response, ScriptedExecutor};
pub use generator::ScriptedGenerator;

use peridot_ast::{BinaryOp, ColumnRef, Expr, Literal, SelectItem, SelectQuery};
use peridot_schema::{ColumnMeta, DataType, State, TableMeta};

/// An empty schema. Every oracle must skip against it.
pub fn empty_state() -> State {
    State::new()
}

/// Two base tables with indexed ids plus a view, the workhorse fixture.
pub fn two_table_state() -> State {
    let mut state = State::new();
    let mut t0 = TableMeta::new(
        "t0",
        vec![
            ColumnMeta::new("id", DataType::BigInt).not_null().indexed(),
            ColumnMeta::new("a", DataType::Int),
            ColumnMeta::new("b", DataType::Int),
        ],
    );
    t0.has_pk = true;
    state.add_table(t0);
    let mut t1 = TableMeta::new(
        "t1",
        vec![
            ColumnMeta::new("id", DataType::BigInt).not_null().indexed(),
            ColumnMeta::new("c", DataType::Varchar),
        ],
    );
    t1.has_pk = true;
    state.add_table(t1);
    let mut view = TableMeta::new("v0", vec![ColumnMeta::new("a", DataType::Int)]);
    view.is_view = true;
    state.add_table(view);
    state
}

/// `SELECT t0.a AS a0, t0.b AS a1 FROM t0 WHERE (t0.a > 2)`.
pub fn simple_filtered_query() -> SelectQuery {
    let mut q = SelectQuery::from_table("t0");
    q.items = vec![
        SelectItem {
            expr: Expr::Column(ColumnRef::new("t0", "a", DataType::Int)),
            alias: "a0".into(),
        },
        SelectItem {
            expr: Expr::Column(ColumnRef::new("t0", "b", DataType::Int)),
            alias: "a1".into(),
        },
    ];
    q.where_clause = Some(Expr::binary(
        BinaryOp::Gt,
        Expr::Column(ColumnRef::new("t0", "a", DataType::Int)),
        Expr::lit(Literal::Int(2)),
    ));
    q
}
