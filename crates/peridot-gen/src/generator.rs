//! The `QueryGenerator` trait.

use rand::RngCore;

use peridot_ast::{DmlStmt, Expr, SelectItem, SelectQuery};
use peridot_schema::{State, TableMeta};

use crate::config::{FuzzConfig, PredicateLevel};
use crate::constraints::BuildConstraints;
use crate::reason::BuildError;

/// A check an oracle attaches to a build so unacceptable predicates are
/// rejected inside the builder's retry loop instead of after it.
pub type PredicateGuard<'a> = dyn Fn(&Expr) -> bool + 'a;

/// Everything the oracle engine may ask of the random SQL generator.
///
/// One generator instance is owned by one worker; implementations need
/// not be thread-safe. Builds that cannot satisfy their constraints
/// return a [`BuildError`] carrying the closed-set reason.
pub trait QueryGenerator {
    /// The schema model this generator draws from.
    fn state(&self) -> &State;

    /// The run configuration.
    fn config(&self) -> &FuzzConfig;

    /// The worker's random source.
    fn rng(&mut self) -> &mut dyn RngCore;

    /// Generates a query under the run's default constraints.
    fn generate_select_query(&mut self) -> Result<SelectQuery, BuildError>;

    /// Generates a query under oracle-specific constraints. When `guard`
    /// is present, a candidate whose WHERE fails it counts as a failed
    /// attempt.
    fn generate_select_query_with_constraints(
        &mut self,
        constraints: &BuildConstraints,
        guard: Option<&PredicateGuard<'_>>,
    ) -> Result<SelectQuery, BuildError>;

    /// Generates an UPDATE or DELETE against a random base table.
    fn generate_dml(&mut self) -> Result<DmlStmt, BuildError>;

    /// A predicate within `level`'s shape over the given tables, using
    /// at most `max_columns` distinct columns. `None` when no eligible
    /// column exists.
    fn generate_simple_predicate(
        &mut self,
        tables: &[&TableMeta],
        level: PredicateLevel,
        max_columns: usize,
    ) -> Option<Expr>;

    /// A single `column OP literal` comparison over one table.
    fn generate_simple_column_literal_predicate(&mut self, table: &TableMeta) -> Option<Expr>;

    /// An unconstrained predicate over the given tables.
    fn generate_predicate(&mut self, tables: &[&TableMeta]) -> Option<Expr>;

    /// A fresh aliased select list over the given tables.
    fn generate_select_list(&mut self, tables: &[&TableMeta]) -> Vec<SelectItem>;

    /// Resolves the tables in scope for `query`'s own FROM clause,
    /// aliases mapped back to their metadata. Derived tables resolve to
    /// a synthesized meta describing their output columns.
    fn tables_for_query_scope(&self, query: &SelectQuery) -> Vec<TableMeta>;

    /// Whether `expr` only references columns resolvable in `query`'s
    /// scope.
    fn validate_expr_in_query_scope(&self, expr: &Expr, query: &SelectQuery) -> bool;

    /// Whether every expression hanging off `query` is resolvable in its
    /// own scope.
    fn validate_query_scope(&self, query: &SelectQuery) -> bool;
}
