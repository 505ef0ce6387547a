//! Queue-scripted generator.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use peridot_ast::{ColumnRef, DmlStmt, Expr, SelectItem, SelectQuery};
use peridot_gen::{
    BuildConstraints, BuildError, BuildReason, FuzzConfig, PredicateGuard, PredicateLevel,
    QueryGenerator,
};
use peridot_schema::{ColumnMeta, DataType, State, TableMeta};

/// Generator double: outcomes are popped from queues loaded by the
/// test. An empty queue reports `no_tables` on an empty schema and
/// `max_tries_exceeded` otherwise, which mirrors how a real builder
/// runs dry.
pub struct ScriptedGenerator {
    state: State,
    config: FuzzConfig,
    rng: StdRng,
    pub queries: VecDeque<Result<SelectQuery, BuildError>>,
    pub dml: VecDeque<Result<DmlStmt, BuildError>>,
    pub simple_predicates: VecDeque<Option<Expr>>,
    pub column_literal_predicates: VecDeque<Option<Expr>>,
    pub predicates: VecDeque<Option<Expr>>,
    pub select_lists: VecDeque<Vec<SelectItem>>,
    /// Forces scope validation to fail when set.
    pub scope_valid: bool,
    /// Constraint sets the oracles asked for, in order.
    pub requested_constraints: Vec<BuildConstraints>,
}

impl ScriptedGenerator {
    pub fn new(state: State) -> Self {
        Self {
            state,
            config: FuzzConfig::default(),
            rng: StdRng::seed_from_u64(0x5eed),
            queries: VecDeque::new(),
            dml: VecDeque::new(),
            simple_predicates: VecDeque::new(),
            column_literal_predicates: VecDeque::new(),
            predicates: VecDeque::new(),
            select_lists: VecDeque::new(),
            scope_valid: true,
            requested_constraints: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: FuzzConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: SelectQuery) -> Self {
        self.queries.push_back(Ok(query));
        self
    }

    #[must_use]
    pub fn with_dml(mut self, stmt: DmlStmt) -> Self {
        self.dml.push_back(Ok(stmt));
        self
    }

    #[must_use]
    pub fn with_simple_predicate(mut self, predicate: Expr) -> Self {
        self.simple_predicates.push_back(Some(predicate));
        self
    }

    #[must_use]
    pub fn with_column_literal_predicate(mut self, predicate: Expr) -> Self {
        self.column_literal_predicates.push_back(Some(predicate));
        self
    }

    fn exhausted(&self) -> BuildError {
        if self.state.has_tables() {
            BuildError::new(BuildReason::MaxTriesExceeded, 1)
        } else {
            BuildError::new(BuildReason::NoTables, 1)
        }
    }

    fn scope_tables(&self, query: &SelectQuery) -> Vec<TableMeta> {
        let mut out = Vec::new();
        let mut factor = |name: &str, table: &str, derived: Option<&SelectQuery>| {
            if let Some(q) = derived {
                out.push(TableMeta::new(
                    name,
                    q.column_aliases()
                        .into_iter()
                        .map(|a| ColumnMeta::new(a, DataType::Int))
                        .collect(),
                ));
            } else if let Some(cte) = query.with.iter().find(|c| c.name == table) {
                out.push(TableMeta::new(
                    name,
                    cte.query
                        .column_aliases()
                        .into_iter()
                        .map(|a| ColumnMeta::new(a, DataType::Int))
                        .collect(),
                ));
            } else if let Some(meta) = self.state.table_by_name(table) {
                let mut meta = meta.clone();
                meta.name = name.to_string();
                out.push(meta);
            }
        };
        factor(
            query.from.base_effective_name(),
            &query.from.base_table,
            query.from.base_query.as_deref(),
        );
        for join in &query.from.joins {
            factor(join.effective_name(), &join.table, join.table_query.as_deref());
        }
        out
    }
}

impl QueryGenerator for ScriptedGenerator {
    fn state(&self) -> &State {
        &self.state
    }

    fn config(&self) -> &FuzzConfig {
        &self.config
    }

    fn rng(&mut self) -> &mut dyn RngCore {
        &mut self.rng
    }

    fn generate_select_query(&mut self) -> Result<SelectQuery, BuildError> {
        self.generate_select_query_with_constraints(&BuildConstraints::permissive(), None)
    }

    fn generate_select_query_with_constraints(
        &mut self,
        constraints: &BuildConstraints,
        guard: Option<&PredicateGuard<'_>>,
    ) -> Result<SelectQuery, BuildError> {
        self.requested_constraints.push(constraints.clone());
        let Some(next) = self.queries.pop_front() else {
            return Err(self.exhausted());
        };
        let query = next?;
        if let (Some(guard), Some(where_clause)) = (guard, &query.where_clause) {
            if !guard(where_clause) {
                return Err(BuildError::new(BuildReason::PredicateRejected, 1));
            }
        }
        Ok(query)
    }

    fn generate_dml(&mut self) -> Result<DmlStmt, BuildError> {
        match self.dml.pop_front() {
            Some(next) => next,
            None => Err(self.exhausted()),
        }
    }

    fn generate_simple_predicate(
        &mut self,
        _tables: &[&TableMeta],
        _level: PredicateLevel,
        _max_columns: usize,
    ) -> Option<Expr> {
        self.simple_predicates.pop_front().flatten()
    }

    fn generate_simple_column_literal_predicate(&mut self, _table: &TableMeta) -> Option<Expr> {
        self.column_literal_predicates.pop_front().flatten()
    }

    fn generate_predicate(&mut self, _tables: &[&TableMeta]) -> Option<Expr> {
        self.predicates.pop_front().flatten()
    }

    fn generate_select_list(&mut self, tables: &[&TableMeta]) -> Vec<SelectItem> {
        if let Some(list) = self.select_lists.pop_front() {
            return list;
        }
        tables
            .iter()
            .flat_map(|t| t.columns.first().map(|c| (t.name.clone(), c.clone())))
            .enumerate()
            .map(|(i, (table, col))| SelectItem {
                expr: Expr::Column(ColumnRef::new(table, col.name, col.ty)),
                alias: format!("a{i}"),
            })
            .collect()
    }

    fn tables_for_query_scope(&self, query: &SelectQuery) -> Vec<TableMeta> {
        self.scope_tables(query)
    }

    fn validate_expr_in_query_scope(&self, expr: &Expr, query: &SelectQuery) -> bool {
        if !self.scope_valid {
            return false;
        }
        let scope = self.scope_tables(query);
        let mut ok = true;
        expr.visit_columns(&mut |col| {
            ok &= scope
                .iter()
                .any(|t| t.name == col.table && t.column(&col.name).is_some());
        });
        ok
    }

    fn validate_query_scope(&self, query: &SelectQuery) -> bool {
        if !self.scope_valid {
            return false;
        }
        let mut ok = true;
        query.visit_own_exprs(&mut |e| ok &= self.validate_expr_in_query_scope(e, query));
        ok
    }
}
