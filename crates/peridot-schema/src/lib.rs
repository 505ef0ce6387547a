//! # peridot-schema: schema and state model for the Peridot fuzzer
//!
//! Read-only metadata about the schema under test: tables, columns,
//! indexes and views. Oracles consult this model to validate column
//! references, pick join keys and decide whether a table is usable for
//! a given check. The model is populated once per fuzzing run (from
//! `information_schema` or from the DDL the state generator emitted)
//! and never mutated by oracles.

mod truth;
mod types;

pub use truth::{JoinEdge, JoinKind, JoinTruth, KeyTable};
pub use types::{DataType, TypeCategory};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Column / Index / Table metadata
// ============================================================================

/// Metadata for a single column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMeta {
    /// Column name as it appears in DDL.
    pub name: String,
    /// Declared SQL type.
    pub ty: DataType,
    /// Whether the column admits NULL.
    pub nullable: bool,
    /// Whether any index covers this column.
    pub has_index: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, ty: DataType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            has_index: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.has_index = true;
        self
    }
}

/// Metadata for a secondary index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// Metadata for a table or view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    pub has_pk: bool,
    pub partitioned: bool,
    pub indexes: Vec<IndexMeta>,
    /// Views are excluded from `State::base_tables`.
    pub is_view: bool,
    /// Whether a TiFlash replica exists for this table (gates MPP hints).
    pub tiflash_replica: bool,
}

impl TableMeta {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMeta>) -> Self {
        Self {
            name: name.into(),
            columns,
            has_pk: false,
            partitioned: false,
            indexes: Vec::new(),
            is_view: false,
            tiflash_replica: false,
        }
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether any column of this table is covered by an index.
    pub fn has_indexed_column(&self) -> bool {
        self.has_pk || self.columns.iter().any(|c| c.has_index) || !self.indexes.is_empty()
    }
}

// ============================================================================
// State
// ============================================================================

/// The long-lived, immutable-during-a-run view of the schema under test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    tables: BTreeMap<String, TableMeta>,
    /// Optional ground-truth key material for simple join chains.
    #[serde(skip)]
    join_truth: Option<JoinTruth>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table. Used by run setup, never by oracles.
    pub fn add_table(&mut self, table: TableMeta) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn set_join_truth(&mut self, truth: JoinTruth) {
        self.join_truth = Some(truth);
    }

    pub fn join_truth(&self) -> Option<&JoinTruth> {
        self.join_truth.as_ref()
    }

    pub fn has_tables(&self) -> bool {
        !self.tables.is_empty()
    }

    pub fn has_base_tables(&self) -> bool {
        self.tables.values().any(|t| !t.is_view)
    }

    /// All tables and views, in name order.
    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.values()
    }

    /// Tables only, views excluded.
    pub fn base_tables(&self) -> Vec<&TableMeta> {
        self.tables.values().filter(|t| !t.is_view).collect()
    }

    pub fn table_by_name(&self, name: &str) -> Option<&TableMeta> {
        self.tables.get(name)
    }
}

/// Fluent construction for run setup and tests.
///
/// ```
/// use peridot_schema::{ColumnMeta, DataType, StateBuilder};
///
/// let state = StateBuilder::new()
///     .table("t0", vec![
///         ColumnMeta::new("id", DataType::BigInt).not_null().indexed(),
///         ColumnMeta::new("c0", DataType::Int),
///     ])
///     .view("v0", vec![ColumnMeta::new("c0", DataType::Int)])
///     .build();
/// assert_eq!(state.base_tables().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct StateBuilder {
    state: State,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn table(mut self, name: impl Into<String>, columns: Vec<ColumnMeta>) -> Self {
        self.state.add_table(TableMeta::new(name, columns));
        self
    }

    /// Registers a table with a primary key on its first column.
    #[must_use]
    pub fn keyed_table(mut self, name: impl Into<String>, columns: Vec<ColumnMeta>) -> Self {
        let mut meta = TableMeta::new(name, columns);
        meta.has_pk = true;
        if let Some(first) = meta.columns.first_mut() {
            first.has_index = true;
        }
        self.state.add_table(meta);
        self
    }

    #[must_use]
    pub fn view(mut self, name: impl Into<String>, columns: Vec<ColumnMeta>) -> Self {
        let mut meta = TableMeta::new(name, columns);
        meta.is_view = true;
        self.state.add_table(meta);
        self
    }

    #[must_use]
    pub fn join_truth(mut self, truth: JoinTruth) -> Self {
        self.state.set_join_truth(truth);
        self
    }

    pub fn build(self) -> State {
        self.state
    }
}
