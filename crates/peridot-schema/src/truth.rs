//! In-memory ground truth for simple join chains.
//!
//! When the state generator loads data it can register the join-key
//! columns of each table here. The GroundTruth oracle then evaluates an
//! inner/left join chain entirely in process and compares the row count
//! against the server.

use std::collections::BTreeMap;
use std::collections::HashMap;

/// Join flavor for a single edge in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
        }
    }
}

/// One equi-join edge: `left_table.left_col = right_table.right_col`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEdge {
    pub left_table: String,
    pub left_col: String,
    pub right_table: String,
    pub right_col: String,
    pub kind: JoinKind,
}

/// Join-key material for one table: the key columns and one row per
/// table row, each cell `None` for SQL NULL.
#[derive(Debug, Clone, Default)]
pub struct KeyTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<i64>>>,
}

impl KeyTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Option<i64>>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Ground-truth key material for a set of tables.
#[derive(Debug, Clone, Default)]
pub struct JoinTruth {
    tables: BTreeMap<String, KeyTable>,
}

impl JoinTruth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, name: impl Into<String>, table: KeyTable) {
        self.tables.insert(name.into(), table);
    }

    pub fn table(&self, name: &str) -> Option<&KeyTable> {
        self.tables.get(name)
    }

    pub fn covers(&self, tables: &[&str]) -> bool {
        tables.iter().all(|t| self.tables.contains_key(*t))
    }

    /// Evaluates a left-deep join chain and returns the result row count.
    ///
    /// `None` when a referenced table or column is missing from the truth
    /// material. Edges must be ordered so each edge's left table already
    /// appears in the chain (the first edge introduces both sides).
    pub fn eval_join_chain(&self, edges: &[JoinEdge]) -> Option<u64> {
        self.eval_join_chain_exact(edges)
    }

    /// Exact evaluation: NULL keys never match (SQL equality semantics),
    /// LEFT edges preserve unmatched left rows.
    pub fn eval_join_chain_exact(&self, edges: &[JoinEdge]) -> Option<u64> {
        let first = edges.first()?;
        let base = self.tables.get(&first.left_table)?;

        // The working set tracks, per surviving intermediate row, the key
        // row of each table already joined, by table name.
        let mut joined: Vec<HashMap<String, usize>> = (0..base.rows.len())
            .map(|i| {
                let mut m = HashMap::new();
                m.insert(first.left_table.clone(), i);
                m
            })
            .collect();

        for edge in edges {
            let left = self.tables.get(&edge.left_table)?;
            let left_idx = left.column_index(&edge.left_col)?;
            let right = self.tables.get(&edge.right_table)?;
            let right_idx = right.column_index(&edge.right_col)?;

            // Hash the right side on the join key, skipping NULL keys.
            let mut index: HashMap<i64, Vec<usize>> = HashMap::new();
            for (i, row) in right.rows.iter().enumerate() {
                if let Some(key) = row.get(right_idx).copied().flatten() {
                    index.entry(key).or_default().push(i);
                }
            }

            let mut next = Vec::new();
            for entry in &joined {
                let Some(&left_row) = entry.get(&edge.left_table) else {
                    return None;
                };
                let key = left.rows.get(left_row)?.get(left_idx).copied().flatten();
                let matches = key.and_then(|k| index.get(&k));
                match matches {
                    Some(rows) => {
                        for &r in rows {
                            let mut extended = entry.clone();
                            extended.insert(edge.right_table.clone(), r);
                            next.push(extended);
                        }
                    }
                    None => {
                        if edge.kind == JoinKind::Left {
                            // Unmatched left row survives with NULLs on the right.
                            next.push(entry.clone());
                        }
                    }
                }
            }
            joined = next;
        }

        Some(joined.len() as u64)
    }
}
