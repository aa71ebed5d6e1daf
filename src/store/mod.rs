//! # Relational Store
//!
//! In-process relational store backing the master.
//!
//! - Rows are JSON objects grouped by [`Table`]
//! - Writes happen inside a [`Transaction`]; a transaction works on a private
//!   copy and publishes it atomically on commit, a dropped transaction leaves
//!   no trace
//! - Row ids come from one monotonically increasing sequence shared by every
//!   table; ids handed to a rolled-back transaction are never reused

pub mod errors;
pub mod fault;
pub mod row;
pub mod table;
pub mod transaction;

pub use errors::{StoreError, StoreResult};
pub use fault::FaultInjector;
pub use row::{into_row, Row, RowExt};
pub use table::Table;
pub use transaction::Transaction;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row identifier
pub type RowId = u64;

/// Read access shared by committed state and open transactions
pub trait RowSource {
    /// Get a row by id
    fn row(&self, table: Table, id: RowId) -> Option<&Row>;

    /// Iterate all rows of a table in id order
    fn rows(&self, table: Table) -> Box<dyn Iterator<Item = (RowId, &Row)> + '_>;

    /// Get a row or fail with `RowNotFound`
    fn require(&self, table: Table, id: RowId) -> StoreResult<&Row> {
        self.row(table, id)
            .ok_or(StoreError::RowNotFound { table, id })
    }

    /// Ids of rows whose reference `column` points at `target`
    fn referencing(&self, table: Table, column: &str, target: RowId) -> Vec<RowId> {
        self.rows(table)
            .filter(|(_, row)| row.ref_id(column) == Some(target))
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether any row of `table` references `target` through `column`
    fn is_referenced(&self, table: Table, column: &str, target: RowId) -> bool {
        self.rows(table)
            .any(|(_, row)| row.ref_id(column) == Some(target))
    }

    /// Ids of rows whose text `column` equals `value`
    fn with_text(&self, table: Table, column: &str, value: &str) -> Vec<RowId> {
        self.rows(table)
            .filter(|(_, row)| row.text(column) == Some(value))
            .map(|(id, _)| id)
            .collect()
    }
}

/// Materialized table contents
#[derive(Debug, Clone, Default)]
pub struct Tables {
    rows: BTreeMap<Table, BTreeMap<RowId, Row>>,
}

impl Tables {
    fn table_mut(&mut self, table: Table) -> &mut BTreeMap<RowId, Row> {
        self.rows.entry(table).or_default()
    }

    /// Number of rows in a table
    pub fn count(&self, table: Table) -> usize {
        self.rows.get(&table).map(BTreeMap::len).unwrap_or(0)
    }

    fn max_id(&self) -> RowId {
        self.rows
            .values()
            .filter_map(|t| t.keys().next_back().copied())
            .max()
            .unwrap_or(0)
    }
}

impl RowSource for Tables {
    fn row(&self, table: Table, id: RowId) -> Option<&Row> {
        self.rows.get(&table).and_then(|t| t.get(&id))
    }

    fn rows(&self, table: Table) -> Box<dyn Iterator<Item = (RowId, &Row)> + '_> {
        match self.rows.get(&table) {
            Some(t) => Box::new(t.iter().map(|(id, row)| (*id, row))),
            None => Box::new(std::iter::empty()),
        }
    }
}

/// Initial rows loaded at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    /// Rows per table; every row carries its own `id`
    #[serde(default)]
    pub tables: BTreeMap<Table, Vec<Value>>,
}

impl Seed {
    /// Load a seed from a JSON file
    pub fn load(path: &Path) -> StoreResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidSeed(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::InvalidSeed(format!("{}: {}", path.display(), e)))
    }

    /// Add a row to the seed
    pub fn with_row(mut self, table: Table, row: Value) -> Self {
        self.tables.entry(table).or_default().push(row);
        self
    }
}

/// The relational store
#[derive(Debug)]
pub struct Store {
    tables: Mutex<Tables>,
    sequence: AtomicU64,
    faults: FaultInjector,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            sequence: AtomicU64::new(1),
            faults: FaultInjector::new(),
        }
    }

    /// Create a store pre-populated from a seed
    ///
    /// The id sequence resumes after the largest seeded id.
    pub fn from_seed(seed: Seed) -> StoreResult<Self> {
        let mut tables = Tables::default();

        for (table, rows) in seed.tables {
            for value in rows {
                let row = into_row(table, value)?;
                let id = row.ref_id(row::ID).ok_or_else(|| {
                    StoreError::InvalidSeed(format!("{} row without numeric id", table))
                })?;
                if tables.table_mut(table).insert(id, row).is_some() {
                    return Err(StoreError::InvalidSeed(format!(
                        "duplicate id {} in {}",
                        id, table
                    )));
                }
            }
        }

        let next = tables.max_id() + 1;
        Ok(Self {
            tables: Mutex::new(tables),
            sequence: AtomicU64::new(next),
            faults: FaultInjector::new(),
        })
    }

    /// Begin a transaction
    ///
    /// Writing transactions are serialized; the returned transaction holds
    /// the store lock until it is committed or dropped.
    pub fn begin(&self) -> StoreResult<Transaction<'_>> {
        let guard = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(Transaction::new(guard, &self.sequence, &self.faults))
    }

    /// Run a read against committed state
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        let guard = self.tables.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&guard))
    }

    /// Make the `nth` write from now fail once
    pub fn arm_write_fault(&self, nth: usize) {
        self.faults.arm(nth);
    }

    /// Drop an armed write fault
    pub fn disarm_write_fault(&self) {
        self.faults.disarm();
    }

    /// Peek at the next id the sequence will hand out
    pub fn next_id(&self) -> RowId {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
