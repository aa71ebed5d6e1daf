//! Store transactions
//!
//! A transaction reads and writes a private copy of the committed tables.
//! `commit` publishes the copy in one step; dropping the transaction without
//! committing discards every write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::MutexGuard;

use serde_json::Value;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::fault::FaultInjector;
use super::row::{self, Row};
use super::table::Table;
use super::{RowId, RowSource, Tables};

/// An open transaction
pub struct Transaction<'a> {
    id: Uuid,
    committed: MutexGuard<'a, Tables>,
    working: Tables,
    sequence: &'a AtomicU64,
    faults: &'a FaultInjector,
    writes: usize,
}

impl<'a> Transaction<'a> {
    pub(super) fn new(
        committed: MutexGuard<'a, Tables>,
        sequence: &'a AtomicU64,
        faults: &'a FaultInjector,
    ) -> Self {
        let working = committed.clone();
        Self {
            id: Uuid::new_v4(),
            committed,
            working,
            sequence,
            faults,
            writes: 0,
        }
    }

    /// Transaction identifier (for logging)
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of writes issued so far
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Insert a row, assigning it the next id from the sequence
    pub fn insert(&mut self, table: Table, mut row: Row) -> StoreResult<RowId> {
        self.faults.check(table)?;
        let id = self.sequence.fetch_add(1, Ordering::SeqCst);
        row.insert(row::ID.to_string(), Value::from(id));
        self.working.table_mut(table).insert(id, row);
        self.writes += 1;
        Ok(id)
    }

    /// Overwrite the given columns of an existing row
    pub fn update(&mut self, table: Table, id: RowId, changes: Row) -> StoreResult<()> {
        self.faults.check(table)?;
        let row = self
            .working
            .table_mut(table)
            .get_mut(&id)
            .ok_or(StoreError::RowNotFound { table, id })?;
        for (column, value) in changes {
            if column != row::ID {
                row.insert(column, value);
            }
        }
        self.writes += 1;
        Ok(())
    }

    /// Set a single column
    pub fn set(&mut self, table: Table, id: RowId, column: &str, value: Value) -> StoreResult<()> {
        let mut changes = Row::new();
        changes.insert(column.to_string(), value);
        self.update(table, id, changes)
    }

    /// Delete a row, returning its last contents
    pub fn delete(&mut self, table: Table, id: RowId) -> StoreResult<Row> {
        self.faults.check(table)?;
        let removed = self
            .working
            .table_mut(table)
            .remove(&id)
            .ok_or(StoreError::RowNotFound { table, id })?;
        self.writes += 1;
        Ok(removed)
    }

    /// Publish every write atomically
    pub fn commit(self) -> StoreResult<()> {
        self.commit_then(|| ())
    }

    /// Publish every write, then run `after` before other writers can start
    ///
    /// Used to hand committed invalidations to subscribers in commit order.
    pub fn commit_then<T>(mut self, after: impl FnOnce() -> T) -> StoreResult<T> {
        *self.committed = std::mem::take(&mut self.working);
        Ok(after())
    }

    /// Discard every write
    pub fn rollback(self) {}
}

impl RowSource for Transaction<'_> {
    fn row(&self, table: Table, id: RowId) -> Option<&Row> {
        self.working.row(table, id)
    }

    fn rows(&self, table: Table) -> Box<dyn Iterator<Item = (RowId, &Row)> + '_> {
        self.working.rows(table)
    }
}
