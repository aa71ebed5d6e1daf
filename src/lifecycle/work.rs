//! Units of work
//!
//! One logical operation: a store transaction paired with the invalidation
//! batch that records what it touched. Committing publishes the rows and
//! flushes the batch; dropping the unit rolls back both.

use serde_json::Value;
use uuid::Uuid;

use crate::errors::MasterResult;
use crate::invalidation::{AccountScope, Broadcaster, FlushReport, HostScope, InvalidationBatch};
use crate::ownership::{OwnershipResolver, ResourceRef};
use crate::store::{Row, RowId, RowSource, Store, Table, Transaction};

/// Open transaction plus its invalidation batch
pub struct UnitOfWork<'a> {
    tx: Transaction<'a>,
    batch: InvalidationBatch,
    user_initiated: bool,
}

impl<'a> UnitOfWork<'a> {
    /// Begin a unit of work; `user_initiated` tags every tuple it records
    pub fn begin(
        store: &'a Store,
        broadcaster: &Broadcaster,
        user_initiated: bool,
    ) -> MasterResult<Self> {
        Ok(Self {
            tx: store.begin()?,
            batch: broadcaster.begin(),
            user_initiated,
        })
    }

    pub fn id(&self) -> Uuid {
        self.tx.id()
    }

    /// Read view including this unit's own writes
    pub fn rows(&self) -> &dyn RowSource {
        &self.tx
    }

    pub fn resolver(&self) -> OwnershipResolver<'_> {
        OwnershipResolver::new(&self.tx)
    }

    pub fn batch(&self) -> &InvalidationBatch {
        &self.batch
    }

    /// Record an invalidation for `table`
    pub fn record(&mut self, table: Table, accounts: AccountScope, hosts: HostScope) {
        self.batch.record(table, accounts, hosts, self.user_initiated);
    }

    /// Record an invalidation scoped to an existing resource
    pub fn record_for(&mut self, table: Table, resource: ResourceRef) -> MasterResult<()> {
        let (accounts, hosts) = self.resolver().scope_of(resource)?;
        self.record(table, accounts, hosts);
        Ok(())
    }

    pub fn insert(&mut self, table: Table, row: Row) -> MasterResult<RowId> {
        Ok(self.tx.insert(table, row)?)
    }

    pub fn update(&mut self, table: Table, id: RowId, changes: Row) -> MasterResult<()> {
        Ok(self.tx.update(table, id, changes)?)
    }

    pub fn set(&mut self, table: Table, id: RowId, column: &str, value: Value) -> MasterResult<()> {
        Ok(self.tx.set(table, id, column, value)?)
    }

    pub fn delete(&mut self, table: Table, id: RowId) -> MasterResult<Row> {
        Ok(self.tx.delete(table, id)?)
    }

    /// Commit the rows, then flush the batch before the next writer starts
    pub fn commit(self, broadcaster: &Broadcaster) -> MasterResult<FlushReport> {
        let batch = self.batch;
        Ok(self.tx.commit_then(|| broadcaster.flush(batch))?)
    }

    /// Roll back the rows and discard the batch
    pub fn abort(self, reason: &str) {
        self.batch.abort(reason);
        self.tx.rollback();
    }
}
