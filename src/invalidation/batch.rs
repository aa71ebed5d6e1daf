//! # Invalidation Batches
//!
//! The per-transaction accumulator. A batch is Open while it is owned by a
//! unit of work; handing it to [`Broadcaster::flush`](super::Broadcaster::flush)
//! commits it, dropping it aborts it. Both consume the batch, so a batch can
//! never be flushed twice or flushed after being discarded.

use std::collections::HashSet;

use uuid::Uuid;

use crate::observability::{Event, Logger};
use crate::store::Table;

use super::tuple::{AccountScope, HostScope, InvalidationTuple};

/// Tuples recorded by one logical transaction
#[derive(Debug)]
pub struct InvalidationBatch {
    id: Uuid,
    tuples: Vec<InvalidationTuple>,
    seen: HashSet<InvalidationTuple>,
}

impl InvalidationBatch {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            tuples: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Record one invalidation; duplicates collapse onto the first occurrence
    pub fn record(
        &mut self,
        table: Table,
        accounts: AccountScope,
        hosts: HostScope,
        user_initiated: bool,
    ) -> bool {
        self.push(InvalidationTuple::new(table, accounts, hosts, user_initiated))
    }

    /// Record a prepared tuple; returns false when it was already recorded
    pub fn push(&mut self, tuple: InvalidationTuple) -> bool {
        if self.seen.contains(&tuple) {
            return false;
        }
        self.seen.insert(tuple.clone());
        self.tuples.push(tuple);
        true
    }

    /// Recorded tuples in recording order
    pub fn tuples(&self) -> &[InvalidationTuple] {
        &self.tuples
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Discard the batch, logging why
    pub fn abort(mut self, reason: &str) {
        if !self.tuples.is_empty() {
            let id = self.id.to_string();
            let count = self.tuples.len().to_string();
            Logger::event(
                Event::TransactionAborted,
                &[("batch", &id), ("discarded", &count), ("reason", reason)],
            );
        }
        self.tuples.clear();
        self.seen.clear();
    }

    /// Take the tuples for delivery; only the broadcaster calls this
    pub(super) fn into_tuples(mut self) -> Vec<InvalidationTuple> {
        self.seen.clear();
        std::mem::take(&mut self.tuples)
    }
}

impl Default for InvalidationBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InvalidationBatch {
    fn drop(&mut self) {
        if !self.tuples.is_empty() {
            let id = self.id.to_string();
            let count = self.tuples.len().to_string();
            Logger::event(
                Event::TransactionAborted,
                &[("batch", &id), ("discarded", &count), ("reason", "dropped before commit")],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse_in_first_order() {
        let mut batch = InvalidationBatch::new();
        assert!(batch.record(Table::Packages, AccountScope::One(3), HostScope::All, false));
        assert!(batch.record(Table::LinuxAccounts, AccountScope::One(3), HostScope::One(10), false));
        assert!(!batch.record(Table::Packages, AccountScope::One(3), HostScope::All, false));

        let tables: Vec<_> = batch.tuples().iter().map(|t| t.table).collect();
        assert_eq!(tables, vec![Table::Packages, Table::LinuxAccounts]);
    }

    #[test]
    fn test_user_initiated_is_distinct() {
        let mut batch = InvalidationBatch::new();
        batch.record(Table::MysqlUsers, AccountScope::One(3), HostScope::One(10), false);
        batch.record(Table::MysqlUsers, AccountScope::One(3), HostScope::One(10), true);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_into_tuples_empties_batch() {
        let mut batch = InvalidationBatch::new();
        batch.record(Table::Hosts, AccountScope::All, HostScope::All, false);
        let tuples = batch.into_tuples();
        assert_eq!(tuples.len(), 1);
    }

    #[test]
    fn test_abort_discards() {
        let mut batch = InvalidationBatch::new();
        batch.record(Table::Hosts, AccountScope::All, HostScope::All, false);
        batch.abort("test");
    }
}
