//! # Memoization Caches
//!
//! Table-scoped caches inside the master. Entries are only ever removed by
//! matching invalidation tuples, never patched in place; a cleared entry is
//! recomputed on the next read.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Mutex;

use crate::ownership::{ResourceKind, ResourceRef};
use crate::store::RowId;

use super::tuple::InvalidationTuple;

/// A cache the broadcaster clears on flush
pub trait InvalidationCache: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Drop every entry the tuple covers; returns how many were dropped
    fn invalidate(&self, tuple: &InvalidationTuple) -> usize;

    /// Drop everything
    fn clear(&self);
}

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    account: RowId,
    hosts: BTreeSet<RowId>,
}

/// Values memoized per resource, tagged with the resource's scope
#[derive(Debug)]
pub struct MemoCache<V> {
    name: String,
    entries: Mutex<HashMap<ResourceRef, Entry<V>>>,
}

impl<V: Clone> MemoCache<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: ResourceRef) -> Option<V> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(&key).map(|e| e.value.clone()))
    }

    /// Remember a value along with the resource's owning account and hosts
    pub fn insert(&self, key: ResourceRef, account: RowId, hosts: BTreeSet<RowId>, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                key,
                Entry {
                    value,
                    account,
                    hosts,
                },
            );
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn covers(tuple: &InvalidationTuple, key: &ResourceRef, entry: &Entry<V>) -> bool {
        if ResourceKind::for_table(tuple.table) != Some(key.kind) {
            return false;
        }
        if tuple.is_full_table() {
            return true;
        }
        tuple.accounts.covers(entry.account)
            && (entry.hosts.is_empty() || tuple.hosts.intersects(&entry.hosts))
    }
}

impl<V: Clone + Send + fmt::Debug> InvalidationCache for MemoCache<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn invalidate(&self, tuple: &InvalidationTuple) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|key, entry| !Self::covers(tuple, key, entry));
        before - entries.len()
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::{AccountScope, HostScope};
    use crate::store::Table;

    fn cache() -> MemoCache<bool> {
        let cache = MemoCache::new("disabled");
        cache.insert(ResourceRef::new(ResourceKind::LinuxAccount, 20), 3, BTreeSet::from([10]), true);
        cache.insert(ResourceRef::new(ResourceKind::LinuxAccount, 21), 4, BTreeSet::from([11]), false);
        cache.insert(ResourceRef::new(ResourceKind::Package, 7), 3, BTreeSet::new(), false);
        cache
    }

    fn tuple(table: Table, accounts: AccountScope, hosts: HostScope) -> InvalidationTuple {
        InvalidationTuple::new(table, accounts, hosts, false)
    }

    #[test]
    fn test_clears_only_matching_keys() {
        let cache = cache();
        let dropped = cache.invalidate(&tuple(
            Table::LinuxAccounts,
            AccountScope::One(3),
            HostScope::One(10),
        ));
        assert_eq!(dropped, 1);
        assert!(cache.get(ResourceRef::new(ResourceKind::LinuxAccount, 20)).is_none());
        assert_eq!(cache.get(ResourceRef::new(ResourceKind::LinuxAccount, 21)), Some(false));
        assert_eq!(cache.get(ResourceRef::new(ResourceKind::Package, 7)), Some(false));
    }

    #[test]
    fn test_full_table_flag() {
        let cache = cache();
        let dropped = cache.invalidate(&tuple(Table::LinuxAccounts, AccountScope::All, HostScope::All));
        assert_eq!(dropped, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unbound_entries_match_any_host() {
        let cache = cache();
        let dropped = cache.invalidate(&tuple(Table::Packages, AccountScope::One(3), HostScope::One(99)));
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_other_account_untouched() {
        let cache = cache();
        let dropped = cache.invalidate(&tuple(Table::LinuxAccounts, AccountScope::One(5), HostScope::All));
        assert_eq!(dropped, 0);
        assert_eq!(cache.len(), 3);
    }
}
