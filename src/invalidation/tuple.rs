//! # Invalidation Tuples
//!
//! The unit of cache invalidation: which table changed, for which accounts,
//! on which hosts.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::{RowId, Table};

/// Accounts whose cached rows are affected
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountScope {
    All,
    One(RowId),
}

impl AccountScope {
    /// Whether the scope covers `account`
    pub fn covers(&self, account: RowId) -> bool {
        match self {
            AccountScope::All => true,
            AccountScope::One(id) => *id == account,
        }
    }

    /// Whether the scope covers any of `accounts`
    pub fn intersects(&self, accounts: &BTreeSet<RowId>) -> bool {
        match self {
            AccountScope::All => true,
            AccountScope::One(id) => accounts.contains(id),
        }
    }
}

/// Hosts whose cached rows are affected
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostScope {
    All,
    One(RowId),
    Set(BTreeSet<RowId>),
}

impl HostScope {
    /// Scope for a resource bound to `hosts`; unbound resources affect all hosts
    pub fn from_hosts(hosts: BTreeSet<RowId>) -> Self {
        let mut iter = hosts.iter();
        match (iter.next(), iter.next()) {
            (None, _) => HostScope::All,
            (Some(host), None) => HostScope::One(*host),
            _ => HostScope::Set(hosts),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, HostScope::All)
    }

    /// Whether the scope covers any of `hosts`
    pub fn intersects(&self, hosts: &BTreeSet<RowId>) -> bool {
        match self {
            HostScope::All => true,
            HostScope::One(id) => hosts.contains(id),
            HostScope::Set(set) => !set.is_disjoint(hosts),
        }
    }
}

/// One invalidation produced by a mutation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvalidationTuple {
    pub table: Table,
    pub accounts: AccountScope,
    pub hosts: HostScope,
    /// Whether the change was requested by a client rather than the master
    pub user_initiated: bool,
}

impl InvalidationTuple {
    pub fn new(table: Table, accounts: AccountScope, hosts: HostScope, user_initiated: bool) -> Self {
        Self {
            table,
            accounts,
            hosts,
            user_initiated,
        }
    }

    /// Whether this tuple affects every account on every host
    pub fn is_full_table(&self) -> bool {
        self.accounts == AccountScope::All && self.hosts.is_all()
    }
}

impl fmt::Display for InvalidationTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accounts = match &self.accounts {
            AccountScope::All => "*".to_string(),
            AccountScope::One(id) => id.to_string(),
        };
        let hosts = match &self.hosts {
            HostScope::All => "*".to_string(),
            HostScope::One(id) => id.to_string(),
            HostScope::Set(set) => set
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>()
                .join(","),
        };
        write!(f, "{}[account={} host={}]", self.table, accounts, hosts)
    }
}
