//! # Subscription Interests
//!
//! What a connected session wants to hear about. `None` in any dimension
//! means "no restriction".

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::{RowId, Table};

use super::errors::{InvalidationError, InvalidationResult};
use super::tuple::InvalidationTuple;

/// Who is on the other end of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionKind {
    /// An administrative client, identified by principal username
    Client { username: String },
    /// A per-host daemon
    Daemon { host: RowId },
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Client { username } => write!(f, "client:{}", username),
            SessionKind::Daemon { host } => write!(f, "daemon:{}", host),
        }
    }
}

/// Subscription filter over invalidation tuples
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<BTreeSet<Table>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<BTreeSet<RowId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<BTreeSet<RowId>>,
}

impl Interest {
    /// Interest in every tuple
    pub fn everything() -> Self {
        Self::default()
    }

    /// Interest in tuples touching any of `accounts`
    pub fn for_accounts(accounts: BTreeSet<RowId>) -> Self {
        Self {
            accounts: Some(accounts),
            ..Self::default()
        }
    }

    /// Interest in tuples touching any of `hosts`
    pub fn for_hosts(hosts: BTreeSet<RowId>) -> Self {
        Self {
            hosts: Some(hosts),
            ..Self::default()
        }
    }

    /// Restrict to the given tables
    pub fn with_tables(mut self, tables: BTreeSet<Table>) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Whether a tuple intersects this interest
    pub fn matches(&self, tuple: &InvalidationTuple) -> bool {
        if let Some(tables) = &self.tables {
            if !tables.contains(&tuple.table) {
                return false;
            }
        }
        if let Some(accounts) = &self.accounts {
            if !tuple.accounts.intersects(accounts) {
                return false;
            }
        }
        if let Some(hosts) = &self.hosts {
            if !tuple.hosts.intersects(hosts) {
                return false;
            }
        }
        true
    }

    /// Narrow this interest by a client request
    ///
    /// A request may only shrink what the session sees; asking for accounts
    /// or hosts outside the current interest is rejected.
    pub fn narrow(&self, requested: &Interest) -> InvalidationResult<Interest> {
        Ok(Interest {
            tables: narrow_set(&self.tables, &requested.tables, "tables")?,
            accounts: narrow_set(&self.accounts, &requested.accounts, "accounts")?,
            hosts: narrow_set(&self.hosts, &requested.hosts, "hosts")?,
        })
    }
}

fn narrow_set<T: Ord + Clone + fmt::Debug>(
    allowed: &Option<BTreeSet<T>>,
    requested: &Option<BTreeSet<T>>,
    dimension: &str,
) -> InvalidationResult<Option<BTreeSet<T>>> {
    match (allowed, requested) {
        (_, None) => Ok(allowed.clone()),
        (None, Some(req)) => Ok(Some(req.clone())),
        (Some(allowed), Some(req)) => {
            let outside: Vec<_> = req.difference(allowed).collect();
            if outside.is_empty() {
                Ok(Some(req.clone()))
            } else {
                Err(InvalidationError::InvalidInterest(format!(
                    "{} {:?} not visible to this session",
                    dimension, outside
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::{AccountScope, HostScope};

    fn tuple(table: Table, accounts: AccountScope, hosts: HostScope) -> InvalidationTuple {
        InvalidationTuple::new(table, accounts, hosts, false)
    }

    #[test]
    fn test_everything_matches() {
        let interest = Interest::everything();
        assert!(interest.matches(&tuple(Table::Hosts, AccountScope::All, HostScope::All)));
    }

    #[test]
    fn test_account_filter() {
        let interest = Interest::for_accounts(BTreeSet::from([3, 5]));
        assert!(interest.matches(&tuple(Table::Packages, AccountScope::One(3), HostScope::All)));
        assert!(!interest.matches(&tuple(Table::Packages, AccountScope::One(4), HostScope::All)));
        // "all accounts" reaches everybody
        assert!(interest.matches(&tuple(Table::NetBinds, AccountScope::All, HostScope::One(9))));
    }

    #[test]
    fn test_host_filter() {
        let interest = Interest::for_hosts(BTreeSet::from([10]));
        assert!(interest.matches(&tuple(Table::HttpdSites, AccountScope::One(3), HostScope::One(10))));
        assert!(!interest.matches(&tuple(Table::HttpdSites, AccountScope::One(3), HostScope::One(11))));
        assert!(interest.matches(&tuple(Table::Packages, AccountScope::One(3), HostScope::All)));
        assert!(interest.matches(&tuple(
            Table::HttpdSites,
            AccountScope::One(3),
            HostScope::Set(BTreeSet::from([10, 11]))
        )));
    }

    #[test]
    fn test_table_filter() {
        let interest = Interest::everything().with_tables(BTreeSet::from([Table::MysqlUsers]));
        assert!(interest.matches(&tuple(Table::MysqlUsers, AccountScope::All, HostScope::All)));
        assert!(!interest.matches(&tuple(Table::MysqlDatabases, AccountScope::All, HostScope::All)));
    }

    #[test]
    fn test_narrow_rejects_widening() {
        let base = Interest::for_accounts(BTreeSet::from([3]));
        let wider = Interest::for_accounts(BTreeSet::from([3, 4]));
        assert!(base.narrow(&wider).is_err());

        let tables = Interest::everything().with_tables(BTreeSet::from([Table::Packages]));
        let narrowed = base.narrow(&tables).unwrap();
        assert_eq!(narrowed.accounts, Some(BTreeSet::from([3])));
        assert_eq!(narrowed.tables, Some(BTreeSet::from([Table::Packages])));
    }

    #[test]
    fn test_session_kind_serde() {
        let kind = SessionKind::Daemon { host: 10 };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "daemon");
        assert_eq!(kind.to_string(), "daemon:10");
    }
}
