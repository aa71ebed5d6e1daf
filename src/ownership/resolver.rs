//! # Ownership Graph Resolver
//!
//! Answers "which account owns this?" and "which hosts does it live on?" by
//! walking the join chains declared in the resource descriptors. Pure reads;
//! a dangling reference is reported as `NotFound`.

use std::collections::{BTreeSet, VecDeque};

use crate::errors::{MasterError, MasterResult};
use crate::invalidation::{AccountScope, HostScope};
use crate::store::{RowExt, RowId, RowSource, Table};

use super::descriptor::{Hop, ResourceRef};

/// Read-only resolver over committed state or an open transaction
pub struct OwnershipResolver<'a> {
    src: &'a dyn RowSource,
}

impl<'a> OwnershipResolver<'a> {
    pub fn new(src: &'a dyn RowSource) -> Self {
        Self { src }
    }

    /// Follow `hops` from `(table, id)`, returning every row visited
    fn walk(&self, table: Table, id: RowId, hops: &[Hop]) -> MasterResult<Vec<(Table, RowId)>> {
        let mut visited = Vec::with_capacity(hops.len() + 1);
        let (mut table, mut id) = (table, id);

        self.src.require(table, id)?;
        visited.push((table, id));

        for hop in hops {
            let row = self.src.require(table, id)?;
            let next = row.ref_id(hop.column).ok_or_else(|| {
                MasterError::not_found(format!("{} #{} has no {}", table, id, hop.column))
            })?;
            self.src.require(hop.table, next)?;
            table = hop.table;
            id = next;
            visited.push((table, id));
        }

        Ok(visited)
    }

    /// The owning account of a resource
    pub fn owner_account_of(&self, resource: ResourceRef) -> MasterResult<RowId> {
        self.owner_chain(resource)?
            .last()
            .map(|(_, id)| *id)
            .ok_or_else(|| MasterError::internal(format!("empty owner chain for {}", resource)))
    }

    /// Every row from the resource up to and including its owning account
    pub fn owner_chain(&self, resource: ResourceRef) -> MasterResult<Vec<(Table, RowId)>> {
        let descriptor = resource.kind.descriptor();
        self.walk(descriptor.table, resource.id, descriptor.owner)
            .map_err(|e| match e {
                MasterError::NotFound(msg) => {
                    MasterError::not_found(format!("{}: {}", resource, msg))
                }
                other => other,
            })
    }

    /// Hosts a resource is bound to; empty for unbound types
    pub fn hosts_of(&self, resource: ResourceRef) -> MasterResult<BTreeSet<RowId>> {
        let descriptor = resource.kind.descriptor();
        let path = match descriptor.host {
            Some(path) => path,
            None => {
                self.src.require(descriptor.table, resource.id)?;
                return Ok(BTreeSet::new());
            }
        };

        let visited = self.walk(descriptor.table, resource.id, path.hops)?;
        let (table, id) = visited
            .last()
            .copied()
            .ok_or_else(|| MasterError::internal(format!("empty host chain for {}", resource)))?;
        let row = self.src.require(table, id)?;

        Ok(row.ref_id(path.column).into_iter().collect())
    }

    /// Invalidation scope of a resource
    pub fn scope_of(&self, resource: ResourceRef) -> MasterResult<(AccountScope, HostScope)> {
        let account = self.owner_account_of(resource)?;
        let hosts = self.hosts_of(resource)?;
        Ok((AccountScope::One(account), HostScope::from_hosts(hosts)))
    }

    /// The account followed by each of its ancestors up to the root
    pub fn lineage(&self, account: RowId) -> MasterResult<Vec<RowId>> {
        let mut lineage = Vec::new();
        let mut current = Some(account);

        while let Some(id) = current {
            if lineage.contains(&id) {
                return Err(MasterError::internal(format!(
                    "account tree contains a cycle through account #{}",
                    id
                )));
            }
            let row = self.src.require(Table::Accounts, id)?;
            lineage.push(id);
            current = row.ref_id("parent");
        }

        Ok(lineage)
    }

    /// Whether `account` is `ancestor` or lies anywhere below it
    pub fn is_within(&self, account: RowId, ancestor: RowId) -> MasterResult<bool> {
        Ok(self.lineage(account)?.contains(&ancestor))
    }

    /// `account` and every account below it
    pub fn subtree(&self, account: RowId) -> MasterResult<BTreeSet<RowId>> {
        self.src.require(Table::Accounts, account)?;

        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([account]);
        while let Some(id) = queue.pop_front() {
            if !found.insert(id) {
                continue;
            }
            queue.extend(self.src.referencing(Table::Accounts, "parent", id));
        }

        Ok(found)
    }

    /// Whether the account or one of its ancestors holds a grant for `host`
    pub fn can_access_host(&self, account: RowId, host: RowId) -> MasterResult<bool> {
        let lineage = self.lineage(account)?;
        Ok(self.src.rows(Table::AccountHosts).any(|(_, grant)| {
            grant.ref_id("host") == Some(host)
                && grant
                    .ref_id("account")
                    .map(|a| lineage.contains(&a))
                    .unwrap_or(false)
        }))
    }
}
