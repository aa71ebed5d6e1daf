//! Principals
//!
//! An authenticated caller is either a privileged operator, scoped to an
//! explicit set of hosts (empty = every host), or an ordinary administrator
//! bound to exactly one account. Both are rows in the store.

use std::collections::BTreeSet;

use crate::errors::{MasterError, MasterResult};
use crate::invalidation::Interest;
use crate::ownership::{OwnershipResolver, ResourceKind, ResourceRef};
use crate::store::{row::DISABLE_LOG, RowExt, RowId, RowSource, Table};

use super::permission::Permission;

/// How a principal's reach is determined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Bypasses ownership checks within `hosts`; empty means global
    Operator { hosts: BTreeSet<RowId> },
    /// Reaches its own account and everything below it
    Administrator { account: RowId },
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub role: Role,
    pub permissions: BTreeSet<Permission>,
}

impl Principal {
    pub fn operator(username: impl Into<String>, hosts: BTreeSet<RowId>) -> Self {
        Self {
            username: username.into(),
            role: Role::Operator { hosts },
            permissions: BTreeSet::new(),
        }
    }

    pub fn administrator(username: impl Into<String>, account: RowId) -> Self {
        Self {
            username: username.into(),
            role: Role::Administrator { account },
            permissions: BTreeSet::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn is_global_operator(&self) -> bool {
        matches!(&self.role, Role::Operator { hosts } if hosts.is_empty())
    }

    /// The administrator's account, `None` for operators
    pub fn account(&self) -> Option<RowId> {
        match self.role {
            Role::Administrator { account } => Some(account),
            Role::Operator { .. } => None,
        }
    }

    /// Load a principal by username
    ///
    /// Operators (`master_users`) take precedence over administrators. An
    /// administrator's account is the one owning its Username (through the
    /// package); registry rows with no Username fall back to their
    /// `account` column. Disabled administrators, disabled Usernames and
    /// administrators of canceled accounts cannot act.
    pub fn load(src: &dyn RowSource, username: &str) -> MasterResult<Principal> {
        if let Some(id) = src.with_text(Table::MasterUsers, "username", username).first() {
            let row = src.require(Table::MasterUsers, *id)?;
            return Ok(Principal {
                username: username.to_string(),
                role: Role::Operator {
                    hosts: row.id_list("hosts").into_iter().collect(),
                },
                permissions: parse_permissions(row.text_list("permissions")),
            });
        }

        let id = src
            .with_text(Table::Administrators, "username", username)
            .first()
            .copied()
            .ok_or_else(|| MasterError::deny(format!("unknown principal '{}'", username)))?;
        let row = src.require(Table::Administrators, id)?;
        if !row.is_unset(DISABLE_LOG) {
            return Err(MasterError::deny(format!("administrator '{}' is disabled", username)));
        }
        let account = match src.with_text(Table::Usernames, "name", username).first() {
            Some(login) => {
                if !src.require(Table::Usernames, *login)?.is_unset(DISABLE_LOG) {
                    return Err(MasterError::deny(format!("username '{}' is disabled", username)));
                }
                OwnershipResolver::new(src)
                    .owner_account_of(ResourceRef::new(ResourceKind::Username, *login))?
            }
            None => row.ref_id("account").ok_or_else(|| {
                MasterError::internal(format!("administrator '{}' has no account", username))
            })?,
        };
        let account_row = src.require(Table::Accounts, account)?;
        if !account_row.is_unset("canceled") {
            return Err(MasterError::deny(format!(
                "account #{} of administrator '{}' is canceled",
                account, username
            )));
        }

        Ok(Principal {
            username: username.to_string(),
            role: Role::Administrator { account },
            permissions: parse_permissions(row.text_list("permissions")),
        })
    }

    /// Default subscription: everything visible to this principal
    pub fn visible_interest(&self, src: &dyn RowSource) -> MasterResult<Interest> {
        match &self.role {
            Role::Operator { hosts } if hosts.is_empty() => Ok(Interest::everything()),
            Role::Operator { hosts } => Ok(Interest::for_hosts(hosts.clone())),
            Role::Administrator { account } => {
                let subtree = OwnershipResolver::new(src).subtree(*account)?;
                Ok(Interest::for_accounts(subtree))
            }
        }
    }
}

fn parse_permissions(names: Vec<String>) -> BTreeSet<Permission> {
    names
        .iter()
        .filter_map(|name| Permission::from_name(name))
        .collect()
}
