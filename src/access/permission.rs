//! Permission bits and the sensitive-action policy
//!
//! Most actions are decided by ownership alone. Sensitive ones additionally
//! need a permission bit granted to the principal; which actions are
//! sensitive is configuration.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{MasterError, MasterResult};
use crate::ownership::ResourceKind;

use super::action::{Action, Verb};

/// Fine-grained permission bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    AddCreditCard,
    EditCreditCard,
    RemoveCreditCard,
    SetPassword,
    BankAccounting,
    CancelAccount,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::AddCreditCard => "add_credit_card",
            Permission::EditCreditCard => "edit_credit_card",
            Permission::RemoveCreditCard => "remove_credit_card",
            Permission::SetPassword => "set_password",
            Permission::BankAccounting => "bank_accounting",
            Permission::CancelAccount => "cancel_account",
        }
    }

    pub fn from_name(name: &str) -> Option<Permission> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which actions need which permission bit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    required: BTreeMap<Action, Permission>,
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        let required = BTreeMap::from([
            (Action::add(ResourceKind::CreditCard), Permission::AddCreditCard),
            (
                Action::Resource(Verb::Edit, ResourceKind::CreditCard),
                Permission::EditCreditCard,
            ),
            (Action::remove(ResourceKind::CreditCard), Permission::RemoveCreditCard),
            (
                Action::Resource(Verb::SetPassword, ResourceKind::LinuxAccount),
                Permission::SetPassword,
            ),
            (
                Action::Resource(Verb::SetPassword, ResourceKind::MysqlUser),
                Permission::SetPassword,
            ),
            (Action::AccessBankAccounting, Permission::BankAccounting),
        ]);
        Self { required }
    }
}

impl PermissionPolicy {
    /// A policy where no action needs a permission bit
    pub fn empty() -> Self {
        Self {
            required: BTreeMap::new(),
        }
    }

    /// The built-in policy with `overrides` (action name → permission name) applied
    pub fn with_overrides(overrides: &HashMap<String, String>) -> MasterResult<Self> {
        let mut policy = Self::default();
        for (action, permission) in overrides {
            let action = Action::from_name(action)
                .ok_or_else(|| MasterError::validation(format!("unknown action '{}'", action)))?;
            let permission = Permission::from_name(permission).ok_or_else(|| {
                MasterError::validation(format!("unknown permission '{}'", permission))
            })?;
            policy.required.insert(action, permission);
        }
        Ok(policy)
    }

    /// The permission bit `action` needs, if any
    pub fn required(&self, action: Action) -> Option<Permission> {
        self.required.get(&action).copied()
    }
}
