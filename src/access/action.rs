//! Action identifiers
//!
//! The closed set of action names the access control resolver understands.
//! Names are stable: they appear in permission configuration and in denial
//! messages.

use std::fmt;

use crate::ownership::ResourceKind;

/// What is being done to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Add,
    Edit,
    Disable,
    Enable,
    Remove,
    SetPassword,
    View,
}

impl Verb {
    pub const ALL: [Verb; 7] = [
        Verb::Add,
        Verb::Edit,
        Verb::Disable,
        Verb::Enable,
        Verb::Remove,
        Verb::SetPassword,
        Verb::View,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Add => "add",
            Verb::Edit => "edit",
            Verb::Disable => "disable",
            Verb::Enable => "enable",
            Verb::Remove => "remove",
            Verb::SetPassword => "set_password",
            Verb::View => "view",
        }
    }
}

/// An authorizable action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    /// A lifecycle verb applied to one resource type, e.g. `add_credit_card`
    Resource(Verb, ResourceKind),
    CancelAccount,
    RemoveDisableLog,
    AccessBankAccounting,
}

impl Action {
    pub fn add(kind: ResourceKind) -> Self {
        Action::Resource(Verb::Add, kind)
    }

    pub fn disable(kind: ResourceKind) -> Self {
        Action::Resource(Verb::Disable, kind)
    }

    pub fn enable(kind: ResourceKind) -> Self {
        Action::Resource(Verb::Enable, kind)
    }

    pub fn remove(kind: ResourceKind) -> Self {
        Action::Resource(Verb::Remove, kind)
    }

    /// Every known action
    pub fn all() -> Vec<Action> {
        let mut actions: Vec<Action> = Verb::ALL
            .into_iter()
            .flat_map(|verb| {
                ResourceKind::ALL
                    .into_iter()
                    .map(move |kind| Action::Resource(verb, kind))
            })
            .collect();
        actions.extend([
            Action::CancelAccount,
            Action::RemoveDisableLog,
            Action::AccessBankAccounting,
        ]);
        actions
    }

    /// Stable action name
    pub fn name(&self) -> String {
        match self {
            Action::Resource(verb, kind) => format!("{}_{}", verb.as_str(), kind.as_str()),
            Action::CancelAccount => "cancel_account".to_string(),
            Action::RemoveDisableLog => "remove_disable_log".to_string(),
            Action::AccessBankAccounting => "access_bank_accounting".to_string(),
        }
    }

    /// Look an action up by name
    pub fn from_name(name: &str) -> Option<Action> {
        Action::all().into_iter().find(|a| a.name() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
