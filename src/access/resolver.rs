//! # Access Control Resolver
//!
//! `authorize(principal, action, resource)` decides allow or deny from the
//! ownership graph, the principal's role and the sensitive-action policy.
//! Denials always name the action and the resource and are logged; there
//! is no partial authorization.

use std::sync::Arc;

use crate::errors::{MasterError, MasterResult};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::ownership::{OwnershipResolver, ResourceKind, ResourceRef};
use crate::store::{RowExt, RowId, RowSource, Table};

use super::action::Action;
use super::permission::PermissionPolicy;
use super::principal::{Principal, Role};

/// Access control decisions
#[derive(Debug)]
pub struct AccessControl {
    policy: PermissionPolicy,
    metrics: Arc<MetricsRegistry>,
}

impl AccessControl {
    pub fn new(policy: PermissionPolicy, metrics: Arc<MetricsRegistry>) -> Self {
        Self { policy, metrics }
    }

    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    /// Allow or deny `action` on `resource`
    ///
    /// A dangling `resource` is reported as `NotFound`, not as a denial.
    pub fn authorize(
        &self,
        src: &dyn RowSource,
        principal: &Principal,
        action: Action,
        resource: ResourceRef,
    ) -> MasterResult<()> {
        if let Some(reason) = self.scope_violation(src, principal, resource)? {
            return Err(self.deny(principal, action, &resource.to_string(), &reason));
        }
        self.check_permission(principal, action, &resource.to_string())
    }

    /// Authorize creating a `kind` row under `parent`
    ///
    /// `hosts` are the hosts the new row binds to or, for an account, the
    /// hosts it is granted. A scoped operator must hold every one of them.
    pub fn authorize_create(
        &self,
        src: &dyn RowSource,
        principal: &Principal,
        kind: ResourceKind,
        parent: ResourceRef,
        hosts: &[RowId],
    ) -> MasterResult<()> {
        let action = Action::add(kind);
        if let Role::Operator { hosts: scope } = &principal.role {
            if !scope.is_empty() {
                if let Some(host) = hosts.iter().find(|h| !scope.contains(*h)) {
                    let reason = format!("host #{} is outside the operator's scope", host);
                    return Err(self.deny(principal, action, &parent.to_string(), &reason));
                }
            }
        }
        self.authorize(src, principal, action, parent)
    }

    /// Authorize an account-level action such as cancel or bank accounting
    pub fn authorize_account(
        &self,
        src: &dyn RowSource,
        principal: &Principal,
        action: Action,
        account: RowId,
    ) -> MasterResult<()> {
        self.authorize(src, principal, action, ResourceRef::new(ResourceKind::Account, account))
    }

    /// Authorize enabling against the DisableLog that disabled the resource
    ///
    /// An administrator may only lift a disable issued from its own account
    /// or an account below it; disables issued by operators need an
    /// operator to lift them.
    pub fn authorize_disable_log(
        &self,
        src: &dyn RowSource,
        principal: &Principal,
        action: Action,
        log: RowId,
    ) -> MasterResult<()> {
        let row = src.require(Table::DisableLog, log)?;
        let target = format!("disable_log #{}", log);

        match &principal.role {
            Role::Operator { .. } => Ok(()),
            Role::Administrator { account } => match row.ref_id("disabled_by_account") {
                None => Err(self.deny(
                    principal,
                    action,
                    &target,
                    "disabled by a privileged operator",
                )),
                Some(by) => {
                    if OwnershipResolver::new(src).is_within(by, *account)? {
                        Ok(())
                    } else {
                        Err(self.deny(
                            principal,
                            action,
                            &target,
                            &format!("disabled by account #{} outside account #{}", by, account),
                        ))
                    }
                }
            },
        }
    }

    /// Authorize an action tied to a DisableLog row itself
    pub fn authorize_disable_log_removal(
        &self,
        src: &dyn RowSource,
        principal: &Principal,
        log: RowId,
    ) -> MasterResult<()> {
        let row = src.require(Table::DisableLog, log)?;
        if let Some(account) = row.ref_id("account") {
            if let Some(reason) =
                self.scope_violation(src, principal, ResourceRef::new(ResourceKind::Account, account))?
            {
                let target = format!("disable_log #{}", log);
                return Err(self.deny(principal, Action::RemoveDisableLog, &target, &reason));
            }
        }
        self.authorize_disable_log(src, principal, Action::RemoveDisableLog, log)
    }

    /// Why the resource is outside the principal's reach, if it is
    fn scope_violation(
        &self,
        src: &dyn RowSource,
        principal: &Principal,
        resource: ResourceRef,
    ) -> MasterResult<Option<String>> {
        let resolver = OwnershipResolver::new(src);
        let owner = resolver.owner_account_of(resource)?;

        match &principal.role {
            Role::Operator { hosts } if hosts.is_empty() => Ok(None),
            Role::Operator { hosts: scope } => {
                let bound = resolver.hosts_of(resource)?;
                if bound.is_empty() {
                    for host in scope {
                        if resolver.can_access_host(owner, *host)? {
                            return Ok(None);
                        }
                    }
                    return Ok(Some(format!(
                        "account #{} has no host within the operator's scope",
                        owner
                    )));
                }
                for host in &bound {
                    if !scope.contains(host) {
                        return Ok(Some(format!("host #{} is outside the operator's scope", host)));
                    }
                    if !resolver.can_access_host(owner, *host)? {
                        return Ok(Some(format!(
                            "account #{} has no grant for host #{}",
                            owner, host
                        )));
                    }
                }
                Ok(None)
            }
            Role::Administrator { account } => {
                if resolver.is_within(owner, *account)? {
                    Ok(None)
                } else {
                    Ok(Some(format!(
                        "owned by account #{} outside account #{}",
                        owner, account
                    )))
                }
            }
        }
    }

    fn check_permission(&self, principal: &Principal, action: Action, target: &str) -> MasterResult<()> {
        match self.policy.required(action) {
            Some(permission) if !principal.has_permission(permission) => Err(self.deny(
                principal,
                action,
                target,
                &format!("missing permission {}", permission),
            )),
            _ => Ok(()),
        }
    }

    fn deny(&self, principal: &Principal, action: Action, target: &str, reason: &str) -> MasterError {
        self.metrics.increment_denied();
        let action_name = action.name();
        Logger::event(
            Event::AccessDenied,
            &[
                ("action", &action_name),
                ("principal", &principal.username),
                ("reason", reason),
                ("resource", target),
            ],
        );
        MasterError::deny(format!(
            "{} may not {} on {}: {}",
            principal.username, action_name, target, reason
        ))
    }
}

impl Default for AccessControl {
    fn default() -> Self {
        Self::new(PermissionPolicy::default(), Arc::new(MetricsRegistry::new()))
    }
}
