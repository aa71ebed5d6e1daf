//! # Resource Lifecycle Manager
//!
//! Create / Disable / Enable / Remove for every resource type, driven by
//! the descriptor table. Each operation is one unit of work: preconditions
//! are evaluated inside the transaction, and either every row change and
//! every recorded invalidation survives to commit or none does.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::access::{AccessControl, Action, Principal, Verb};
use crate::auth::hash_password;
use crate::errors::{MasterError, MasterResult};
use crate::invalidation::{Broadcaster, MemoCache};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::ownership::{OwnershipResolver, ResourceKind, ResourceRef};
use crate::shared::{self, SweepReport};
use crate::store::{into_row, row::DISABLE_LOG, Row, RowExt, RowId, RowSource, Store, Table};

use super::disable_log;
use super::remove::{self, RemovalReport};
use super::request::{CreateRequest, CreditCardUpdate};
use super::work::UnitOfWork;

/// Owner and hosts of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerInfo {
    pub resource: ResourceRef,
    pub account: RowId,
    pub hosts: BTreeSet<RowId>,
}

/// Committed password change still to be pushed to the host daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordChange {
    pub resource: ResourceRef,
    pub host: RowId,
    /// Login name on the host
    pub login: String,
}

/// The lifecycle engine
#[derive(Debug)]
pub struct LifecycleManager {
    store: Arc<Store>,
    broadcaster: Arc<Broadcaster>,
    access: Arc<AccessControl>,
    metrics: Arc<MetricsRegistry>,
    disabled: Arc<MemoCache<bool>>,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<Store>,
        broadcaster: Arc<Broadcaster>,
        access: Arc<AccessControl>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let disabled = Arc::new(MemoCache::new("disabled"));
        broadcaster.register_cache(disabled.clone());
        Self {
            store,
            broadcaster,
            access,
            metrics,
            disabled,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn access(&self) -> &Arc<AccessControl> {
        &self.access
    }

    /// Load the principal for `username` from committed state
    pub fn principal(&self, username: &str) -> MasterResult<Principal> {
        self.store.read(|t| Principal::load(t, username))?
    }

    /// Run `op` as one unit of work, committing on success
    fn run<T>(
        &self,
        operation: &str,
        user_initiated: bool,
        op: impl FnOnce(&mut UnitOfWork<'_>) -> MasterResult<T>,
    ) -> MasterResult<T> {
        let mut work = UnitOfWork::begin(&self.store, &self.broadcaster, user_initiated)?;
        match op(&mut work) {
            Ok(value) => match work.commit(&self.broadcaster) {
                Ok(_) => {
                    self.metrics.increment_committed();
                    Ok(value)
                }
                Err(err) => {
                    self.metrics.increment_aborted();
                    Err(err)
                }
            },
            Err(err) => {
                self.metrics.increment_aborted();
                work.abort(&format!("{}: {}", operation, err));
                Err(err)
            }
        }
    }

    // ==================
    // Create
    // ==================

    /// Create a resource
    pub fn create(&self, principal: &Principal, request: CreateRequest) -> MasterResult<ResourceRef> {
        request.validate()?;
        let kind = request.kind();

        let created = self.run("create", true, |work| {
            let parent = request.parent();
            self.access
                .authorize_create(work.rows(), principal, kind, parent, &request.target_hosts())?;
            ensure_chain_active(work.rows(), parent, 0)?;

            if let Some(host) = request.host() {
                work.rows().require(Table::Hosts, host)?;
                let owner = work.resolver().owner_account_of(parent)?;
                if !work.resolver().can_access_host(owner, host)? {
                    return Err(MasterError::precondition(format!(
                        "account #{} has no access to host #{}",
                        owner, host
                    )));
                }
            }

            insert_resource(work, principal, &request)
        })?;

        let id = created.id.to_string();
        Logger::event(
            Event::ResourceCreated,
            &[("kind", kind.as_str()), ("id", &id), ("principal", &principal.username)],
        );
        Ok(created)
    }

    // ==================
    // Disable / Enable
    // ==================

    /// Disable a resource; returns the new DisableLog
    pub fn disable(&self, principal: &Principal, resource: ResourceRef, reason: &str) -> MasterResult<RowId> {
        let log = self.run("disable", true, |work| {
            require_disableable(resource)?;
            self.access
                .authorize(work.rows(), principal, Action::disable(resource.kind), resource)?;

            let row = work.rows().require(resource.table(), resource.id)?;
            if !row.is_unset(DISABLE_LOG) {
                return Err(MasterError::precondition(format!("{} is already disabled", resource)));
            }
            if let Some(dependent) = first_enabled_dependent(work.rows(), resource) {
                return Err(MasterError::precondition(format!(
                    "cannot disable {}: {} is still enabled",
                    resource, dependent
                )));
            }

            let owner = work.resolver().owner_account_of(resource)?;
            let log = disable_log::create(work, owner, principal, reason)?;
            work.set(resource.table(), resource.id, DISABLE_LOG, json!(log))?;
            work.record_for(resource.table(), resource)?;
            Ok(log)
        })?;

        let target = resource.to_string();
        let log_id = log.to_string();
        Logger::event(
            Event::ResourceDisabled,
            &[("resource", &target), ("disable_log", &log_id), ("principal", &principal.username)],
        );
        Ok(log)
    }

    /// Enable a disabled resource; dependents stay as they are
    pub fn enable(&self, principal: &Principal, resource: ResourceRef) -> MasterResult<()> {
        self.run("enable", true, |work| {
            require_disableable(resource)?;
            let action = Action::enable(resource.kind);
            self.access.authorize(work.rows(), principal, action, resource)?;

            let row = work.rows().require(resource.table(), resource.id)?;
            let log = row.ref_id(DISABLE_LOG).ok_or_else(|| {
                MasterError::precondition(format!("{} is not disabled", resource))
            })?;
            if resource.kind == ResourceKind::Account && !row.is_unset("canceled") {
                return Err(MasterError::precondition(format!(
                    "{} is canceled and cannot be enabled",
                    resource
                )));
            }
            self.access
                .authorize_disable_log(work.rows(), principal, action, log)?;
            ensure_chain_active(work.rows(), resource, 1)?;

            work.set(resource.table(), resource.id, DISABLE_LOG, Value::Null)?;
            work.record_for(resource.table(), resource)?;
            disable_log::release_if_unused(work, log)?;
            Ok(())
        })?;

        let target = resource.to_string();
        Logger::event(
            Event::ResourceEnabled,
            &[("resource", &target), ("principal", &principal.username)],
        );
        Ok(())
    }

    /// Whether a resource is disabled, memoized until invalidated
    pub fn is_disabled(&self, resource: ResourceRef) -> MasterResult<bool> {
        if let Some(disabled) = self.disabled.get(resource) {
            return Ok(disabled);
        }

        // populated under the store lock so a concurrent flush cannot slip
        // in between the read and the insert
        self.store.read(|t| -> MasterResult<bool> {
            let row = t.require(resource.table(), resource.id)?;
            let disabled = !row.is_unset(DISABLE_LOG);
            let resolver = OwnershipResolver::new(t);
            let account = resolver.owner_account_of(resource)?;
            let hosts = resolver.hosts_of(resource)?;
            self.disabled.insert(resource, account, hosts, disabled);
            Ok(disabled)
        })?
    }

    // ==================
    // Remove
    // ==================

    /// Remove a resource and everything depending on it
    pub fn remove(&self, principal: &Principal, resource: ResourceRef) -> MasterResult<RemovalReport> {
        let report = self.run("remove", true, |work| {
            self.access
                .authorize(work.rows(), principal, Action::remove(resource.kind), resource)?;
            remove::execute(work, resource)
        })?;

        for _ in &report.reclaimed {
            self.metrics.increment_reclaimed();
        }
        let target = resource.to_string();
        let rows = report.removed.len().to_string();
        let reclaimed = report.reclaimed.len().to_string();
        Logger::event(
            Event::ResourceRemoved,
            &[
                ("resource", &target),
                ("rows", &rows),
                ("reclaimed", &reclaimed),
                ("principal", &principal.username),
            ],
        );
        Ok(report)
    }

    // ==================
    // Account cancel, DisableLog removal
    // ==================

    /// Cancel a disabled account; a canceled account is never enabled again
    pub fn cancel_account(&self, principal: &Principal, account: RowId) -> MasterResult<()> {
        let resource = ResourceRef::new(ResourceKind::Account, account);
        self.run("cancel_account", true, |work| {
            self.access
                .authorize_account(work.rows(), principal, Action::CancelAccount, account)?;
            let row = work.rows().require(Table::Accounts, account)?;
            if !row.is_unset("canceled") {
                return Err(MasterError::precondition(format!("{} is already canceled", resource)));
            }
            if row.is_unset(DISABLE_LOG) {
                return Err(MasterError::precondition(format!(
                    "{} must be disabled before it is canceled",
                    resource
                )));
            }
            work.set(Table::Accounts, account, "canceled", json!(now()))?;
            work.record_for(Table::Accounts, resource)
        })?;

        let target = resource.to_string();
        Logger::event(
            Event::AccountCanceled,
            &[("account", &target), ("principal", &principal.username)],
        );
        Ok(())
    }

    /// Remove a DisableLog nothing references any more
    pub fn remove_disable_log(&self, principal: &Principal, log: RowId) -> MasterResult<()> {
        self.run("remove_disable_log", true, |work| {
            self.access
                .authorize_disable_log_removal(work.rows(), principal, log)?;
            disable_log::remove(work, log)
        })
    }

    // ==================
    // Edits
    // ==================

    /// Edit the stored fields of a credit card
    pub fn edit_credit_card(&self, principal: &Principal, card: RowId, update: CreditCardUpdate) -> MasterResult<()> {
        update.validate()?;
        let resource = ResourceRef::new(ResourceKind::CreditCard, card);
        self.run("edit_credit_card", true, |work| {
            self.access.authorize(
                work.rows(),
                principal,
                Action::Resource(Verb::Edit, ResourceKind::CreditCard),
                resource,
            )?;
            let mut changes = Row::new();
            if let Some(number) = &update.masked_number {
                changes.insert("masked_number".to_string(), json!(number));
            }
            if let Some(month) = update.expiration_month {
                changes.insert("expiration_month".to_string(), json!(month));
            }
            if let Some(year) = update.expiration_year {
                changes.insert("expiration_year".to_string(), json!(year));
            }
            if changes.is_empty() {
                return Err(MasterError::validation("nothing to change"));
            }
            work.update(Table::CreditCards, card, changes)?;
            work.record_for(Table::CreditCards, resource)
        })
    }

    /// Store a new password hash for a linux account or mysql user
    ///
    /// The clear text is returned to the caller only through the daemon
    /// push; the committed row holds the hash.
    pub fn set_password(&self, principal: &Principal, resource: ResourceRef, password: &str) -> MasterResult<PasswordChange> {
        if !matches!(resource.kind, ResourceKind::LinuxAccount | ResourceKind::MysqlUser) {
            return Err(MasterError::validation(format!(
                "{} does not have a password",
                resource.kind
            )));
        }
        let hash = hash_password(password)?;

        let change = self.run("set_password", true, |work| {
            self.access.authorize(
                work.rows(),
                principal,
                Action::Resource(Verb::SetPassword, resource.kind),
                resource,
            )?;
            let row = work.rows().require(resource.table(), resource.id)?;
            let host = row.ref_id("host").ok_or_else(|| {
                MasterError::internal(format!("{} is not bound to a host", resource))
            })?;
            let username = row.ref_id("username").ok_or_else(|| {
                MasterError::internal(format!("{} has no username", resource))
            })?;
            let login = work
                .rows()
                .require(Table::Usernames, username)?
                .text("name")
                .unwrap_or_default()
                .to_string();

            work.set(resource.table(), resource.id, "password", json!(hash))?;
            work.record_for(resource.table(), resource)?;
            Ok(PasswordChange { resource, host, login })
        })?;

        let target = resource.to_string();
        Logger::event(
            Event::PasswordSet,
            &[("resource", &target), ("principal", &principal.username)],
        );
        Ok(change)
    }

    // ==================
    // Reads
    // ==================

    /// Owning account and hosts of a resource
    pub fn owner(&self, principal: &Principal, resource: ResourceRef) -> MasterResult<OwnerInfo> {
        self.store.read(|t| {
            self.access.authorize(
                t,
                principal,
                Action::Resource(Verb::View, resource.kind),
                resource,
            )?;
            let resolver = OwnershipResolver::new(t);
            Ok(OwnerInfo {
                resource,
                account: resolver.owner_account_of(resource)?,
                hosts: resolver.hosts_of(resource)?,
            })
        })?
    }

    /// Committed contents of a resource row
    pub fn get(&self, principal: &Principal, resource: ResourceRef) -> MasterResult<Row> {
        self.store.read(|t| {
            self.access.authorize(
                t,
                principal,
                Action::Resource(Verb::View, resource.kind),
                resource,
            )?;
            let mut row = t.require(resource.table(), resource.id)?.clone();
            row.remove("password");
            Ok(row)
        })?
    }

    // ==================
    // Reconciliation
    // ==================

    /// Reclaim every unreferenced shared row and DisableLog
    pub fn reconcile(&self) -> MasterResult<SweepReport> {
        let report = self.run("reconcile", false, shared::sweep)?;
        for _ in &report.reclaimed {
            self.metrics.increment_reclaimed();
        }
        Ok(report)
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn require_disableable(resource: ResourceRef) -> MasterResult<()> {
    if resource.kind.descriptor().disableable {
        Ok(())
    } else {
        Err(MasterError::validation(format!("{} cannot be disabled", resource.kind)))
    }
}

/// Fail when any row of the owner chain from `skip` onward, or any ancestor
/// of the owning account, is disabled or canceled
fn ensure_chain_active(src: &dyn RowSource, resource: ResourceRef, skip: usize) -> MasterResult<()> {
    let resolver = OwnershipResolver::new(src);
    let mut chain = resolver.owner_chain(resource)?;
    if let Some(&(Table::Accounts, owner)) = chain.last() {
        let ancestors = resolver.lineage(owner)?;
        chain.extend(ancestors.into_iter().skip(1).map(|id| (Table::Accounts, id)));
    }
    for (table, id) in chain.into_iter().skip(skip) {
        let row = src.require(table, id)?;
        if table == Table::Accounts && !row.is_unset("canceled") {
            return Err(MasterError::precondition(format!("account #{} is canceled", id)));
        }
        if !row.is_unset(DISABLE_LOG) {
            let name = ResourceKind::for_table(table)
                .map(|k| k.as_str())
                .unwrap_or_else(|| table.as_str());
            return Err(MasterError::precondition(format!("{} #{} is disabled", name, id)));
        }
    }
    Ok(())
}

/// The first direct dependent that is disableable and still enabled
fn first_enabled_dependent(src: &dyn RowSource, resource: ResourceRef) -> Option<ResourceRef> {
    let descriptor = resource.kind.descriptor();
    let mut candidates: Vec<(ResourceKind, &'static str)> = descriptor
        .dependents
        .iter()
        .filter_map(|dep| match dep.rows {
            crate::ownership::DependentRows::Resource(kind) if kind.descriptor().disableable => {
                Some((kind, dep.column))
            }
            _ => None,
        })
        .collect();
    if resource.kind == ResourceKind::Account {
        candidates.insert(0, (ResourceKind::Account, "parent"));
    }

    candidates.into_iter().find_map(|(kind, column)| {
        src.referencing(kind.table(), column, resource.id)
            .into_iter()
            .find(|id| {
                src.row(kind.table(), *id)
                    .map(|row| row.is_unset(DISABLE_LOG))
                    .unwrap_or(false)
            })
            .map(|id| ResourceRef::new(kind, id))
    })
}

/// Insert the row(s) for a validated, authorized request
fn insert_resource(work: &mut UnitOfWork<'_>, principal: &Principal, request: &CreateRequest) -> MasterResult<ResourceRef> {
    let kind = request.kind();
    let table = kind.table();

    let id = match request {
        CreateRequest::Account { parent, name, hosts } => {
            unique(work.rows(), Table::Accounts, &[("name", json!(name))], "account", name)?;
            for host in hosts {
                work.rows().require(Table::Hosts, *host)?;
                if !work.resolver().can_access_host(*parent, *host)? {
                    return Err(MasterError::precondition(format!(
                        "account #{} has no access to host #{}",
                        parent, host
                    )));
                }
            }
            let id = insert(work, table, json!({
                "name": name,
                "parent": parent,
                "canceled": null,
                "disable_log": null,
                "created": now(),
                "created_by": principal.username,
            }))?;
            for host in hosts {
                insert(work, Table::AccountHosts, json!({ "account": id, "host": host }))?;
            }
            if !hosts.is_empty() {
                work.record_for(Table::AccountHosts, ResourceRef::new(ResourceKind::Account, id))?;
            }
            id
        }
        CreateRequest::Package { account, name } => {
            unique(work.rows(), table, &[("name", json!(name))], "package", name)?;
            insert(work, table, json!({
                "account": account,
                "name": name,
                "disable_log": null,
                "created": now(),
            }))?
        }
        CreateRequest::Username { package, name } => {
            unique(work.rows(), table, &[("name", json!(name))], "username", name)?;
            insert(work, table, json!({ "package": package, "name": name, "disable_log": null }))?
        }
        CreateRequest::LinuxAccount { username, host, group, home } => {
            unique(
                work.rows(),
                table,
                &[("username", json!(username)), ("host", json!(host))],
                "linux account for username",
                &username.to_string(),
            )?;
            let name = work
                .rows()
                .require(Table::Usernames, *username)?
                .text("name")
                .unwrap_or_default()
                .to_string();
            let home = home.clone().unwrap_or_else(|| format!("/home/{}", name));
            let gid = shared::acquire_linux_group(work, *host, group)?;
            insert(work, table, json!({
                "username": username,
                "host": host,
                "group": gid,
                "home": home,
                "password": null,
                "disable_log": null,
            }))?
        }
        CreateRequest::MysqlDatabase { package, host, name } => {
            unique(
                work.rows(),
                table,
                &[("name", json!(name)), ("host", json!(host))],
                "mysql database",
                name,
            )?;
            insert(work, table, json!({ "package": package, "host": host, "name": name }))?
        }
        CreateRequest::MysqlUser { username, host } => {
            unique(
                work.rows(),
                table,
                &[("username", json!(username)), ("host", json!(host))],
                "mysql user for username",
                &username.to_string(),
            )?;
            insert(work, table, json!({
                "username": username,
                "host": host,
                "password": null,
                "disable_log": null,
            }))?
        }
        CreateRequest::HttpdSite { package, host, name } => {
            unique(
                work.rows(),
                table,
                &[("name", json!(name)), ("host", json!(host))],
                "httpd site",
                name,
            )?;
            let site = insert(work, table, json!({
                "package": package,
                "host": host,
                "name": name,
                "disable_log": null,
            }))?;
            let context = insert(
                work,
                Table::HttpdTomcatContexts,
                json!({ "site": site, "path": "" }),
            )?;
            work.record_for(
                Table::HttpdTomcatContexts,
                ResourceRef::new(ResourceKind::HttpdTomcatContext, context),
            )?;
            site
        }
        CreateRequest::HttpdSiteBind { site, ip_address, port, protocol } => {
            let host = work
                .rows()
                .require(Table::HttpdSites, *site)?
                .ref_id("host")
                .ok_or_else(|| MasterError::internal(format!("httpd_site #{} has no host", site)))?;
            let ip = shared::acquire_ip_address(work, host, ip_address)?;
            let net_bind = shared::acquire_net_bind(work, host, ip, *port, *protocol)?;
            unique(
                work.rows(),
                table,
                &[("site", json!(site)), ("net_bind", json!(net_bind))],
                "site bind",
                &format!("{}:{}/{}", ip_address, port, protocol.as_str()),
            )?;
            insert(work, table, json!({ "site": site, "net_bind": net_bind, "disable_log": null }))?
        }
        CreateRequest::HttpdSiteUrl { site_bind, hostname } => {
            unique(
                work.rows(),
                table,
                &[("site_bind", json!(site_bind)), ("hostname", json!(hostname))],
                "site url",
                hostname,
            )?;
            insert(work, table, json!({ "site_bind": site_bind, "hostname": hostname }))?
        }
        CreateRequest::HttpdTomcatContext { site, path } => {
            unique(
                work.rows(),
                table,
                &[("site", json!(site)), ("path", json!(path))],
                "tomcat context",
                path,
            )?;
            insert(work, table, json!({ "site": site, "path": path }))?
        }
        CreateRequest::CreditCard { account, masked_number, expiration_month, expiration_year } => {
            insert(work, table, json!({
                "account": account,
                "masked_number": masked_number,
                "expiration_month": expiration_month,
                "expiration_year": expiration_year,
                "created_by": principal.username,
            }))?
        }
    };

    let created = ResourceRef::new(kind, id);
    work.record_for(table, created)?;
    Ok(created)
}

fn insert(work: &mut UnitOfWork<'_>, table: Table, value: Value) -> MasterResult<RowId> {
    work.insert(table, into_row(table, value)?)
}

/// Fail when a row with the same identifying columns exists
fn unique(src: &dyn RowSource, table: Table, columns: &[(&str, Value)], what: &str, label: &str) -> MasterResult<()> {
    let clash = src
        .rows(table)
        .any(|(_, row)| columns.iter().all(|(column, value)| row.get(*column) == Some(value)));
    if clash {
        Err(MasterError::precondition(format!("{} '{}' already exists", what, label)))
    } else {
        Ok(())
    }
}
