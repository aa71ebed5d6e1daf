//! Generic removal executor
//!
//! Walks the descriptor of the resource being removed: guards first, then
//! every dependent category in declaration order, then the row itself.
//! Shared rows and DisableLogs the removed rows referenced are released
//! afterwards, inside the same unit of work.

use serde::Serialize;

use crate::errors::{MasterError, MasterResult};
use crate::invalidation::HostScope;
use crate::observability::{Event, Logger};
use crate::ownership::{DependentRows, ResourceKind, ResourceRef};
use crate::shared::{reclaim_if_unused, SharedRef};
use crate::store::{row::DISABLE_LOG, Row, RowExt, RowId};

use super::disable_log;
use super::work::UnitOfWork;

/// Everything a removal deleted
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// Resources removed, dependents before their parent
    pub removed: Vec<ResourceRef>,
    /// Shared rows reclaimed afterwards
    pub reclaimed: Vec<SharedRef>,
    /// DisableLogs deleted afterwards
    pub disable_logs: Vec<RowId>,
    /// Cleanups that failed and were left to the reconciliation sweep
    pub deferred: usize,
}

#[derive(Default)]
struct Released {
    shared: Vec<SharedRef>,
    disable_logs: Vec<RowId>,
}

/// Remove `resource` with all its dependents
pub fn execute(work: &mut UnitOfWork<'_>, resource: ResourceRef) -> MasterResult<RemovalReport> {
    let mut report = RemovalReport::default();
    let mut released = Released::default();

    remove_tree(work, resource, &mut report, &mut released)?;

    for shared in released.shared {
        match reclaim_if_unused(work, shared) {
            Ok(reclaimed) => report.reclaimed.extend(reclaimed),
            Err(err) => {
                report.deferred += 1;
                let target = shared.to_string();
                let reason = err.to_string();
                Logger::event(Event::ReclaimDeferred, &[("shared", &target), ("reason", &reason)]);
            }
        }
    }
    for log in released.disable_logs {
        match disable_log::release_if_unused(work, log) {
            Ok(true) => report.disable_logs.push(log),
            Ok(false) => {}
            Err(err) => {
                report.deferred += 1;
                let target = format!("disable_log #{}", log);
                let reason = err.to_string();
                Logger::event(Event::ReclaimDeferred, &[("disable_log", &target), ("reason", &reason)]);
            }
        }
    }

    Ok(report)
}

fn remove_tree(
    work: &mut UnitOfWork<'_>,
    resource: ResourceRef,
    report: &mut RemovalReport,
    released: &mut Released,
) -> MasterResult<()> {
    let descriptor = resource.kind.descriptor();
    let row = work.rows().require(descriptor.table, resource.id)?.clone();

    for guard in descriptor.guards {
        if let Some(reason) = guard(work.rows(), resource.id, &row) {
            return Err(MasterError::precondition(format!(
                "cannot remove {}: {}",
                resource, reason
            )));
        }
    }

    // scope must be resolved while the owner chain still exists
    let (accounts, hosts) = work.resolver().scope_of(resource)?;

    for dependent in descriptor.dependents {
        let ids = work
            .rows()
            .referencing(dependent.rows.table(), dependent.column, resource.id);
        for id in ids {
            match dependent.rows {
                DependentRows::Resource(kind) => {
                    remove_tree(work, ResourceRef::new(kind, id), report, released)?;
                }
                DependentRows::Rows(table) => {
                    let removed = work.delete(table, id)?;
                    let hosts = removed
                        .ref_id("host")
                        .map(HostScope::One)
                        .unwrap_or(HostScope::All);
                    work.record(table, accounts.clone(), hosts);
                }
            }
        }
    }

    work.delete(descriptor.table, resource.id)?;
    work.record(descriptor.table, accounts, hosts);
    report.removed.push(resource);

    for shared in shared_refs(resource.kind, &row) {
        if !released.shared.contains(&shared) {
            released.shared.push(shared);
        }
    }
    if let Some(log) = row.ref_id(DISABLE_LOG) {
        if !released.disable_logs.contains(&log) {
            released.disable_logs.push(log);
        }
    }
    Ok(())
}

/// Shared rows referenced by a row, per its descriptor
fn shared_refs(kind: ResourceKind, row: &Row) -> Vec<SharedRef> {
    kind.descriptor()
        .shared
        .iter()
        .filter_map(|link| row.ref_id(link.column).map(|id| SharedRef::new(link.kind, id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::{Broadcaster, Interest, SessionKind};
    use crate::shared::SharedKind;
    use crate::store::{RowSource, Seed, Store, Table};
    use serde_json::json;

    /// acme(1) on host 2 with a site, one bind on 10.0.0.1:80 and a url
    fn store() -> Store {
        Store::from_seed(
            Seed::default()
                .with_row(Table::Accounts, json!({"id": 1, "name": "acme", "parent": null}))
                .with_row(Table::Hosts, json!({"id": 2, "name": "web1"}))
                .with_row(Table::AccountHosts, json!({"id": 3, "account": 1, "host": 2}))
                .with_row(Table::Packages, json!({"id": 4, "account": 1, "name": "hosting"}))
                .with_row(Table::HttpdSites, json!({"id": 5, "package": 4, "host": 2, "name": "www"}))
                .with_row(Table::IpAddresses, json!({"id": 6, "host": 2, "address": "10.0.0.1"}))
                .with_row(Table::NetBinds, json!({"id": 7, "host": 2, "ip_address": 6, "port": 80, "protocol": "tcp"}))
                .with_row(Table::HttpdSiteBinds, json!({"id": 8, "site": 5, "net_bind": 7, "disable_log": 12}))
                .with_row(Table::HttpdSiteUrls, json!({"id": 9, "site_bind": 8, "hostname": "acme.test"}))
                .with_row(Table::HttpdTomcatContexts, json!({"id": 10, "site": 5, "path": ""}))
                .with_row(Table::DisableLog, json!({"id": 12, "account": 1, "disabled_by": "root"})),
        )
        .unwrap()
    }

    #[test]
    fn test_removes_dependents_then_reclaims() {
        let store = store();
        let broadcaster = Broadcaster::default();
        let (_id, mut rx) = broadcaster.connect(
            SessionKind::Client { username: "root".into() },
            Interest::everything(),
        );

        let mut work = UnitOfWork::begin(&store, &broadcaster, true).unwrap();
        let report = execute(&mut work, ResourceRef::new(ResourceKind::HttpdSite, 5)).unwrap();
        work.commit(&broadcaster).unwrap();

        assert_eq!(
            report.removed,
            vec![
                ResourceRef::new(ResourceKind::HttpdTomcatContext, 10),
                ResourceRef::new(ResourceKind::HttpdSiteUrl, 9),
                ResourceRef::new(ResourceKind::HttpdSiteBind, 8),
                ResourceRef::new(ResourceKind::HttpdSite, 5),
            ]
        );
        assert_eq!(
            report.reclaimed,
            vec![
                SharedRef::new(SharedKind::NetBind, 7),
                SharedRef::new(SharedKind::IpAddress, 6),
            ]
        );
        assert_eq!(report.disable_logs, vec![12]);

        store
            .read(|t| {
                assert!(t.row(Table::NetBinds, 7).is_none());
                assert!(t.row(Table::IpAddresses, 6).is_none());
                assert!(t.row(Table::Packages, 4).is_some());
            })
            .unwrap();

        let mut tables = Vec::new();
        while let Ok(tuple) = rx.try_recv() {
            tables.push(tuple.table);
        }
        for table in [Table::HttpdSites, Table::HttpdSiteBinds, Table::NetBinds, Table::IpAddresses, Table::DisableLog] {
            assert!(tables.contains(&table), "missing {}", table);
        }
    }

    #[test]
    fn test_guard_blocks_whole_removal() {
        let store = Store::from_seed(
            Seed::default()
                .with_row(Table::Accounts, json!({"id": 1, "name": "root", "parent": null}))
                .with_row(Table::Accounts, json!({"id": 2, "name": "child", "parent": 1}))
                .with_row(Table::Packages, json!({"id": 3, "account": 1, "name": "p"})),
        )
        .unwrap();
        let broadcaster = Broadcaster::default();

        let mut work = UnitOfWork::begin(&store, &broadcaster, true).unwrap();
        let err = execute(&mut work, ResourceRef::new(ResourceKind::Account, 1)).unwrap_err();
        assert!(matches!(err, MasterError::Precondition(ref m) if m.contains("sub-account #2")));
        work.abort("guard");

        assert!(store.read(|t| t.row(Table::Packages, 3).is_some()).unwrap());
    }

    #[test]
    fn test_pinned_address_survives() {
        let store = Store::from_seed(
            Seed::default()
                .with_row(Table::Accounts, json!({"id": 1, "name": "acme", "parent": null}))
                .with_row(Table::Hosts, json!({"id": 2, "name": "web1"}))
                .with_row(Table::Packages, json!({"id": 4, "account": 1, "name": "hosting"}))
                .with_row(Table::HttpdSites, json!({"id": 5, "package": 4, "host": 2, "name": "www"}))
                .with_row(Table::IpAddresses, json!({"id": 6, "host": 2, "address": "10.0.0.1", "pinned": true}))
                .with_row(Table::NetBinds, json!({"id": 7, "host": 2, "ip_address": 6, "port": 80, "protocol": "tcp"}))
                .with_row(Table::HttpdSiteBinds, json!({"id": 8, "site": 5, "net_bind": 7})),
        )
        .unwrap();
        let broadcaster = Broadcaster::default();

        let mut work = UnitOfWork::begin(&store, &broadcaster, true).unwrap();
        let report = execute(&mut work, ResourceRef::new(ResourceKind::HttpdSiteBind, 8)).unwrap();
        work.commit(&broadcaster).unwrap();

        assert_eq!(report.reclaimed, vec![SharedRef::new(SharedKind::NetBind, 7)]);
        assert!(store.read(|t| t.row(Table::IpAddresses, 6).is_some()).unwrap());
    }
}
