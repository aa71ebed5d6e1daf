//! Access control across principals
//!
//! Account tree: root(1) -> reseller(2) -> acme(3); other(4) under root.
//! Host 10 is granted to reseller, host 20 to other.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::json;

use hostmaster::access::{AccessControl, Action, Permission, PermissionPolicy, Principal, Role};
use hostmaster::errors::{MasterError, MasterResult};
use hostmaster::invalidation::{Broadcaster, Interest, SessionKind};
use hostmaster::lifecycle::{CreateRequest, LifecycleManager};
use hostmaster::observability::MetricsRegistry;
use hostmaster::ownership::{ResourceKind, ResourceRef};
use hostmaster::store::{RowSource, Seed, Store, Table};

const ACME_SITE: ResourceRef = ResourceRef { kind: ResourceKind::HttpdSite, id: 31 };
const ACME_SPARE: ResourceRef = ResourceRef { kind: ResourceKind::Package, id: 33 };
const OTHER_PACKAGE: ResourceRef = ResourceRef { kind: ResourceKind::Package, id: 40 };
const OTHER_SITE: ResourceRef = ResourceRef { kind: ResourceKind::HttpdSite, id: 41 };

fn seed() -> Seed {
    Seed::default()
        .with_row(Table::Accounts, json!({"id": 1, "name": "root", "parent": null}))
        .with_row(Table::Accounts, json!({"id": 2, "name": "reseller", "parent": 1}))
        .with_row(Table::Accounts, json!({"id": 3, "name": "acme", "parent": 2}))
        .with_row(Table::Accounts, json!({"id": 4, "name": "other", "parent": 1}))
        .with_row(Table::Hosts, json!({"id": 10, "name": "web1"}))
        .with_row(Table::Hosts, json!({"id": 20, "name": "web2"}))
        .with_row(Table::AccountHosts, json!({"id": 11, "account": 2, "host": 10}))
        .with_row(Table::AccountHosts, json!({"id": 21, "account": 4, "host": 20}))
        .with_row(Table::Packages, json!({"id": 30, "account": 3, "name": "hosting"}))
        .with_row(Table::HttpdSites, json!({"id": 31, "package": 30, "host": 10, "name": "www"}))
        .with_row(Table::Packages, json!({"id": 33, "account": 3, "name": "spare"}))
        .with_row(Table::Packages, json!({"id": 40, "account": 4, "name": "elsewhere"}))
        .with_row(Table::HttpdSites, json!({"id": 41, "package": 40, "host": 20, "name": "www2"}))
        .with_row(Table::MasterUsers, json!({"id": 50, "username": "ops", "hosts": [10], "permissions": []}))
        .with_row(Table::MasterUsers, json!({"id": 51, "username": "root", "hosts": [], "permissions": ["set_password"]}))
        .with_row(Table::Administrators, json!({"id": 60, "username": "resell", "account": 2, "permissions": []}))
        .with_row(
            Table::Administrators,
            json!({"id": 61, "username": "alice", "account": 3, "permissions": ["add_credit_card"]}),
        )
        .with_row(Table::Administrators, json!({"id": 62, "username": "mallory", "account": 3, "disable_log": 70}))
        .with_row(Table::DisableLog, json!({"id": 70, "account": 3, "disabled_by": "root"}))
}

fn manager_with(policy: PermissionPolicy) -> (LifecycleManager, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new());
    let manager = LifecycleManager::new(
        Arc::new(Store::from_seed(seed()).unwrap()),
        Arc::new(Broadcaster::new(metrics.clone())),
        Arc::new(AccessControl::new(policy, metrics.clone())),
        metrics.clone(),
    );
    (manager, metrics)
}

fn manager() -> LifecycleManager {
    manager_with(PermissionPolicy::default()).0
}

fn authorize(m: &LifecycleManager, username: &str, action: Action, resource: ResourceRef) -> MasterResult<()> {
    let principal = m.principal(username)?;
    m.store()
        .read(|t| m.access().authorize(t, &principal, action, resource))?
}

fn is_denied(result: MasterResult<()>) -> bool {
    matches!(result, Err(MasterError::Deny(_)))
}

#[test]
fn principals_load_from_registry() {
    let m = manager();

    let ops = m.principal("ops").unwrap();
    assert_eq!(ops.role, Role::Operator { hosts: BTreeSet::from([10]) });
    assert!(m.principal("root").unwrap().is_global_operator());

    let alice = m.principal("alice").unwrap();
    assert_eq!(alice.account(), Some(3));
    assert!(alice.has_permission(Permission::AddCreditCard));

    assert!(matches!(m.principal("mallory"), Err(MasterError::Deny(ref msg)) if msg.contains("disabled")));
    assert!(matches!(m.principal("nobody"), Err(MasterError::Deny(_))));
}

#[test]
fn administrators_reach_their_subtree_only() {
    let m = manager();
    let view = Action::Resource(hostmaster::access::Verb::View, ResourceKind::Package);

    assert!(authorize(&m, "resell", view, ACME_SPARE).is_ok());
    assert!(is_denied(authorize(&m, "resell", view, OTHER_PACKAGE)));

    // no upward reach into the parent account
    let reseller = ResourceRef::new(ResourceKind::Account, 2);
    assert!(is_denied(authorize(&m, "alice", Action::disable(ResourceKind::Account), reseller)));
    assert!(is_denied(authorize(&m, "alice", Action::remove(ResourceKind::HttpdSite), OTHER_SITE)));
}

#[test]
fn scoped_operator_limited_to_hosts() {
    let m = manager();

    assert!(authorize(&m, "ops", Action::disable(ResourceKind::HttpdSite), ACME_SITE).is_ok());
    assert!(is_denied(authorize(&m, "ops", Action::disable(ResourceKind::HttpdSite), OTHER_SITE)));

    // unbound rows: the owner or an ancestor must hold a host in scope
    assert!(authorize(&m, "ops", Action::disable(ResourceKind::Package), ACME_SPARE).is_ok());
    assert!(is_denied(authorize(&m, "ops", Action::disable(ResourceKind::Package), OTHER_PACKAGE)));

    // creating on a host outside the scope
    let ops = m.principal("ops").unwrap();
    let err = m
        .create(&ops, CreateRequest::MysqlDatabase { package: 40, host: 20, name: "db".into() })
        .unwrap_err();
    assert!(matches!(err, MasterError::Deny(ref msg) if msg.contains("host #20")));
}

#[test]
fn sensitive_actions_need_permission_bits() {
    let m = manager();
    let card = CreateRequest::CreditCard {
        account: 3,
        masked_number: "XXXX-XXXX-XXXX-1234".into(),
        expiration_month: 12,
        expiration_year: 2030,
    };

    let resell = m.principal("resell").unwrap();
    assert!(matches!(m.create(&resell, card.clone()), Err(MasterError::Deny(_))));

    let alice = m.principal("alice").unwrap();
    let created = m.create(&alice, card).unwrap();
    assert_eq!(created.kind, ResourceKind::CreditCard);
}

#[test]
fn disable_log_authority() {
    let m = manager();
    let alice = m.principal("alice").unwrap();
    let resell = m.principal("resell").unwrap();
    let root = m.principal("root").unwrap();

    // disabled by an operator: administrators cannot lift it
    m.disable(&root, ACME_SPARE, "operator hold").unwrap();
    assert!(matches!(m.enable(&alice, ACME_SPARE), Err(MasterError::Deny(_))));
    assert!(matches!(m.enable(&resell, ACME_SPARE), Err(MasterError::Deny(_))));
    m.enable(&root, ACME_SPARE).unwrap();

    // disabled by acme itself: acme and its parent may lift it
    m.disable(&alice, ACME_SPARE, "self").unwrap();
    m.enable(&resell, ACME_SPARE).unwrap();

    // disabled by the reseller: acme may not lift it
    m.disable(&resell, ACME_SPARE, "reseller hold").unwrap();
    assert!(matches!(m.enable(&alice, ACME_SPARE), Err(MasterError::Deny(_))));
}

#[test]
fn dangling_target_is_not_found_and_denials_are_counted() {
    let (m, metrics) = manager_with(PermissionPolicy::default());
    let missing = ResourceRef::new(ResourceKind::Package, 999);
    assert!(matches!(
        authorize(&m, "alice", Action::disable(ResourceKind::Package), missing),
        Err(MasterError::NotFound(_))
    ));
    assert_eq!(metrics.snapshot().access_denied, 0);

    let _ = authorize(&m, "alice", Action::disable(ResourceKind::Package), OTHER_PACKAGE);
    let _ = authorize(&m, "ops", Action::disable(ResourceKind::Package), OTHER_PACKAGE);
    assert_eq!(metrics.snapshot().access_denied, 2);
}

#[test]
fn policy_overrides_apply() {
    let overrides = HashMap::from([("disable_package".to_string(), "cancel_account".to_string())]);
    let (m, _metrics) = manager_with(PermissionPolicy::with_overrides(&overrides).unwrap());

    let alice = m.principal("alice").unwrap();
    assert!(matches!(m.disable(&alice, ACME_SPARE, "x"), Err(MasterError::Deny(ref msg)) if msg.contains("cancel_account")));

    let root = m.principal("root").unwrap();
    assert!(matches!(m.disable(&root, ACME_SPARE, "x"), Err(MasterError::Deny(_))));
    let privileged = Principal::operator("auditor", BTreeSet::new()).with_permission(Permission::CancelAccount);
    m.disable(&privileged, ACME_SPARE, "x").unwrap();
}

#[test]
fn denied_operations_leave_no_trace() {
    let m = manager();
    let (_id, mut rx) = m
        .broadcaster()
        .connect(SessionKind::Client { username: "watcher".into() }, Interest::everything());
    let alice = m.principal("alice").unwrap();
    let ops = m.principal("ops").unwrap();

    assert!(matches!(m.disable(&alice, OTHER_PACKAGE, "x"), Err(MasterError::Deny(_))));
    assert!(matches!(m.remove(&alice, OTHER_SITE), Err(MasterError::Deny(_))));
    assert!(matches!(m.remove(&ops, OTHER_PACKAGE), Err(MasterError::Deny(_))));
    assert!(matches!(
        m.create(&alice, CreateRequest::Username { package: OTHER_PACKAGE.id, name: "eve".into() }),
        Err(MasterError::Deny(_))
    ));

    assert!(rx.try_recv().is_err());
    assert!(!m.is_disabled(OTHER_PACKAGE).unwrap());
    m.store()
        .read(|t| {
            assert!(t.row(Table::HttpdSites, OTHER_SITE.id).is_some());
            assert_eq!(t.count(Table::Usernames), 0);
            assert_eq!(t.count(Table::DisableLog), 1);
        })
        .unwrap();
}
