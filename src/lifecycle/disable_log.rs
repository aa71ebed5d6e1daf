//! DisableLog bookkeeping
//!
//! A disabled row references exactly one DisableLog. A DisableLog is
//! deleted only once no account, package, username, resource or
//! administrator row references it.

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::access::Principal;
use crate::errors::{MasterError, MasterResult};
use crate::invalidation::{AccountScope, HostScope};
use crate::observability::{Event, Logger};
use crate::ownership::descriptors;
use crate::store::{into_row, row::DISABLE_LOG, RowExt, RowId, RowSource, Table};

use super::work::UnitOfWork;

/// Tables whose rows may carry a `disable_log` reference
fn referencing_tables() -> impl Iterator<Item = (Table, &'static str)> {
    descriptors()
        .iter()
        .filter(|d| d.disableable)
        .map(|d| (d.table, d.kind.as_str()))
        .chain(std::iter::once((Table::Administrators, "administrator")))
}

/// Rows still referencing the DisableLog, as "kind #id"
pub fn referenced_by(src: &dyn RowSource, log: RowId) -> Vec<String> {
    referencing_tables()
        .flat_map(|(table, name)| {
            src.referencing(table, DISABLE_LOG, log)
                .into_iter()
                .map(move |id| format!("{} #{}", name, id))
        })
        .collect()
}

pub fn is_in_use(src: &dyn RowSource, log: RowId) -> bool {
    referencing_tables().any(|(table, _)| src.is_referenced(table, DISABLE_LOG, log))
}

/// Insert a new DisableLog for a row owned by `account`
pub fn create(
    work: &mut UnitOfWork<'_>,
    account: RowId,
    disabled_by: &Principal,
    reason: &str,
) -> MasterResult<RowId> {
    let row = into_row(
        Table::DisableLog,
        json!({
            "account": account,
            "disabled_by": disabled_by.username,
            "disabled_by_account": disabled_by.account(),
            "reason": reason,
            "time": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }),
    )?;
    let id = work.insert(Table::DisableLog, row)?;
    work.record(Table::DisableLog, AccountScope::One(account), HostScope::All);
    Ok(id)
}

/// Delete the DisableLog if nothing references it; returns whether it was deleted
pub fn release_if_unused(work: &mut UnitOfWork<'_>, log: RowId) -> MasterResult<bool> {
    if work.rows().row(Table::DisableLog, log).is_none() || is_in_use(work.rows(), log) {
        return Ok(false);
    }
    delete(work, log)?;
    Ok(true)
}

/// Explicit removal; fails while the DisableLog is in use
pub fn remove(work: &mut UnitOfWork<'_>, log: RowId) -> MasterResult<()> {
    work.rows().require(Table::DisableLog, log)?;
    let users = referenced_by(work.rows(), log);
    if !users.is_empty() {
        return Err(MasterError::precondition(format!(
            "DisableLog in use: disable_log #{} is referenced by {}",
            log,
            users.join(", ")
        )));
    }
    delete(work, log)
}

fn delete(work: &mut UnitOfWork<'_>, log: RowId) -> MasterResult<()> {
    let removed = work.delete(Table::DisableLog, log)?;
    let accounts = removed
        .ref_id("account")
        .map(AccountScope::One)
        .unwrap_or(AccountScope::All);
    work.record(Table::DisableLog, accounts, HostScope::All);

    let id = log.to_string();
    Logger::event(Event::DisableLogRemoved, &[("disable_log", &id)]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invalidation::Broadcaster;
    use crate::store::{Seed, Store};

    fn store() -> Store {
        Store::from_seed(
            Seed::default()
                .with_row(Table::Accounts, json!({"id": 1, "name": "acme", "parent": null}))
                .with_row(Table::DisableLog, json!({"id": 5, "account": 1, "disabled_by": "root", "reason": "unpaid"}))
                .with_row(Table::DisableLog, json!({"id": 6, "account": 1, "disabled_by": "root", "reason": "abuse"}))
                .with_row(Table::Packages, json!({"id": 2, "account": 1, "name": "hosting", "disable_log": 5}))
                .with_row(Table::DisableLog, json!({"id": 7, "account": 1, "disabled_by": "root", "reason": "suspended"}))
                .with_row(Table::Administrators, json!({"id": 3, "username": "mallory", "account": 1, "disable_log": 7})),
        )
        .unwrap()
    }

    #[test]
    fn test_in_use_detection() {
        let store = store();
        store
            .read(|t| {
                assert!(is_in_use(t, 5));
                assert!(!is_in_use(t, 6));
                assert_eq!(referenced_by(t, 5), vec!["package #2".to_string()]);
                assert!(is_in_use(t, 7));
                assert_eq!(referenced_by(t, 7), vec!["administrator #3".to_string()]);
            })
            .unwrap();
    }

    #[test]
    fn test_remove_in_use_fails() {
        let store = store();
        let broadcaster = Broadcaster::default();
        let mut work = UnitOfWork::begin(&store, &broadcaster, false).unwrap();

        let err = remove(&mut work, 5).unwrap_err();
        assert!(matches!(err, MasterError::Precondition(ref m) if m.contains("DisableLog in use")));
        remove(&mut work, 6).unwrap();
        assert!(work.rows().row(Table::DisableLog, 6).is_none());
    }

    #[test]
    fn test_release_if_unused() {
        let store = store();
        let broadcaster = Broadcaster::default();
        let mut work = UnitOfWork::begin(&store, &broadcaster, false).unwrap();

        assert!(!release_if_unused(&mut work, 5).unwrap());
        assert!(release_if_unused(&mut work, 6).unwrap());
        assert!(!release_if_unused(&mut work, 6).unwrap());
    }

    #[test]
    fn test_create_records_account_scope() {
        let store = store();
        let broadcaster = Broadcaster::default();
        let mut work = UnitOfWork::begin(&store, &broadcaster, false).unwrap();

        let id = create(&mut work, 1, &Principal::administrator("root", 1), "maintenance").unwrap();
        assert!(id > 7);
        let tuple = &work.batch().tuples()[0];
        assert_eq!(tuple.accounts, AccountScope::One(1));
        let row = work.rows().require(Table::DisableLog, id).unwrap();
        assert_eq!(row.ref_id("disabled_by_account"), Some(1));
    }
}
