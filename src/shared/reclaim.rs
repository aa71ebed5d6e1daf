//! Shared-infrastructure reclamation
//!
//! `reclaim_if_unused` runs inside the transaction of the removal that may
//! have dropped the last reference, so the existence check and the delete
//! see the same state.

use crate::errors::MasterResult;
use crate::invalidation::{AccountScope, HostScope};
use crate::lifecycle::{disable_log, UnitOfWork};
use crate::observability::{Event, Logger};
use crate::store::{RowExt, RowId, RowSource, Table};

use super::kind::{SharedKind, SharedRef};

/// Column marking operator-managed rows that are never reclaimed
pub const PINNED: &str = "pinned";

/// Whether anything still references the shared row
pub fn is_referenced(src: &dyn RowSource, shared: SharedRef) -> bool {
    shared
        .kind
        .referencers()
        .into_iter()
        .any(|(table, column)| src.is_referenced(table, column, shared.id))
}

/// Delete the shared row if nothing references it any more
///
/// Returns every row deleted, including shared rows it referenced that
/// became unreferenced in turn. A row that is already gone, pinned or still
/// referenced is left alone.
pub fn reclaim_if_unused(work: &mut UnitOfWork<'_>, shared: SharedRef) -> MasterResult<Vec<SharedRef>> {
    let table = shared.kind.table();
    let pinned = match work.rows().row(table, shared.id) {
        None => return Ok(Vec::new()),
        Some(row) => row.get(PINNED).and_then(|v| v.as_bool()).unwrap_or(false),
    };
    if pinned || is_referenced(work.rows(), shared) {
        return Ok(Vec::new());
    }

    let removed = work.delete(table, shared.id)?;
    let hosts = removed
        .ref_id("host")
        .map(HostScope::One)
        .unwrap_or(HostScope::All);
    work.record(table, AccountScope::All, hosts);

    let id = shared.to_string();
    Logger::event(Event::SharedReclaimed, &[("shared", &id)]);

    let mut reclaimed = vec![shared];
    for (column, kind) in shared.kind.links() {
        if let Some(target) = removed.ref_id(column) {
            reclaimed.extend(reclaim_if_unused(work, SharedRef::new(*kind, target))?);
        }
    }
    Ok(reclaimed)
}

/// What a reconciliation sweep cleaned up
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub reclaimed: Vec<SharedRef>,
    pub disable_logs: Vec<RowId>,
    /// Rows whose cleanup failed again
    pub failed: usize,
}

/// Reclaim every unreferenced shared row and DisableLog
pub fn sweep(work: &mut UnitOfWork<'_>) -> MasterResult<SweepReport> {
    let mut report = SweepReport::default();

    for kind in SharedKind::ALL {
        let ids: Vec<RowId> = work.rows().rows(kind.table()).map(|(id, _)| id).collect();
        for id in ids {
            let shared = SharedRef::new(kind, id);
            match reclaim_if_unused(work, shared) {
                Ok(reclaimed) => report.reclaimed.extend(reclaimed),
                Err(err) => {
                    report.failed += 1;
                    let target = shared.to_string();
                    let reason = err.to_string();
                    Logger::event(Event::ReclaimDeferred, &[("shared", &target), ("reason", &reason)]);
                }
            }
        }
    }

    let logs: Vec<RowId> = work.rows().rows(Table::DisableLog).map(|(id, _)| id).collect();
    for id in logs {
        match disable_log::release_if_unused(work, id) {
            Ok(true) => report.disable_logs.push(id),
            Ok(false) => {}
            Err(err) => {
                report.failed += 1;
                let target = format!("disable_log #{}", id);
                let reason = err.to_string();
                Logger::event(Event::ReclaimDeferred, &[("disable_log", &target), ("reason", &reason)]);
            }
        }
    }

    let reclaimed = report.reclaimed.len().to_string();
    let logs = report.disable_logs.len().to_string();
    let failed = report.failed.to_string();
    Logger::event(
        Event::ReconcileSweep,
        &[("disable_logs", &logs), ("failed", &failed), ("reclaimed", &reclaimed)],
    );

    Ok(report)
}
