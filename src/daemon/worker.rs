//! Daemon invalidation worker
//!
//! Each configured host daemon is a broadcaster session whose interest is
//! its own host. Tuples arriving together are coalesced into one rebuild
//! call per service.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;

use crate::invalidation::{Broadcaster, Interest, InvalidationTuple, SessionKind, TupleReceiver};
use crate::observability::{Event, Logger};
use crate::store::{RowId, Table};

use super::connector::{DaemonClient, DaemonOutcome};
use super::operation::DaemonOperation;

/// Rebuild calls for a set of tuples, with the tables behind each
pub fn rebuild_plan(tuples: &[InvalidationTuple]) -> BTreeMap<DaemonOperation, BTreeSet<Table>> {
    let mut plan: BTreeMap<DaemonOperation, BTreeSet<Table>> = BTreeMap::new();
    for tuple in tuples {
        if let Some(operation) = DaemonOperation::rebuild_for(tuple.table) {
            plan.entry(operation).or_default().insert(tuple.table);
        }
    }
    plan
}

/// Background task feeding one host daemon
pub struct DaemonWorker {
    host: RowId,
    client: DaemonClient,
    broadcaster: Arc<Broadcaster>,
}

impl DaemonWorker {
    pub fn new(host: RowId, client: DaemonClient, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            host,
            client,
            broadcaster,
        }
    }

    /// Subscribe and start the worker loop
    ///
    /// The session is registered before this returns, so no commit after
    /// the call is missed.
    pub fn spawn(self) -> JoinHandle<()> {
        let interest = Interest::for_hosts(BTreeSet::from([self.host]));
        let (session, rx) = self
            .broadcaster
            .connect(SessionKind::Daemon { host: self.host }, interest);

        tokio::spawn(async move {
            self.run(rx).await;
            self.broadcaster.disconnect(session);
        })
    }

    async fn run(&self, mut rx: TupleReceiver) {
        while let Some(first) = rx.recv().await {
            let mut tuples = vec![first];
            while let Ok(tuple) = rx.try_recv() {
                tuples.push(tuple);
            }

            for (operation, tables) in rebuild_plan(&tuples) {
                let names: Vec<&str> = tables.iter().map(Table::as_str).collect();
                let outcome = self
                    .client
                    .push(self.host, operation, json!({ "tables": names }))
                    .await;
                if let DaemonOutcome::Applied { .. } = outcome {
                    let host = self.host.to_string();
                    Logger::event(
                        Event::DaemonRebuilt,
                        &[("host", &host), ("operation", operation.as_str())],
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::Value;

    use crate::daemon::{DaemonConnector, DaemonFuture};
    use crate::invalidation::{AccountScope, HostScope};
    use crate::observability::MetricsRegistry;

    #[derive(Debug, Default)]
    struct Recording {
        calls: Mutex<Vec<(RowId, DaemonOperation, Value)>>,
    }

    impl DaemonConnector for Recording {
        fn call<'a>(&'a self, host: RowId, operation: DaemonOperation, args: Value) -> DaemonFuture<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push((host, operation, args));
                Ok(Value::Null)
            })
        }
    }

    fn tuple(table: Table, host: HostScope) -> InvalidationTuple {
        InvalidationTuple::new(table, AccountScope::One(1), host, true)
    }

    #[test]
    fn test_plan_coalesces_per_service() {
        let plan = rebuild_plan(&[
            tuple(Table::HttpdSites, HostScope::One(2)),
            tuple(Table::HttpdSiteBinds, HostScope::One(2)),
            tuple(Table::HttpdSites, HostScope::One(2)),
            tuple(Table::Packages, HostScope::All),
            tuple(Table::MysqlUsers, HostScope::One(2)),
        ]);
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan[&DaemonOperation::RebuildHttpd],
            BTreeSet::from([Table::HttpdSites, Table::HttpdSiteBinds])
        );
        assert!(plan.contains_key(&DaemonOperation::RebuildMysql));
    }

    #[tokio::test]
    async fn test_worker_rebuilds_own_host_only() {
        let metrics = Arc::new(MetricsRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(metrics.clone()));
        let recording = Arc::new(Recording::default());
        let client = DaemonClient::new(recording.clone(), Duration::from_secs(1), metrics);

        let handle = DaemonWorker::new(2, client, broadcaster.clone()).spawn();
        assert_eq!(broadcaster.session_count(), 1);

        let mut batch = broadcaster.begin();
        batch.record(Table::HttpdSites, AccountScope::One(1), HostScope::One(2), true);
        batch.record(Table::MysqlDatabases, AccountScope::One(1), HostScope::One(3), true);
        broadcaster.flush(batch);

        for _ in 0..50 {
            if !recording.calls.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let calls = recording.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 2);
        assert_eq!(calls[0].1, DaemonOperation::RebuildHttpd);
        assert_eq!(calls[0].2["tables"], serde_json::json!(["httpd_sites"]));

        handle.abort();
    }
}
