//! Daemon connector interface and the timeout-enforcing client on top of it

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::observability::{Event, Logger, MetricsRegistry};
use crate::store::RowId;

use super::errors::{DaemonError, DaemonResult};
use super::operation::DaemonOperation;

/// Future returned by a connector call
pub type DaemonFuture<'a> = Pin<Box<dyn Future<Output = DaemonResult<Value>> + Send + 'a>>;

/// Narrow RPC interface to per-host daemons
pub trait DaemonConnector: Send + Sync + fmt::Debug {
    /// Invoke `operation` on the daemon of `host`
    fn call<'a>(&'a self, host: RowId, operation: DaemonOperation, args: Value) -> DaemonFuture<'a>;
}

/// Result of a best-effort daemon push
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DaemonOutcome {
    Applied { result: Value },
    /// The committed change stands; the daemon catches up later
    Deferred { reason: String },
}

impl DaemonOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DaemonOutcome::Applied { .. })
    }
}

/// Connector wrapper enforcing the caller-visible timeout
#[derive(Debug, Clone)]
pub struct DaemonClient {
    connector: Arc<dyn DaemonConnector>,
    timeout: Duration,
    metrics: Arc<MetricsRegistry>,
}

impl DaemonClient {
    pub fn new(connector: Arc<dyn DaemonConnector>, timeout: Duration, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            connector,
            timeout,
            metrics,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Call the daemon, failing with `Timeout` once the deadline passes
    pub async fn call(&self, host: RowId, operation: DaemonOperation, args: Value) -> DaemonResult<Value> {
        let result = match tokio::time::timeout(self.timeout, self.connector.call(host, operation, args)).await {
            Ok(result) => result,
            Err(_) => Err(DaemonError::Timeout {
                host,
                millis: self.timeout.as_millis() as u64,
            }),
        };

        if let Err(err) = &result {
            self.metrics.increment_daemon_failures();
            let host = host.to_string();
            let reason = err.to_string();
            Logger::event(
                Event::DaemonUnreachable,
                &[
                    ("code", err.code()),
                    ("host", &host),
                    ("operation", operation.as_str()),
                    ("reason", &reason),
                ],
            );
        }
        result
    }

    /// Call the daemon; failures degrade to a deferred outcome
    pub async fn push(&self, host: RowId, operation: DaemonOperation, args: Value) -> DaemonOutcome {
        match self.call(host, operation, args).await {
            Ok(result) => DaemonOutcome::Applied { result },
            Err(err) => DaemonOutcome::Deferred {
                reason: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Slow;

    impl DaemonConnector for Slow {
        fn call<'a>(&'a self, _host: RowId, _operation: DaemonOperation, _args: Value) -> DaemonFuture<'a> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!({}))
            })
        }
    }

    #[derive(Debug)]
    struct Echo;

    impl DaemonConnector for Echo {
        fn call<'a>(&'a self, host: RowId, operation: DaemonOperation, args: Value) -> DaemonFuture<'a> {
            Box::pin(async move { Ok(json!({"host": host, "operation": operation, "args": args})) })
        }
    }

    #[tokio::test]
    async fn test_timeout_becomes_deferred() {
        let metrics = Arc::new(MetricsRegistry::new());
        let client = DaemonClient::new(Arc::new(Slow), Duration::from_millis(20), metrics.clone());

        let err = client
            .call(4, DaemonOperation::RebuildHttpd, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Timeout { host: 4, millis: 20 }));

        let outcome = client.push(4, DaemonOperation::RebuildHttpd, json!({})).await;
        assert!(!outcome.is_applied());
        assert_eq!(metrics.snapshot().daemon_failures, 2);
    }

    #[tokio::test]
    async fn test_successful_call() {
        let client = DaemonClient::new(
            Arc::new(Echo),
            Duration::from_secs(1),
            Arc::new(MetricsRegistry::new()),
        );
        let outcome = client
            .push(9, DaemonOperation::SetPassword, json!({"login": "bob"}))
            .await;
        match outcome {
            DaemonOutcome::Applied { result } => {
                assert_eq!(result["host"], 9);
                assert_eq!(result["operation"], "set_password");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
