//! # Master assembly
//!
//! Builds every long-lived component from a validated [`Config`] and runs
//! the background tasks next to the HTTP server:
//!
//! - one [`DaemonWorker`] per configured host daemon
//! - the periodic reconciliation sweep

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;

use crate::access::AccessControl;
use crate::auth::TokenManager;
use crate::cli::Config;
use crate::daemon::{DaemonClient, DaemonWorker, TcpConnector};
use crate::errors::{MasterError, MasterResult};
use crate::http_server::{ApiState, HttpServer};
use crate::invalidation::Broadcaster;
use crate::lifecycle::LifecycleManager;
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::store::{Seed, Store};

/// A fully assembled master
pub struct Master {
    config: Config,
    store: Arc<Store>,
    metrics: Arc<MetricsRegistry>,
    broadcaster: Arc<Broadcaster>,
    manager: Arc<LifecycleManager>,
    tokens: Arc<TokenManager>,
    daemons: DaemonClient,
}

impl Master {
    /// Load the seed named by the configuration and assemble the master
    pub fn build(config: &Config) -> MasterResult<Self> {
        let store = match &config.seed_file {
            Some(path) => {
                let seed = Seed::load(path)?;
                let rows: usize = seed.tables.values().map(Vec::len).sum();
                let store = Store::from_seed(seed)?;
                let rows = rows.to_string();
                let file = path.display().to_string();
                Logger::event(Event::SeedLoaded, &[("file", &file), ("rows", &rows)]);
                store
            }
            None => Store::new(),
        };
        Self::with_store(config, store)
    }

    /// Assemble the master around an already populated store
    pub fn with_store(config: &Config, store: Store) -> MasterResult<Self> {
        let policy = config
            .permission_policy()
            .map_err(|e| MasterError::validation(e.message()))?;

        let store = Arc::new(store);
        let metrics = Arc::new(MetricsRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(metrics.clone()));
        let access = Arc::new(AccessControl::new(policy, metrics.clone()));
        let manager = Arc::new(LifecycleManager::new(
            store.clone(),
            broadcaster.clone(),
            access,
            metrics.clone(),
        ));
        let tokens = Arc::new(TokenManager::new(config.token_config()));
        let connector = Arc::new(TcpConnector::new(config.daemon_addresses()));
        let daemons = DaemonClient::new(
            connector,
            Duration::from_millis(config.daemon_timeout_ms),
            metrics.clone(),
        );

        Ok(Self {
            config: config.clone(),
            store,
            metrics,
            broadcaster,
            manager,
            tokens,
            daemons,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// State shared by the HTTP routes
    pub fn api_state(&self) -> ApiState {
        ApiState {
            manager: self.manager.clone(),
            tokens: self.tokens.clone(),
            daemons: self.daemons.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Start one invalidation worker per configured daemon
    ///
    /// Must run inside a tokio runtime.
    pub fn spawn_daemon_workers(&self) -> Vec<JoinHandle<()>> {
        self.config
            .daemons
            .iter()
            .map(|endpoint| {
                DaemonWorker::new(endpoint.host, self.daemons.clone(), self.broadcaster.clone()).spawn()
            })
            .collect()
    }

    /// Start the periodic reconciliation sweep, unless disabled
    ///
    /// Each period is stretched by up to a tenth so that several masters
    /// restarted together do not sweep in lockstep.
    pub fn spawn_reconciler(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.reconcile_interval_secs;
        if interval == 0 {
            return None;
        }
        let manager = self.manager.clone();

        Some(tokio::spawn(async move {
            loop {
                let jitter = rand::thread_rng().gen_range(0..=interval / 10);
                tokio::time::sleep(Duration::from_secs(interval + jitter)).await;

                let sweep = manager.clone();
                match tokio::task::spawn_blocking(move || sweep.reconcile()).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        let reason = err.to_string();
                        Logger::event(Event::ReclaimDeferred, &[("sweep", "periodic"), ("reason", &reason)]);
                    }
                    Err(join) => {
                        let reason = join.to_string();
                        Logger::event(Event::ReclaimDeferred, &[("sweep", "periodic"), ("reason", &reason)]);
                    }
                }
            }
        }))
    }

    /// Run background tasks and serve the API until the listener fails
    pub async fn serve(self) -> Result<(), std::io::Error> {
        let workers = self.spawn_daemon_workers();
        let reconciler = self.spawn_reconciler();
        let server = HttpServer::new(self.config.http.clone(), self.api_state());

        let result = server.start().await;

        for worker in workers {
            worker.abort();
        }
        if let Some(reconciler) = reconciler {
            reconciler.abort();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::DaemonEndpoint;
    use crate::store::Table;
    use serde_json::json;

    fn config() -> Config {
        Config::with_secret("test-secret-value")
    }

    #[test]
    fn test_build_without_seed_is_empty() {
        let master = Master::build(&config()).unwrap();
        assert_eq!(master.store().next_id(), 1);
        assert_eq!(master.store().read(|t| t.count(Table::Accounts)).unwrap(), 0);
    }

    #[test]
    fn test_with_store_keeps_rows() {
        let seed = Seed::default().with_row(Table::Hosts, json!({"id": 7, "name": "web7"}));
        let master = Master::with_store(&config(), Store::from_seed(seed).unwrap()).unwrap();
        assert_eq!(master.store().next_id(), 8);
    }

    #[tokio::test]
    async fn test_one_worker_per_daemon() {
        let mut config = config();
        config.reconcile_interval_secs = 0;
        config.daemons = vec![
            DaemonEndpoint {
                host: 1,
                address: "127.0.0.1:1".to_string(),
            },
            DaemonEndpoint {
                host: 2,
                address: "127.0.0.1:2".to_string(),
            },
        ];
        let master = Master::build(&config).unwrap();

        let workers = master.spawn_daemon_workers();
        assert_eq!(workers.len(), 2);
        assert!(master.spawn_reconciler().is_none());
        for worker in workers {
            worker.abort();
        }
    }
}
