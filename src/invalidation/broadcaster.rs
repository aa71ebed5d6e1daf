//! # Invalidation Broadcaster
//!
//! Process-wide fan-out of committed invalidation tuples.
//!
//! - Tuples reach a session in the order they were recorded
//! - A session that cannot be reached is dropped and logged; delivery to
//!   the remaining sessions continues and the flush never fails
//! - Registered memoization caches are cleared before any session hears
//!   about the change

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::observability::{Event, Logger, MetricsRegistry};

use super::batch::InvalidationBatch;
use super::cache::InvalidationCache;
use super::errors::{InvalidationError, InvalidationResult};
use super::subscription::{Interest, SessionKind};
use super::tuple::InvalidationTuple;

/// Tuple sender for a session
pub type TupleSender = mpsc::UnboundedSender<InvalidationTuple>;

/// Tuple receiver for a session
pub type TupleReceiver = mpsc::UnboundedReceiver<InvalidationTuple>;

#[derive(Debug)]
struct Session {
    kind: SessionKind,
    interest: Interest,
    sender: TupleSender,
}

/// Public view of a connected session
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub kind: SessionKind,
    pub interest: Interest,
}

/// Outcome of one flush
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Tuples in the flushed batch
    pub tuples: usize,
    /// Tuple deliveries across all sessions
    pub delivered: usize,
    /// Cache entries cleared
    pub cache_entries_cleared: usize,
    /// Sessions dropped because delivery failed
    pub dropped_sessions: Vec<Uuid>,
}

/// Session registry and fan-out
#[derive(Debug)]
pub struct Broadcaster {
    sessions: RwLock<HashMap<Uuid, Session>>,
    caches: RwLock<Vec<Arc<dyn InvalidationCache>>>,
    metrics: Arc<MetricsRegistry>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(Arc::new(MetricsRegistry::new()))
    }
}

impl Broadcaster {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            caches: RwLock::new(Vec::new()),
            metrics,
        }
    }

    /// Open a batch for a new logical transaction
    pub fn begin(&self) -> InvalidationBatch {
        InvalidationBatch::new()
    }

    /// Register a memoization cache to clear on flush
    pub fn register_cache(&self, cache: Arc<dyn InvalidationCache>) {
        if let Ok(mut caches) = self.caches.write() {
            caches.push(cache);
        }
    }

    /// Connect a session
    pub fn connect(&self, kind: SessionKind, interest: Interest) -> (Uuid, TupleReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let label = kind.to_string();

        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(
                id,
                Session {
                    kind,
                    interest,
                    sender: tx,
                },
            );
        }

        self.metrics.session_opened();
        let session = id.to_string();
        Logger::event(Event::SessionOpened, &[("session", &session), ("peer", &label)]);
        (id, rx)
    }

    /// Remove a session; returns whether it was connected
    pub fn disconnect(&self, id: Uuid) -> bool {
        let removed = self
            .sessions
            .write()
            .map(|mut sessions| sessions.remove(&id).is_some())
            .unwrap_or(false);

        if removed {
            self.metrics.session_closed();
            let session = id.to_string();
            Logger::event(Event::SessionClosed, &[("session", &session)]);
        }
        removed
    }

    /// Replace the interest of a connected session
    pub fn set_interest(&self, id: Uuid, interest: Interest) -> InvalidationResult<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| InvalidationError::Poisoned)?;
        let session = sessions
            .get_mut(&id)
            .ok_or(InvalidationError::SessionNotFound(id))?;
        session.interest = interest;
        Ok(())
    }

    /// Current interest of a session
    pub fn interest(&self, id: Uuid) -> InvalidationResult<Interest> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| InvalidationError::Poisoned)?;
        sessions
            .get(&id)
            .map(|s| s.interest.clone())
            .ok_or(InvalidationError::SessionNotFound(id))
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .map(|sessions| {
                sessions
                    .iter()
                    .map(|(id, s)| SessionInfo {
                        id: *id,
                        kind: s.kind.clone(),
                        interest: s.interest.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deliver a committed batch
    ///
    /// Must only be called after the batch's transaction committed.
    pub fn flush(&self, batch: InvalidationBatch) -> FlushReport {
        let batch_id = batch.id();
        let tuples = batch.into_tuples();
        let mut report = FlushReport {
            tuples: tuples.len(),
            ..FlushReport::default()
        };
        if tuples.is_empty() {
            return report;
        }

        if let Ok(caches) = self.caches.read() {
            for cache in caches.iter() {
                for tuple in &tuples {
                    report.cache_entries_cleared += cache.invalidate(tuple);
                }
            }
        }

        if let Ok(sessions) = self.sessions.read() {
            for (id, session) in sessions.iter() {
                for tuple in tuples.iter().filter(|t| session.interest.matches(t)) {
                    if session.sender.send(tuple.clone()).is_err() {
                        report.dropped_sessions.push(*id);
                        break;
                    }
                    report.delivered += 1;
                }
            }
        }

        for id in &report.dropped_sessions {
            self.metrics.increment_delivery_failures();
            let session = id.to_string();
            Logger::event(
                Event::DeliveryFailed,
                &[("session", &session), ("batch", &batch_id.to_string())],
            );
            self.disconnect(*id);
        }

        self.metrics.add_tuples_flushed(report.tuples as u64);
        self.metrics.add_deliveries(report.delivered as u64);

        let batch = batch_id.to_string();
        let count = report.tuples.to_string();
        let delivered = report.delivered.to_string();
        Logger::event(
            Event::InvalidationFlushed,
            &[("batch", &batch), ("delivered", &delivered), ("tuples", &count)],
        );

        report
    }
}
