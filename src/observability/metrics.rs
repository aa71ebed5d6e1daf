//! Operational counters for the master
//!
//! Counters only; values reset on process start. Increments use Relaxed
//! ordering, readers tolerate slightly stale values.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of all master counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Operations whose transaction committed
    operations_committed: AtomicU64,
    /// Operations rolled back for any reason
    operations_aborted: AtomicU64,
    /// Authorization failures
    access_denied: AtomicU64,
    /// Tuples flushed after commit
    tuples_flushed: AtomicU64,
    /// Per-session tuple deliveries
    deliveries: AtomicU64,
    /// Deliveries that failed and dropped the session
    delivery_failures: AtomicU64,
    /// Shared rows deleted by reclamation
    shared_reclaimed: AtomicU64,
    /// Daemon calls that failed or timed out
    daemon_failures: AtomicU64,
    /// Currently connected subscriber sessions
    sessions: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_committed(&self) {
        self.operations_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_aborted(&self) {
        self.operations_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_denied(&self) {
        self.access_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_tuples_flushed(&self, count: u64) {
        self.tuples_flushed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_deliveries(&self, count: u64) {
        self.deliveries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reclaimed(&self) {
        self.shared_reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_daemon_failures(&self) {
        self.daemon_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Session gauge goes up on connect
    pub fn session_opened(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Session gauge goes down on disconnect, never below zero
    pub fn session_closed(&self) {
        let _ = self
            .sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Take a point-in-time snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            operations_committed: self.operations_committed.load(Ordering::Relaxed),
            operations_aborted: self.operations_aborted.load(Ordering::Relaxed),
            access_denied: self.access_denied.load(Ordering::Relaxed),
            tuples_flushed: self.tuples_flushed.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            shared_reclaimed: self.shared_reclaimed.load(Ordering::Relaxed),
            daemon_failures: self.daemon_failures.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub operations_committed: u64,
    pub operations_aborted: u64,
    pub access_denied: u64,
    pub tuples_flushed: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
    pub shared_reclaimed: u64,
    pub daemon_failures: u64,
    pub sessions: u64,
}
