//! Write fault injection
//!
//! Lets tests (and operators reproducing incidents) make the store reject a
//! specific write, so the transactional behaviour of multi-step operations
//! can be observed without a real database failing underneath.
//!
//! Two sources are supported:
//! - `Store::arm_write_fault(n)`: the n-th write from now fails, once.
//! - `HOSTMASTER_FAULT_TABLE=<table>`: every write to that table fails.
//!
//! ```bash
//! HOSTMASTER_FAULT_TABLE=httpd_tomcat_contexts hostmaster serve
//! ```

use std::sync::{Mutex, OnceLock};

use super::errors::{StoreError, StoreResult};
use super::table::Table;

/// Cache the faulted table name to avoid repeated env var lookups
static FAULT_TABLE: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn faulted_table() -> Option<&'static str> {
    FAULT_TABLE
        .get_or_init(|| std::env::var("HOSTMASTER_FAULT_TABLE").ok())
        .as_deref()
}

/// Armed write faults for one store
#[derive(Debug, Default)]
pub struct FaultInjector {
    /// Writes left before the armed fault fires
    countdown: Mutex<Option<usize>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `nth` write (1-based) issued after this call
    pub fn arm(&self, nth: usize) {
        if let Ok(mut countdown) = self.countdown.lock() {
            *countdown = Some(nth.max(1));
        }
    }

    /// Drop any armed fault
    pub fn disarm(&self) {
        if let Ok(mut countdown) = self.countdown.lock() {
            *countdown = None;
        }
    }

    /// Whether a fault is armed and has not fired yet
    pub fn is_armed(&self) -> bool {
        self.countdown
            .lock()
            .map(|c| c.is_some())
            .unwrap_or(false)
    }

    /// Called before every write
    pub fn check(&self, table: Table) -> StoreResult<()> {
        if faulted_table() == Some(table.as_str()) {
            return Err(StoreError::WriteFailed {
                table,
                reason: "fault injected by HOSTMASTER_FAULT_TABLE".to_string(),
            });
        }

        let mut countdown = self.countdown.lock().map_err(|_| StoreError::Poisoned)?;
        match *countdown {
            Some(remaining) if remaining <= 1 => {
                *countdown = None;
                Err(StoreError::WriteFailed {
                    table,
                    reason: "injected write fault".to_string(),
                })
            }
            Some(remaining) => {
                *countdown = Some(remaining - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unarmed_never_fails() {
        let faults = FaultInjector::new();
        for _ in 0..10 {
            assert!(faults.check(Table::Packages).is_ok());
        }
    }

    #[test]
    fn test_armed_fault_fires_once() {
        let faults = FaultInjector::new();
        faults.arm(2);

        assert!(faults.check(Table::Packages).is_ok());
        assert!(matches!(
            faults.check(Table::HttpdSites),
            Err(StoreError::WriteFailed { table: Table::HttpdSites, .. })
        ));
        assert!(!faults.is_armed());
        assert!(faults.check(Table::HttpdSites).is_ok());
    }

    #[test]
    fn test_disarm() {
        let faults = FaultInjector::new();
        faults.arm(1);
        faults.disarm();
        assert!(faults.check(Table::Accounts).is_ok());
    }
}
