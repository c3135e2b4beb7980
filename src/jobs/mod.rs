pub mod status_reconciliation;
pub mod tracking_automation;
pub mod tracking_cleanup;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-timer "skip if already running" flag, released on drop
pub(crate) struct TickGuard(Arc<AtomicBool>);

impl TickGuard {
    pub(crate) fn acquire(running: &Arc<AtomicBool>) -> Option<Self> {
        if running.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self(running.clone()))
        }
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
