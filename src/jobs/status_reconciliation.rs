//! Status Reconciliation Job
//!
//! Polling fallback for missed webhooks: every interval, asks the platforms
//! for the current status of a small batch of stale active orders.
//! Supports graceful shutdown via SIGTERM/SIGINT signals.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::TickGuard;
use crate::services::automation::AutomationService;

/// Start the status reconciliation job
///
/// Each tick runs in its own task; a tick that fires while the previous one
/// is still working is skipped.
pub async fn start_status_reconciliation_job(automation: AutomationService) {
    tokio::spawn(async move {
        let config = automation.config().clone();
        info!(
            interval_secs = config.reconcile_interval.as_secs(),
            batch_size = config.reconcile_batch_size,
            stale_after_secs = config.reconcile_stale_after.num_seconds(),
            "Status reconciliation job started"
        );

        let running = Arc::new(AtomicBool::new(false));
        let mut interval = interval(config.reconcile_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping status reconciliation job gracefully");
                    break;
                }
                _ = interval.tick() => {
                    let Some(guard) = TickGuard::acquire(&running) else {
                        debug!("Previous reconciliation tick still running, skipping");
                        continue;
                    };

                    let automation = automation.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        match automation.reconcile_statuses().await {
                            Ok(summary) if summary.checked > 0 => {
                                info!(
                                    checked = summary.checked,
                                    updated = summary.updated,
                                    unsupported = summary.unsupported,
                                    failed = summary.failed,
                                    "Status reconciliation tick complete"
                                );
                            }
                            Ok(_) => debug!("No stale orders to reconcile"),
                            Err(e) => error!(error = %e, "Status reconciliation tick failed"),
                        }
                    });
                }
            }
        }

        info!("Status reconciliation job stopped");
    });
}
