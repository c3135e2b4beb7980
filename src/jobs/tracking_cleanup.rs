use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::TickGuard;
use crate::services::automation::AutomationService;

/// Periodically purge persisted tracking snapshots past the retention window
pub async fn start_tracking_cleanup_job(automation: AutomationService) {
    tokio::spawn(async move {
        let config = automation.config().clone();
        info!(
            interval_secs = config.cleanup_interval.as_secs(),
            retention_hours = config.tracking_retention.num_hours(),
            "Tracking cleanup job started"
        );

        let running = Arc::new(AtomicBool::new(false));
        let mut interval = interval(config.cleanup_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping tracking cleanup job gracefully");
                    break;
                }
                _ = interval.tick() => {
                    let Some(guard) = TickGuard::acquire(&running) else {
                        debug!("Previous cleanup still running, skipping");
                        continue;
                    };

                    let automation = automation.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        match automation.cleanup_tracking().await {
                            Ok(deleted) => debug!(deleted, "Tracking cleanup tick complete"),
                            Err(e) => error!(error = %e, "Tracking cleanup failed"),
                        }
                    });
                }
            }
        }
    });
}
