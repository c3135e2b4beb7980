//! Tracking Automation Job
//!
//! Binds delivery tracking to the order lifecycle: starts polling for orders
//! that became ready or delivering, stops it once they are delivered.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::TickGuard;
use crate::services::automation::AutomationService;

pub async fn start_tracking_automation_job(automation: AutomationService) {
    tokio::spawn(async move {
        let config = automation.config().clone();
        info!(
            interval_secs = config.tracking_interval.as_secs(),
            window_secs = config.tracking_recent_window.num_seconds(),
            auto_track_ready = config.auto_track_ready,
            "Tracking automation job started"
        );

        let running = Arc::new(AtomicBool::new(false));
        let mut interval = interval(config.tracking_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping tracking automation job gracefully");
                    break;
                }
                _ = interval.tick() => {
                    let Some(guard) = TickGuard::acquire(&running) else {
                        debug!("Previous tracking automation tick still running, skipping");
                        continue;
                    };

                    let automation = automation.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        if let Err(e) = automation.run_tracking_automation().await {
                            error!(error = %e, "Tracking automation tick failed");
                        }
                    });
                }
            }
        }

        info!("Tracking automation job stopped");
    });
}
