use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::planner::Planner;

/// Background task that periodically saves the planner's events when they
/// changed since the last save or load.
pub async fn run_autosave(planner: Arc<Planner>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing to save yet.
    interval.tick().await;
    loop {
        interval.tick().await;
        autosave_once(&planner).await;
    }
}

pub fn spawn(planner: Arc<Planner>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(run_autosave(planner, every))
}

/// One autosave pass. Returns true if a snapshot was written.
pub async fn autosave_once(planner: &Planner) -> bool {
    if !planner.is_dirty().await {
        debug!("autosave skipped, nothing changed");
        return false;
    }
    match planner.save_snapshot().await {
        Ok(events) => {
            metrics::counter!(crate::observability::AUTOSAVES_TOTAL).increment(1);
            info!(events, "autosaved");
            true
        }
        Err(e) => {
            // Stays dirty, so the next tick retries.
            warn!(error = %e, "autosave failed");
            false
        }
    }
}
