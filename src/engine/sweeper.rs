use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::orchestrator::expire_assignment;
use crate::models::assignment::AssignmentStatus;
use crate::state::AppState;

pub async fn run_expiry_sweeper(state: Arc<AppState>) {
    let interval = std::time::Duration::from_secs(state.config.sweep_interval_secs);
    info!(interval_secs = state.config.sweep_interval_secs, "expiry sweeper started");

    loop {
        sleep(interval).await;

        let swept = sweep_expired(&state);
        if swept > 0 {
            info!(swept, "cancelled expired assignments");
        }

        crate::tracking::cleanup_old_tracking(&state);
    }
}

/// Cancels every assignment still unaccepted past the configured timeout.
/// Safe to re-run: already-terminal assignments fail the transition table
/// and are skipped. One bad record never stops the batch.
pub fn sweep_expired(state: &AppState) -> usize {
    let cutoff = Utc::now() - Duration::minutes(state.config.assignment_timeout_minutes);

    let expired: Vec<Uuid> = state
        .assignments
        .iter()
        .filter(|entry| entry.status == AssignmentStatus::Assigned && entry.assigned_at < cutoff)
        .map(|entry| entry.id)
        .collect();

    let mut swept = 0;
    for assignment_id in expired {
        match expire_assignment(state, assignment_id) {
            Ok(_) => {
                swept += 1;
                state.metrics.expired_assignments_total.inc();
            }
            Err(err) => {
                warn!(
                    assignment_id = %assignment_id,
                    error = %err,
                    "skipping assignment during expiry sweep"
                );
            }
        }
    }

    swept
}
