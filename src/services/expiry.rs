use chrono::Utc;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::services::tracker::{PaymentRequestTracker, TrackerError};

/// Runs the expiry loop. Pending requests older than `horizon` are moved to
/// `Expired` every `interval`; a callback that arrives afterwards is recorded
/// as an orphan instead of crediting a goal.
pub async fn run_expiry_sweeper(
    tracker: Arc<PaymentRequestTracker>,
    interval: Duration,
    horizon: chrono::Duration,
) {
    info!(
        interval_secs = interval.as_secs(),
        horizon_secs = horizon.num_seconds(),
        "Payment request expiry sweeper started"
    );

    loop {
        sleep(interval).await;

        if let Err(e) = sweep_once(&tracker, horizon).await {
            error!("Expiry sweep error: {}", e);
        }
    }
}

pub async fn sweep_once(tracker: &PaymentRequestTracker, horizon: chrono::Duration) -> Result<usize, TrackerError> {
    let expired = tracker.expire_stale(Utc::now(), horizon).await?;
    if expired > 0 {
        info!(expired, "Expired stale payment requests");
    } else {
        debug!("No stale payment requests");
    }
    Ok(expired)
}
