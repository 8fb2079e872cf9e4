//! Periodic idle-policy sweep.
//!
//! Suspends idle desktops and force-ends overlong sessions on a fixed
//! interval. Runs until `cancel` is triggered.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vdesk_broker::IdlePolicy;

/// Run the idle sweep loop.
pub async fn run(idle: Arc<IdlePolicy>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Idle sweep started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Idle sweep stopping");
                break;
            }
            _ = ticker.tick() => {
                let outcome = idle.sweep().await;
                tracing::debug!(?outcome, "Idle sweep pass complete");
            }
        }
    }
}
