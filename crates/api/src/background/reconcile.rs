//! Periodic state reconciliation loop.
//!
//! Refreshes every active desktop against the provider on a fixed
//! interval. Runs until `cancel` is triggered.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use vdesk_broker::StateReconciler;

/// Run the reconciliation loop.
pub async fn run(reconciler: Arc<StateReconciler>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Reconcile loop started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Reconcile loop stopping");
                break;
            }
            _ = ticker.tick() => {
                let refreshed = reconciler.refresh_all().await;
                tracing::debug!(refreshed, "Reconcile pass complete");
            }
        }
    }
}
