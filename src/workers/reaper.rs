use crate::modules::media::repository::{MediaAssetStore, StateError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Fail media assets a dead worker left in `processing`.
pub async fn reap_once(assets: &dyn MediaAssetStore, threshold: Duration) -> Result<u64, StateError> {
    let detail = format!(
        "processing did not finish within {}s; the worker was likely killed",
        threshold.as_secs()
    );
    assets.fail_stale(threshold, &detail).await
}

pub async fn start_stale_reaper(
    assets: Arc<dyn MediaAssetStore>,
    threshold: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(
        "🧹 Starting stale processing reaper (threshold {}s, every {}s)",
        threshold.as_secs(),
        interval.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if let Err(e) = reap_once(assets.as_ref(), threshold).await {
            error!("Stale processing sweep failed: {}", e);
        }
    }

    info!("🧹 Stale processing reaper stopped");
}
