//! Periodic price refresh

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::pricing::PricingService;

/// Refresh prices every `interval` until a shutdown signal arrives.
///
/// The initial fetch is done by the caller, so the first tick fires one
/// interval after start. Failed refreshes are logged and the loop goes on
/// serving whatever the caches hold.
pub async fn run_refresh_loop(
    service: Arc<PricingService>,
    interval: Duration,
    mut shutdown: mpsc::Receiver<()>,
) -> eyre::Result<()> {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    info!(
        interval_secs = interval.as_secs(),
        "Price refresh loop starting"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping price refresh");
                return Ok(());
            }
        }

        match service.fetch_and_update_usd_prices().await {
            Ok(()) => {
                if consecutive_failures > 0 {
                    info!(
                        previous_failures = consecutive_failures,
                        "Price refresh recovered"
                    );
                }
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures >= 5 {
                    error!(
                        error = %e,
                        consecutive_failures,
                        "Price refresh keeps failing, serving stale data"
                    );
                } else {
                    warn!(error = %e, consecutive_failures, "Price refresh failed");
                }
            }
        }
    }
}
