use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::table::HitTable;
use crate::telemetry::Metrics;

/// Periodically evict entries idle for at least `idle`.
///
/// Runs until the returned handle is aborted. The first sweep happens one `interval` after
/// spawning.
pub fn spawn_sweeper(
    table: Arc<HitTable>,
    interval: Duration,
    idle: Duration,
    metrics: Option<Arc<Metrics>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = table.sweep(idle);
            let remaining = table.len();
            debug!(removed, remaining, "hit table swept");
            if let Some(metrics) = &metrics {
                metrics.set_hit_table_entries(remaining);
            }
        }
    })
}
