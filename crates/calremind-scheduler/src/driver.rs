use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use calremind_schema::CycleReport;
use tokio_util::sync::CancellationToken;

/// One pass of the reminder pipeline.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport>;
}

/// Run a cycle now and then once per `interval` until `token` is cancelled.
///
/// Cancellation is only observed between cycles. Returns the number of
/// cycles started.
pub async fn run_until_cancelled<R>(runner: &R, interval: Duration, token: CancellationToken) -> u64
where
    R: CycleRunner + ?Sized,
{
    let mut cycles = 0_u64;
    loop {
        cycles += 1;
        match runner.run_cycle().await {
            Ok(report) => {
                tracing::info!(
                    cycle = cycles,
                    events = report.events_seen,
                    sent = report.reminders_sent,
                    skipped = report.reminders_skipped,
                    failures = report.delivery_failures + report.event_failures,
                    "reminder cycle complete"
                );
            }
            Err(e) => {
                tracing::error!(cycle = cycles, "reminder cycle failed: {e:#}");
            }
        }

        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("shutdown requested; stopping after {cycles} cycles");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
    cycles
}
