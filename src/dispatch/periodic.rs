use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Fire `tick` every `period` until `shutdown` is cancelled.
///
/// Every firing runs as its own task, so a slow tick does not delay the
/// timer; overlapping is left to the tick itself to refuse. Errors are
/// logged and never stop the timer.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        info!("Starting {} loop, period {:?}", name, period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("{} loop stopped", name);
                    break;
                }
                _ = interval.tick() => {
                    let fut = tick();
                    tokio::spawn(async move {
                        if let Err(err) = fut.await {
                            error!("{} tick failed: {:#}", name, err);
                        }
                    });
                }
            }
        }
    })
}
