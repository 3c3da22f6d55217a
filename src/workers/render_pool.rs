use super::process::{ProcessLauncher, RenderError, RenderRequest};
use crate::server::metrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, warn};

/// How a render got its turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free.
    Immediate,
    /// The caller waited for a running render to finish.
    AfterWait,
    /// The wait timed out and the render was launched over the ceiling.
    OverCapacity,
}

/// Bounded executor for renderer processes.
///
/// Launching holds one permit for the lifetime of the process. When all
/// permits are taken the caller waits up to `wait_timeout` for one; past
/// that it launches anyway. The ceiling is soft: it throttles a caller that
/// keeps submitting, it never rejects a render.
pub struct RenderPool {
    launcher: Arc<dyn ProcessLauncher>,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    wait_timeout: Duration,
}

impl RenderPool {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        max_concurrent: usize,
        wait_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            wait_timeout,
        }
    }

    /// Processes launched and not yet exited.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn submit(&self, request: RenderRequest) -> Result<Admission, RenderError> {
        let (permit, admission) = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => (Some(permit), Admission::Immediate),
            Err(TryAcquireError::Closed) => return Err(RenderError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                debug!(
                    "Render pool saturated ({} running), waiting up to {:?}",
                    self.in_flight(),
                    self.wait_timeout
                );
                match tokio::time::timeout(self.wait_timeout, self.permits.clone().acquire_owned())
                    .await
                {
                    Ok(Ok(permit)) => (Some(permit), Admission::AfterWait),
                    Ok(Err(_)) => return Err(RenderError::PoolClosed),
                    Err(_) => {
                        warn!(
                            "No render slot after {:?}, launching over capacity",
                            self.wait_timeout
                        );
                        (None, Admission::OverCapacity)
                    }
                }
            }
        };

        // Dropping the permit on launch failure hands the slot back.
        let exit = self.launcher.launch(&request)?;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_render_in_flight(running);

        let in_flight = self.in_flight.clone();
        let executable = request.executable.display().to_string();
        tokio::spawn(async move {
            let _permit = permit;
            let exit = exit.await;
            let running = in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_render_in_flight(running);
            if exit.success {
                debug!("{} finished, {} renders still running", executable, running);
            } else {
                warn!("{} exited unsuccessfully (code {:?})", executable, exit.code);
            }
        });

        Ok(admission)
    }
}
