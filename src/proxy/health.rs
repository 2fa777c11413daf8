//! Periodic health sweep for the proxy pool
//!
//! One task per pool; rounds run back to back on a single task so sweeps
//! never overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::proxy::pool::ProxyPool;

/// How long shutdown waits for an in-flight round before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Health checker for pooled proxies
pub struct HealthChecker {
    pool: Arc<ProxyPool>,
    check_interval: Duration,
}

impl HealthChecker {
    pub fn new(pool: Arc<ProxyPool>, check_interval: Duration) -> Self {
        Self {
            pool,
            check_interval,
        }
    }

    /// Run until `shutdown` flips to true (call in a spawned task)
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting health checker with {}ms interval",
            self.check_interval.as_millis()
        );

        let mut ticker = interval_at(Instant::now() + self.check_interval, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.pool.sweep().await {
                        error!("Health check round failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Health checker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Spawn the checker onto the runtime
    pub fn spawn(self) -> HealthHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(rx).await });
        HealthHandle { shutdown: tx, task }
    }
}

/// Owner of a running health checker task
pub struct HealthHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HealthHandle {
    /// Signal the task and wait for it, aborting after a grace period
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        let mut task = self.task;
        match timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Health checker task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Health checker did not stop within {}s, aborting",
                    SHUTDOWN_GRACE.as_secs()
                );
                task.abort();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
