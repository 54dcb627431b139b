//! Background sweep worker
//!
//! Runs the orchestrator's periodic timeout sweep on a small fixed pool of
//! background tasks (one by default), with jittered intervals, a periodic
//! persistence tick for in-progress workflows, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::ApprovalOrchestrator;

/// Sweep worker configuration
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Number of background sweep tasks
    pub workers: usize,
    /// Base interval between sweep passes; sub-second by default to meet
    /// the detection-latency target
    pub interval: Duration,
    /// Fractional jitter applied to each interval (0.1 = ±10%)
    pub jitter: f64,
    /// How often in-progress workflows are persisted
    pub persist_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            interval: Duration::from_millis(250),
            jitter: 0.1,
            persist_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl SweeperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.persist_interval = interval;
        self
    }
}

/// Drives periodic sweeps until shut down
pub struct SweepWorker {
    orchestrator: Arc<ApprovalOrchestrator>,
    config: SweeperConfig,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SweepWorker {
    pub fn new(orchestrator: Arc<ApprovalOrchestrator>, config: SweeperConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            orchestrator,
            config,
            shutdown_tx,
            shutdown_rx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the sweep task pool; idempotent while running
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            return;
        }

        info!(
            workers = self.config.workers,
            interval_ms = self.config.interval.as_millis() as u64,
            "sweep workers started"
        );
        for worker in 0..self.config.workers.max(1) {
            let orchestrator = self.orchestrator.clone();
            let config = self.config.clone();
            let mut shutdown_rx = self.shutdown_rx.clone();

            handles.push(tokio::spawn(async move {
                // Only the first worker runs the persistence tick
                let persists = worker == 0;
                let mut since_persist = Duration::ZERO;
                loop {
                    let interval = jittered(config.interval, config.jitter);
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = shutdown_rx.changed() => {
                            debug!(worker, "sweep worker shutdown requested");
                            break;
                        }
                    }

                    let report = orchestrator.run_sweep(Utc::now()).await;
                    if report.warnings
                        + report.paths_opened
                        + report.paths_exhausted
                        + report.expired
                        > 0
                    {
                        debug!(
                            worker,
                            warnings = report.warnings,
                            paths_opened = report.paths_opened,
                            exhausted = report.paths_exhausted,
                            expired = report.expired,
                            "sweep pass"
                        );
                    }

                    if persists {
                        since_persist += interval;
                        if since_persist >= config.persist_interval {
                            since_persist = Duration::ZERO;
                            orchestrator.persist_active().await;
                        }
                    }
                }
                debug!(worker, "sweep worker stopped");
            }));
        }
    }

    /// Signal shutdown and wait for every loop to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if tokio::time::timeout(self.config.shutdown_timeout, handle)
                .await
                .is_err()
            {
                warn!("sweep worker did not stop within the shutdown timeout");
            }
        }
        info!("sweep workers stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.handles.lock().is_empty()
    }
}

fn jittered(interval: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return interval;
    }
    let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
    interval.mul_f64(factor.max(0.1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorConfig;

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let j = jittered(base, 0.1);
            assert!(j >= Duration::from_millis(900));
            assert!(j <= Duration::from_millis(1100));
        }
        assert_eq!(jittered(base, 0.0), base);
    }

    #[test_log::test(tokio::test)]
    async fn test_start_and_shutdown() {
        let orchestrator = Arc::new(ApprovalOrchestrator::new(OrchestratorConfig::default()));
        let worker = SweepWorker::new(
            orchestrator,
            SweeperConfig::default().with_interval(Duration::from_millis(10)),
        );

        worker.start();
        assert!(worker.is_running());
        // A second start is a no-op
        worker.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        worker.shutdown().await;
        assert!(!worker.is_running());
    }

    #[test_log::test(tokio::test)]
    async fn test_multiple_workers_shut_down_together() {
        let orchestrator = Arc::new(ApprovalOrchestrator::new(OrchestratorConfig::default()));
        let worker = SweepWorker::new(
            orchestrator,
            SweeperConfig::default()
                .with_workers(3)
                .with_interval(Duration::from_millis(10)),
        );

        worker.start();
        tokio::time::sleep(Duration::from_millis(40)).await;
        worker.shutdown().await;
        assert!(!worker.is_running());
    }
}
