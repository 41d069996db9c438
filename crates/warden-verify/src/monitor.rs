//! Continuous verification daemon.
//!
//! A ticker task scans the schedule store and enqueues subjects whose
//! next-verification deadline has passed onto a bounded queue, consumed
//! by a fixed-size worker pool. The same ticker periodically sweeps the
//! result cache and runs the slow schedule-tuning pass. Everything shuts
//! down through a single watch-channel signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use warden_core::{SubjectId, Timestamp};

use crate::pipeline::Orchestrator;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// How often the ticker scans for due subjects.
    pub tick_interval: Duration,
    /// Bounded work-queue depth. A full queue defers the remaining due
    /// subjects to the next tick.
    pub queue_size: usize,
    /// Fixed worker-pool size.
    pub workers: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            queue_size: 256,
            workers: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// VerificationMonitor
// ---------------------------------------------------------------------------

pub struct VerificationMonitor;

impl VerificationMonitor {
    /// Spawn the ticker and worker tasks. The returned handle owns the
    /// shutdown signal.
    pub fn spawn(orchestrator: Arc<Orchestrator>, config: MonitorConfig) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::channel::<SubjectId>(config.queue_size.max(1));
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let mut tasks = Vec::new();

        for worker in 0..config.workers.max(1) {
            let queue_rx = queue_rx.clone();
            let orchestrator = orchestrator.clone();
            let mut shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    let subject = tokio::select! {
                        _ = shutdown.changed() => break,
                        received = async { queue_rx.lock().await.recv().await } => {
                            match received {
                                Some(subject) => subject,
                                None => break,
                            }
                        }
                    };
                    match orchestrator.verify_now(&subject).await {
                        Ok(result) => {
                            tracing::debug!(
                                worker,
                                subject = %subject,
                                risk = %result.risk_score,
                                "scheduled verification completed"
                            );
                        }
                        Err(e) => {
                            // Typically a subject deregistered after being
                            // enqueued.
                            tracing::debug!(subject = %subject, "scheduled verification skipped: {}", e);
                        }
                    }
                }
            }));
        }

        let ticker_orchestrator = orchestrator;
        let mut ticker_shutdown = shutdown_rx;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let tune_interval = ticker_orchestrator.schedules().config().tune_interval;
            let mut last_tune = tokio::time::Instant::now();

            loop {
                tokio::select! {
                    _ = ticker_shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let now = Timestamp::now();
                for subject in ticker_orchestrator.schedules().due_subjects(now) {
                    match queue_tx.try_send(subject.clone()) {
                        Ok(()) => {
                            ticker_orchestrator.schedules().mark_enqueued(&subject, now);
                        }
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            tracing::warn!("verification queue full, deferring to next tick");
                            break;
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => return,
                    }
                }

                let swept = ticker_orchestrator.sweep_cache();
                if swept > 0 {
                    tracing::debug!(swept, "expired cache entries removed");
                }

                if last_tune.elapsed() >= tune_interval {
                    ticker_orchestrator.tune_schedules();
                    last_tune = tokio::time::Instant::now();
                }
            }
        }));

        MonitorHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

/// Handle to the running monitor tasks.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signal shutdown and wait for the ticker and all workers to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
