//! # Registration Worker Pool
//!
//! Tokio workers consuming [`RegistrationJob`]s from an in-process queue.
//!
//! A job whose run returns a retryable `Err` is redelivered after exponential
//! backoff until `backoff.max_deliveries` is reached. Jobs for a submission
//! that is already being processed are coalesced by the runner's claimer, so
//! duplicate enqueues never fan out into parallel executions.
//!
//! A coalesced payment-complete job is not a duplicate: the claim holder may
//! have loaded the submission before the payment landed. It is redelivered
//! with backoff until it runs, independent of `max_deliveries`; the claim
//! timeout bounds how long a claim can block it.

use super::task_runner::RegistrationTaskRunner;
use super::types::{RegistrationJob, TaskOutcome, Trigger};
use crate::config::{BackoffConfig, RegistrationConfig};
use crate::error::{RegistrationError, Result};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Sending side of the job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<RegistrationJob>,
}

impl JobQueue {
    /// A queue plus its receiving end, for wiring a pool or inspecting jobs.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RegistrationJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn enqueue(&self, job: RegistrationJob) -> Result<()> {
        self.sender
            .send(job)
            .map_err(|_| RegistrationError::Worker("job queue is closed".to_string()))
    }
}

/// Counters since the pool started.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    redelivered: AtomicU64,
    coalesced: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub redelivered: u64,
    pub coalesced: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            redelivered: self.redelivered.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

pub struct RegistrationWorkerPool {
    queue: JobQueue,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl RegistrationWorkerPool {
    /// Spawn `worker.concurrency` workers on the current runtime.
    pub fn start(runner: Arc<RegistrationTaskRunner>, config: &RegistrationConfig) -> Self {
        let (queue, receiver) = JobQueue::channel();
        let receiver = Arc::new(Mutex::new(receiver));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(WorkerStats::default());

        let handles = (0..config.worker.concurrency)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    runner: Arc::clone(&runner),
                    receiver: Arc::clone(&receiver),
                    queue: queue.clone(),
                    backoff: config.backoff.clone(),
                    stats: Arc::clone(&stats),
                };
                tokio::spawn(worker.run(shutdown_rx.clone()))
            })
            .collect();

        info!(
            workers = config.worker.concurrency,
            max_deliveries = config.backoff.max_deliveries,
            "🚀 Registration worker pool started"
        );

        Self {
            queue,
            shutdown,
            handles,
            stats,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    pub fn submit(&self, job: RegistrationJob) -> Result<()> {
        self.queue.enqueue(job)
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the workers after their current job and wait for them. Jobs
    /// still queued are dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!("Registration worker terminated abnormally: {e}");
            }
        }
        info!("Registration worker pool stopped");
    }
}

struct Worker {
    id: usize,
    runner: Arc<RegistrationTaskRunner>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<RegistrationJob>>>,
    queue: JobQueue,
    backoff: BackoffConfig,
    stats: Arc<WorkerStats>,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker_id = self.id, "Registration worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let job = tokio::select! {
                job = async { self.receiver.lock().await.recv().await } => job,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let Some(job) = job else {
                break;
            };
            self.process(job).await;
        }
        debug!(worker_id = self.id, "Registration worker stopped");
    }

    async fn process(&self, job: RegistrationJob) {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        match self.runner.run_job(&job).await {
            Ok(TaskOutcome::Coalesced) => {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                if job.trigger == Trigger::OnPaymentComplete {
                    let delay = self.backoff.delay_for(job.delivery);
                    debug!(
                        worker_id = self.id,
                        submission_id = %job.submission_id,
                        retry_in_ms = millis(delay),
                        "Payment job coalesced, scheduling redelivery"
                    );
                    self.schedule(job.redelivery(), delay);
                }
            }
            Ok(outcome) => {
                debug!(
                    worker_id = self.id,
                    submission_id = %job.submission_id,
                    outcome = ?outcome,
                    "Registration job finished"
                );
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                self.redeliver(job, e);
            }
        }
    }

    fn redeliver(&self, job: RegistrationJob, error: RegistrationError) {
        if !error.is_retryable() || job.delivery >= self.backoff.max_deliveries {
            error!(
                submission_id = %job.submission_id,
                delivery = job.delivery,
                error = %error,
                "Registration job failed permanently"
            );
            return;
        }

        let delay = self.backoff.delay_for(job.delivery);
        warn!(
            submission_id = %job.submission_id,
            delivery = job.delivery,
            retry_in_ms = millis(delay),
            error = %error,
            "Registration job failed, scheduling redelivery"
        );
        self.schedule(job.redelivery(), delay);
    }

    fn schedule(&self, next: RegistrationJob, delay: Duration) {
        self.stats.redelivered.fetch_add(1, Ordering::Relaxed);
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if queue.enqueue(next).is_err() {
                debug!(submission_id = %next.submission_id, "Queue closed, redelivery dropped");
            }
        });
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
