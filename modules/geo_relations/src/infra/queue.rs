//! In-process job queue and worker pool
//!
//! Jobs travel through a bounded channel in their wire form. Identical jobs
//! waiting in the channel collapse into one; a job leaves the pending set the
//! moment a worker picks it up, so a change arriving mid-run is queued again.

use crate::contract::GeoSyncError;
use crate::domain::jobs::{JobSink, SyncJob};
use crate::domain::service::Service;
use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Worker pool sizing and retry policy
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub workers: usize,
    pub capacity: usize,
    /// Runs per job for retryable failures, first run included
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl From<&crate::config::Config> for QueueSettings {
    fn from(cfg: &crate::config::Config) -> Self {
        Self {
            workers: cfg.workers,
            capacity: cfg.queue_capacity,
            max_attempts: cfg.max_attempts,
            retry_backoff: cfg.retry_backoff,
        }
    }
}

/// Counters since the queue was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub deduplicated: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    deduplicated: AtomicU64,
    completed: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

pub struct SyncQueue {
    tx: mpsc::Sender<String>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    pending: Arc<DashSet<SyncJob>>,
    counters: Arc<Counters>,
    settings: QueueSettings,
}

impl SyncQueue {
    pub fn new(settings: QueueSettings) -> Self {
        let (tx, rx) = mpsc::channel(settings.capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            pending: Arc::new(DashSet::new()),
            counters: Arc::new(Counters::default()),
            settings,
        }
    }

    /// Jobs waiting for a worker
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            deduplicated: self.counters.deduplicated.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Start `settings.workers` workers; they stop when `cancel` fires
    pub fn spawn_workers(&self, service: Arc<Service>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.settings.workers.max(1))
            .map(|worker| {
                let worker = Worker {
                    id: worker,
                    rx: self.rx.clone(),
                    pending: self.pending.clone(),
                    counters: self.counters.clone(),
                    settings: self.settings.clone(),
                    service: service.clone(),
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect()
    }

    /// Run the worker pool until `cancel` fires
    pub async fn run(&self, service: Arc<Service>, cancel: CancellationToken) {
        let handles = self.spawn_workers(service, cancel);
        tracing::info!(workers = handles.len(), "sync workers started");
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!("sync worker panicked: {}", e);
            }
        }
        tracing::info!("sync workers stopped");
    }
}

#[async_trait]
impl JobSink for SyncQueue {
    async fn submit(&self, job: SyncJob) -> Result<bool, GeoSyncError> {
        let payload = job.to_wire()?;
        if !self.pending.insert(job) {
            self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(job = %job, "identical job already pending");
            return Ok(false);
        }
        if let Err(e) = self.tx.send(payload).await {
            self.pending.remove(&job);
            return Err(GeoSyncError::Queue(e.to_string()));
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }
}

struct Worker {
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    pending: Arc<DashSet<SyncJob>>,
    counters: Arc<Counters>,
    settings: QueueSettings,
    service: Arc<Service>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        loop {
            let payload = tokio::select! {
                _ = self.cancel.cancelled() => break,
                payload = async { self.rx.lock().await.recv().await } => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            let job = match SyncJob::from_wire(&payload) {
                Ok(job) => job,
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(worker = self.id, error_kind = e.kind(), "dropping undecodable job: {}", e);
                    continue;
                }
            };
            self.pending.remove(&job);
            self.process(job).await;
        }
        tracing::debug!(worker = self.id, "worker exiting");
    }

    async fn process(&self, job: SyncJob) {
        let mut attempt = 1;
        loop {
            match self.service.run(&job).await {
                Ok(outcome) => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(worker = self.id, job = %job, attempt, ?outcome, "job done");
                    return;
                }
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        worker = self.id,
                        job = %job,
                        attempt,
                        error_kind = e.kind(),
                        "job failed, retrying: {}",
                        e
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(self.settings.retry_backoff) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        worker = self.id,
                        job = %job,
                        attempt,
                        error_kind = e.kind(),
                        "job failed: {}",
                        e
                    );
                    return;
                }
            }
        }
    }
}
