// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The job queue — a passive substrate that admits jobs, hands them to the
// worker through a bounded pending channel, and fans each job's progress
// stream out to any number of per-job subscribers.
//
// The queue never processes jobs itself. Fan-out sends are non-blocking:
// slow subscribers miss updates, they do not stall the pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::ProgressUpdate;

use crate::job::Job;

/// Capacity of the pending channel; submits beyond this fail with `QueueFull`.
const PENDING_CAPACITY: usize = 100;

/// Capacity of each subscriber channel.
const SUBSCRIBER_BUFFER: usize = 50;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<ProgressUpdate>,
}

type SubscriberMap = RwLock<HashMap<String, Vec<Subscriber>>>;

/// Concurrent-safe registry of jobs plus the pending channel workers consume.
pub struct JobQueue {
    jobs: RwLock<HashMap<String, Arc<Job>>>,
    subscribers: Arc<SubscriberMap>,
    pending_tx: mpsc::Sender<Arc<Job>>,
    pending_rx: Mutex<Option<mpsc::Receiver<Arc<Job>>>>,
    next_subscriber_id: AtomicU64,
}

impl JobQueue {
    pub fn new() -> Self {
        let (pending_tx, pending_rx) = mpsc::channel(PENDING_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            pending_tx,
            pending_rx: Mutex::new(Some(pending_rx)),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Admit a job: register it under its id and push it onto the pending
    /// channel. Fails with `DuplicateJob` or `QueueFull`; a failed push rolls
    /// the registration back so no orphan entry remains.
    pub fn submit(&self, job: Arc<Job>) -> Result<()> {
        let id = job.id().to_string();
        {
            let mut jobs = self.jobs.write().unwrap();
            if jobs.contains_key(&id) {
                return Err(ScanwerkError::DuplicateJob(id));
            }
            jobs.insert(id.clone(), Arc::clone(&job));
        }

        if self.pending_tx.try_send(Arc::clone(&job)).is_err() {
            self.jobs.write().unwrap().remove(&id);
            return Err(ScanwerkError::QueueFull);
        }

        info!(job_id = %id, profile = %job.profile(), "job submitted");

        // Drain the job's progress channel into the subscriber fan-out for
        // the rest of the job's life.
        if let Some(rx) = job.take_progress_receiver() {
            let subscribers = Arc::clone(&self.subscribers);
            let job_id = id;
            tokio::spawn(forward_progress(job_id, rx, subscribers));
        }

        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Job>> {
        self.jobs.read().unwrap().get(id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Job>> {
        self.jobs.read().unwrap().values().cloned().collect()
    }

    /// Cancel a job by id.
    pub fn cancel(&self, id: &str) -> Result<()> {
        let job = self
            .get(id)
            .ok_or_else(|| ScanwerkError::NotFound("job".into()))?;
        job.cancel();
        info!(job_id = %id, "job cancelled");
        Ok(())
    }

    /// Remove a job and close all its subscriber channels.
    pub fn remove(&self, id: &str) {
        self.jobs.write().unwrap().remove(id);
        // Dropping the senders closes every subscriber receiver.
        self.subscribers.write().unwrap().remove(id);
    }

    /// Take the receiving end of the pending channel. The worker claims this
    /// exactly once at startup.
    pub fn take_pending_receiver(&self) -> Option<mpsc::Receiver<Arc<Job>>> {
        self.pending_rx.lock().unwrap().take()
    }

    /// Open a per-job update stream. Returns the subscription id (needed for
    /// `unsubscribe`) and the receiving end.
    pub fn subscribe(&self, job_id: &str) -> (u64, mpsc::Receiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        (id, rx)
    }

    /// Drop a subscription; the receiver observes the channel closing.
    pub fn unsubscribe(&self, job_id: &str, subscriber_id: u64) {
        let mut subscribers = self.subscribers.write().unwrap();
        if let Some(list) = subscribers.get_mut(job_id) {
            list.retain(|s| s.id != subscriber_id);
            if list.is_empty() {
                subscribers.remove(job_id);
            }
        }
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward every update from one job's progress channel to its subscribers.
/// Sends are non-blocking; a subscriber with a full buffer misses the update.
async fn forward_progress(
    job_id: String,
    mut rx: mpsc::Receiver<ProgressUpdate>,
    subscribers: Arc<SubscriberMap>,
) {
    while let Some(update) = rx.recv().await {
        let subscribers = subscribers.read().unwrap();
        if let Some(list) = subscribers.get(&job_id) {
            for subscriber in list {
                let _ = subscriber.tx.try_send(update.clone());
            }
        }
    }
    debug!(job_id = %job_id, "progress forwarding finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::types::OutputConfig;

    fn test_job() -> Arc<Job> {
        Arc::new(Job::new("standard", OutputConfig::default(), None, None))
    }

    #[tokio::test]
    async fn submit_then_get_returns_the_job() {
        let queue = JobQueue::new();
        let job = test_job();
        let id = job.id().to_string();

        queue.submit(job).unwrap();

        let found = queue.get(&id).unwrap();
        assert_eq!(found.id(), id);
        assert_eq!(queue.list().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_submit_is_rejected() {
        let queue = JobQueue::new();
        let job = test_job();
        queue.submit(Arc::clone(&job)).unwrap();

        let err = queue.submit(job).unwrap_err();
        assert!(matches!(err, ScanwerkError::DuplicateJob(_)));
    }

    #[tokio::test]
    async fn full_pending_channel_rejects_and_rolls_back() {
        let queue = JobQueue::new();
        for _ in 0..PENDING_CAPACITY {
            queue.submit(test_job()).unwrap();
        }

        let overflow = test_job();
        let overflow_id = overflow.id().to_string();
        let err = queue.submit(overflow).unwrap_err();
        assert!(matches!(err, ScanwerkError::QueueFull));
        // The rejected job must not linger in the registry.
        assert!(queue.get(&overflow_id).is_none());
    }

    #[tokio::test]
    async fn cancel_unknown_job_is_not_found() {
        let queue = JobQueue::new();
        let err = queue.cancel("does-not-exist").unwrap_err();
        assert!(matches!(err, ScanwerkError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_moves_job_to_terminal_state() {
        let queue = JobQueue::new();
        let job = test_job();
        let id = job.id().to_string();
        queue.submit(job).unwrap();

        queue.cancel(&id).unwrap();
        assert_eq!(
            queue.get(&id).unwrap().status(),
            crate::job::JobStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn pending_receiver_delivers_submitted_jobs() {
        let queue = JobQueue::new();
        let mut pending = queue.take_pending_receiver().unwrap();
        // A second take returns nothing; the worker claims it once.
        assert!(queue.take_pending_receiver().is_none());

        let job = test_job();
        let id = job.id().to_string();
        queue.submit(job).unwrap();

        let received = pending.recv().await.unwrap();
        assert_eq!(received.id(), id);
    }

    #[tokio::test]
    async fn progress_fans_out_to_subscribers() {
        let queue = JobQueue::new();
        let job = test_job();
        let id = job.id().to_string();

        queue.submit(Arc::clone(&job)).unwrap();
        let (_sub_id, mut rx) = queue.subscribe(&id);

        job.send_progress(ProgressUpdate {
            kind: "page_complete".into(),
            page: 1,
            ..Default::default()
        });

        let update = rx.recv().await.unwrap();
        assert_eq!(update.kind, "page_complete");
        assert_eq!(update.job_id, id);
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_stream() {
        let queue = JobQueue::new();
        let job = test_job();
        let id = job.id().to_string();
        queue.submit(Arc::clone(&job)).unwrap();

        let (sub_id, mut rx) = queue.subscribe(&id);
        queue.unsubscribe(&id, sub_id);

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn remove_closes_subscribers_and_forgets_job() {
        let queue = JobQueue::new();
        let job = test_job();
        let id = job.id().to_string();
        queue.submit(Arc::clone(&job)).unwrap();

        let (_sub_id, mut rx) = queue.subscribe(&id);
        queue.remove(&id);

        assert!(queue.get(&id).is_none());
        assert!(rx.recv().await.is_none());
    }
}
