// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The scan job model.
//
// All mutation goes through the synchronized methods below; readers (including
// JSON serialization via `snapshot`) take the read lock implicitly. Progress
// updates flow through a bounded channel with drop-on-full semantics so a
// slow consumer can never stall the scan pipeline.

use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use scanwerk_core::types::{DocumentMetadata, OutputConfig, ProgressUpdate};

/// Capacity of the per-job progress channel. Senders never block; updates
/// beyond this backlog are dropped.
const PROGRESS_BUFFER: usize = 100;

/// Lifecycle states of a scan job.
///
/// `Completed`, `Failed`, and `Cancelled` are terminal; a job never leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Scanning,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scanning | Self::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A single scanned page.
///
/// Created by the scanner controller; owned by its job once appended. The
/// in-memory image is dropped when the pipeline persists it to disk.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// 1-indexed position within the job.
    pub number: usize,
    pub width: u32,
    pub height: u32,
    pub image: Option<DynamicImage>,
    pub path: Option<PathBuf>,
    /// A read error carried out of the scan stream.
    pub error: Option<String>,
}

impl Page {
    /// A successfully scanned page.
    pub fn scanned(number: usize, image: DynamicImage) -> Self {
        Self {
            number,
            width: image.width(),
            height: image.height(),
            image: Some(image),
            path: None,
            error: None,
        }
    }

    /// A page carrying a scan error; terminates the batch stream.
    pub fn from_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Serializable view of a page for API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub number: usize,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl From<&Page> for PageInfo {
    fn from(page: &Page) -> Self {
        Self {
            number: page.number,
            width: page.width,
            height: page.height,
            path: page.path.clone(),
        }
    }
}

/// Serializable snapshot of a job, matching the public JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub status: JobStatus,
    pub profile: String,
    pub pages: Vec<PageInfo>,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    pub output: OutputConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_enabled: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mutable job state guarded by the job's lock.
#[derive(Debug)]
struct JobState {
    status: JobStatus,
    pages: Vec<Page>,
    progress: u8,
    error: String,
    output: OutputConfig,
    metadata: Option<DocumentMetadata>,
    ocr_enabled: Option<bool>,
    updated_at: DateTime<Utc>,
}

/// A scan job with all its data and state.
#[derive(Debug)]
pub struct Job {
    id: String,
    profile: String,
    created_at: DateTime<Utc>,
    state: RwLock<JobState>,
    cancel: Mutex<Option<CancellationToken>>,
    progress_tx: mpsc::Sender<ProgressUpdate>,
    progress_rx: Mutex<Option<mpsc::Receiver<ProgressUpdate>>>,
}

impl Job {
    /// Create a new pending job with a fresh id.
    pub fn new(
        profile: impl Into<String>,
        output: OutputConfig,
        metadata: Option<DocumentMetadata>,
        ocr_enabled: Option<bool>,
    ) -> Self {
        let now = Utc::now();
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_BUFFER);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile: profile.into(),
            created_at: now,
            state: RwLock::new(JobState {
                status: JobStatus::Pending,
                pages: Vec::new(),
                progress: 0,
                error: String::new(),
                output,
                metadata,
                ocr_enabled,
                updated_at: now,
            }),
            cancel: Mutex::new(None),
            progress_tx,
            progress_rx: Mutex::new(Some(progress_rx)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn status(&self) -> JobStatus {
        self.state.read().unwrap().status
    }

    /// Advance the job status. Transitions out of a terminal state are
    /// ignored so observed statuses always form a valid lifecycle path.
    pub fn set_status(&self, status: JobStatus) {
        let mut state = self.state.write().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = status;
        state.updated_at = Utc::now();
    }

    /// Mark the job failed with an error message. A no-op once terminal.
    pub fn set_error(&self, error: impl std::fmt::Display) {
        let mut state = self.state.write().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = JobStatus::Failed;
        state.error = error.to_string();
        state.updated_at = Utc::now();
    }

    pub fn error(&self) -> String {
        self.state.read().unwrap().error.clone()
    }

    /// Append a scanned page. Ignored once the job is terminal, so a
    /// cancelled job can never grow.
    pub fn add_page(&self, page: Page) {
        let mut state = self.state.write().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.pages.push(page);
        state.updated_at = Utc::now();
    }

    /// Delete the page with the given stored number and renumber the rest so
    /// numbers stay contiguous 1..N. Returns false when no page matches.
    pub fn delete_page(&self, number: usize) -> bool {
        let mut state = self.state.write().unwrap();
        let Some(index) = state.pages.iter().position(|p| p.number == number) else {
            return false;
        };
        state.pages.remove(index);
        for (offset, page) in state.pages[index..].iter_mut().enumerate() {
            page.number = index + offset + 1;
        }
        state.updated_at = Utc::now();
        true
    }

    pub fn page_count(&self) -> usize {
        self.state.read().unwrap().pages.len()
    }

    /// Clone of the page list, including image data. The pipeline uses this
    /// to persist pages without holding the job lock across I/O.
    pub fn pages(&self) -> Vec<Page> {
        self.state.read().unwrap().pages.clone()
    }

    /// Record where a page image landed on disk.
    pub fn set_page_path(&self, number: usize, path: PathBuf) {
        let mut state = self.state.write().unwrap();
        if let Some(page) = state.pages.iter_mut().find(|p| p.number == number) {
            page.path = Some(path);
        }
    }

    pub fn page_infos(&self) -> Vec<PageInfo> {
        self.state
            .read()
            .unwrap()
            .pages
            .iter()
            .map(PageInfo::from)
            .collect()
    }

    pub fn output(&self) -> OutputConfig {
        self.state.read().unwrap().output.clone()
    }

    pub fn set_output(&self, output: OutputConfig) {
        let mut state = self.state.write().unwrap();
        state.output = output;
        state.updated_at = Utc::now();
    }

    pub fn metadata(&self) -> Option<DocumentMetadata> {
        self.state.read().unwrap().metadata.clone()
    }

    pub fn set_metadata(&self, metadata: DocumentMetadata) {
        let mut state = self.state.write().unwrap();
        state.metadata = Some(metadata);
        state.updated_at = Utc::now();
    }

    /// Per-job OCR override; `None` defers to the pipeline default.
    pub fn ocr_enabled(&self) -> Option<bool> {
        self.state.read().unwrap().ocr_enabled
    }

    /// Store the cancellation trigger for the job's long-lived context.
    pub fn set_cancel(&self, token: CancellationToken) {
        *self.cancel.lock().unwrap() = Some(token);
    }

    /// Cancel the job: fire the stored trigger (if any) and move to
    /// `Cancelled`. Firing propagates into the scan and pipeline contexts.
    pub fn cancel(&self) {
        if let Some(token) = self.cancel.lock().unwrap().as_ref() {
            token.cancel();
        }
        let mut state = self.state.write().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = JobStatus::Cancelled;
        state.updated_at = Utc::now();
    }

    /// Queue a progress update. Non-blocking: when the buffer is full the
    /// update is dropped.
    pub fn send_progress(&self, mut update: ProgressUpdate) {
        update.job_id = self.id.clone();
        if update.progress > 0 {
            let mut state = self.state.write().unwrap();
            state.progress = update.progress;
        }
        let _ = self.progress_tx.try_send(update);
    }

    /// Take the receiving end of the progress channel. The queue's forwarder
    /// claims this exactly once at submit time.
    pub fn take_progress_receiver(&self) -> Option<mpsc::Receiver<ProgressUpdate>> {
        self.progress_rx.lock().unwrap().take()
    }

    /// Serializable snapshot of the whole job.
    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.read().unwrap();
        JobSnapshot {
            id: self.id.clone(),
            status: state.status,
            profile: self.profile.clone(),
            pages: state.pages.iter().map(PageInfo::from).collect(),
            progress: state.progress,
            error: state.error.clone(),
            output: state.output.clone(),
            metadata: state.metadata.clone(),
            ocr_enabled: state.ocr_enabled,
            created_at: self.created_at,
            updated_at: state.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_page(number: usize) -> Page {
        Page {
            number,
            width: 100,
            height: 150,
            image: None,
            path: None,
            error: None,
        }
    }

    fn test_job() -> Job {
        Job::new("standard", OutputConfig::default(), None, None)
    }

    #[test]
    fn new_job_starts_pending_with_id() {
        let job = test_job();
        assert!(!job.id().is_empty());
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.page_count(), 0);
    }

    #[test]
    fn status_advances_through_lifecycle() {
        let job = test_job();
        job.set_status(JobStatus::Scanning);
        assert_eq!(job.status(), JobStatus::Scanning);
        job.set_status(JobStatus::Processing);
        job.set_status(JobStatus::Completed);
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[test]
    fn terminal_states_are_final() {
        let job = test_job();
        job.cancel();
        assert_eq!(job.status(), JobStatus::Cancelled);

        job.set_status(JobStatus::Scanning);
        assert_eq!(job.status(), JobStatus::Cancelled);

        job.set_error("late failure");
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(job.error().is_empty());
    }

    #[test]
    fn no_page_appends_after_cancel() {
        let job = test_job();
        job.add_page(test_page(1));
        job.cancel();
        job.add_page(test_page(2));
        assert_eq!(job.page_count(), 1);
    }

    #[test]
    fn delete_page_renumbers_remaining() {
        let job = test_job();
        for n in 1..=3 {
            job.add_page(test_page(n));
        }

        assert!(job.delete_page(2));

        let pages = job.page_infos();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].number, 1);
        assert_eq!(pages[1].number, 2);

        // The old number 3 no longer exists.
        assert!(!job.delete_page(3));
    }

    #[test]
    fn delete_first_page_renumbers_all() {
        let job = test_job();
        for n in 1..=4 {
            job.add_page(test_page(n));
        }
        assert!(job.delete_page(1));
        let numbers: Vec<usize> = job.page_infos().iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn delete_unknown_page_returns_false() {
        let job = test_job();
        job.add_page(test_page(1));
        assert!(!job.delete_page(7));
        assert_eq!(job.page_count(), 1);
    }

    #[test]
    fn send_progress_never_blocks_on_full_buffer() {
        let job = test_job();
        // Push well past the buffer capacity; the overflow must be dropped
        // silently rather than blocking or panicking.
        for i in 0..(PROGRESS_BUFFER + 50) {
            job.send_progress(ProgressUpdate {
                kind: "processing".into(),
                message: format!("update {i}"),
                ..Default::default()
            });
        }

        let mut rx = job.take_progress_receiver().unwrap();
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, PROGRESS_BUFFER);
    }

    #[test]
    fn send_progress_stamps_job_id_and_records_progress() {
        let job = test_job();
        job.send_progress(ProgressUpdate {
            kind: "processing".into(),
            progress: 50,
            ..Default::default()
        });

        let mut rx = job.take_progress_receiver().unwrap();
        let update = rx.try_recv().unwrap();
        assert_eq!(update.job_id, job.id());
        assert_eq!(job.snapshot().progress, 50);
    }

    #[test]
    fn cancel_fires_stored_token() {
        let job = test_job();
        let token = CancellationToken::new();
        job.set_cancel(token.clone());
        assert!(!token.is_cancelled());
        job.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn snapshot_json_shape() {
        let job = Job::new(
            "standard",
            OutputConfig {
                target: "paperless".into(),
                filename: String::new(),
            },
            None,
            Some(true),
        );
        job.add_page(test_page(1));

        let json = serde_json::to_value(job.snapshot()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["profile"], "standard");
        assert_eq!(json["pages"][0]["number"], 1);
        assert_eq!(json["output"]["target"], "paperless");
        assert_eq!(json["ocr_enabled"], true);
        assert!(json.get("error").is_none());
        assert!(json.get("metadata").is_none());
    }
}
