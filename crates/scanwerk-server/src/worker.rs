// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The job worker — a single consumer of the pending channel that drives each
// job through scan, pipeline, and output dispatch, broadcasting every state
// transition. Failures are reported into the job, never retried.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use scanwerk_core::error::ScanwerkError;
use scanwerk_core::types::ProgressUpdate;
use scanwerk_document::Pipeline;
use scanwerk_jobs::{Job, JobStatus};

use crate::state::AppState;

/// Consume pending jobs until shutdown. Pool size is one by design: the
/// scanner is the bottleneck and cannot parallelize.
pub async fn run(state: AppState, pipeline: Pipeline, mut pending: mpsc::Receiver<Arc<Job>>) {
    info!("job worker started");
    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            job = pending.recv() => match job {
                Some(job) => process_job(&state, &pipeline, job).await,
                None => break,
            },
        }
    }
    info!("job worker stopped");
}

async fn process_job(state: &AppState, pipeline: &Pipeline, job: Arc<Job>) {
    // The job outlives its admission request; it gets its own cancellable
    // context parented to the server's root token.
    let token = state.shutdown.child_token();
    job.set_cancel(token.clone());

    info!(job_id = %job.id(), profile = %job.profile(), "processing job");

    let profile = state
        .profiles
        .read()
        .unwrap()
        .get(job.profile())
        .cloned();
    let Some(profile) = profile else {
        job.set_error(format!("profile \"{}\" not found", job.profile()));
        broadcast_job_update(state, &job);
        return;
    };

    // Scan.
    job.set_status(JobStatus::Scanning);
    broadcast_job_update(state, &job);

    let opts = profile.scan_options();
    let mut pages = match state.scanner.scan_batch(token.clone(), &opts) {
        Ok(pages) => pages,
        Err(e) => {
            job.set_error(format!("scan failed: {e}"));
            broadcast_job_update(state, &job);
            return;
        }
    };

    while let Some(page) = pages.recv().await {
        if let Some(err) = &page.error {
            warn!(job_id = %job.id(), error = %err, "page scan error");
            continue;
        }
        let number = page.number;
        job.add_page(page);
        job.send_progress(ProgressUpdate {
            kind: "page_complete".into(),
            page: number,
            message: format!("Page {number} scanned"),
            ..Default::default()
        });
        broadcast_job_update(state, &job);
    }

    if job.page_count() == 0 {
        job.set_error("no pages scanned");
        broadcast_job_update(state, &job);
        return;
    }

    if token.is_cancelled() {
        // Cancel already moved the job to its terminal state.
        broadcast_job_update(state, &job);
        return;
    }

    // Process.
    job.set_status(JobStatus::Processing);
    broadcast_job_update(state, &job);

    let ocr = state.settings.read().unwrap().clone();
    let doc = match pipeline.process(&token, &job, &profile, &ocr).await {
        Ok(doc) => doc,
        Err(e) => {
            job.set_error(format!("processing failed: {e}"));
            broadcast_job_update(state, &job);
            return;
        }
    };

    // Deliver. The job's explicit target wins over the profile default.
    let target = {
        let output = job.output();
        if output.target.is_empty() {
            profile.output.default_target.clone()
        } else {
            output.target
        }
    };

    let sent = tokio::select! {
        result = state.outputs.send(&target, doc) => result,
        _ = token.cancelled() => Err(ScanwerkError::Pipeline("job cancelled".into())),
    };
    if let Err(e) = sent {
        job.set_error(format!("output failed: {e}"));
        broadcast_job_update(state, &job);
        return;
    }

    job.set_status(JobStatus::Completed);
    job.send_progress(ProgressUpdate {
        kind: "completed".into(),
        message: "Document processed and delivered".into(),
        ..Default::default()
    });
    broadcast_job_update(state, &job);
    info!(job_id = %job.id(), pages = job.page_count(), "job completed");
}

/// Push the job's current state to every connected WebSocket client.
fn broadcast_job_update(state: &AppState, job: &Arc<Job>) {
    let snapshot = job.snapshot();
    state.hub.broadcast(ProgressUpdate {
        kind: "job_update".into(),
        job_id: snapshot.id,
        status: snapshot.status.as_str().into(),
        progress: snapshot.progress,
        message: snapshot.status.as_str().into(),
        ..Default::default()
    });
}
