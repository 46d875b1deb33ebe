// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP handlers — thin adapters from requests onto the queue, scanner,
// profile store, and output manager.
//
// Request bodies are decoded by hand so malformed input always yields the
// `{"error": "invalid request body"}` shape the clients expect.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use scanwerk_core::profiles::Profile;
use scanwerk_core::types::{DocumentMetadata, OutputConfig, ScanOptions};
use scanwerk_jobs::{Job, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// An incoming scan request.
#[derive(Debug, Default, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub options: Option<ScanOptions>,
    #[serde(default)]
    pub output: Option<OutputConfig>,
    #[serde(default)]
    pub metadata: Option<DocumentMetadata>,
    #[serde(default)]
    pub ocr_enabled: Option<bool>,
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("invalid request body"))
}

fn find_job(state: &AppState, id: &str) -> ApiResult<Arc<Job>> {
    state.queue.get(id).ok_or_else(|| ApiError::not_found("job"))
}

// ---------------------------------------------------------------------------
// Health and status
// ---------------------------------------------------------------------------

/// GET /api/v1/health — liveness, no auth.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": VERSION }))
}

/// GET /api/v1/status
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let jobs = state.queue.list();
    let active = jobs.iter().filter(|j| j.status().is_active()).count();

    Json(json!({
        "status": "ok",
        "version": VERSION,
        "scanner": state.scanner.is_connected(),
        "devices": state.scanner.list_devices().len(),
        "active_jobs": active,
        "total_jobs": jobs.len(),
    }))
}

// ---------------------------------------------------------------------------
// Scanner management
// ---------------------------------------------------------------------------

/// GET /api/v1/scanner/devices
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "devices": state.scanner.list_devices() }))
}

/// GET /api/v1/scanner/devices/{id}
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let device = state
        .scanner
        .get_device(&id)
        .ok_or_else(|| ApiError::not_found("device"))?;
    Ok(Json(device))
}

/// POST /api/v1/scanner/devices/{id}/open
pub async fn open_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.scanner.open(&id)?;
    Ok(Json(json!({ "status": "opened" })))
}

/// DELETE /api/v1/scanner/devices/{id}/close
pub async fn close_device(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.scanner.close()?;
    Ok(Json(json!({ "status": "closed" })))
}

// ---------------------------------------------------------------------------
// Scan operations
// ---------------------------------------------------------------------------

/// POST /api/v1/scan — admit a job; 202 with the job, 400 on unknown profile.
pub async fn start_scan(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request: ScanRequest = parse_body(&body)?;

    let profile = if request.profile.is_empty() {
        "standard".to_string()
    } else {
        request.profile
    };

    if !state.profiles.read().unwrap().contains(&profile) {
        return Err(ApiError::bad_request(format!("unknown profile: {profile}")));
    }

    let output = request.output.unwrap_or(OutputConfig {
        target: "paperless".into(),
        filename: String::new(),
    });

    let job = Arc::new(Job::new(
        &profile,
        output,
        request.metadata,
        request.ocr_enabled,
    ));
    let snapshot = job.snapshot();
    state.queue.submit(job)?;

    info!(job_id = %snapshot.id, profile = %profile, "scan started via API");
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// GET /api/v1/scan/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = find_job(&state, &id)?;
    Ok(Json(job.snapshot()))
}

/// DELETE /api/v1/scan/{id}
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.queue.cancel(&id)?;
    Ok(Json(json!({ "status": "cancelled" })))
}

/// GET /api/v1/scan/{id}/preview
pub async fn get_preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = find_job(&state, &id)?;

    let previews: Vec<_> = job
        .page_infos()
        .into_iter()
        .map(|p| {
            json!({
                "number": p.number,
                "width": p.width,
                "height": p.height,
                "url": format!("/api/v1/scan/{id}/pages/{}/preview", p.number),
            })
        })
        .collect();

    Ok(Json(json!({ "previews": previews })))
}

/// POST /api/v1/scan/{id}/continue — re-arm the scanning state.
pub async fn continue_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = find_job(&state, &id)?;

    let status = job.status();
    if status != JobStatus::Scanning && status != JobStatus::Pending {
        return Err(ApiError::bad_request("job is not in scanning state"));
    }

    job.set_status(JobStatus::Scanning);
    Ok(Json(json!({ "status": "continuing" })))
}

#[derive(Debug, Default, Deserialize)]
struct FinishRequest {
    #[serde(default)]
    output: Option<OutputConfig>,
    #[serde(default)]
    metadata: Option<DocumentMetadata>,
}

/// POST /api/v1/scan/{id}/finish — apply output/metadata overrides and move
/// the job to processing.
pub async fn finish_scan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let job = find_job(&state, &id)?;

    // Overrides are optional; an absent or empty body is fine.
    let request: FinishRequest = if body.is_empty() {
        FinishRequest::default()
    } else {
        parse_body(&body).unwrap_or_default()
    };

    if let Some(output) = request.output {
        job.set_output(output);
    }
    if let Some(metadata) = request.metadata {
        job.set_metadata(metadata);
    }

    job.set_status(JobStatus::Processing);
    Ok(Json(json!({ "status": "finishing" })))
}

// ---------------------------------------------------------------------------
// Page management
// ---------------------------------------------------------------------------

/// GET /api/v1/scan/{id}/pages
pub async fn list_pages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = find_job(&state, &id)?;
    Ok(Json(json!({ "pages": job.page_infos() })))
}

/// DELETE /api/v1/scan/{id}/pages/{n} — delete and renumber.
pub async fn delete_page(
    State(state): State<AppState>,
    Path((id, page)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let number: usize = page
        .parse()
        .map_err(|_| ApiError::bad_request("invalid page number"))?;

    let job = find_job(&state, &id)?;
    if !job.delete_page(number) {
        return Err(ApiError::not_found("page"));
    }

    Ok(Json(json!({ "status": "deleted" })))
}

#[derive(Debug, Deserialize)]
struct ReorderRequest {
    #[allow(dead_code)]
    order: Vec<usize>,
}

/// POST /api/v1/scan/{id}/pages/reorder — accepted but not applied.
pub async fn reorder_pages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let _job = find_job(&state, &id)?;
    let _request: ReorderRequest = parse_body(&body)?;
    Ok(Json(json!({ "status": "reordered" })))
}

// ---------------------------------------------------------------------------
// Output targets
// ---------------------------------------------------------------------------

/// GET /api/v1/outputs
pub async fn list_outputs(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "outputs": state.outputs.list_targets() }))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    #[serde(default)]
    target: String,
}

/// POST /api/v1/scan/{id}/send
pub async fn send_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let _job = find_job(&state, &id)?;
    let request: SendRequest = parse_body(&body)?;

    if !state.outputs.contains(&request.target) {
        return Err(ApiError::bad_request(format!(
            "unknown output target: {}",
            request.target
        )));
    }

    Ok(Json(json!({ "status": "sending" })))
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// GET /api/v1/profiles
pub async fn list_profiles(State(state): State<AppState>) -> impl IntoResponse {
    let profiles: Vec<Profile> = state
        .profiles
        .read()
        .unwrap()
        .list()
        .into_iter()
        .map(|(_, profile)| profile)
        .collect();
    Json(json!({ "profiles": profiles }))
}

/// GET /api/v1/profiles/{name}
pub async fn get_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let profile = state
        .profiles
        .read()
        .unwrap()
        .get(&name)
        .cloned()
        .ok_or_else(|| ApiError::not_found("profile"))?;
    Ok(Json(profile))
}

/// POST /api/v1/profiles
pub async fn create_profile(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let profile: Profile = parse_body(&body)?;

    let name = profile.profile.name.clone();
    if name.is_empty() {
        return Err(ApiError::bad_request("profile name is required"));
    }

    state.profiles.write().unwrap().set(name, profile.clone());
    Ok((StatusCode::CREATED, Json(profile)))
}

/// PUT /api/v1/profiles/{name}
pub async fn update_profile(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    if !state.profiles.read().unwrap().contains(&name) {
        return Err(ApiError::not_found("profile"));
    }

    let profile: Profile = parse_body(&body)?;
    state.profiles.write().unwrap().set(name, profile.clone());
    Ok(Json(profile))
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct SettingsRequest {
    #[serde(default)]
    ocr_enabled: Option<bool>,
    #[serde(default)]
    ocr_language: Option<String>,
}

/// GET /api/v1/settings
pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    let settings = state.settings.read().unwrap();
    Json(json!({
        "ocr_enabled": settings.enabled,
        "ocr_language": settings.language,
    }))
}

/// PUT /api/v1/settings
pub async fn update_settings(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let request: SettingsRequest = parse_body(&body)?;

    let mut settings = state.settings.write().unwrap();
    if let Some(enabled) = request.ocr_enabled {
        settings.enabled = enabled;
    }
    if let Some(language) = request.ocr_language {
        settings.language = language;
    }

    Ok(Json(json!({
        "ocr_enabled": settings.enabled,
        "ocr_language": settings.language,
    })))
}
