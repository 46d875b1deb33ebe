// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Route table and middleware stack.
//
// ```text
// GET    /api/v1/health                      (public)
// GET    /api/v1/status
// GET    /api/v1/scanner/devices
// GET    /api/v1/scanner/devices/{id}
// POST   /api/v1/scanner/devices/{id}/open
// DELETE /api/v1/scanner/devices/{id}/close
// POST   /api/v1/scan
// GET    /api/v1/scan/{id}
// DELETE /api/v1/scan/{id}
// GET    /api/v1/scan/{id}/preview
// POST   /api/v1/scan/{id}/continue
// POST   /api/v1/scan/{id}/finish
// GET    /api/v1/scan/{id}/pages
// DELETE /api/v1/scan/{id}/pages/{n}
// POST   /api/v1/scan/{id}/pages/reorder
// GET    /api/v1/outputs
// POST   /api/v1/scan/{id}/send
// GET    /api/v1/profiles
// POST   /api/v1/profiles
// GET    /api/v1/profiles/{name}
// PUT    /api/v1/profiles/{name}
// GET    /api/v1/settings
// PUT    /api/v1/settings
// GET    /api/v1/ws
// ```

use std::time::Duration;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{auth, handlers, ws};

/// Request timeout applied to the whole surface. Long-running scans are
/// never tied to a request; the job owns its own context.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the complete application router.
pub fn build_router(state: AppState) -> Router {
    // Everything except the health endpoint sits behind the (optional)
    // API key check.
    let mut api = Router::new()
        .route("/status", get(handlers::status))
        .route("/scanner/devices", get(handlers::list_devices))
        .route("/scanner/devices/{id}", get(handlers::get_device))
        .route("/scanner/devices/{id}/open", post(handlers::open_device))
        .route("/scanner/devices/{id}/close", delete(handlers::close_device))
        .route("/scan", post(handlers::start_scan))
        .route(
            "/scan/{id}",
            get(handlers::get_job).delete(handlers::cancel_job),
        )
        .route("/scan/{id}/preview", get(handlers::get_preview))
        .route("/scan/{id}/continue", post(handlers::continue_scan))
        .route("/scan/{id}/finish", post(handlers::finish_scan))
        .route("/scan/{id}/pages", get(handlers::list_pages))
        .route("/scan/{id}/pages/{n}", delete(handlers::delete_page))
        .route("/scan/{id}/pages/reorder", post(handlers::reorder_pages))
        .route("/outputs", get(handlers::list_outputs))
        .route("/scan/{id}/send", post(handlers::send_output))
        .route(
            "/profiles",
            get(handlers::list_profiles).post(handlers::create_profile),
        )
        .route(
            "/profiles/{name}",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/ws", get(ws::ws_handler));

    if state.config.server.auth.enabled {
        api = api.layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));
    }

    // The health endpoint merges in outside the auth layer, so it stays
    // public even with authentication enabled.
    let api = Router::new()
        .route("/health", get(handlers::health))
        .merge(api);

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors_layer())
        .with_state(state)
}

/// Permissive CORS for local-network clients.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-api-key"),
        ])
        .max_age(Duration::from_secs(3600))
}
