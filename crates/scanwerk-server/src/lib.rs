// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk server — the HTTP/WebSocket surface, the job worker that drives
// scan jobs through scanner, pipeline, and output dispatch, and the progress
// hub that fans job updates out to connected clients.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod worker;
pub mod ws;

pub use routes::build_router;
pub use state::AppState;
