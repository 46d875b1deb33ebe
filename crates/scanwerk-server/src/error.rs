// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP error mapping: domain errors become JSON `{"error": "<message>"}`
// bodies with the matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use scanwerk_core::ScanwerkError;

/// Wrapper turning [`ScanwerkError`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ScanwerkError);

/// Handler return type.
pub type ApiResult<T> = Result<T, ApiError>;

impl From<ScanwerkError> for ApiError {
    fn from(err: ScanwerkError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(ScanwerkError::BadRequest(message.into()))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self(ScanwerkError::NotFound(what.into()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ScanwerkError::NotFound(_) => StatusCode::NOT_FOUND,
            ScanwerkError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ScanwerkError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
