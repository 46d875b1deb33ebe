// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared-secret API key authentication.
//
// Accepts `Authorization: Bearer <k>`, `X-API-Key: <k>`, or an `api_key`
// query parameter (for browsers that cannot set headers on a WebSocket
// upgrade). The health endpoint sits outside the protected router and is
// always public.

use std::collections::HashSet;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use scanwerk_core::ScanwerkError;

use crate::error::ApiError;
use crate::state::AppState;

/// Axum middleware enforcing the API key check.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if authorized(
        request.headers(),
        request.uri().query(),
        state.api_keys.as_ref(),
    ) {
        next.run(request).await
    } else {
        ApiError(ScanwerkError::Unauthorized).into_response()
    }
}

/// The key membership check shared by every accepted credential carrier.
pub fn authorized(headers: &HeaderMap, query: Option<&str>, keys: &HashSet<String>) -> bool {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if keys.contains(token) {
                return true;
            }
        }
    }

    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        if keys.contains(key) {
            return true;
        }
    }

    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some(key) = pair.strip_prefix("api_key=") {
                if keys.contains(key) {
                    return true;
                }
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn keys() -> HashSet<String> {
        ["k1".to_string(), "k2".to_string()].into_iter().collect()
    }

    #[test]
    fn bearer_token_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer k1"));
        assert!(authorized(&headers, None, &keys()));
    }

    #[test]
    fn wrong_bearer_token_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer nope"));
        assert!(!authorized(&headers, None, &keys()));
    }

    #[test]
    fn x_api_key_header_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("k2"));
        assert!(authorized(&headers, None, &keys()));
    }

    #[test]
    fn query_parameter_is_accepted() {
        let headers = HeaderMap::new();
        assert!(authorized(&headers, Some("foo=bar&api_key=k1"), &keys()));
        assert!(!authorized(&headers, Some("api_key=bad"), &keys()));
    }

    #[test]
    fn no_credentials_is_rejected() {
        assert!(!authorized(&HeaderMap::new(), None, &keys()));
    }
}
