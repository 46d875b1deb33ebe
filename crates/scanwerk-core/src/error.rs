// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Scanwerk.

use thiserror::Error;

/// Top-level error type for all Scanwerk operations.
#[derive(Debug, Error)]
pub enum ScanwerkError {
    // -- Scanner errors --
    #[error("scanner not connected")]
    NotConnected,

    #[error("scanner is busy")]
    Busy,

    #[error("no scanner device found")]
    NoDevice,

    #[error("scanner error: {0}")]
    Scanner(String),

    // -- Lookup / request errors --
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    // -- Job errors --
    #[error("job {0} already exists")]
    DuplicateJob(String),

    #[error("job queue is full")]
    QueueFull,

    // -- Pipeline / delivery errors --
    #[error("processing failed: {0}")]
    Pipeline(String),

    #[error("unknown output target: {0}")]
    UnknownTarget(String),

    #[error("output {target}: {message}")]
    Output { target: String, message: String },

    // -- Configuration --
    #[error("config error: {0}")]
    Config(String),

    // -- Infrastructure --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_matches_api_contract() {
        let err = ScanwerkError::NotFound("job".into());
        assert_eq!(err.to_string(), "job not found");
    }

    #[test]
    fn bad_request_passes_message_through() {
        let err = ScanwerkError::BadRequest("unknown profile: nonexistent".into());
        assert_eq!(err.to_string(), "unknown profile: nonexistent");
    }

    #[test]
    fn output_error_names_the_target() {
        let err = ScanwerkError::Output {
            target: "smb".into(),
            message: "connect: timed out".into(),
        };
        assert_eq!(err.to_string(), "smb: connect: timed out");
    }
}
