// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Scanwerk scan server.

use serde::{Deserialize, Serialize};

/// A detected scanner device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub vendor: String,
    pub model: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Colour mode for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Color,
    Gray,
    Lineart,
}

impl ColorMode {
    /// Keyword the access layer expects for the `mode` option.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Gray => "gray",
            Self::Lineart => "lineart",
        }
    }
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::Color
    }
}

/// Paper-path source on the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    Flatbed,
    Adf,
    AdfFront,
    AdfBack,
    AdfDuplex,
}

impl FeedSource {
    /// Keyword the access layer expects for the `source` option.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Flatbed => "flatbed",
            Self::Adf => "adf",
            Self::AdfFront => "adf_front",
            Self::AdfBack => "adf_back",
            Self::AdfDuplex => "adf_duplex",
        }
    }
}

impl Default for FeedSource {
    fn default() -> Self {
        Self::AdfDuplex
    }
}

/// Scanner settings applied before a batch scan.
///
/// `page_height` of `0.0` is a distinguished value meaning *unlimited length*
/// (scan until end of feed) and must never be rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub resolution: u32,
    pub mode: ColorMode,
    pub source: FeedSource,
    /// Page width in millimetres.
    pub page_width: f64,
    /// Page height in millimetres; 0 = unlimited (oversize documents).
    pub page_height: f64,
    #[serde(default)]
    pub brightness: i32,
    #[serde(default)]
    pub contrast: i32,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            resolution: 300,
            mode: ColorMode::Color,
            source: FeedSource::AdfDuplex,
            page_width: 210.0,
            page_height: 297.0,
            brightness: 0,
            contrast: 0,
        }
    }
}

/// Where to send the finished document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub target: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filename: String,
}

/// Metadata carried on a job and copied onto the output document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub correspondent: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub document_type: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub archive_serial_number: String,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

/// A progress record pushed to WebSocket subscribers.
///
/// Fire-and-forget; drops are allowed when subscribers cannot keep up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(rename = "type")]
    pub kind: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(default, skip_serializing_if = "is_zero_usize")]
    pub page: usize,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preview_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

fn is_zero_usize(n: &usize) -> bool {
    *n == 0
}

fn is_zero_u8(n: &u8) -> bool {
    *n == 0
}

/// A finished document ready for delivery to an output sink.
///
/// The open file handle keeps the bytes readable even after the pipeline's
/// temp directory has been unlinked. A sink consumes the stream exactly once.
#[derive(Debug)]
pub struct Document {
    pub filename: String,
    pub title: String,
    pub created: String,
    pub correspondent: i64,
    pub document_type: i64,
    pub tags: Vec<i64>,
    pub archive_serial: String,
    pub file: std::fs::File,
    pub size: u64,
}

impl Document {
    /// Read the full document stream into memory, consuming it.
    pub fn into_bytes(mut self) -> std::io::Result<Vec<u8>> {
        use std::io::Read;
        let mut buf = Vec::with_capacity(self.size as usize);
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_options_default_is_standard_duplex_color() {
        let opts = ScanOptions::default();
        assert_eq!(opts.resolution, 300);
        assert_eq!(opts.mode, ColorMode::Color);
        assert_eq!(opts.source, FeedSource::AdfDuplex);
        assert_eq!(opts.page_height, 297.0);
    }

    #[test]
    fn mode_and_source_keywords() {
        assert_eq!(ColorMode::Lineart.keyword(), "lineart");
        assert_eq!(FeedSource::AdfDuplex.keyword(), "adf_duplex");
        assert_eq!(FeedSource::Flatbed.keyword(), "flatbed");
    }

    #[test]
    fn progress_update_serializes_type_field() {
        let update = ProgressUpdate {
            kind: "page_complete".into(),
            job_id: "abc".into(),
            page: 2,
            message: "Page 2 scanned".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "page_complete");
        assert_eq!(json["job_id"], "abc");
        assert_eq!(json["page"], 2);
        // Empty fields are omitted entirely.
        assert!(json.get("error").is_none());
        assert!(json.get("status").is_none());
    }

    #[test]
    fn metadata_omits_empty_fields() {
        let meta = DocumentMetadata {
            title: "Invoice".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["title"], "Invoice");
        assert!(json.get("correspondent").is_none());
        assert!(json.get("tags").is_none());
    }

    #[test]
    fn device_serializes_kind_as_type() {
        let device = Device {
            name: "test:0".into(),
            vendor: "Test".into(),
            model: "Virtual Scanner".into(),
            kind: "virtual device".into(),
        };
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["type"], "virtual device");
    }
}
