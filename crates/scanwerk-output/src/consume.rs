// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Consume-folder sink — drops the file into a directory watched by a
// downstream document-management system, which imports it automatically.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;

use scanwerk_core::config::ConsumeConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::Document;

use crate::OutputHandler;

pub struct ConsumeHandler {
    consume_path: PathBuf,
}

impl ConsumeHandler {
    pub fn new(cfg: &ConsumeConfig) -> Self {
        Self {
            consume_path: PathBuf::from(&cfg.path),
        }
    }

    /// `created - title` from the available metadata, sanitized, with a
    /// `scan_<timestamp>` fallback and a `.pdf` extension.
    fn build_filename(doc: &Document) -> String {
        let mut parts = Vec::new();
        if !doc.created.is_empty() {
            parts.push(doc.created.clone());
        }
        if !doc.title.is_empty() {
            parts.push(doc.title.clone());
        }

        let mut name = parts.join(" - ");
        if name.is_empty() {
            name = format!("scan_{}", Local::now().format("%Y%m%d_%H%M%S"));
        }

        let sanitized: String = name
            .chars()
            .filter(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.')
            })
            .collect();

        format!("{sanitized}.pdf")
    }
}

#[async_trait]
impl OutputHandler for ConsumeHandler {
    fn name(&self) -> &str {
        "paperless_consume"
    }

    /// Available only when the watched directory actually exists.
    fn available(&self) -> bool {
        !self.consume_path.as_os_str().is_empty() && self.consume_path.exists()
    }

    async fn send(&self, mut doc: Document) -> Result<()> {
        let filename = Self::build_filename(&doc);
        let target = self.consume_path.join(filename);
        let consume_path = self.consume_path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&consume_path).map_err(|e| ScanwerkError::Output {
                target: "paperless_consume".into(),
                message: format!("create consume directory: {e}"),
            })?;

            let mut file = std::fs::File::create(&target).map_err(|e| ScanwerkError::Output {
                target: "paperless_consume".into(),
                message: format!("create file in consume folder: {e}"),
            })?;
            std::io::copy(&mut doc.file, &mut file).map_err(|e| ScanwerkError::Output {
                target: "paperless_consume".into(),
                message: format!("write to consume folder: {e}"),
            })?;
            Ok(())
        })
        .await
        .map_err(|e| ScanwerkError::Output {
            target: "paperless_consume".into(),
            message: e.to_string(),
        })?
    }
}
