// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Paperless sink — uploads documents to a Paperless-NGX instance via its
// REST API (multipart POST with token auth).

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

use scanwerk_core::config::PaperlessConfig;
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::Document;

use crate::OutputHandler;

pub struct PaperlessHandler {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl PaperlessHandler {
    pub fn new(cfg: &PaperlessConfig) -> Self {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!cfg.verify_ssl)
            .build()
            .unwrap_or_default();

        Self {
            base_url: cfg.url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            client,
        }
    }

    fn err(message: impl Into<String>) -> ScanwerkError {
        ScanwerkError::Output {
            target: "paperless".into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl OutputHandler for PaperlessHandler {
    fn name(&self) -> &str {
        "paperless"
    }

    fn available(&self) -> bool {
        !self.base_url.is_empty() && !self.token.is_empty()
    }

    async fn send(&self, doc: Document) -> Result<()> {
        let filename = doc.filename.clone();
        let title = doc.title.clone();
        let created = doc.created.clone();
        let correspondent = doc.correspondent;
        let document_type = doc.document_type;
        let tags = doc.tags.clone();
        let archive_serial = doc.archive_serial.clone();

        let bytes = tokio::task::spawn_blocking(move || doc.into_bytes())
            .await
            .map_err(|e| Self::err(e.to_string()))?
            .map_err(|e| Self::err(format!("read document: {e}")))?;

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/pdf")
            .map_err(|e| Self::err(format!("build form file: {e}")))?;

        let mut form = Form::new().part("document", part);
        if !title.is_empty() {
            form = form.text("title", title);
        }
        if correspondent > 0 {
            form = form.text("correspondent", correspondent.to_string());
        }
        if document_type > 0 {
            form = form.text("document_type", document_type.to_string());
        }
        for tag in tags {
            form = form.text("tags", tag.to_string());
        }
        if !created.is_empty() {
            form = form.text("created", created);
        }
        if !archive_serial.is_empty() {
            form = form.text("archive_serial_number", archive_serial);
        }

        let response = self
            .client
            .post(format!("{}/api/documents/post_document/", self.base_url))
            .header("Authorization", format!("Token {}", self.token))
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::err(format!("upload: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::err(format!("error {status}: {body}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler(url: &str, token: &str) -> PaperlessHandler {
        PaperlessHandler::new(&PaperlessConfig {
            enabled: true,
            url: url.into(),
            token: token.into(),
            ..Default::default()
        })
    }

    #[test]
    fn availability_requires_url_and_token() {
        assert!(handler("http://paperless:8000", "tok").available());
        assert!(!handler("", "tok").available());
        assert!(!handler("http://paperless:8000", "").available());
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let h = handler("http://paperless:8000/", "tok");
        assert_eq!(h.base_url, "http://paperless:8000");
    }

    #[tokio::test]
    async fn unreachable_server_surfaces_an_output_error() {
        // Nothing listens on this port; the upload must fail loudly.
        let h = handler("http://127.0.0.1:1", "tok");
        let (_dir, doc) = crate::test_support::test_document(b"%PDF");
        let err = h.send(doc).await.unwrap_err();
        assert!(err.to_string().contains("paperless"));
    }
}
