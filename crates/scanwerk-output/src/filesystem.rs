// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Filesystem sink — writes finished documents to a local directory.

use std::path::PathBuf;

use async_trait::async_trait;

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::Document;

use crate::OutputHandler;

pub struct FilesystemHandler {
    directory: PathBuf,
}

impl FilesystemHandler {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl OutputHandler for FilesystemHandler {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn available(&self) -> bool {
        !self.directory.as_os_str().is_empty()
    }

    async fn send(&self, mut doc: Document) -> Result<()> {
        let directory = self.directory.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&directory)
                .map_err(|e| ScanwerkError::Output {
                    target: "filesystem".into(),
                    message: format!("create directory: {e}"),
                })?;

            let path = directory.join(&doc.filename);
            let mut file = std::fs::File::create(&path).map_err(|e| ScanwerkError::Output {
                target: "filesystem".into(),
                message: format!("create file: {e}"),
            })?;
            std::io::copy(&mut doc.file, &mut file).map_err(|e| ScanwerkError::Output {
                target: "filesystem".into(),
                message: format!("write file: {e}"),
            })?;
            Ok(())
        })
        .await
        .map_err(|e| ScanwerkError::Output {
            target: "filesystem".into(),
            message: e.to_string(),
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_document;

    #[test]
    fn availability_requires_a_directory() {
        assert!(FilesystemHandler::new("/var/lib/scanwerk").available());
        assert!(!FilesystemHandler::new("").available());
    }

    #[tokio::test]
    async fn send_writes_the_document() {
        let out = tempfile::tempdir().unwrap();
        let handler = FilesystemHandler::new(out.path());
        let (_src, doc) = test_document(b"%PDF-1.4 test content");

        handler.send(doc).await.unwrap();

        let written = std::fs::read(out.path().join("doc.pdf")).unwrap();
        assert_eq!(written, b"%PDF-1.4 test content");
    }

    #[tokio::test]
    async fn send_creates_missing_directories() {
        let out = tempfile::tempdir().unwrap();
        let nested = out.path().join("a/b/c");
        let handler = FilesystemHandler::new(&nested);
        let (_src, doc) = test_document(b"data");

        handler.send(doc).await.unwrap();
        assert!(nested.join("doc.pdf").exists());
    }
}
