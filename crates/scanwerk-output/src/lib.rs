// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output dispatch — routes finished documents to named sinks.
//
// Handlers are registered at startup from config toggles; the filesystem
// sink is always present. A handler consumes the document stream exactly
// once and there are no retries; the worker reports failures back into the
// job.

pub mod consume;
pub mod email;
pub mod filesystem;
pub mod paperless;
pub mod smb;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use scanwerk_core::config::{OutputsConfig, StorageConfig};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::Document;

pub use consume::ConsumeHandler;
pub use email::EmailHandler;
pub use filesystem::FilesystemHandler;
pub use paperless::PaperlessHandler;
pub use smb::SmbHandler;

/// A named output destination.
#[async_trait]
pub trait OutputHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the sink is currently usable (configured and reachable by its
    /// own availability rule).
    fn available(&self) -> bool;

    /// Deliver the document. Consumes the stream exactly once.
    async fn send(&self, doc: Document) -> Result<()>;
}

/// A configured output target as reported by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub enabled: bool,
    pub available: bool,
}

/// Routes documents to the appropriate output handler.
pub struct OutputManager {
    handlers: HashMap<String, Box<dyn OutputHandler>>,
}

impl OutputManager {
    /// Build the handler registry from configuration. The filesystem sink is
    /// always registered.
    pub fn new(cfg: &OutputsConfig, storage: &StorageConfig) -> Self {
        let mut handlers: HashMap<String, Box<dyn OutputHandler>> = HashMap::new();

        if cfg.paperless.enabled {
            handlers.insert(
                "paperless".into(),
                Box::new(PaperlessHandler::new(&cfg.paperless)),
            );
        }
        if cfg.smb.enabled {
            handlers.insert("smb".into(), Box::new(SmbHandler::new(&cfg.smb)));
        }
        if cfg.paperless_consume.enabled {
            handlers.insert(
                "paperless_consume".into(),
                Box::new(ConsumeHandler::new(&cfg.paperless_consume)),
            );
        }
        if cfg.email.enabled {
            handlers.insert("email".into(), Box::new(EmailHandler::new(&cfg.email)));
        }

        handlers.insert(
            "filesystem".into(),
            Box::new(FilesystemHandler::new(&storage.local_directory)),
        );

        info!(count = handlers.len(), "output handlers initialized");
        Self { handlers }
    }

    /// Route a document to the named target.
    pub async fn send(&self, target: &str, doc: Document) -> Result<()> {
        let handler = self
            .handlers
            .get(target)
            .ok_or_else(|| ScanwerkError::UnknownTarget(target.to_string()))?;

        info!(
            target,
            filename = %doc.filename,
            size = doc.size,
            "sending document to output"
        );

        handler
            .send(doc)
            .await
            .map_err(|e| ScanwerkError::Output {
                target: target.to_string(),
                message: e.to_string(),
            })?;

        info!(target, "document sent successfully");
        Ok(())
    }

    /// All configured targets with their current availability.
    pub fn list_targets(&self) -> Vec<Target> {
        let mut targets: Vec<Target> = self
            .handlers
            .iter()
            .map(|(name, handler)| Target {
                name: name.clone(),
                kind: name.clone(),
                enabled: true,
                available: handler.available(),
            })
            .collect();
        targets.sort_by(|a, b| a.name.cmp(&b.name));
        targets
    }

    pub fn contains(&self, target: &str) -> bool {
        self.handlers.contains_key(target)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_document;

    fn manager_with_defaults() -> OutputManager {
        let storage = StorageConfig {
            local_directory: "/tmp/scanwerk-test-docs".into(),
            retention_days: 30,
        };
        OutputManager::new(&OutputsConfig::default(), &storage)
    }

    #[tokio::test]
    async fn unknown_target_is_rejected() {
        let manager = manager_with_defaults();
        let (_dir, doc) = test_document(b"%PDF-1.4");
        let err = manager.send("dropbox", doc).await.unwrap_err();
        assert!(matches!(err, ScanwerkError::UnknownTarget(_)));
        assert_eq!(err.to_string(), "unknown output target: dropbox");
    }

    #[test]
    fn filesystem_is_always_registered() {
        let manager = manager_with_defaults();
        assert!(manager.contains("filesystem"));
        assert!(!manager.contains("paperless"));

        let targets = manager.list_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "filesystem");
        assert!(targets[0].available);
    }

    #[test]
    fn enabled_sinks_appear_in_target_list() {
        let mut cfg = OutputsConfig::default();
        cfg.email.enabled = true;
        cfg.paperless.enabled = true;
        let storage = StorageConfig::default();

        let manager = OutputManager::new(&cfg, &storage);
        let names: Vec<String> = manager.list_targets().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["email", "filesystem", "paperless"]);
    }

    #[test]
    fn unconfigured_paperless_reports_unavailable() {
        let mut cfg = OutputsConfig::default();
        cfg.paperless.enabled = true;
        let manager = OutputManager::new(&cfg, &StorageConfig::default());

        let targets = manager.list_targets();
        let paperless = targets.iter().find(|t| t.name == "paperless").unwrap();
        assert!(!paperless.available);
    }

    #[test]
    fn target_serializes_kind_as_type() {
        let target = Target {
            name: "smb".into(),
            kind: "smb".into(),
            enabled: true,
            available: false,
        };
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["type"], "smb");
        assert_eq!(json["available"], false);
    }
}
