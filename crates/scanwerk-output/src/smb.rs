// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SMB sink — writes documents to an SMB/CIFS network share.
//
// Connects to the server (default port 445), authenticates with the
// configured user and password (password read from a file), mounts the
// share, creates the target directory tree when configured, and writes the
// file. The libsmbclient calls are synchronous and run on the blocking pool.

use async_trait::async_trait;
use chrono::Local;
use pavao::{SmbClient, SmbCredentials, SmbMode, SmbOpenOptions, SmbOptions};

use scanwerk_core::config::{read_secret_file, SmbConfig};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::Document;

use crate::OutputHandler;

const DEFAULT_SMB_PORT: u16 = 445;

pub struct SmbHandler {
    server: String,
    share: String,
    username: String,
    password: String,
    directory: String,
    filename_pattern: String,
}

impl SmbHandler {
    pub fn new(cfg: &SmbConfig) -> Self {
        let password = if cfg.password_file.is_empty() {
            String::new()
        } else {
            read_secret_file(&cfg.password_file).unwrap_or_default()
        };

        Self {
            server: cfg.server.clone(),
            share: cfg.share.clone(),
            username: cfg.username.clone(),
            password,
            directory: cfg.directory.clone(),
            filename_pattern: cfg.filename_pattern.clone(),
        }
    }

    fn err(message: impl Into<String>) -> ScanwerkError {
        ScanwerkError::Output {
            target: "smb".into(),
            message: message.into(),
        }
    }

    /// `smb://host:port` from the configured server string; a leading `//`
    /// is stripped and the default port appended when missing.
    fn server_url(server: &str) -> String {
        let server = server.trim_start_matches("//");
        if server.contains(':') {
            format!("smb://{server}")
        } else {
            format!("smb://{server}:{DEFAULT_SMB_PORT}")
        }
    }

    /// The document's own filename, or the configured pattern with
    /// `{date}`, `{time}`, and `{title}` substituted. Always `.pdf`.
    fn build_filename(pattern: &str, doc: &Document) -> String {
        if !doc.filename.is_empty() {
            return doc.filename.clone();
        }

        let pattern = if pattern.is_empty() {
            "{date}_{time}_{title}"
        } else {
            pattern
        };

        let now = Local::now();
        let title = if doc.title.is_empty() {
            "scan"
        } else {
            doc.title.as_str()
        };

        let mut filename = pattern
            .replace("{date}", &now.format("%Y%m%d").to_string())
            .replace("{time}", &now.format("%H%M%S").to_string())
            .replace("{title}", title);

        if !filename.ends_with(".pdf") {
            filename.push_str(".pdf");
        }
        filename
    }
}

#[async_trait]
impl OutputHandler for SmbHandler {
    fn name(&self) -> &str {
        "smb"
    }

    fn available(&self) -> bool {
        !self.server.is_empty() && !self.share.is_empty()
    }

    async fn send(&self, mut doc: Document) -> Result<()> {
        let filename = Self::build_filename(&self.filename_pattern, &doc);
        let server_url = Self::server_url(&self.server);
        let share = if self.share.starts_with('/') {
            self.share.clone()
        } else {
            format!("/{}", self.share)
        };
        let username = self.username.clone();
        let password = self.password.clone();
        let directory = self.directory.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let client = SmbClient::new(
                SmbCredentials::default()
                    .server(&server_url)
                    .share(&share)
                    .username(&username)
                    .password(&password),
                SmbOptions::default().one_share_per_server(true),
            )
            .map_err(|e| SmbHandler::err(format!("connect {server_url}: {e}")))?;

            let path = if directory.is_empty() {
                format!("/{filename}")
            } else {
                let _ = client.mkdir(&format!("/{directory}"), SmbMode::from(0o755));
                format!("/{directory}/{filename}")
            };

            let mut remote = client
                .open_with(&path, SmbOpenOptions::default().create(true).write(true))
                .map_err(|e| SmbHandler::err(format!("create file {path}: {e}")))?;

            std::io::copy(&mut doc.file, &mut remote)
                .map_err(|e| SmbHandler::err(format!("write: {e}")))?;

            Ok(())
        })
        .await
        .map_err(|e| Self::err(e.to_string()))?
    }
}
