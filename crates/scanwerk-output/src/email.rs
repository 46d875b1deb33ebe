// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Email sink — sends the document as a PDF attachment on a
// multipart/mixed message over SMTP.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use scanwerk_core::config::{read_secret_file, EmailConfig};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::Document;

use crate::OutputHandler;

/// Default SMTP submission port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

pub struct EmailHandler {
    host: String,
    port: u16,
    user: String,
    password: String,
    from: String,
    recipient: String,
}

impl EmailHandler {
    pub fn new(cfg: &EmailConfig) -> Self {
        let password = if cfg.smtp_password_file.is_empty() {
            String::new()
        } else {
            read_secret_file(&cfg.smtp_password_file).unwrap_or_default()
        };

        Self {
            host: cfg.smtp_host.clone(),
            port: if cfg.smtp_port == 0 {
                DEFAULT_SMTP_PORT
            } else {
                cfg.smtp_port
            },
            user: cfg.smtp_user.clone(),
            password,
            from: cfg.from_address.clone(),
            recipient: cfg.default_recipient.clone(),
        }
    }

    fn err(message: impl Into<String>) -> ScanwerkError {
        ScanwerkError::Output {
            target: "email".into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl OutputHandler for EmailHandler {
    fn name(&self) -> &str {
        "email"
    }

    fn available(&self) -> bool {
        !self.host.is_empty() && !self.from.is_empty() && !self.recipient.is_empty()
    }

    async fn send(&self, doc: Document) -> Result<()> {
        let subject = if doc.title.is_empty() {
            format!("Scanwerk: {}", doc.filename)
        } else {
            format!("Scanwerk: {}", doc.title)
        };
        let body = format!("Scanned document: {}\r\n", doc.filename);
        let filename = doc.filename.clone();

        let bytes = tokio::task::spawn_blocking(move || doc.into_bytes())
            .await
            .map_err(|e| Self::err(e.to_string()))?
            .map_err(|e| Self::err(format!("read document: {e}")))?;

        let pdf_type = ContentType::parse("application/pdf")
            .map_err(|e| Self::err(format!("content type: {e}")))?;

        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| Self::err(format!("from address: {e}")))?,
            )
            .to(self
                .recipient
                .parse()
                .map_err(|e| Self::err(format!("recipient address: {e}")))?)
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(body))
                    .singlepart(Attachment::new(filename).body(bytes, pdf_type)),
            )
            .map_err(|e| Self::err(format!("build message: {e}")))?;

        let mut transport =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
                .map_err(|e| Self::err(format!("smtp relay: {e}")))?
                .port(self.port);

        if !self.user.is_empty() {
            transport = transport.credentials(Credentials::new(
                self.user.clone(),
                self.password.clone(),
            ));
        }

        transport
            .build()
            .send(message)
            .await
            .map_err(|e| Self::err(format!("send email: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(host: &str, from: &str, recipient: &str) -> EmailConfig {
        EmailConfig {
            enabled: true,
            smtp_host: host.into(),
            smtp_port: 0,
            smtp_user: String::new(),
            smtp_password_file: String::new(),
            from_address: from.into(),
            default_recipient: recipient.into(),
        }
    }

    #[test]
    fn availability_requires_host_from_and_recipient() {
        assert!(EmailHandler::new(&config("smtp.example.com", "a@b.c", "x@y.z")).available());
        assert!(!EmailHandler::new(&config("", "a@b.c", "x@y.z")).available());
        assert!(!EmailHandler::new(&config("smtp.example.com", "", "x@y.z")).available());
        assert!(!EmailHandler::new(&config("smtp.example.com", "a@b.c", "")).available());
    }

    #[test]
    fn zero_port_defaults_to_starttls_submission() {
        let handler = EmailHandler::new(&config("smtp.example.com", "a@b.c", "x@y.z"));
        assert_eq!(handler.port, DEFAULT_SMTP_PORT);
    }

    #[test]
    fn password_is_read_and_trimmed_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  hunter2  ").unwrap();

        let mut cfg = config("smtp.example.com", "a@b.c", "x@y.z");
        cfg.smtp_password_file = file.path().to_string_lossy().into_owned();
        cfg.smtp_user = "mailer".into();

        let handler = EmailHandler::new(&cfg);
        assert_eq!(handler.password, "hunter2");
    }

    #[tokio::test]
    async fn invalid_from_address_fails_before_any_network_io() {
        let handler = EmailHandler::new(&config("smtp.example.com", "not-an-address", "x@y.z"));
        let (_dir, doc) = crate::test_support::test_document(b"%PDF");
        let err = handler.send(doc).await.unwrap_err();
        assert!(err.to_string().contains("from address"));
    }
}
