// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Server configuration, loaded from a TOML file.
//
// Every section has sensible defaults so a partial config file works. Secret
// values may be supplied inline or via `*_file` paths that are read and
// trimmed at load time.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanwerkError};
use crate::types::{ColorMode, FeedSource, ScanOptions};

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub scanner: ScannerConfig,
    pub button: ButtonConfig,
    pub processing: ProcessingConfig,
    pub storage: StorageConfig,
    pub output: OutputsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub auth: AuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            base_url: String::new(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Device name to open; empty selects the first discovered device.
    pub device: String,
    pub auto_open: bool,
    pub defaults: ScannerDefaults,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            auto_open: true,
            defaults: ScannerDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerDefaults {
    pub resolution: u32,
    pub mode: ColorMode,
    pub source: FeedSource,
    pub page_width: f64,
    pub page_height: f64,
}

impl Default for ScannerDefaults {
    fn default() -> Self {
        Self {
            resolution: 300,
            mode: ColorMode::Color,
            source: FeedSource::AdfDuplex,
            page_width: 210.0,
            page_height: 297.0,
        }
    }
}

impl ScannerDefaults {
    pub fn to_scan_options(&self) -> ScanOptions {
        ScanOptions {
            resolution: self.resolution,
            mode: self.mode,
            source: self.source,
            page_width: self.page_width,
            page_height: self.page_height,
            brightness: 0,
            contrast: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub enabled: bool,
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    #[serde(with = "duration_str")]
    pub long_press_duration: Duration,
    pub short_press_profile: String,
    pub long_press_profile: String,
    pub output: String,
    pub beep_on_long_press: bool,
    pub metadata: ButtonMetadataConfig,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval: Duration::from_millis(50),
            long_press_duration: Duration::from_secs(1),
            short_press_profile: "standard".into(),
            long_press_profile: "oversize".into(),
            output: "paperless".into(),
            beep_on_long_press: false,
            metadata: ButtonMetadataConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonMetadataConfig {
    pub title_pattern: String,
    pub correspondent: i64,
    pub document_type: i64,
    pub tags: Vec<i64>,
}

impl Default for ButtonMetadataConfig {
    fn default() -> Self {
        Self {
            title_pattern: "Scan_{date}_{time}".into(),
            correspondent: 0,
            document_type: 0,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub temp_directory: String,
    pub max_concurrent_jobs: u32,
    pub pdf: PdfConfig,
    pub ocr: OcrConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            temp_directory: "/tmp/scanwerk".into(),
            max_concurrent_jobs: 2,
            pdf: PdfConfig::default(),
            ocr: OcrConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    pub format: String,
    pub jpeg_quality: u8,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            format: "PDF/A-2b".into(),
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub enabled: bool,
    pub language: String,
    pub tesseract_path: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: "deu+eng".into(),
            tesseract_path: "/usr/bin/tesseract".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub local_directory: String,
    pub retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_directory: "/var/lib/scanwerk/documents".into(),
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputsConfig {
    pub paperless: PaperlessConfig,
    pub smb: SmbConfig,
    pub paperless_consume: ConsumeConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperlessConfig {
    pub enabled: bool,
    pub url: String,
    pub token: String,
    pub token_file: String,
    pub verify_ssl: bool,
    pub default_correspondent: i64,
    pub default_document_type: i64,
    pub default_tags: Vec<i64>,
}

impl Default for PaperlessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            token: String::new(),
            token_file: String::new(),
            verify_ssl: true,
            default_correspondent: 0,
            default_document_type: 0,
            default_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbConfig {
    pub enabled: bool,
    pub server: String,
    pub share: String,
    pub username: String,
    pub password_file: String,
    pub directory: String,
    pub filename_pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumeConfig {
    pub enabled: bool,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password_file: String,
    pub from_address: String,
    pub default_recipient: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "json".into(),
            file: String::new(),
        }
    }
}

impl Config {
    /// Read and parse the configuration from a TOML file, then resolve
    /// file-based secrets.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ScanwerkError::Config(format!(
                "read config file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::parse(&data)
    }

    /// Parse configuration from TOML text (tests use this directly).
    pub fn parse(data: &str) -> Result<Self> {
        let mut cfg: Config = toml::from_str(data)
            .map_err(|e| ScanwerkError::Config(format!("parse config: {e}")))?;
        cfg.load_secrets()?;
        Ok(cfg)
    }

    /// Resolve `*_file` secrets into their inline fields.
    ///
    /// A missing secret file is fatal only when the owning sink is enabled.
    fn load_secrets(&mut self) -> Result<()> {
        let paperless = &mut self.output.paperless;
        if !paperless.token_file.is_empty() && paperless.token.is_empty() {
            match read_secret_file(&paperless.token_file) {
                Ok(token) => paperless.token = token,
                Err(e) if paperless.enabled => {
                    return Err(ScanwerkError::Config(format!("paperless token: {e}")));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "paperless token file unreadable; sink disabled");
                }
            }
        }
        Ok(())
    }
}

/// Read a secret file and trim surrounding whitespace.
pub fn read_secret_file(path: &str) -> std::io::Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

/// Serde adapter for durations written as strings (`"50ms"`, `"1s"`, `"2m"`).
pub mod duration_str {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let millis = d.as_millis();
        if millis % 1000 == 0 {
            s.serialize_str(&format!("{}s", millis / 1000))
        } else {
            s.serialize_str(&format!("{millis}ms"))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(d)?;
        parse(&text).map_err(de::Error::custom)
    }

    /// Parse a duration string with an `ms`, `s`, `m`, or `h` suffix.
    pub fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        let split = text
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| format!("duration {text:?} is missing a unit"))?;
        let (num, unit) = text.split_at(split);
        let value: f64 = num
            .parse()
            .map_err(|_| format!("invalid duration value {num:?}"))?;
        let millis = match unit {
            "ms" => value,
            "s" => value * 1000.0,
            "m" => value * 60_000.0,
            "h" => value * 3_600_000.0,
            other => return Err(format!("unknown duration unit {other:?}")),
        };
        if millis < 0.0 {
            return Err(format!("negative duration {text:?}"));
        }
        Ok(Duration::from_millis(millis as u64))
    }
}
