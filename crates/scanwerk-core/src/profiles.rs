// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan profiles — named bundles of scanner and processing settings.
//
// Three profiles are built in (`standard`, `oversize`, `photo`); additional
// profiles are loaded from a directory of TOML files at startup. A file named
// `invoices.toml` registers as profile `invoices` and overrides a built-in of
// the same name (last write wins).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanwerkError};
use crate::types::{ColorMode, FeedSource, ScanOptions};

/// A scan profile: scanner options plus processing toggles plus a default
/// output target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub profile: ProfileInfo,
    pub scanner: ProfileScanner,
    pub processing: ProfileProcessing,
    pub output: ProfileOutput,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileScanner {
    pub resolution: u32,
    pub mode: ColorMode,
    pub source: FeedSource,
    pub page_width: f64,
    /// 0 = unlimited length (oversize documents).
    pub page_height: f64,
}

impl Default for ProfileScanner {
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

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileProcessing {
    pub optimize_images: bool,
    pub deskew: bool,
    pub remove_blank_pages: bool,
    pub blank_threshold: f64,
    pub ocr: ProfileOcr,
}

impl Default for ProfileProcessing {
    fn default() -> Self {
        Self {
            optimize_images: false,
            deskew: false,
            remove_blank_pages: false,
            blank_threshold: 0.99,
            ocr: ProfileOcr::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOcr {
    pub enabled: bool,
    pub language: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOutput {
    pub default_target: String,
}

impl Profile {
    /// Scanner options derived from this profile.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            resolution: self.scanner.resolution,
            mode: self.scanner.mode,
            source: self.scanner.source,
            page_width: self.scanner.page_width,
            page_height: self.scanner.page_height,
            brightness: 0,
            contrast: 0,
        }
    }
}

/// In-memory profile registry keyed by profile name.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    profiles: HashMap<String, Profile>,
}

impl ProfileStore {
    /// Create a store with the built-in profiles, then overlay any TOML
    /// profiles found in `dir`. A missing directory is not an error.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self::builtin();
        store.load_from_directory(dir.as_ref())?;
        Ok(store)
    }

    /// Create a store containing only the built-in profiles.
    pub fn builtin() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert("standard".to_string(), standard_profile());
        profiles.insert("oversize".to_string(), oversize_profile());
        profiles.insert("photo".to_string(), photo_profile());
        Self { profiles }
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// All profiles, sorted by registry name for stable listings.
    pub fn list(&self) -> Vec<(String, Profile)> {
        let mut entries: Vec<_> = self
            .profiles
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn set(&mut self, name: impl Into<String>, profile: Profile) {
        self.profiles.insert(name.into(), profile);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    fn load_from_directory(&mut self, dir: &Path) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(ScanwerkError::Config(format!(
                    "read profiles directory {}: {e}",
                    dir.display()
                )))
            }
        };

        for entry in entries {
            let entry = entry.map_err(ScanwerkError::Io)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }

            let data = std::fs::read_to_string(&path).map_err(|e| {
                ScanwerkError::Config(format!("read profile {}: {e}", path.display()))
            })?;
            let profile: Profile = toml::from_str(&data).map_err(|e| {
                ScanwerkError::Config(format!("parse profile {}: {e}", path.display()))
            })?;

            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            tracing::debug!(profile = %name, "loaded profile from directory");
            self.profiles.insert(name, profile);
        }

        Ok(())
    }
}

fn standard_profile() -> Profile {
    Profile {
        profile: ProfileInfo {
            name: "Standard document".into(),
            description: "Colour scan at 300 DPI, duplex, with OCR".into(),
        },
        scanner: ProfileScanner {
            resolution: 300,
            mode: ColorMode::Color,
            source: FeedSource::AdfDuplex,
            page_width: 210.0,
            page_height: 420.0,
        },
        processing: ProfileProcessing {
            optimize_images: true,
            deskew: true,
            remove_blank_pages: true,
            blank_threshold: 0.99,
            ocr: ProfileOcr {
                enabled: true,
                language: "deu".into(),
            },
        },
        output: ProfileOutput {
            default_target: "paperless".into(),
        },
    }
}

fn oversize_profile() -> Profile {
    Profile {
        profile: ProfileInfo {
            name: "Oversize".into(),
            description: "Documents longer than A4 (bank statements, receipts)".into(),
        },
        scanner: ProfileScanner {
            resolution: 200,
            mode: ColorMode::Gray,
            source: FeedSource::AdfDuplex,
            page_width: 210.0,
            // Unlimited length — scan until the feeder runs out.
            page_height: 0.0,
        },
        processing: ProfileProcessing {
            optimize_images: true,
            deskew: true,
            remove_blank_pages: false,
            blank_threshold: 0.99,
            ocr: ProfileOcr {
                enabled: true,
                language: "deu".into(),
            },
        },
        output: ProfileOutput {
            default_target: "paperless".into(),
        },
    }
}

fn photo_profile() -> Profile {
    Profile {
        profile: ProfileInfo {
            name: "Photo".into(),
            description: "High-resolution colour scan for photographs".into(),
        },
        scanner: ProfileScanner {
            resolution: 600,
            mode: ColorMode::Color,
            source: FeedSource::Flatbed,
            page_width: 210.0,
            page_height: 297.0,
        },
        processing: ProfileProcessing::default(),
        output: ProfileOutput {
            default_target: "filesystem".into(),
        },
    }
}
