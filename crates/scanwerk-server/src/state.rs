// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared application state handed to all Axum handlers.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;

use scanwerk_core::{Config, ProfileStore};
use scanwerk_document::OcrSettings;
use scanwerk_jobs::JobQueue;
use scanwerk_output::OutputManager;
use scanwerk_scanner::ScanController;

use crate::ws::ProgressHub;

/// Cheaply cloneable state; all heavy members live behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Pre-computed API key set for the auth middleware.
    pub api_keys: Arc<HashSet<String>>,
    pub scanner: Arc<ScanController>,
    pub queue: Arc<JobQueue>,
    pub profiles: Arc<RwLock<ProfileStore>>,
    pub outputs: Arc<OutputManager>,
    pub hub: Arc<ProgressHub>,
    /// Runtime OCR settings adjustable through the settings endpoint.
    pub settings: Arc<RwLock<OcrSettings>>,
    /// Root token; per-job contexts are parented to this.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        scanner: Arc<ScanController>,
        queue: Arc<JobQueue>,
        profiles: ProfileStore,
        outputs: OutputManager,
    ) -> Self {
        let api_keys: HashSet<String> = config.server.auth.api_keys.iter().cloned().collect();
        let settings = OcrSettings {
            enabled: config.processing.ocr.enabled,
            language: config.processing.ocr.language.clone(),
            tesseract_path: config.processing.ocr.tesseract_path.clone(),
        };

        Self {
            config: Arc::new(config),
            api_keys: Arc::new(api_keys),
            scanner,
            queue,
            profiles: Arc::new(RwLock::new(profiles)),
            outputs: Arc::new(outputs),
            hub: Arc::new(ProgressHub::new()),
            settings: Arc::new(RwLock::new(settings)),
            shutdown: CancellationToken::new(),
        }
    }
}
