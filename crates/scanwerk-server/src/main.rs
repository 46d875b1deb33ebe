// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk-server — network-attached document scanner service.
//
// Owns the scanner hardware, accepts scan requests over HTTP and from the
// hardware button, processes pages into searchable PDFs, and delivers the
// result to a configured output sink.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use scanwerk_core::config::LoggingConfig;
use scanwerk_core::types::{DocumentMetadata, OutputConfig};
use scanwerk_core::{Config, ProfileStore};
use scanwerk_document::Pipeline;
use scanwerk_jobs::{Job, JobQueue};
use scanwerk_output::OutputManager;
use scanwerk_scanner::{ButtonWatcher, ScanController, StubBackend};
use scanwerk_server::{build_router, worker, AppState};

#[derive(Debug, Parser)]
#[command(name = "scanwerk-server", version, about = "Scanwerk scan server")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "/etc/scanwerk/server.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            return ExitCode::from(1);
        }
    };

    init_logging(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "starting scanwerk-server");

    // The stub backend stands in for the hardware access layer; a real SANE
    // binding plugs in through the same ScanBackend trait.
    let scanner = Arc::new(ScanController::new(
        config.scanner.device.clone(),
        config.scanner.auto_open,
        Box::new(StubBackend::new()),
    ));
    if let Err(e) = scanner.init() {
        warn!(error = %e, "scanner initialization failed; continuing disconnected");
    }

    let profiles_dir = args
        .config
        .parent()
        .map(|dir| dir.join("profiles"))
        .unwrap_or_else(|| PathBuf::from("profiles"));
    let profiles = match ProfileStore::new(&profiles_dir) {
        Ok(profiles) => profiles,
        Err(e) => {
            warn!(dir = %profiles_dir.display(), error = %e, "failed to load profiles from directory, using built-ins");
            ProfileStore::builtin()
        }
    };

    let queue = Arc::new(JobQueue::new());
    let outputs = OutputManager::new(&config.output, &config.storage);
    let pipeline = Pipeline::new(
        config.processing.temp_directory.clone(),
        config.processing.pdf.jpeg_quality,
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let button_config = config.button.clone();

    let state = AppState::new(config, Arc::clone(&scanner), Arc::clone(&queue), profiles, outputs);

    // Progress hub run loop.
    {
        let hub = Arc::clone(&state.hub);
        tokio::spawn(async move { hub.run().await });
    }

    // Job worker.
    let pending = queue
        .take_pending_receiver()
        .expect("pending receiver already claimed");
    tokio::spawn(worker::run(state.clone(), pipeline, pending));

    // Hardware button.
    if button_config.enabled {
        let watcher = ButtonWatcher::new(
            Arc::clone(&scanner),
            button_config.poll_interval,
            button_config.long_press_duration,
            button_config.beep_on_long_press,
            button_callback(
                Arc::clone(&queue),
                button_config.short_press_profile.clone(),
                button_config.output.clone(),
                button_config.metadata.clone(),
            ),
            button_callback(
                Arc::clone(&queue),
                button_config.long_press_profile.clone(),
                button_config.output.clone(),
                button_config.metadata.clone(),
            ),
        );
        tokio::spawn(watcher.run(state.shutdown.child_token()));
    }

    let app = build_router(state.clone());

    info!(addr = %addr, "API server starting");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "failed to bind");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "server error");
        return ExitCode::from(1);
    }

    info!("shutting down");
    state.shutdown.cancel();
    scanner.shutdown();
    ExitCode::SUCCESS
}

/// A press callback submitting a job for the given profile and target,
/// stamped with the configured button metadata.
fn button_callback(
    queue: Arc<JobQueue>,
    profile: String,
    output: String,
    metadata: scanwerk_core::config::ButtonMetadataConfig,
) -> Arc<dyn Fn() + Send + Sync> {
    Arc::new(move || {
        let now = chrono_now();
        let title = metadata
            .title_pattern
            .replace("{date}", &now.0)
            .replace("{time}", &now.1);
        let has_metadata = !metadata.title_pattern.is_empty()
            || metadata.correspondent > 0
            || metadata.document_type > 0
            || !metadata.tags.is_empty();

        let job = Arc::new(Job::new(
            &profile,
            OutputConfig {
                target: output.clone(),
                filename: String::new(),
            },
            has_metadata.then(|| DocumentMetadata {
                title,
                correspondent: metadata.correspondent,
                document_type: metadata.document_type,
                tags: metadata.tags.clone(),
                ..Default::default()
            }),
            None,
        ));

        info!(profile = %profile, "button press scan");
        if let Err(e) = queue.submit(job) {
            warn!(error = %e, "button scan submit failed");
        }
    })
}

fn chrono_now() -> (String, String) {
    let now = chrono::Local::now();
    (
        now.format("%Y%m%d").to_string(),
        now.format("%H%M%S").to_string(),
    )
}

fn init_logging(cfg: &LoggingConfig) {
    let level = match cfg.level.as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},tower_http=warn")));

    let registry = tracing_subscriber::registry().with(filter);
    if cfg.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Resolve on SIGINT or SIGTERM so the server drains cleanly under both
/// interactive use and a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}
