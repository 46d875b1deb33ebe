// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR via external tooling.
//
// Prefers `ocrmypdf` (produces a searchable PDF directly). When it is absent
// but a tesseract binary exists, the PDF is copied through unchanged with a
// warning; OCR is always best-effort and never fails a job on its own.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use scanwerk_core::error::{Result, ScanwerkError};

/// Apply OCR to `input_pdf`, writing the result to `output_pdf`.
pub async fn run_ocr(
    token: &CancellationToken,
    input_pdf: &Path,
    output_pdf: &Path,
    language: &str,
    tesseract_path: &str,
) -> Result<()> {
    let tesseract = if tesseract_path.is_empty() {
        "tesseract"
    } else {
        tesseract_path
    };

    if let Some(ocrmypdf) = find_in_path("ocrmypdf") {
        return run_ocrmypdf(token, &ocrmypdf, input_pdf, output_pdf, language).await;
    }

    if resolve_binary(tesseract).is_none() {
        return Err(ScanwerkError::Pipeline(format!(
            "tesseract not found at {tesseract}"
        )));
    }

    // Tesseract works on images, not PDFs; without ocrmypdf the PDF passes
    // through unchanged.
    warn!("ocrmypdf not available, copying PDF without OCR");
    tokio::fs::copy(input_pdf, output_pdf)
        .await
        .map_err(|e| ScanwerkError::Pipeline(format!("copy PDF: {e}")))?;
    Ok(())
}

async fn run_ocrmypdf(
    token: &CancellationToken,
    ocrmypdf: &Path,
    input_pdf: &Path,
    output_pdf: &Path,
    language: &str,
) -> Result<()> {
    let mut command = tokio::process::Command::new(ocrmypdf);
    command
        .arg("--language")
        .arg(language)
        // Skip pages that already have text.
        .arg("--skip-text")
        // Light optimization.
        .arg("--optimize")
        .arg("1")
        .arg("--deskew")
        .arg(input_pdf)
        .arg(output_pdf)
        .kill_on_drop(true);

    debug!(language, input = %input_pdf.display(), "running ocrmypdf");

    let mut child = command
        .spawn()
        .map_err(|e| ScanwerkError::Pipeline(format!("spawn ocrmypdf: {e}")))?;

    tokio::select! {
        status = child.wait() => {
            let status = status
                .map_err(|e| ScanwerkError::Pipeline(format!("ocrmypdf wait: {e}")))?;
            if !status.success() {
                return Err(ScanwerkError::Pipeline(format!(
                    "ocrmypdf failed with status {status}"
                )));
            }
            Ok(())
        }
        _ = token.cancelled() => {
            let _ = child.start_kill();
            Err(ScanwerkError::Pipeline("OCR cancelled".into()))
        }
    }
}

/// Resolve a binary: absolute or relative paths are checked directly, bare
/// names are searched on PATH.
fn resolve_binary(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    find_in_path(name)
}

/// Search the PATH environment for an executable with the given name.
fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
