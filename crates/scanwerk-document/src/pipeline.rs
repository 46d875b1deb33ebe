// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The processing pipeline — turns a scanned job into a deliverable Document.
//
// Stages: persist images, optimize (deskew, blank-page removal), PDF
// assembly, OCR, finalize. Optional stages fail soft; required stages fail
// the job. The per-job temp directory is removed on every exit path; the
// returned Document holds an open file handle, which keeps the bytes
// readable after the unlink.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::profiles::Profile;
use scanwerk_core::types::{Document, ProgressUpdate};
use scanwerk_jobs::Job;

use crate::image_ops;
use crate::ocr;
use crate::pdf::PdfWriter;

/// Runtime OCR settings, adjustable through the settings endpoint.
#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub enabled: bool,
    pub language: String,
    pub tesseract_path: String,
}

/// Orchestrates image processing, PDF creation, and OCR for one job at a
/// time.
pub struct Pipeline {
    temp_dir: PathBuf,
    jpeg_quality: u8,
}

impl Pipeline {
    pub fn new(temp_dir: impl Into<PathBuf>, jpeg_quality: u8) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            jpeg_quality,
        }
    }

    /// Process a completed scan job into a Document ready for output.
    pub async fn process(
        &self,
        token: &CancellationToken,
        job: &Arc<Job>,
        profile: &Profile,
        ocr: &OcrSettings,
    ) -> Result<Document> {
        info!(job_id = %job.id(), pages = job.page_count(), "processing job");

        let job_dir = self.temp_dir.join(job.id());
        std::fs::create_dir_all(&job_dir)
            .map_err(|e| ScanwerkError::Pipeline(format!("create temp dir: {e}")))?;
        let _cleanup = TempDirGuard(job_dir.clone());

        // Step 1: persist images to disk.
        job.send_progress(ProgressUpdate {
            kind: "processing".into(),
            progress: 10,
            message: "Saving scanned images...".into(),
            ..Default::default()
        });

        let pages = job.pages();
        let dir = job_dir.clone();
        let saved = tokio::task::spawn_blocking(move || image_ops::save_pages(&dir, &pages))
            .await
            .map_err(|e| ScanwerkError::Pipeline(format!("save task: {e}")))??;
        for (number, path) in &saved {
            job.set_page_path(*number, path.clone());
        }
        let mut image_paths: Vec<PathBuf> = saved.into_iter().map(|(_, path)| path).collect();

        self.check_cancelled(token)?;

        // Step 2: optional image optimization. Failures log and continue
        // with the prior artifacts.
        if profile.processing.optimize_images {
            job.send_progress(ProgressUpdate {
                kind: "processing".into(),
                progress: 20,
                message: "Optimizing images...".into(),
                ..Default::default()
            });

            if profile.processing.deskew {
                let paths = image_paths.clone();
                match tokio::task::spawn_blocking(move || image_ops::deskew_images(&paths)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "deskew failed"),
                    Err(e) => warn!(error = %e, "deskew task failed"),
                }
            }

            if profile.processing.remove_blank_pages {
                let paths = image_paths.clone();
                let threshold = profile.processing.blank_threshold;
                match tokio::task::spawn_blocking(move || {
                    image_ops::remove_blank_pages(paths, threshold)
                })
                .await
                {
                    Ok(Ok(kept)) => image_paths = kept,
                    Ok(Err(e)) => warn!(error = %e, "blank page removal failed"),
                    Err(e) => warn!(error = %e, "blank page removal task failed"),
                }
            }
        }

        if image_paths.is_empty() {
            return Err(ScanwerkError::Pipeline(
                "no pages remaining after processing".into(),
            ));
        }

        self.check_cancelled(token)?;

        // Step 3: PDF assembly.
        job.send_progress(ProgressUpdate {
            kind: "processing".into(),
            progress: 50,
            message: "Creating PDF...".into(),
            ..Default::default()
        });

        let mut pdf_path = job_dir.join("output.pdf");
        let mut writer = PdfWriter::new(profile.scanner.resolution, self.jpeg_quality);
        if let Some(meta) = job.metadata() {
            if !meta.title.is_empty() {
                writer.set_title(&meta.title);
            }
        }
        {
            let paths = image_paths.clone();
            let out = pdf_path.clone();
            tokio::task::spawn_blocking(move || writer.write_to_file(&paths, &out))
                .await
                .map_err(|e| ScanwerkError::Pipeline(format!("pdf task: {e}")))??;
        }

        // Step 4: OCR. Profile wins when explicitly enabled; the job-level
        // override wins over both. Failure is non-fatal.
        let ocr_enabled = job
            .ocr_enabled()
            .unwrap_or(ocr.enabled || profile.processing.ocr.enabled);

        if ocr_enabled {
            job.send_progress(ProgressUpdate {
                kind: "processing".into(),
                progress: 70,
                message: "Running OCR...".into(),
                ..Default::default()
            });

            let language = if profile.processing.ocr.language.is_empty() {
                ocr.language.clone()
            } else {
                profile.processing.ocr.language.clone()
            };

            let ocr_pdf_path = job_dir.join("output_ocr.pdf");
            match ocr::run_ocr(
                token,
                &pdf_path,
                &ocr_pdf_path,
                &language,
                &ocr.tesseract_path,
            )
            .await
            {
                Ok(()) => pdf_path = ocr_pdf_path,
                Err(e) => warn!(error = %e, "OCR failed, using PDF without OCR"),
            }
        }

        self.check_cancelled(token)?;

        // Step 5: finalize the document.
        job.send_progress(ProgressUpdate {
            kind: "processing".into(),
            progress: 90,
            message: "Finalizing document...".into(),
            ..Default::default()
        });

        let file = std::fs::File::open(&pdf_path)
            .map_err(|e| ScanwerkError::Pipeline(format!("open PDF: {e}")))?;
        let size = file
            .metadata()
            .map_err(|e| ScanwerkError::Pipeline(format!("stat PDF: {e}")))?
            .len();

        let metadata = job.metadata().unwrap_or_default();
        let document = Document {
            filename: generate_filename(metadata.title.as_str()),
            title: metadata.title,
            created: metadata.created,
            correspondent: metadata.correspondent,
            document_type: metadata.document_type,
            tags: metadata.tags,
            archive_serial: metadata.archive_serial_number,
            file,
            size,
        };

        job.send_progress(ProgressUpdate {
            kind: "processing".into(),
            progress: 100,
            message: "Document ready".into(),
            ..Default::default()
        });

        info!(
            job_id = %job.id(),
            pages = image_paths.len(),
            size,
            filename = %document.filename,
            "document processed"
        );

        Ok(document)
    }

    fn check_cancelled(&self, token: &CancellationToken) -> Result<()> {
        if token.is_cancelled() {
            return Err(ScanwerkError::Pipeline("job cancelled".into()));
        }
        Ok(())
    }
}

/// Removes the per-job temp directory when the pipeline returns, whatever
/// the exit path.
struct TempDirGuard(PathBuf);

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// `<sanitized title or "scan">_<YYYYMMDD_HHMMSS>.pdf`
pub fn generate_filename(title: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let base = if title.is_empty() {
        "scan".to_string()
    } else {
        sanitize_filename(title)
    };
    format!("{base}_{timestamp}.pdf")
}

/// Keep `[A-Za-z0-9._-]`, turn spaces into underscores, drop the rest.
/// An empty result becomes "document".
pub fn sanitize_filename(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
            result.push(c);
        } else if c == ' ' {
            result.push('_');
        }
    }
    if result.is_empty() {
        "document".to_string()
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use scanwerk_core::profiles::ProfileStore;
    use scanwerk_core::types::{DocumentMetadata, OutputConfig};
    use scanwerk_jobs::Page;

    fn no_ocr() -> OcrSettings {
        OcrSettings {
            enabled: false,
            language: "eng".into(),
            tesseract_path: String::new(),
        }
    }

    fn page_with_content(number: usize) -> Page {
        let mut img = RgbImage::from_pixel(200, 280, Rgb([255, 255, 255]));
        for x in 0..200 {
            for y in 100..120 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        Page::scanned(number, DynamicImage::ImageRgb8(img))
    }

    fn blank_page(number: usize) -> Page {
        let img = RgbImage::from_pixel(200, 280, Rgb([255, 255, 255]));
        Page::scanned(number, DynamicImage::ImageRgb8(img))
    }

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_filename("Invoice 2024-01.pdf"), "Invoice_2024-01.pdf");
        assert_eq!(sanitize_filename("a/b\\c:d"), "abcd");
        assert_eq!(sanitize_filename("ümläut"), "mlut");
        assert_eq!(sanitize_filename("///"), "document");
        assert_eq!(sanitize_filename(""), "document");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["Invoice 2024", "a/b c", "...", "ümläut!", ""] {
            let once = sanitize_filename(input);
            assert_eq!(sanitize_filename(&once), once);
        }
    }

    #[test]
    fn generated_filename_has_timestamp_and_extension() {
        let name = generate_filename("Tax Return");
        assert!(name.starts_with("Tax_Return_"));
        assert!(name.ends_with(".pdf"));

        let fallback = generate_filename("");
        assert!(fallback.starts_with("scan_"));
    }

    #[tokio::test]
    async fn happy_path_produces_a_document() {
        let temp = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(temp.path(), 85);

        let job = Arc::new(Job::new(
            "photo",
            OutputConfig::default(),
            Some(DocumentMetadata {
                title: "Holiday scans".into(),
                ..Default::default()
            }),
            None,
        ));
        for n in 1..=2 {
            job.add_page(page_with_content(n));
        }

        let store = ProfileStore::builtin();
        let profile = store.get("photo").unwrap();
        let doc = pipeline
            .process(&CancellationToken::new(), &job, profile, &no_ocr())
            .await
            .unwrap();

        assert!(doc.filename.starts_with("Holiday_scans_"));
        assert!(doc.size > 0);
        assert_eq!(doc.title, "Holiday scans");

        // The temp dir is gone, but the document stream still reads.
        assert!(!temp.path().join(job.id()).exists());
        let bytes = doc.into_bytes().unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn all_blank_pages_fail_the_job() {
        let temp = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(temp.path(), 85);

        let job = Arc::new(Job::new("standard", OutputConfig::default(), None, None));
        job.add_page(blank_page(1));
        job.add_page(blank_page(2));

        let store = ProfileStore::builtin();
        // `standard` enables blank-page removal at threshold 0.99.
        let profile = store.get("standard").unwrap();

        let err = pipeline
            .process(&CancellationToken::new(), &job, profile, &no_ocr())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no pages remaining"));
        assert!(!temp.path().join(job.id()).exists());
    }

    #[tokio::test]
    async fn cancellation_aborts_between_stages() {
        let temp = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(temp.path(), 85);

        let job = Arc::new(Job::new("photo", OutputConfig::default(), None, None));
        job.add_page(page_with_content(1));

        let token = CancellationToken::new();
        token.cancel();

        let store = ProfileStore::builtin();
        let profile = store.get("photo").unwrap();
        let err = pipeline
            .process(&token, &job, profile, &no_ocr())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(!temp.path().join(job.id()).exists());
    }

    #[tokio::test]
    async fn progress_updates_flow_through_the_job_channel() {
        let temp = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(temp.path(), 85);

        let job = Arc::new(Job::new("photo", OutputConfig::default(), None, None));
        job.add_page(page_with_content(1));
        let mut rx = job.take_progress_receiver().unwrap();

        let store = ProfileStore::builtin();
        let profile = store.get("photo").unwrap();
        pipeline
            .process(&CancellationToken::new(), &job, profile, &no_ocr())
            .await
            .unwrap();

        let mut percents = Vec::new();
        while let Ok(update) = rx.try_recv() {
            percents.push(update.progress);
        }
        assert!(percents.contains(&10));
        assert!(percents.contains(&50));
        assert!(percents.contains(&90));
        assert!(percents.contains(&100));
        // Progress is non-decreasing through the pipeline.
        let mut sorted = percents.clone();
        sorted.sort_unstable();
        assert_eq!(percents, sorted);
    }
}
