// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanwerk — document processing: page persistence, image optimization,
// PDF assembly, and OCR.

pub mod image_ops;
pub mod ocr;
pub mod pdf;
pub mod pipeline;

pub use pdf::PdfWriter;
pub use pipeline::{sanitize_filename, OcrSettings, Pipeline};
