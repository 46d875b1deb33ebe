// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF assembly — one page per scanned image, using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`. Each scan image is compressed through a JPEG
// round-trip at the configured quality before embedding, then placed to fill
// its page exactly; the page inherits the image's dimensions at the scan
// resolution.

use std::io::Cursor;
use std::path::Path;

use image::DynamicImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info};

use scanwerk_core::error::{Result, ScanwerkError};

const MM_PER_INCH: f32 = 25.4;

/// Creates PDF documents from scanned page images.
pub struct PdfWriter {
    /// Scan resolution; maps pixel dimensions to physical page size.
    dpi: u32,
    /// JPEG compression quality (1-100) applied to each page image.
    jpeg_quality: u8,
    /// Title embedded in the PDF /Info dictionary.
    title: String,
}

impl PdfWriter {
    pub fn new(dpi: u32, jpeg_quality: u8) -> Self {
        let dpi = if dpi == 0 { 300 } else { dpi };
        let jpeg_quality = if jpeg_quality == 0 { 85 } else { jpeg_quality };
        Self {
            dpi,
            jpeg_quality,
            title: "Scanned document".into(),
        }
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Assemble a PDF whose pages correspond 1:1 to `image_paths`, in order.
    pub fn create_from_images(&self, image_paths: &[impl AsRef<Path>]) -> Result<Vec<u8>> {
        if image_paths.is_empty() {
            return Err(ScanwerkError::Pipeline(
                "no images to create PDF from".into(),
            ));
        }

        let mut doc = PdfDocument::new(&self.title);
        let mut pages = Vec::with_capacity(image_paths.len());

        for path in image_paths {
            let path = path.as_ref();
            let image = image::open(path).map_err(|e| {
                ScanwerkError::Pipeline(format!("load image {}: {e}", path.display()))
            })?;
            pages.push(self.image_page(&mut doc, &image)?);
        }

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);

        info!(
            pages = image_paths.len(),
            bytes = output.len(),
            "PDF assembled"
        );
        Ok(output)
    }

    /// Create the PDF and write it to `out_path`.
    pub fn write_to_file(
        &self,
        image_paths: &[impl AsRef<Path>],
        out_path: impl AsRef<Path>,
    ) -> Result<()> {
        let bytes = self.create_from_images(image_paths)?;
        std::fs::write(out_path.as_ref(), &bytes)?;
        debug!(path = %out_path.as_ref().display(), "PDF written");
        Ok(())
    }

    /// Build one page holding one image, sized so the raster fills the page
    /// exactly at the configured resolution.
    fn image_page(&self, doc: &mut PdfDocument, image: &DynamicImage) -> Result<PdfPage> {
        let compressed = self.jpeg_round_trip(image)?;
        let rgb = compressed.to_rgb8();
        let (px_w, px_h) = rgb.dimensions();

        let raw = RawImage {
            pixels: RawImageData::U8(rgb.into_raw()),
            width: px_w as usize,
            height: px_h as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let xobject_id = doc.add_image(&raw);

        let page_w = Mm(px_w as f32 / self.dpi as f32 * MM_PER_INCH);
        let page_h = Mm(px_h as f32 / self.dpi as f32 * MM_PER_INCH);

        let ops = vec![Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                scale_x: Some(1.0),
                scale_y: Some(1.0),
                dpi: Some(self.dpi as f32),
                rotate: None,
            },
        }];

        Ok(PdfPage::new(page_w, page_h, ops))
    }

    /// Apply the configured JPEG quality by encoding and decoding the image.
    fn jpeg_round_trip(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let mut jpeg = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
            Cursor::new(&mut jpeg),
            self.jpeg_quality,
        );
        image
            .to_rgb8()
            .write_with_encoder(encoder)
            .map_err(|e| ScanwerkError::Pipeline(format!("JPEG encoding failed: {e}")))?;

        image::load_from_memory(&jpeg)
            .map_err(|e| ScanwerkError::Pipeline(format!("JPEG decoding failed: {e}")))
    }
}
