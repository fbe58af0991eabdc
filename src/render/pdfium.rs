//! PDFium-backed renderer

use super::{PageRenderer, RenderError, RenderedPage};
use crate::document::Document;
use crate::error::{Error, Result};
use pdfium_render::prelude::*;
use std::path::PathBuf;

/// Same-line tolerance in points for grouping characters into lines
const Y_TOLERANCE: f32 = 5.0;
/// Horizontal gap in points treated as a word break
const SPACE_THRESHOLD: f32 = 10.0;
/// PDF user space unit
const POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF pages with PDFium.
///
/// PDFium is not reentrant, so the library is bound afresh for every call
/// instead of sharing one handle across workers.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    library_dirs: Vec<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32) -> Self {
        Self {
            dpi,
            library_dirs: vec![PathBuf::from("./"), PathBuf::from("/opt/pdfium/lib")],
        }
    }

    /// Look for the PDFium shared library in these directories before
    /// falling back to the system library path
    pub fn with_library_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.library_dirs = dirs;
        self
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    fn bind(&self) -> std::result::Result<Pdfium, String> {
        let mut last_error = None;
        for dir in &self.library_dirs {
            match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => last_error = Some(e),
            }
        }
        Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|e| {
                let detail = last_error.map(|l| format!(" (also tried bundled: {})", l));
                format!("Failed to initialize PDFium: {}{}", e, detail.unwrap_or_default())
            })
    }

    fn open_reason(err: PdfiumError) -> String {
        match err {
            PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError) => {
                "document is password protected".to_string()
            }
            other => other.to_string(),
        }
    }

    fn page_text(page: &PdfPage) -> String {
        let text_obj = match page.text() {
            Ok(t) => t,
            Err(_) => return String::new(),
        };

        let mut chars = Vec::new();
        for segment in text_obj.segments().iter() {
            if let Ok(segment_chars) = segment.chars() {
                for char_result in segment_chars.iter() {
                    if let Some(c) = char_result.unicode_char() {
                        if let Ok(bounds) = char_result.loose_bounds() {
                            chars.push(PositionedChar {
                                ch: c,
                                x: bounds.left().value,
                                y: bounds.top().value,
                            });
                        }
                    }
                }
            }
        }

        layout_text(chars)
    }
}

impl PageRenderer for PdfiumRenderer {
    fn page_count(&self, document: &Document) -> Result<u32> {
        let pdfium = self
            .bind()
            .map_err(|reason| Error::EngineUnavailable { reason })?;
        let pdf = pdfium
            .load_pdf_from_byte_slice(document.data(), None)
            .map_err(|e| Error::DocumentOpen {
                reason: Self::open_reason(e),
            })?;
        Ok(pdf.pages().len() as u32)
    }

    fn render(
        &self,
        document: &Document,
        page_index: u32,
    ) -> std::result::Result<RenderedPage, RenderError> {
        let pdfium = self
            .bind()
            .map_err(|reason| RenderError::Unavailable { reason })?;
        let pdf = pdfium
            .load_pdf_from_byte_slice(document.data(), None)
            .map_err(|e| RenderError::CorruptDocument {
                reason: Self::open_reason(e),
            })?;

        let pages = pdf.pages();
        let total = pages.len() as u32;
        if page_index >= total {
            return Err(RenderError::PageOutOfRange {
                page: page_index,
                total,
            });
        }

        let page = pages
            .get(page_index as u16)
            .map_err(|e| RenderError::CorruptDocument {
                reason: format!("failed to load page {}: {}", page_index, e),
            })?;

        let native_text = Self::page_text(&page);

        let config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / POINTS_PER_INCH)
            .render_form_data(true)
            .render_annotations(true);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| RenderError::CorruptDocument {
                reason: format!("failed to rasterize page {}: {}", page_index, e),
            })?;

        Ok(RenderedPage {
            image: bitmap.as_image(),
            native_text,
        })
    }
}

/// A character with its top-left position in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedChar {
    pub ch: char,
    pub x: f32,
    pub y: f32,
}

/// Rebuild reading order from positioned characters: lines top to bottom
/// (PDF y grows upwards), characters left to right, with a space inserted at
/// wide horizontal gaps.
pub fn layout_text(mut chars: Vec<PositionedChar>) -> String {
    if chars.is_empty() {
        return String::new();
    }

    chars.sort_by(|a, b| {
        b.y.partial_cmp(&a.y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
    });

    let mut lines: Vec<Vec<(char, f32)>> = Vec::new();
    let mut line_y: Option<f32> = None;
    for c in chars {
        let same_line = matches!(line_y, Some(y) if (y - c.y).abs() <= Y_TOLERANCE);
        if same_line {
            if let Some(line) = lines.last_mut() {
                line.push((c.ch, c.x));
                continue;
            }
        }
        lines.push(vec![(c.ch, c.x)]);
        line_y = Some(c.y);
    }

    let mut out = String::new();
    for mut line in lines {
        line.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let mut prev_x: Option<f32> = None;
        for (c, x) in line {
            if matches!(prev_x, Some(px) if x - px > SPACE_THRESHOLD && c != ' ') {
                out.push(' ');
            }
            out.push(c);
            prev_x = Some(x);
        }
        out.push('\n');
    }

    out.trim_end().to_string()
}
