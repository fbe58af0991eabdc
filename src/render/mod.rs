//! Page rendering layer
//!
//! A [`PageRenderer`] turns one page of a [`Document`] into a raster image plus
//! whatever text is embedded in the page. PDFs go through PDFium, raster
//! uploads through the `image` crate.

mod pdfium;
mod raster;

pub use pdfium::{layout_text, PdfiumRenderer, PositionedChar};
pub use raster::RasterRenderer;

use crate::document::Document;
use crate::error::Result;
use image::DynamicImage;
use thiserror::Error;

/// One rendered page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Page raster, handed to OCR when the native text is not usable
    pub image: DynamicImage,
    /// Embedded text (empty for image-only pages)
    pub native_text: String,
}

/// Page-fatal render failure. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Page index past the end of the document (0-indexed)
    #[error("page {page} out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },

    /// Renderer rejected the document or page
    #[error("corrupt or unsupported document: {reason}")]
    CorruptDocument { reason: String },

    /// Renderer library could not be bound
    #[error("renderer unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Synchronous renderer capability.
///
/// Implementations are called from the blocking thread pool and must not
/// keep per-document state between calls.
pub trait PageRenderer: Send + Sync {
    /// Count pages, failing with `Error::DocumentOpen` when the document
    /// cannot be parsed at all
    fn page_count(&self, document: &Document) -> Result<u32>;

    /// Render a page (0-indexed)
    fn render(
        &self,
        document: &Document,
        page_index: u32,
    ) -> std::result::Result<RenderedPage, RenderError>;
}
