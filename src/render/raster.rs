//! Raster image "renderer": single page, no embedded text

use super::{PageRenderer, RenderError, RenderedPage};
use crate::document::Document;
use crate::error::{Error, Result};

/// Decodes image uploads (PNG, JPEG, TIFF, ...) as a one-page document
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterRenderer;

impl PageRenderer for RasterRenderer {
    fn page_count(&self, document: &Document) -> Result<u32> {
        image::guess_format(document.data()).map_err(|e| Error::DocumentOpen {
            reason: format!("unrecognised image data: {}", e),
        })?;
        Ok(1)
    }

    fn render(
        &self,
        document: &Document,
        page_index: u32,
    ) -> std::result::Result<RenderedPage, RenderError> {
        if page_index != 0 {
            return Err(RenderError::PageOutOfRange {
                page: page_index,
                total: 1,
            });
        }

        let image = image::load_from_memory(document.data()).map_err(|e| {
            RenderError::CorruptDocument {
                reason: format!("failed to decode image: {}", e),
            }
        })?;

        Ok(RenderedPage {
            image,
            native_text: String::new(),
        })
    }
}
