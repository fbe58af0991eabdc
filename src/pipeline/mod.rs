//! Extraction pipeline
//!
//! [`DocumentPipeline::extract`] opens a document, fans it out into one
//! [`PageTask`] per page, runs the tasks in parallel under the shared
//! [`WorkerPool`], and folds the page results back into a [`DocumentResult`]
//! in page order.

mod pool;
mod result;
mod worker;

pub use pool::{Cancellation, WorkerPool};
pub use result::{
    normalize_page_text, DocumentResult, DocumentStatus, ExtractionMethod, PageOutcome,
    PageResult, PAGE_BOUNDARY,
};
pub use worker::{PageState, PageTask};

use crate::config::{ExtractionConfig, ServerConfig};
use crate::document::{Document, MediaType};
use crate::error::{Error, PageError, Result};
use crate::ocr::{OcrEngine, TesseractEngine};
use crate::render::{PageRenderer, PdfiumRenderer, RasterRenderer};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn, Instrument};
use worker::{run_page, Admission};

/// Renderer and OCR engines, created once at startup and shared by `Arc`
pub struct Engines {
    pdf: Arc<dyn PageRenderer>,
    image: Arc<dyn PageRenderer>,
    ocr: Arc<dyn OcrEngine>,
}

impl Engines {
    pub fn new(
        pdf: Arc<dyn PageRenderer>,
        image: Arc<dyn PageRenderer>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self { pdf, image, ocr }
    }

    /// PDFium for PDFs, the `image` crate for rasters, tesseract for OCR
    pub fn production(server: &ServerConfig, defaults: &ExtractionConfig) -> Self {
        let ocr = TesseractEngine::new(server.tesseract_cmd.clone()).with_dpi(defaults.render_dpi);
        Self::new(
            Arc::new(PdfiumRenderer::new(defaults.render_dpi)),
            Arc::new(RasterRenderer),
            Arc::new(ocr),
        )
    }

    pub fn renderer(&self, media_type: MediaType) -> Arc<dyn PageRenderer> {
        match media_type {
            MediaType::Pdf => Arc::clone(&self.pdf),
            MediaType::Image => Arc::clone(&self.image),
        }
    }

    pub fn ocr(&self) -> Arc<dyn OcrEngine> {
        Arc::clone(&self.ocr)
    }
}

/// Document-level orchestrator. Cheap to clone; clones share engines and
/// the worker pool but nothing else.
#[derive(Clone)]
pub struct DocumentPipeline {
    engines: Arc<Engines>,
    pool: WorkerPool,
}

impl DocumentPipeline {
    pub fn new(engines: Arc<Engines>, pool: WorkerPool) -> Self {
        Self { engines, pool }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Count the document's pages, failing with [`Error::DocumentOpen`]
    /// when it cannot be parsed
    pub async fn open(&self, document: &Document) -> Result<u32> {
        let renderer = self.engines.renderer(document.media_type());
        let doc = document.clone();
        let pages = tokio::task::spawn_blocking(move || renderer.page_count(&doc))
            .await
            .map_err(|e| Error::TaskJoin {
                reason: e.to_string(),
            })??;

        if pages == 0 {
            return Err(Error::DocumentOpen {
                reason: "document has no pages".to_string(),
            });
        }
        Ok(pages)
    }

    pub async fn extract(&self, document: Document, config: ExtractionConfig) -> DocumentResult {
        self.extract_with_cancel(document, config, Cancellation::new())
            .await
    }

    /// Extract a document; `cancel` fails every outstanding page of this
    /// document without retries
    pub async fn extract_with_cancel(
        &self,
        document: Document,
        config: ExtractionConfig,
        cancel: Cancellation,
    ) -> DocumentResult {
        let span = tracing::info_span!(
            "extract",
            document = %document.name(),
            media_type = %document.media_type(),
            pages = tracing::field::Empty
        );
        self.run(document, config, cancel).instrument(span).await
    }

    async fn run(
        &self,
        document: Document,
        config: ExtractionConfig,
        cancel: Cancellation,
    ) -> DocumentResult {
        let started = Instant::now();
        let failed = |e: Error| {
            warn!(error = %e, "document not extracted");
            DocumentResult::open_failed(
                document.name(),
                Some(document.media_type()),
                e.client_message(),
            )
            .with_elapsed(started.elapsed())
        };

        if cancel.is_cancelled() {
            return failed(Error::Cancelled);
        }
        let page_count = match self.open(&document).await {
            Ok(n) => {
                tracing::Span::current().record("pages", n);
                n
            }
            Err(e) => return failed(e),
        };
        if cancel.is_cancelled() {
            return failed(Error::Cancelled);
        }

        let config = Arc::new(config);
        let admission = Arc::new(Admission {
            pool: self.pool.clone(),
            document_slots: Arc::new(Semaphore::new(config.max_concurrent_pages.max(1))),
        });

        let mut tasks = JoinSet::new();
        for index in 0..page_count {
            let task = PageTask {
                document: document.clone(),
                index,
                config: Arc::clone(&config),
            };
            tasks.spawn(
                run_page(
                    task,
                    Arc::clone(&self.engines),
                    Arc::clone(&admission),
                    cancel.clone(),
                )
                .in_current_span(),
            );
        }

        let mut collected: BTreeMap<u32, PageResult> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(page) => {
                    collected.insert(page.index, page);
                }
                Err(e) => warn!(error = %e, "page task died"),
            }
        }

        // A panicked task loses its index; report the gap as a failed page.
        for index in 0..page_count {
            collected.entry(index).or_insert_with(|| {
                PageResult::failed(index, &PageError::Worker("page task aborted".to_string()), 0)
            });
        }

        let result = DocumentResult::from_pages(
            document.name(),
            document.media_type(),
            collected.into_values().collect(),
        )
        .with_elapsed(started.elapsed());

        info!(
            status = ?result.status,
            pages = result.page_count,
            failed = result.failed_pages().count(),
            elapsed_ms = result.elapsed_ms,
            "extraction finished"
        );
        result
    }
}
