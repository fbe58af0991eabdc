//! Page extraction worker
//!
//! Drives one page through
//! `Pending → Rendering → Classifying → {NativeAccepted | OcrRunning} → {Succeeded | Failed}`.
//! Every failure ends in a [`PageOutcome::Failed`]; nothing escapes the worker.

use super::pool::{Cancellation, WorkerPool};
use super::result::{PageOutcome, PageResult};
use super::Engines;
use crate::classify::{TextClassifier, TextQuality};
use crate::config::ExtractionConfig;
use crate::document::Document;
use crate::error::PageError;
use crate::keywords::extract_keywords;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn, Instrument};

/// Worker states, reported in debug logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Pending,
    Rendering,
    Classifying,
    NativeAccepted,
    OcrRunning { attempt: u32 },
    Succeeded,
    Failed,
}

/// One page of work. Immutable once dispatched.
#[derive(Debug, Clone)]
pub struct PageTask {
    pub document: Document,
    pub index: u32,
    pub config: Arc<ExtractionConfig>,
}

/// Per-document admission: the document's own concurrency cap, then the
/// process-wide worker pool.
pub(crate) struct Admission {
    pub pool: WorkerPool,
    pub document_slots: Arc<Semaphore>,
}

/// Run a page task to completion, honoring cancellation and the page budget
pub(crate) async fn run_page(
    task: PageTask,
    engines: Arc<Engines>,
    admission: Arc<Admission>,
    cancel: Cancellation,
) -> PageResult {
    let span = tracing::debug_span!("page", index = task.index);
    async move {
        debug!(state = ?PageState::Pending);
        let attempts = AtomicU32::new(0);

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("cancelled");
                PageOutcome::Failed {
                    error: PageError::Cancelled,
                    attempts: attempts.load(Ordering::SeqCst),
                }
            }
            outcome = admit_and_drive(&task, &engines, &admission, &attempts) => outcome,
        };

        finish(&task, outcome)
    }
    .instrument(span)
    .await
}

fn finish(task: &PageTask, outcome: PageOutcome) -> PageResult {
    let mut result = PageResult::from_outcome(task.index, outcome);

    if result.succeeded() {
        debug!(state = ?PageState::Succeeded, method = ?result.method, confidence = result.confidence);
        if !task.config.keywords.is_empty() {
            result.keywords = Some(extract_keywords(
                &result.text,
                &task.config.keywords,
                task.config.keyword_threshold,
            ));
        }
    } else {
        warn!(
            state = ?PageState::Failed,
            error = result.error.as_deref().unwrap_or_default(),
            "page failed"
        );
    }

    result
}

async fn admit_and_drive(
    task: &PageTask,
    engines: &Engines,
    admission: &Admission,
    attempts: &AtomicU32,
) -> PageOutcome {
    let Ok(_document_slot) = admission.document_slots.acquire().await else {
        return PageOutcome::Failed {
            error: PageError::Cancelled,
            attempts: 0,
        };
    };
    let Ok(_worker) = admission.pool.acquire().await else {
        return PageOutcome::Failed {
            error: PageError::Cancelled,
            attempts: 0,
        };
    };

    // Time spent queued for a worker does not count against the budget.
    let budget = task.config.page_timeout;
    match tokio::time::timeout(budget, drive(task, engines, attempts)).await {
        Ok(outcome) => outcome,
        Err(_) => PageOutcome::Failed {
            error: PageError::Timeout(budget),
            attempts: attempts.load(Ordering::SeqCst),
        },
    }
}

async fn drive(task: &PageTask, engines: &Engines, attempts: &AtomicU32) -> PageOutcome {
    debug!(state = ?PageState::Rendering);
    let renderer = engines.renderer(task.document.media_type());
    let document = task.document.clone();
    let index = task.index;
    let rendered = match tokio::task::spawn_blocking(move || renderer.render(&document, index)).await
    {
        Ok(Ok(page)) => page,
        Ok(Err(e)) => {
            return PageOutcome::Failed {
                error: PageError::Render(e),
                attempts: 0,
            }
        }
        Err(e) => {
            return PageOutcome::Failed {
                error: PageError::Worker(format!("renderer task failed: {}", e)),
                attempts: 0,
            }
        }
    };

    debug!(
        state = ?PageState::Classifying,
        native_chars = rendered.native_text.chars().count()
    );
    match TextClassifier::from_config(&task.config).classify(&rendered.native_text) {
        TextQuality::Sufficient => {
            debug!(state = ?PageState::NativeAccepted);
            return PageOutcome::Native {
                text: rendered.native_text,
            };
        }
        TextQuality::Insufficient(reason) => debug!(?reason, "native text insufficient"),
    }

    let ocr = engines.ocr();
    let max_attempts = task.config.ocr_retries.saturating_add(1);

    loop {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(state = ?PageState::OcrRunning { attempt });

        // Dropping this future on timeout or cancellation stops the engine.
        match ocr.recognize(&rendered.image, &task.config.languages).await {
            Ok(recognized) => {
                return PageOutcome::Ocr {
                    text: recognized.text,
                    confidence: recognized.confidence,
                    attempts: attempt,
                }
            }
            Err(e) if attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "OCR attempt failed, retrying");
            }
            Err(e) => {
                return PageOutcome::Failed {
                    error: PageError::Ocr {
                        source: e,
                        attempts: attempt,
                    },
                    attempts: attempt,
                }
            }
        }
    }
}
