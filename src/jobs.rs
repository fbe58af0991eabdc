//! Background extraction jobs
//!
//! Jobs live only in memory: an LRU bounded by entry count, like the
//! upload/status/result flow of a web front end. Nothing is persisted.

use crate::config::ExtractionConfig;
use crate::document::Document;
use crate::error::{Error, PageErrorKind, Result};
use crate::pipeline::{Cancellation, DocumentPipeline, DocumentResult, DocumentStatus};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use rmcp::schemars::JsonSchema;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Done,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Snapshot of a job for status queries
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub source: String,
    pub state: JobState,
    /// RFC 3339 timestamps
    pub submitted_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Document status once the job finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_status: Option<DocumentStatus>,
}

struct JobEntry {
    source: String,
    state: JobState,
    submitted_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    cancel: Cancellation,
    result: Option<DocumentResult>,
}

impl JobEntry {
    fn status(&self, job_id: &str) -> JobStatus {
        JobStatus {
            job_id: job_id.to_string(),
            source: self.source.clone(),
            state: self.state,
            submitted_at: self.submitted_at.to_rfc3339(),
            finished_at: self.finished_at.map(|t| t.to_rfc3339()),
            document_status: self.result.as_ref().map(|r| r.status),
        }
    }
}

/// In-memory registry of background extractions
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<Mutex<LruCache<String, JobEntry>>>,
    pipeline: DocumentPipeline,
}

impl JobRegistry {
    /// Keep at most `capacity` jobs; the least recently touched is evicted
    pub fn new(pipeline: DocumentPipeline, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            jobs: Arc::new(Mutex::new(LruCache::new(capacity))),
            pipeline,
        }
    }

    /// Start extracting in the background and return the job id.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, document: Document, config: ExtractionConfig) -> String {
        let cancel = Cancellation::new();
        let job_id = self.insert(document.name(), cancel.clone());

        let registry = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            registry.update(&id, |entry| entry.state = JobState::Processing);
            let result = registry
                .pipeline
                .extract_with_cancel(document, config, cancel.clone())
                .await;
            registry.complete(&id, result, cancel.is_cancelled());
        });

        job_id
    }

    fn insert(&self, source: &str, cancel: Cancellation) -> String {
        let mut jobs = self.jobs.lock();
        let job_id = loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !jobs.contains(&key) {
                break key;
            }
        };

        if let Some((evicted, entry)) = jobs.push(
            job_id.clone(),
            JobEntry {
                source: source.to_string(),
                state: JobState::Pending,
                submitted_at: Utc::now(),
                finished_at: None,
                cancel,
                result: None,
            },
        ) {
            if !entry.state.is_finished() {
                tracing::warn!(job_id = %evicted, "evicting unfinished job");
                entry.cancel.cancel();
            }
        }

        tracing::info!(job_id = %job_id, source, "job submitted");
        job_id
    }

    fn update<F: FnOnce(&mut JobEntry)>(&self, job_id: &str, f: F) {
        if let Some(entry) = self.jobs.lock().get_mut(job_id) {
            f(entry);
        }
    }

    /// A cancel that arrives after every page finished leaves the job `Done`
    fn complete(&self, job_id: &str, result: DocumentResult, cancel_requested: bool) {
        let interrupted = result
            .pages
            .iter()
            .any(|p| p.error_kind == Some(PageErrorKind::Cancelled))
            || (cancel_requested && result.pages.is_empty());
        let state = if interrupted {
            JobState::Cancelled
        } else if result.status == DocumentStatus::Failed {
            JobState::Failed
        } else {
            JobState::Done
        };
        tracing::info!(job_id, state = %state, "job finished");

        self.update(job_id, |entry| {
            entry.state = state;
            entry.finished_at = Some(Utc::now());
            entry.result = Some(result);
        });
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs
            .lock()
            .get(job_id)
            .map(|entry| entry.status(job_id))
            .ok_or_else(|| Error::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Result of a finished job
    pub fn result(&self, job_id: &str) -> Result<DocumentResult> {
        let mut jobs = self.jobs.lock();
        let entry = jobs.get(job_id).ok_or_else(|| Error::JobNotFound {
            job_id: job_id.to_string(),
        })?;
        entry.result.clone().ok_or_else(|| Error::JobNotFinished {
            job_id: job_id.to_string(),
            state: entry.state.to_string(),
        })
    }

    /// Request cancellation; finished jobs are left untouched
    pub fn cancel(&self, job_id: &str) -> Result<JobStatus> {
        let mut jobs = self.jobs.lock();
        let entry = jobs.get_mut(job_id).ok_or_else(|| Error::JobNotFound {
            job_id: job_id.to_string(),
        })?;
        if !entry.state.is_finished() {
            entry.cancel.cancel();
            tracing::info!(job_id, "job cancellation requested");
        }
        Ok(entry.status(job_id))
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MediaType;
    use async_trait::async_trait;
    use crate::ocr::{OcrEngine, OcrError, Recognized};
    use crate::pipeline::{Engines, WorkerPool};
    use crate::render::{PageRenderer, RenderError, RenderedPage};
    use image::DynamicImage;
    use std::time::Duration;

    struct SlowRenderer {
        delay: Duration,
    }

    impl PageRenderer for SlowRenderer {
        fn page_count(&self, _document: &Document) -> Result<u32> {
            Ok(3)
        }

        fn render(
            &self,
            _document: &Document,
            index: u32,
        ) -> std::result::Result<RenderedPage, RenderError> {
            std::thread::sleep(self.delay);
            Ok(RenderedPage {
                image: DynamicImage::new_luma8(4, 4),
                native_text: format!("Page {} of the quarterly report, section totals", index),
            })
        }
    }

    struct NoOcr;

    #[async_trait]
    impl OcrEngine for NoOcr {
        async fn recognize(
            &self,
            _image: &DynamicImage,
            _languages: &[String],
        ) -> std::result::Result<Recognized, OcrError> {
            Err(OcrError::Launch("not installed".to_string()))
        }
    }

    fn registry(delay: Duration, capacity: usize) -> JobRegistry {
        let renderer = Arc::new(SlowRenderer { delay });
        let engines = Arc::new(Engines::new(renderer.clone(), renderer, Arc::new(NoOcr)));
        JobRegistry::new(DocumentPipeline::new(engines, WorkerPool::new(1)), capacity)
    }

    fn document() -> Document {
        Document::new("report.pdf", MediaType::Pdf, b"%PDF-1.7".to_vec())
    }

    async fn wait_finished(jobs: &JobRegistry, job_id: &str) -> JobStatus {
        for _ in 0..500 {
            let status = jobs.status(job_id).unwrap();
            if status.state.is_finished() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    #[tokio::test]
    async fn test_job_runs_to_done() {
        let jobs = registry(Duration::ZERO, 10);
        let job_id = jobs.submit(document(), ExtractionConfig::default());

        let status = wait_finished(&jobs, &job_id).await;
        assert_eq!(status.state, JobState::Done);
        assert_eq!(status.document_status, Some(DocumentStatus::Complete));
        assert!(status.finished_at.is_some());

        let result = jobs.result(&job_id).unwrap();
        assert_eq!(result.page_count, 3);
        assert_eq!(result.source, "report.pdf");
    }

    #[tokio::test]
    async fn test_result_before_finish() {
        let jobs = registry(Duration::from_millis(200), 10);
        let job_id = jobs.submit(document(), ExtractionConfig::default());

        let err = jobs.result(&job_id).unwrap_err();
        assert!(matches!(err, Error::JobNotFinished { .. }));
        jobs.cancel(&job_id).unwrap();
    }

    #[tokio::test]
    async fn test_cancel_fails_outstanding_pages() {
        let jobs = registry(Duration::from_millis(300), 10);
        let job_id = jobs.submit(document(), ExtractionConfig::default());

        tokio::time::sleep(Duration::from_millis(20)).await;
        jobs.cancel(&job_id).unwrap();

        let status = wait_finished(&jobs, &job_id).await;
        assert_eq!(status.state, JobState::Cancelled);

        let result = jobs.result(&job_id).unwrap();
        assert_eq!(result.status, DocumentStatus::Failed);
        assert!(result
            .pages
            .iter()
            .all(|p| p.error_kind == Some(PageErrorKind::Cancelled)));
    }

    #[tokio::test]
    async fn test_late_cancel_keeps_completed_job_done() {
        let jobs = registry(Duration::ZERO, 10);
        let cancel = Cancellation::new();
        let job_id = jobs.insert("report.pdf", cancel.clone());

        let result = jobs
            .pipeline
            .extract_with_cancel(document(), ExtractionConfig::default(), cancel.clone())
            .await;
        cancel.cancel();
        jobs.complete(&job_id, result, cancel.is_cancelled());

        let status = jobs.status(&job_id).unwrap();
        assert_eq!(status.state, JobState::Done);
        assert_eq!(status.document_status, Some(DocumentStatus::Complete));
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch_is_cancelled() {
        let jobs = registry(Duration::ZERO, 10);
        let cancel = Cancellation::new();
        let job_id = jobs.insert("report.pdf", cancel.clone());
        cancel.cancel();

        let result = jobs
            .pipeline
            .extract_with_cancel(document(), ExtractionConfig::default(), cancel.clone())
            .await;
        jobs.complete(&job_id, result, cancel.is_cancelled());

        assert_eq!(jobs.status(&job_id).unwrap().state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let jobs = registry(Duration::ZERO, 10);
        assert!(matches!(jobs.status("nope"), Err(Error::JobNotFound { .. })));
        assert!(matches!(jobs.result("nope"), Err(Error::JobNotFound { .. })));
        assert!(matches!(jobs.cancel("nope"), Err(Error::JobNotFound { .. })));
    }

    #[tokio::test]
    async fn test_oldest_job_evicted() {
        let jobs = registry(Duration::ZERO, 1);
        let first = jobs.submit(document(), ExtractionConfig::default());
        let second = jobs.submit(document(), ExtractionConfig::default());

        assert_eq!(jobs.len(), 1);
        assert!(matches!(jobs.status(&first), Err(Error::JobNotFound { .. })));
        wait_finished(&jobs, &second).await;
    }

    #[test]
    fn test_status_json_shape() {
        let status = JobStatus {
            job_id: "abc".to_string(),
            source: "report.pdf".to_string(),
            state: JobState::Processing,
            submitted_at: "2024-01-01T00:00:00+00:00".to_string(),
            finished_at: None,
            document_status: None,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["jobId"], "abc");
        assert_eq!(json["state"], "processing");
        assert!(json.get("finishedAt").is_none());
    }
}
