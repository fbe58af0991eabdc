//! Document Text Extraction Library
//!
//! Extracts text from PDFs and raster images page by page. Each page uses
//! its embedded text when that text is usable and falls back to OCR
//! otherwise; pages run in parallel on a bounded worker pool and a failure
//! on one page never discards the others.
//!
//! The crate is served as an MCP server with these tools:
//! - `extract_document`: Extract one or more documents and wait for the result
//! - `submit_extraction`: Start a background extraction job
//! - `extraction_status` / `extraction_result`: Poll a job and fetch its result
//! - `cancel_extraction`: Cancel a running job

pub mod classify;
pub mod config;
pub mod document;
pub mod error;
pub mod jobs;
pub mod keywords;
pub mod ocr;
pub mod pipeline;
pub mod render;
pub mod server;
pub mod source;

pub use config::{ExtractionConfig, ExtractionOptions, ServerConfig};
pub use document::{Document, MediaType};
pub use error::{Error, PageError, Result};
pub use jobs::{JobRegistry, JobState, JobStatus};
pub use pipeline::{
    Cancellation, DocumentPipeline, DocumentResult, DocumentStatus, Engines, ExtractionMethod,
    PageResult, WorkerPool, PAGE_BOUNDARY,
};
pub use server::{
    run_server, run_server_with_config, DocumentSource, ExtractDocumentParams, ExtractionServer,
};
