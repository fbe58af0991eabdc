//! Error types for the extraction service
//!
//! [`Error`] covers everything that can stop a request before or outside the
//! page workers. Failures inside a single page are carried by [`PageError`]
//! and end up in that page's result instead of being returned.

use crate::ocr::OcrError;
use crate::render::RenderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for the extraction service
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the extraction service
#[derive(Error, Debug)]
pub enum Error {
    /// Document file not found
    #[error("Document not found: {path}")]
    DocumentNotFound { path: String },

    /// Content is neither a PDF nor a decodable raster image
    #[error("Unsupported media type for {name}")]
    UnsupportedMediaType { name: String },

    /// Document cannot be parsed at all
    #[error("Document could not be opened: {reason}")]
    DocumentOpen { reason: String },

    /// Document exceeds the configured size limit
    #[error("Document too large: {size} bytes (max: {max_size} bytes)")]
    DocumentTooLarge { size: u64, max_size: u64 },

    /// Path access denied (outside allowed resource directories)
    #[error("Path access denied: {path}")]
    PathAccessDenied { path: String },

    /// A renderer or OCR engine could not be initialised
    #[error("Engine unavailable: {reason}")]
    EngineUnavailable { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    /// Unknown extraction job
    #[error("Extraction job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// Job exists but has no result yet
    #[error("Extraction job {job_id} is still {state}")]
    JobNotFinished { job_id: String, state: String },

    /// Document was cancelled before its pages were dispatched
    #[error("Extraction cancelled")]
    Cancelled,

    /// Blocking task could not be joined
    #[error("Task join error: {reason}")]
    TaskJoin { reason: String },

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Return a sanitized error message safe to send to clients.
    /// Internal details (paths, library errors, file sizes) are omitted.
    /// Full details should be logged via tracing before calling this.
    pub fn client_message(&self) -> String {
        match self {
            Error::DocumentNotFound { .. } => "Document not found".to_string(),
            Error::UnsupportedMediaType { .. } => {
                "Unsupported document type (expected PDF or image)".to_string()
            }
            Error::DocumentOpen { .. } => "Document could not be opened".to_string(),
            Error::DocumentTooLarge { max_size, .. } => {
                format!("Document exceeds maximum size of {} bytes", max_size)
            }
            Error::PathAccessDenied { .. } => "Access denied".to_string(),
            Error::EngineUnavailable { .. } => "Extraction engine unavailable".to_string(),
            Error::InvalidConfig { key, reason } => {
                format!("Invalid option {}: {}", key, reason)
            }
            Error::JobNotFound { .. } => "Extraction job not found".to_string(),
            Error::JobNotFinished { state, .. } => format!("Extraction job is still {}", state),
            Error::Cancelled => "Extraction cancelled".to_string(),
            Error::TaskJoin { .. } => "Internal processing error".to_string(),
            Error::Base64Decode(_) => "Invalid base64 data".to_string(),
            Error::Io(_) => "I/O error".to_string(),
            Error::Serialization(_) => "Serialization error".to_string(),
        }
    }
}

/// Page-fatal failure captured into a page result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("OCR failed after {attempts} attempt(s): {source}")]
    Ocr {
        #[source]
        source: OcrError,
        attempts: u32,
    },

    #[error("page exceeded its {:.1}s time budget", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("extraction cancelled")]
    Cancelled,

    /// The worker task itself died (panic inside an engine)
    #[error("page worker failed: {0}")]
    Worker(String),
}

/// Coarse classification of a [`PageError`], reported next to the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, rmcp::schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PageErrorKind {
    Render,
    Ocr,
    Timeout,
    Cancelled,
    Worker,
}

impl PageError {
    pub fn kind(&self) -> PageErrorKind {
        match self {
            PageError::Render(_) => PageErrorKind::Render,
            PageError::Ocr { .. } => PageErrorKind::Ocr,
            PageError::Timeout(_) => PageErrorKind::Timeout,
            PageError::Cancelled => PageErrorKind::Cancelled,
            PageError::Worker(_) => PageErrorKind::Worker,
        }
    }
}
