//! OCR layer
//!
//! An [`OcrEngine`] turns a page raster into text plus a confidence score.
//! The production engine shells out to the `tesseract` CLI, one process per
//! call. Dropping a `recognize` future kills its process, so a page that times
//! out or is cancelled releases its CPU together with its worker slot.

mod tesseract;

pub use tesseract::{parse_tsv, TesseractEngine};

use async_trait::async_trait;
use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;

/// OCR output for one page
#[derive(Debug, Clone, PartialEq)]
pub struct Recognized {
    pub text: String,
    pub confidence: Confidence,
}

/// Normalized confidence in `[0, 1]`.
///
/// When the engine reports nothing usable the value is the
/// [`Confidence::UNVERIFIED_VALUE`] sentinel with `verified == false`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Confidence {
    value: f32,
    verified: bool,
}

impl Confidence {
    pub const UNVERIFIED_VALUE: f32 = 0.5;

    /// Engine-reported confidence, clamped into range
    pub fn reported(value: f32) -> Self {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        Self {
            value,
            verified: true,
        }
    }

    /// Engine-reported percentage (0-100)
    pub fn from_percent(percent: f32) -> Self {
        Self::reported(percent / 100.0)
    }

    pub fn unverified() -> Self {
        Self {
            value: Self::UNVERIFIED_VALUE,
            verified: false,
        }
    }

    /// Native text is taken as-is
    pub fn certain() -> Self {
        Self::reported(1.0)
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }
}

/// OCR invocation failure. Retried by the page worker.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    #[error("failed to launch OCR engine: {0}")]
    Launch(String),

    #[error("OCR engine crashed: {0}")]
    Crashed(String),

    #[error("unsupported OCR language: {0}")]
    UnsupportedLanguage(String),

    #[error("failed to encode page image: {0}")]
    Encode(String),

    #[error("unreadable OCR output: {0}")]
    Output(String),
}

/// OCR capability, awaited directly by the page worker
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(
        &self,
        image: &DynamicImage,
        languages: &[String],
    ) -> std::result::Result<Recognized, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(Confidence::reported(1.7).value(), 1.0);
        assert_eq!(Confidence::reported(-0.2).value(), 0.0);
        assert_eq!(Confidence::reported(f32::NAN).value(), 0.0);
        assert!((Confidence::from_percent(91.5).value() - 0.915).abs() < 1e-6);
    }

    #[test]
    fn test_unverified_sentinel() {
        let c = Confidence::unverified();
        assert_eq!(c.value(), 0.5);
        assert!(!c.is_verified());
        assert!(Confidence::certain().is_verified());
    }
}
