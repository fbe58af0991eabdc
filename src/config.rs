//! Extraction and server configuration
//!
//! Process-wide defaults are read once at startup from the environment (after
//! `.env` is loaded by the binary). Requests may override a subset of the
//! extraction options; see [`ExtractionOptions`].

use crate::error::{Error, Result};
use rmcp::schemars::JsonSchema;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Default OCR language
pub const DEFAULT_LANGUAGE: &str = "eng";
/// Trimmed native text shorter than this (in characters) is sent to OCR
pub const DEFAULT_MIN_TEXT_CHARS: usize = 20;
/// Native text with a larger share of non-alphanumeric characters is sent to OCR
pub const DEFAULT_MAX_SYMBOL_RATIO: f32 = 0.5;
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_OCR_RETRIES: u32 = 2;
pub const DEFAULT_RENDER_DPI: u32 = 150;
pub const DEFAULT_KEYWORD_THRESHOLD: u8 = 70;

/// Options controlling one document extraction
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Tesseract language codes, joined with `+` on invocation
    pub languages: Vec<String>,
    /// Minimum trimmed native-text length accepted without OCR
    pub min_text_chars: usize,
    /// Maximum share of non-alphanumeric characters in accepted native text
    pub max_symbol_ratio: f32,
    /// Maximum pages of this document in flight at once
    pub max_concurrent_pages: usize,
    /// Budget for one page from render to final OCR attempt
    pub page_timeout: Duration,
    /// OCR retries after the first failed attempt
    pub ocr_retries: u32,
    /// Raster resolution for rendered PDF pages
    pub render_dpi: u32,
    /// Field keywords matched against page lines (empty disables matching)
    pub keywords: Vec<String>,
    /// Fuzzy match score (0-100) a line needs to be reported for a keyword
    pub keyword_threshold: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            languages: vec![DEFAULT_LANGUAGE.to_string()],
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            max_symbol_ratio: DEFAULT_MAX_SYMBOL_RATIO,
            max_concurrent_pages: default_parallelism(),
            page_timeout: DEFAULT_PAGE_TIMEOUT,
            ocr_retries: DEFAULT_OCR_RETRIES,
            render_dpi: DEFAULT_RENDER_DPI,
            keywords: Vec::new(),
            keyword_threshold: DEFAULT_KEYWORD_THRESHOLD,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ExtractionConfig {
    /// Load defaults from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load defaults through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("FILE_EXTRACTION_LANGUAGES") {
            config.languages = split_list(&raw, ',');
        }
        if let Some(v) = parse_var(&lookup, "FILE_EXTRACTION_MIN_TEXT_CHARS")? {
            config.min_text_chars = v;
        }
        if let Some(v) = parse_var(&lookup, "FILE_EXTRACTION_MAX_SYMBOL_RATIO")? {
            config.max_symbol_ratio = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_WORKERS")? {
            config.max_concurrent_pages = v;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "FILE_EXTRACTION_PAGE_TIMEOUT_SECS")? {
            config.page_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var(&lookup, "FILE_EXTRACTION_OCR_RETRIES")? {
            config.ocr_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "FILE_EXTRACTION_RENDER_DPI")? {
            config.render_dpi = v;
        }
        if let Some(raw) = lookup("FILE_EXTRACTION_KEYWORDS") {
            config.keywords = split_list(&raw, '|');
        }
        if let Some(v) = parse_var(&lookup, "FILE_EXTRACTION_KEYWORD_THRESHOLD")? {
            config.keyword_threshold = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.languages.is_empty() {
            return Err(invalid("languages", "at least one language is required"));
        }
        if let Some(lang) = self.languages.iter().find(|l| !is_language_code(l)) {
            return Err(invalid("languages", &format!("unsupported language code {:?}", lang)));
        }
        if !(0.0..=1.0).contains(&self.max_symbol_ratio) {
            return Err(invalid("max_symbol_ratio", "must be between 0 and 1"));
        }
        if self.max_concurrent_pages == 0 {
            return Err(invalid("max_concurrent_pages", "must be at least 1"));
        }
        if self.page_timeout.is_zero() {
            return Err(invalid("page_timeout", "must be greater than zero"));
        }
        if !(36..=1200).contains(&self.render_dpi) {
            return Err(invalid("render_dpi", "must be between 36 and 1200"));
        }
        if self.keyword_threshold > 100 {
            return Err(invalid("keyword_threshold", "must be between 0 and 100"));
        }
        Ok(())
    }
}

/// Tesseract language pack names: `eng`, `chi_sim`, `script/Latin`
pub fn is_language_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
        && !code.starts_with('/')
        && !code.contains("..")
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(key, &e.to_string())),
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::InvalidConfig {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Per-request overrides merged onto the process-wide defaults
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ExtractionOptions {
    /// OCR languages (e.g. ["eng", "deu"])
    #[serde(default)]
    pub languages: Option<Vec<String>>,
    /// Minimum native text length (characters) before OCR is used instead
    #[serde(default)]
    pub min_text_chars: Option<usize>,
    /// Maximum share (0-1) of non-alphanumeric characters in native text
    #[serde(default)]
    pub max_symbol_ratio: Option<f32>,
    /// Maximum pages processed at once for this document
    #[serde(default)]
    pub max_concurrent_pages: Option<usize>,
    /// Per-page time budget in seconds
    #[serde(default)]
    pub page_timeout_secs: Option<u64>,
    /// OCR retries after a failed attempt
    #[serde(default)]
    pub ocr_retries: Option<u32>,
    /// Field keywords to look for on each page
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    /// Fuzzy match threshold for keywords (0-100)
    #[serde(default)]
    pub keyword_threshold: Option<u8>,
}

impl ExtractionOptions {
    /// Merge onto `base`, validating the result
    pub fn apply(&self, base: &ExtractionConfig) -> Result<ExtractionConfig> {
        let mut config = base.clone();
        if let Some(languages) = &self.languages {
            config.languages = languages.clone();
        }
        if let Some(v) = self.min_text_chars {
            config.min_text_chars = v;
        }
        if let Some(v) = self.max_symbol_ratio {
            config.max_symbol_ratio = v;
        }
        if let Some(v) = self.max_concurrent_pages {
            config.max_concurrent_pages = v;
        }
        if let Some(secs) = self.page_timeout_secs {
            config.page_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = self.ocr_retries {
            config.ocr_retries = v;
        }
        if let Some(keywords) = &self.keywords {
            config.keywords = keywords.clone();
        }
        if let Some(v) = self.keyword_threshold {
            config.keyword_threshold = v;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Serving-layer configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directories path sources must live under (empty allows any path)
    pub resource_dirs: Vec<String>,
    /// Maximum accepted document size in bytes (default: 100MB)
    pub max_document_bytes: u64,
    /// Finished jobs kept for status/result queries (default: 100)
    pub max_jobs: usize,
    /// Size of the page worker pool shared by all requests
    pub worker_pool_size: usize,
    /// OCR executable
    pub tesseract_cmd: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            resource_dirs: Vec::new(),
            max_document_bytes: 100 * 1024 * 1024, // 100MB
            max_jobs: 100,
            worker_pool_size: default_parallelism(),
            tesseract_cmd: "tesseract".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup("FILE_EXTRACTION_RESOURCE_DIRS") {
            config.resource_dirs = split_list(&raw, ',');
        }
        if let Some(v) = parse_var(&lookup, "FILE_EXTRACTION_MAX_DOCUMENT_BYTES")? {
            config.max_document_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "FILE_EXTRACTION_MAX_JOBS")? {
            config.max_jobs = v;
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "MAX_WORKERS")? {
            if v == 0 {
                return Err(invalid("MAX_WORKERS", "must be at least 1"));
            }
            config.worker_pool_size = v;
        }
        if let Some(cmd) = lookup("TESSERACT_CMD").filter(|c| !c.trim().is_empty()) {
            config.tesseract_cmd = cmd.trim().to_string();
        }
        Ok(config)
    }
}
