//! MCP Server implementation using rmcp

use crate::config::{ExtractionConfig, ExtractionOptions, ServerConfig};
use crate::document::Document;
use crate::jobs::JobRegistry;
use crate::ocr::TesseractEngine;
use crate::pipeline::{Cancellation, DocumentPipeline, DocumentResult, Engines, WorkerPool};
use crate::source::{resolve_base64, resolve_path, BASE64_SOURCE_NAME};
use anyhow::Result;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, service::RequestContext, tool, tool_handler, tool_router, RoleServer,
    ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Where a document comes from
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum DocumentSource {
    /// File path (absolute or relative)
    Path {
        /// Path to a PDF or image file
        path: String,
    },
    /// Base64 encoded document
    Base64 {
        /// Base64 encoded PDF or image content
        base64: String,
        /// Display name for the upload
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl<'de> serde::Deserialize<'de> for DocumentSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with \"path\" or \"base64\", but got {}",
                match &value {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    _ => "unknown type",
                }
            )));
        };

        if let Some(v) = obj.get("path") {
            return match v.as_str() {
                Some(s) => Ok(DocumentSource::Path {
                    path: s.to_string(),
                }),
                None => Err(serde::de::Error::custom("\"path\" must be a string")),
            };
        }
        if let Some(v) = obj.get("base64") {
            let Some(s) = v.as_str() else {
                return Err(serde::de::Error::custom("\"base64\" must be a string"));
            };
            let name = match obj.get("name") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(n)) => Some(n.clone()),
                Some(_) => return Err(serde::de::Error::custom("\"name\" must be a string")),
            };
            return Ok(DocumentSource::Base64 {
                base64: s.to_string(),
                name,
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with \"path\" or \"base64\", but got keys: {:?}",
            keys
        )))
    }
}

// ============================================================================
// Tool parameters
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExtractDocumentParams {
    /// Documents to extract
    pub sources: Vec<DocumentSource>,
    /// Overrides for the server's extraction defaults
    #[serde(default)]
    pub options: Option<ExtractionOptions>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SubmitExtractionParams {
    /// Document to extract in the background
    pub source: DocumentSource,
    /// Overrides for the server's extraction defaults
    #[serde(default)]
    pub options: Option<ExtractionOptions>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct JobParams {
    /// Job id returned by submit_extraction
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SubmitExtractionResult {
    pub job_id: Option<String>,
    pub source: String,
    pub error: Option<String>,
}

/// Document extraction MCP server
#[derive(Clone)]
pub struct ExtractionServer {
    pipeline: DocumentPipeline,
    jobs: JobRegistry,
    tool_router: ToolRouter<Self>,
    config: Arc<ServerConfig>,
    defaults: Arc<ExtractionConfig>,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl ExtractionServer {
    /// Create a server over an existing pipeline
    pub fn new(pipeline: DocumentPipeline, config: ServerConfig, defaults: ExtractionConfig) -> Self {
        let jobs = JobRegistry::new(pipeline.clone(), config.max_jobs);
        Self {
            pipeline,
            jobs,
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            defaults: Arc::new(defaults),
        }
    }

    /// Create a server with PDFium, the image decoder and tesseract
    pub fn with_config(config: ServerConfig, defaults: ExtractionConfig) -> Self {
        let engines = Arc::new(Engines::production(&config, &defaults));
        let pipeline = DocumentPipeline::new(engines, WorkerPool::new(config.worker_pool_size));
        Self::new(pipeline, config, defaults)
    }

    /// Extract text from documents, waiting for the result
    #[tool(
        description = "Extract text from PDF or image documents. Each page uses its embedded text when it is usable and falls back to OCR otherwise. Returns per-page results (index, method, confidence, text, error) and the aggregated text.

Source format: each element must be one of {\"path\": \"/absolute/path.pdf\"} or {\"base64\": \"...\", \"name\": \"scan.png\"}"
    )]
    async fn extract_document(
        &self,
        Parameters(params): Parameters<ExtractDocumentParams>,
        context: RequestContext<RoleServer>,
    ) -> String {
        self.extract_response(params, context.ct.cancelled()).await
    }

    /// Start a background extraction
    #[tool(
        description = "Start extracting a document in the background. Returns a job id for extraction_status, extraction_result and cancel_extraction.

Source format: {\"path\": \"/absolute/path.pdf\"} or {\"base64\": \"...\", \"name\": \"scan.png\"}"
    )]
    async fn submit_extraction(
        &self,
        Parameters(params): Parameters<SubmitExtractionParams>,
    ) -> String {
        let result = self
            .request_config(params.options.as_ref())
            .and_then(|config| {
                let document = self.resolve_source(&params.source)?;
                Ok(self.jobs.submit(document, config))
            });

        let response = match result {
            Ok(job_id) => SubmitExtractionResult {
                job_id: Some(job_id),
                source: Self::source_name(&params.source),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "submit_extraction failed");
                SubmitExtractionResult {
                    job_id: None,
                    source: Self::source_name(&params.source),
                    error: Some(e.client_message()),
                }
            }
        };
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Report a job's state
    #[tool(description = "Get the state of a background extraction: pending, processing, done, failed or cancelled.")]
    async fn extraction_status(&self, Parameters(params): Parameters<JobParams>) -> String {
        to_response(self.jobs.status(&params.job_id))
    }

    /// Fetch a finished job's result
    #[tool(description = "Get the result of a finished background extraction.")]
    async fn extraction_result(&self, Parameters(params): Parameters<JobParams>) -> String {
        to_response(self.jobs.result(&params.job_id))
    }

    /// Cancel a running job
    #[tool(
        description = "Cancel a background extraction. Pages still queued or running are reported as failed with a cancellation error."
    )]
    async fn cancel_extraction(&self, Parameters(params): Parameters<JobParams>) -> String {
        to_response(self.jobs.cancel(&params.job_id))
    }
}

impl ExtractionServer {
    fn source_name(source: &DocumentSource) -> String {
        match source {
            DocumentSource::Path { path } => path.clone(),
            DocumentSource::Base64 { name, .. } => name
                .clone()
                .unwrap_or_else(|| BASE64_SOURCE_NAME.to_string()),
        }
    }

    fn request_config(
        &self,
        options: Option<&ExtractionOptions>,
    ) -> crate::error::Result<ExtractionConfig> {
        match options {
            Some(options) => options.apply(&self.defaults),
            None => Ok((*self.defaults).clone()),
        }
    }

    fn resolve_source(&self, source: &DocumentSource) -> crate::error::Result<Document> {
        let max_bytes = self.config.max_document_bytes;
        match source {
            DocumentSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path, max_bytes)
            }
            DocumentSource::Base64 { base64, name } => {
                resolve_base64(base64, name.as_deref(), max_bytes)
            }
        }
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| {
            crate::error::Error::PathAccessDenied {
                path: path.to_string(),
            }
        })?;

        for dir in &self.config.resource_dirs {
            if let Ok(canonical_dir) = std::fs::canonicalize(dir) {
                if canonical.starts_with(&canonical_dir) {
                    return Ok(canonical);
                }
            }
        }

        Err(crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        })
    }

    async fn extract_response(
        &self,
        params: ExtractDocumentParams,
        request_cancelled: impl Future<Output = ()>,
    ) -> String {
        let config = match self.request_config(params.options.as_ref()) {
            Ok(config) => config,
            Err(e) => return error_response(&e),
        };

        let results = self
            .extract_sources(params.sources, config, request_cancelled)
            .await;

        let response = serde_json::json!({ "results": results });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Extract every source side by side; the shared worker pool bounds the
    /// work. Once `request_cancelled` resolves, every document still running
    /// is cancelled. Dropping the returned future aborts them all.
    async fn extract_sources(
        &self,
        sources: Vec<DocumentSource>,
        config: ExtractionConfig,
        request_cancelled: impl Future<Output = ()>,
    ) -> Vec<DocumentResult> {
        let names: Vec<String> = sources.iter().map(Self::source_name).collect();
        let mut cancels = Vec::with_capacity(sources.len());
        let mut tasks = JoinSet::new();
        for (position, source) in sources.into_iter().enumerate() {
            let cancel = Cancellation::new();
            cancels.push(cancel.clone());
            let server = self.clone();
            let config = config.clone();
            tasks.spawn(async move {
                (position, server.process_source(&source, config, cancel).await)
            });
        }

        tokio::pin!(request_cancelled);
        let mut cancel_sent = false;
        let mut collected: BTreeMap<usize, DocumentResult> = BTreeMap::new();
        loop {
            tokio::select! {
                _ = &mut request_cancelled, if !cancel_sent => {
                    tracing::info!(documents = cancels.len(), "request cancelled, stopping extraction");
                    cancels.iter().for_each(Cancellation::cancel);
                    cancel_sent = true;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok((position, result))) => {
                        collected.insert(position, result);
                    }
                    Some(Err(e)) => tracing::warn!(error = %e, "extraction task failed"),
                    None => break,
                },
            }
        }

        names
            .into_iter()
            .enumerate()
            .map(|(position, name)| {
                collected.remove(&position).unwrap_or_else(|| {
                    DocumentResult::open_failed(name, None, "Internal processing error".to_string())
                })
            })
            .collect()
    }

    async fn process_source(
        &self,
        source: &DocumentSource,
        config: ExtractionConfig,
        cancel: Cancellation,
    ) -> DocumentResult {
        match self.resolve_source(source) {
            Ok(document) => {
                self.pipeline
                    .extract_with_cancel(document, config, cancel)
                    .await
            }
            Err(e) => {
                tracing::warn!(source = %Self::source_name(source), error = %e, "source rejected");
                DocumentResult::open_failed(Self::source_name(source), None, e.client_message())
            }
        }
    }
}

fn to_response<T: Serialize>(result: crate::error::Result<T>) -> String {
    match result {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_default(),
        Err(e) => error_response(&e),
    }
}

fn error_response(error: &crate::error::Error) -> String {
    tracing::warn!(error = %error, "request failed");
    let response = serde_json::json!({ "error": error.client_message() });
    serde_json::to_string_pretty(&response).unwrap_or_default()
}

#[tool_handler]
impl ServerHandler for ExtractionServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Extracts text from PDFs and images page by page, using embedded text where \
                 it is usable and OCR elsewhere. Use extract_document for small documents and \
                 submit_extraction for long ones."
                    .into(),
            ),
        }
    }
}

/// Run the MCP server with configuration read from the environment
pub async fn run_server() -> Result<()> {
    let config = ServerConfig::from_env()?;
    let defaults = ExtractionConfig::from_env()?;
    run_server_with_config(config, defaults).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig, defaults: ExtractionConfig) -> Result<()> {
    tracing::info!(
        workers = config.worker_pool_size,
        languages = ?defaults.languages,
        resource_dirs = ?config.resource_dirs,
        "configuration loaded"
    );
    if !TesseractEngine::new(config.tesseract_cmd.clone())
        .is_available()
        .await
    {
        tracing::warn!(
            command = %config.tesseract_cmd,
            "tesseract not found, pages without usable text will fail"
        );
    }
    let server = ExtractionServer::with_config(config, defaults);

    tracing::info!("Extraction server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}
