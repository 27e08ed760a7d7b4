//! Upload-and-analyze pipeline.
//!
//! Turns a statement file (plus optional PDF password) into an
//! [`Analysis`] or exactly one [`AnalysisError`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use crate::client::ApiClient;
use crate::config::ResolvedConfig;
use crate::error::AnalysisError;
use crate::models::{AnalysisResult, ExtractionMetadata, UploadResponse};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const UPLOAD_PATH: &str = "/api/upload/";

/// Guess a content type from a file name, the way a browser file picker
/// labels local files.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => PDF_CONTENT_TYPE,
        Some("txt") | Some("text") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// A statement selected for upload.
#[derive(Debug, Clone)]
pub struct StatementFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl StatementFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data,
        }
    }

    /// Read a file from disk, inferring its content type from the extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read statement: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "statement.pdf".to_string());
        let content_type = content_type_for(&file_name);
        Ok(Self::new(file_name, content_type, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn check(&self, max_size: u64) -> Result<(), AnalysisError> {
        if self.content_type != PDF_CONTENT_TYPE {
            return Err(AnalysisError::InvalidFileType {
                content_type: self.content_type.clone(),
            });
        }
        if self.size() > max_size {
            return Err(AnalysisError::FileTooLarge { size: self.size() });
        }
        Ok(())
    }

    fn form(&self, password: Option<&SecretString>) -> Form {
        let part = Part::bytes(self.data.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.content_type)
            .unwrap_or_else(|_| Part::bytes(self.data.clone()).file_name(self.file_name.clone()));
        let form = Form::new().part("file", part);
        match password {
            Some(p) if !p.expose_secret().is_empty() => {
                form.text("password", p.expose_secret().to_string())
            }
            _ => form,
        }
    }
}

/// A successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub metadata: Option<ExtractionMetadata>,
    /// Named CSV documents produced by the backend (e.g. `income.csv`).
    pub csv_exports: BTreeMap<String, String>,
}

impl From<UploadResponse> for Result<Analysis, AnalysisError> {
    fn from(response: UploadResponse) -> Self {
        match response {
            UploadResponse::Error(body) => Err(AnalysisError::from_error_body(body)),
            UploadResponse::Envelope(env) => Ok(Analysis {
                result: env.extracted,
                metadata: env.metadata,
                csv_exports: env.csv_exports,
            }),
            UploadResponse::Bare(result) => Ok(Analysis {
                result,
                metadata: None,
                csv_exports: BTreeMap::new(),
            }),
        }
    }
}

/// Where the most recent upload attempt stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadState {
    #[default]
    Idle,
    Uploading,
    Succeeded,
    Failed,
}

/// Runs uploads against one backend.
///
/// `analyze` takes `&mut self`, so a single analyzer never has two uploads
/// in flight.
pub struct Analyzer {
    client: ApiClient,
    timeout: Duration,
    max_file_size: u64,
    state: UploadState,
}

impl Analyzer {
    pub fn new(client: ApiClient, config: &ResolvedConfig) -> Self {
        Self {
            client,
            timeout: config.timeouts.upload,
            max_file_size: config.upload.max_file_size,
            state: UploadState::Idle,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_file_size(mut self, max_file_size: u64) -> Self {
        self.max_file_size = max_file_size;
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn is_uploading(&self) -> bool {
        self.state == UploadState::Uploading
    }

    /// Upload a statement and normalize the backend's answer.
    pub async fn analyze(
        &mut self,
        file: &StatementFile,
        password: Option<&SecretString>,
    ) -> Result<Analysis, AnalysisError> {
        if let Err(err) = file.check(self.max_file_size) {
            tracing::info!(file = %file.file_name, kind = err.kind(), "Statement rejected locally");
            self.state = UploadState::Failed;
            return Err(err);
        }

        self.state = UploadState::Uploading;
        let outcome = self.upload(file, password).await;
        self.state = if outcome.is_ok() {
            UploadState::Succeeded
        } else {
            UploadState::Failed
        };

        match &outcome {
            Ok(analysis) => tracing::info!(
                file = %file.file_name,
                income = analysis.result.transactions.income.len(),
                expenses = analysis.result.transactions.expenses.len(),
                "Statement analyzed"
            ),
            Err(err) => tracing::warn!(
                file = %file.file_name,
                kind = err.kind(),
                error = %err,
                "Statement analysis failed"
            ),
        }
        outcome
    }

    async fn upload(
        &self,
        file: &StatementFile,
        password: Option<&SecretString>,
    ) -> Result<Analysis, AnalysisError> {
        let url = self.client.url(UPLOAD_PATH);
        tracing::info!(
            file = %file.file_name,
            size = file.size(),
            has_password = password.is_some(),
            "Uploading statement"
        );

        let timeout = self.timeout;
        let response = self
            .client
            .send(|http| {
                http.post(&url)
                    .timeout(timeout)
                    .multipart(file.form(password))
            })
            .await
            .map_err(|e| AnalysisError::from_transport(&e))?;

        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(AnalysisError::FileTooLarge { size: file.size() });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::from_transport(&e))?;

        match UploadResponse::parse(&body) {
            // An explicit error indicator wins regardless of status.
            Ok(UploadResponse::Error(error)) => Err(AnalysisError::from_error_body(error)),
            _ if !status.is_success() => Err(AnalysisError::from_status(status, &body)),
            Ok(parsed) => parsed.into(),
            Err(err) => {
                tracing::debug!(error = %err, "Unparseable upload response");
                Err(AnalysisError::Unknown(crate::error::BackendMessage::new(
                    "Failed to analyze bank statement. Please try again.",
                )))
            }
        }
    }
}
