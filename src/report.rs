//! Report downloads: the backend-rendered PDF and the CSV exports that come
//! back with an upload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_DISPOSITION;

use crate::client::ApiClient;
use crate::config::ResolvedConfig;
use crate::error::AnalysisError;
use crate::models::{AnalysisResult, DetailBody};

pub const DEFAULT_REPORT_FILENAME: &str = "bank_statement_report.pdf";

const REPORT_PATH: &str = "/api/generate-report/";

/// A downloaded PDF report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Report {
    /// Write the report into `dir` under its own file name.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        let name = safe_file_name(&self.filename).unwrap_or(DEFAULT_REPORT_FILENAME);
        let path = dir.join(name);
        self.save_as(&path)?;
        Ok(path)
    }

    pub fn save_as(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, &self.bytes)
            .with_context(|| format!("Failed to write report: {}", path.display()))
    }
}

/// File name from a `Content-Disposition` header.
///
/// Accepts `filename="report.pdf"` and the unquoted `filename=report.pdf`.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .filter_map(|param| {
            let (key, value) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("filename")
                .then(|| value.trim())
        })
        .map(|value| {
            value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value)
                .to_string()
        })
        .find(|name| !name.is_empty())
}

/// Last path component of a backend-supplied name, or `None` if nothing
/// usable is left.
fn safe_file_name(name: &str) -> Option<&str> {
    let name = name.rsplit(['/', '\\']).next()?.trim();
    (!name.is_empty() && name != "." && name != "..").then_some(name)
}

/// Write the CSV exports returned with an upload into `dir`.
///
/// Names are reduced to their final path component, so an export can never
/// land outside `dir`. Returns the written paths in name order.
pub fn write_csv_exports(dir: &Path, exports: &BTreeMap<String, String>) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let mut written = Vec::with_capacity(exports.len());
    for (name, contents) in exports {
        let Some(file_name) = safe_file_name(name) else {
            tracing::warn!(name = %name, "Skipping CSV export with unusable name");
            continue;
        };
        let path = dir.join(file_name);
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write CSV export: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Wrote CSV export");
        written.push(path);
    }
    Ok(written)
}

/// Client for `POST /api/generate-report/`.
pub struct ReportClient {
    client: ApiClient,
    timeout: Duration,
}

impl ReportClient {
    pub fn new(client: ApiClient, config: &ResolvedConfig) -> Self {
        Self {
            client,
            timeout: config.timeouts.report,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the backend to render a PDF report for `result`.
    pub async fn generate(&self, result: &AnalysisResult) -> Result<Report, AnalysisError> {
        let url = self.client.url(REPORT_PATH);
        let timeout = self.timeout;
        tracing::info!(
            transactions = result.transactions.len(),
            "Requesting PDF report"
        );

        let response = self
            .client
            .send(|http| http.post(&url).timeout(timeout).json(result))
            .await
            .map_err(|e| AnalysisError::from_transport(&e))?;

        let status = response.status();
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(content_disposition_filename)
            .unwrap_or_else(|| DEFAULT_REPORT_FILENAME.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::from_transport(&e))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<DetailBody>(&body)
                .ok()
                .and_then(|b| b.message())
                .unwrap_or_else(|| "Failed to generate PDF report. Please try again.".to_string());
            tracing::warn!(status = status.as_u16(), error = %message, "Report generation failed");
            return Err(AnalysisError::ServerError {
                status: Some(status.as_u16()),
                message,
            });
        }

        tracing::info!(filename = %filename, size = body.len(), "Report downloaded");
        Ok(Report {
            filename,
            bytes: body.to_vec(),
        })
    }
}
