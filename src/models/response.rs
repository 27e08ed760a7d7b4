//! Upload endpoint response shapes.
//!
//! The backend answers `POST /api/upload/` with one of three JSON bodies:
//!
//! - an error: `{ "error": "...", "error_type"?, "suggestions"?, "analysis"? }`
//! - an envelope: `{ "extracted": {..}, "metadata"?, "csv_exports"? }`
//! - a bare [`AnalysisResult`]
//!
//! [`UploadResponse::parse`] checks them in that order and returns which one
//! matched, so callers never have to probe for fields themselves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::analysis::{null_as_default, AnalysisResult};

/// Optional statement-level facts the backend reports next to the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expense_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<f64>,
    /// Anything else the backend chose to include.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Confidence details attached to `invalid_bank_statement` errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementCheck {
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub matched_keywords: Vec<String>,
}

/// Error body returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub analysis: Option<StatementCheck>,
}

/// Success envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Envelope {
    pub extracted: AnalysisResult,
    #[serde(default)]
    pub metadata: Option<ExtractionMetadata>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub csv_exports: BTreeMap<String, String>,
}

/// Which response shape the backend used.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadResponse {
    Error(ErrorBody),
    Envelope(Envelope),
    Bare(AnalysisResult),
}

impl UploadResponse {
    /// Parse a response body, trying the error shape, then the envelope,
    /// then a bare result.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let has = |key: &str| value.get(key).is_some_and(|v| !v.is_null());
        let is_error = has("error");
        let is_envelope = has("extracted");

        if is_error {
            return serde_json::from_value(value).map(UploadResponse::Error);
        }
        if is_envelope {
            return serde_json::from_value(value).map(UploadResponse::Envelope);
        }
        if !value.is_object() {
            return Err(serde::de::Error::custom(
                "expected a JSON object for the upload response",
            ));
        }
        serde_json::from_value(value).map(UploadResponse::Bare)
    }
}

/// Error body of the report endpoint and of generic HTTP failures.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DetailBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DetailBody {
    /// First human-readable message present in the body.
    pub fn message(&self) -> Option<String> {
        let detail = self.detail.as_ref().and_then(|d| match d {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        });
        detail
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .filter(|m| !m.trim().is_empty())
    }
}
