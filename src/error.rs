use std::fmt;

use reqwest::StatusCode;

use crate::models::{DetailBody, ErrorBody};

/// Backend-supplied text shown to the user alongside an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendMessage {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl BackendMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }
}

impl fmt::Display for BackendMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

fn mib(size: &u64) -> String {
    format!("{:.2} MB", *size as f64 / 1024.0 / 1024.0)
}

/// Why an upload (or report request) did not produce a result.
///
/// `InvalidFileType` and `FileTooLarge` are detected before any request is
/// made; every other variant comes from the transport or the backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Please upload a PDF file only (got {content_type})")]
    InvalidFileType { content_type: String },

    #[error("File is too large ({})", mib(.size))]
    FileTooLarge { size: u64 },

    #[error("Request timed out. Please try again with a smaller file.")]
    RequestTimedOut,

    #[error("{0}")]
    ServiceOverloaded(BackendMessage),

    #[error("{0}")]
    RateLimited(BackendMessage),

    #[error("{0}")]
    InvalidApiKey(BackendMessage),

    #[error("{error}")]
    InvalidBankStatement {
        error: BackendMessage,
        confidence: Option<f64>,
        matched_keywords: Vec<String>,
    },

    #[error("Server error: {message}")]
    ServerError { status: Option<u16>, message: String },

    #[error("Network error. Please check your connection and try again. ({0})")]
    NetworkError(String),

    #[error("{0}")]
    Unknown(BackendMessage),
}

impl AnalysisError {
    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidFileType { .. } => "invalid_file_type",
            AnalysisError::FileTooLarge { .. } => "file_too_large",
            AnalysisError::RequestTimedOut => "request_timed_out",
            AnalysisError::ServiceOverloaded(_) => "service_overloaded",
            AnalysisError::RateLimited(_) => "rate_limited",
            AnalysisError::InvalidApiKey(_) => "invalid_api_key",
            AnalysisError::InvalidBankStatement { .. } => "invalid_bank_statement",
            AnalysisError::ServerError { .. } => "server_error",
            AnalysisError::NetworkError(_) => "network_error",
            AnalysisError::Unknown(_) => "unknown",
        }
    }

    /// Whether the error was raised locally, without contacting the backend.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidFileType { .. } | AnalysisError::FileTooLarge { .. }
        )
    }

    /// Hints from the backend, for display only.
    pub fn suggestions(&self) -> &[String] {
        match self {
            AnalysisError::ServiceOverloaded(m)
            | AnalysisError::RateLimited(m)
            | AnalysisError::InvalidApiKey(m)
            | AnalysisError::Unknown(m)
            | AnalysisError::InvalidBankStatement { error: m, .. } => &m.suggestions,
            _ => &[],
        }
    }

    /// Translate a backend error body by its `error_type`.
    pub fn from_error_body(body: ErrorBody) -> Self {
        let message = BackendMessage {
            message: body.error,
            suggestions: body.suggestions,
        };
        match body.error_type.as_deref() {
            Some("service_overloaded") => AnalysisError::ServiceOverloaded(message),
            Some("rate_limited") => AnalysisError::RateLimited(message),
            Some("invalid_api_key") => AnalysisError::InvalidApiKey(message),
            Some("invalid_bank_statement") => {
                let check = body.analysis.unwrap_or_default();
                AnalysisError::InvalidBankStatement {
                    error: message,
                    confidence: check.confidence,
                    matched_keywords: check.matched_keywords,
                }
            }
            _ => AnalysisError::Unknown(message),
        }
    }

    /// Map a non-success status whose body carried no error indicator.
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let detail = serde_json::from_slice::<DetailBody>(body)
            .ok()
            .and_then(|b| b.message());

        match status {
            StatusCode::UNAUTHORIZED => AnalysisError::Unknown(BackendMessage::new(
                detail.unwrap_or_else(|| "Authentication required. Please sign in.".to_string()),
            )),
            StatusCode::FORBIDDEN => AnalysisError::Unknown(BackendMessage::new(
                detail.unwrap_or_else(|| {
                    "Access denied. You don't have permission to perform this action.".to_string()
                }),
            )),
            StatusCode::TOO_MANY_REQUESTS => AnalysisError::RateLimited(BackendMessage::new(
                detail.unwrap_or_else(|| "Too many requests. Please try again later.".to_string()),
            )),
            s if s.is_server_error() => AnalysisError::ServerError {
                status: Some(s.as_u16()),
                message: detail
                    .unwrap_or_else(|| "Internal server error. Please try again later.".to_string()),
            },
            s => AnalysisError::Unknown(BackendMessage::new(detail.unwrap_or_else(|| {
                format!("An unexpected error occurred (HTTP {}).", s.as_u16())
            }))),
        }
    }

    /// Classify a transport failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalysisError::RequestTimedOut
        } else if err.is_connect() || err.is_request() {
            AnalysisError::NetworkError(err.to_string())
        } else if err.is_decode() || err.is_body() {
            AnalysisError::ServerError {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        } else {
            AnalysisError::Unknown(BackendMessage::new(err.to_string()))
        }
    }
}
