//! Error taxonomy for the two user-visible failure sources: fetch and export
//!
//! Extraction, filtering, aggregation and pagination never fail; they degrade
//! to empty or neutral values instead.

use thiserror::Error;

/// Failure reported by the backend collaborator
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("backend unreachable: {0}")]
    Network(String),

    #[error("response body could not be decoded: {0}")]
    Decode(String),
}

/// User-facing classification of a fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchFailureKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Client,
    Server,
    Network,
}

impl FetchFailureKind {
    /// Single notification message per class
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchFailureKind::Unauthorized => "Your session has expired. Please sign in again.",
            FetchFailureKind::Forbidden => "You do not have permission to view this report.",
            FetchFailureKind::NotFound => "The requested report could not be found.",
            FetchFailureKind::Client => "The report request was rejected. Check the filters and try again.",
            FetchFailureKind::Server => "The server failed to produce the report. Please try again later.",
            FetchFailureKind::Network => "Unable to reach the server. Check your connection and try again.",
        }
    }
}

impl std::fmt::Display for FetchFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchFailureKind::Unauthorized => write!(f, "unauthorized"),
            FetchFailureKind::Forbidden => write!(f, "forbidden"),
            FetchFailureKind::NotFound => write!(f, "not found"),
            FetchFailureKind::Client => write!(f, "client error"),
            FetchFailureKind::Server => write!(f, "server error"),
            FetchFailureKind::Network => write!(f, "network error"),
        }
    }
}

impl FetchError {
    pub fn kind(&self) -> FetchFailureKind {
        match self {
            FetchError::Status { status, .. } => match status {
                401 => FetchFailureKind::Unauthorized,
                403 => FetchFailureKind::Forbidden,
                404 => FetchFailureKind::NotFound,
                400..=499 => FetchFailureKind::Client,
                _ => FetchFailureKind::Server,
            },
            FetchError::Timeout | FetchError::Network(_) => FetchFailureKind::Network,
            FetchError::Decode(_) => FetchFailureKind::Server,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Failure while producing or acting on an export artifact
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("rasterization failed: {0}")]
    Rasterize(String),

    #[error("document assembly failed: {0}")]
    Assemble(String),

    #[error("XLSX write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact handle {0} has been revoked")]
    HandleRevoked(String),

    #[error("nothing to export: report has no loaded data")]
    NoData,

    #[error("no document preview is open")]
    NoPreview,

    #[error("preview action failed: {0}")]
    Preview(String),
}

impl ExportError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ExportError::NoData => "Load the report before exporting.",
            ExportError::HandleRevoked(_) | ExportError::NoPreview => {
                "The preview is no longer available. Export again."
            }
            _ => "Export failed. Please try again.",
        }
    }
}
