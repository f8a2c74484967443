//! Remote system of record for timesheets and usage telemetry.

mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{TimesheetList, UsageSample};

pub use http::HttpBackend;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The server rejected the credentials (401/403), or none were attached.
    #[error("not signed in{}", format_detail(.detail))]
    Unauthorized { detail: Option<String> },
    #[error("resource not found{}", format_detail(.detail))]
    NotFound { detail: Option<String> },
    #[error("backend responded with status {status}{}", format_detail(.detail))]
    Status { status: u16, detail: Option<String> },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

fn format_detail(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|detail| format!(": {detail}"))
        .unwrap_or_default()
}

impl BackendError {
    /// Human-readable message supplied by the server, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            BackendError::Unauthorized { detail }
            | BackendError::NotFound { detail }
            | BackendError::Status { detail, .. } => detail.as_deref(),
            BackendError::Transport(_) | BackendError::Decode(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound { .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BackendError::Unauthorized { .. })
    }
}

/// Timesheet and telemetry operations the tracking engine relies on.
/// Credentials are attached by the implementation.
#[async_trait]
pub trait TimesheetBackend: Send + Sync {
    async fn open_timesheet(&self) -> Result<(), BackendError>;

    async fn close_timesheet(&self) -> Result<(), BackendError>;

    /// An empty list (including a 404 from the server) means nothing is active.
    async fn get_current_timesheet(&self) -> Result<TimesheetList, BackendError>;

    async fn buffer_usage(&self, sample: &UsageSample) -> Result<(), BackendError>;

    async fn sync(&self) -> Result<(), BackendError>;

    /// Uploads one PNG screen capture taken while tracking.
    async fn upload_screenshot(&self, png: Vec<u8>, file_name: String) -> Result<(), BackendError>;
}
