use thiserror::Error;

const START_FAILED: &str = "Failed to start tracking";
const STOP_FAILED: &str = "Failed to stop tracking";

/// Failures that reach the user. Everything else the engine logs and swallows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingError {
    #[error("Please sign in first")]
    NotSignedIn,
    #[error("Tracking works only in the desktop app")]
    DesktopOnly,
    #[error("{}", .detail.as_deref().unwrap_or(START_FAILED))]
    StartFailed { detail: Option<String> },
    #[error("{}", .detail.as_deref().unwrap_or(STOP_FAILED))]
    StopFailed { detail: Option<String> },
}

impl TrackingError {
    pub fn start_failed(detail: Option<&str>) -> Self {
        TrackingError::StartFailed {
            detail: detail.map(str::to_string),
        }
    }

    pub fn stop_failed(detail: Option<&str>) -> Self {
        TrackingError::StopFailed {
            detail: detail.map(str::to_string),
        }
    }

    /// Precondition failures leave the engine untouched.
    pub fn is_precondition(&self) -> bool {
        matches!(self, TrackingError::NotSignedIn | TrackingError::DesktopOnly)
    }

    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
