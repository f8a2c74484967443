//! Periodic screen captures uploaded while a tracking session runs.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::backend::TimesheetBackend;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const DEFAULT_SCREENSHOT_INTERVAL_SECS: u64 = 30;

/// Screen capture hook supplied by the desktop shell.
pub trait ScreenshotSource: Send + Sync {
    /// PNG-encoded capture of the primary display.
    fn capture_png(&self) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub(crate) struct ScreenshotUploads {
    pub source: Arc<dyn ScreenshotSource>,
    pub backend: Arc<dyn TimesheetBackend>,
    pub interval: Duration,
}

impl ScreenshotUploads {
    /// Detached; `cancel` is the only way to end it early.
    pub(crate) fn spawn(&self, cancel: CancellationToken) {
        tokio::spawn(run_worker(self.clone(), cancel));
    }
}

/// Captures right away, then once per interval. The first failed capture or
/// upload ends the worker for the rest of the session.
async fn run_worker(uploads: ScreenshotUploads, cancel: CancellationToken) {
    log_debug!("screenshot worker started");

    loop {
        let outcome = tokio::select! {
            outcome = capture_and_upload(&uploads) => outcome,
            _ = cancel.cancelled() => break,
        };

        if let Err(err) = outcome {
            log_warn!("screenshot worker stopping: {err:#}");
            break;
        }

        tokio::select! {
            _ = time::sleep(uploads.interval) => {}
            _ = cancel.cancelled() => break,
        }
    }

    log_debug!("screenshot worker finished");
}

async fn capture_and_upload(uploads: &ScreenshotUploads) -> Result<()> {
    let source = uploads.source.clone();
    let png = tokio::task::spawn_blocking(move || source.capture_png())
        .await
        .context("screen capture task failed")?
        .context("screen capture failed")?;

    let file_name = format!("shot_{}.png", Utc::now().timestamp_millis());
    uploads
        .backend
        .upload_screenshot(png, file_name)
        .await
        .context("screenshot upload failed")
}
