//! Native background tracker: measures elapsed time, foreground application
//! and idle time independently of the UI's lifetime, and captures the screen
//! while a session runs.

mod desktop;
mod screenshot;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::UsageSample;

pub use desktop::{ActivityProbe, DesktopTracker};
pub use screenshot::{ScreenshotSource, DEFAULT_SCREENSHOT_INTERVAL_SECS};

#[async_trait]
pub trait NativeTracker: Send + Sync {
    /// Whether the tracking capability exists in this runtime at all.
    fn is_available(&self) -> bool;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Re-aligns the native clock after a restart so that it reports at least `elapsed` seconds.
    async fn resume(&self, elapsed: u64) -> Result<()>;

    /// `Ok(None)` means no new sample is ready yet.
    async fn tick_usage(&self) -> Result<Option<UsageSample>>;

    async fn get_elapsed(&self) -> Result<u64>;
}

/// Stand-in used when the process is not running inside the desktop shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableTracker;

#[async_trait]
impl NativeTracker for UnavailableTracker {
    fn is_available(&self) -> bool {
        false
    }

    async fn start(&self) -> Result<()> {
        bail!("native tracker is only available in the desktop app")
    }

    async fn stop(&self) -> Result<()> {
        bail!("native tracker is only available in the desktop app")
    }

    async fn resume(&self, _elapsed: u64) -> Result<()> {
        bail!("native tracker is only available in the desktop app")
    }

    async fn tick_usage(&self) -> Result<Option<UsageSample>> {
        bail!("native tracker is only available in the desktop app")
    }

    async fn get_elapsed(&self) -> Result<u64> {
        bail!("native tracker is only available in the desktop app")
    }
}
