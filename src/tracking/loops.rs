use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{backend::TimesheetBackend, settings::TrackerSettings, tracker::NativeTracker};

use super::state::{Generation, SessionState};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const NATIVE_CALL_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopTimings {
    pub tick_interval: Duration,
    pub usage_poll_interval: Duration,
    pub auto_sync_interval: Duration,
    pub drift_check_every: u32,
    pub drift_threshold_secs: u64,
}

impl From<&TrackerSettings> for LoopTimings {
    fn from(settings: &TrackerSettings) -> Self {
        Self {
            tick_interval: settings.tick_interval(),
            usage_poll_interval: settings.usage_poll_interval(),
            auto_sync_interval: settings.auto_sync_interval(),
            drift_check_every: settings.drift_check_every(),
            drift_threshold_secs: settings.drift_threshold_secs,
        }
    }
}

/// What every loop of one tracking session shares.
pub(crate) struct LoopContext {
    pub generation: Generation,
    pub state: Arc<SessionState>,
    pub backend: Arc<dyn TimesheetBackend>,
    pub native: Arc<dyn NativeTracker>,
    pub cancel: CancellationToken,
}

/// The three periodic tasks of a running session.
pub(crate) struct SessionLoops {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SessionLoops {
    pub(crate) fn spawn(
        generation: Generation,
        state: Arc<SessionState>,
        backend: Arc<dyn TimesheetBackend>,
        native: Arc<dyn NativeTracker>,
        timings: LoopTimings,
    ) -> Self {
        let cancel = CancellationToken::new();
        let ctx = Arc::new(LoopContext {
            generation,
            state,
            backend,
            native,
            cancel: cancel.clone(),
        });

        let handles = vec![
            tokio::spawn(elapsed_ticker(
                ctx.clone(),
                timings.tick_interval,
                timings.drift_check_every,
                timings.drift_threshold_secs,
            )),
            tokio::spawn(usage_poll(ctx.clone(), timings.usage_poll_interval)),
            tokio::spawn(auto_sync(ctx, timings.auto_sync_interval)),
        ];

        Self { cancel, handles }
    }

    /// Cancels all three loops without waiting for them to unwind.
    pub(crate) fn cancel(self) {
        self.cancel.cancel();
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Interval whose first tick lands one full period from now.
fn periodic(period: Duration) -> Interval {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Adds a second per tick and periodically lets the native counter pull the
/// local one forward.
pub(crate) async fn elapsed_ticker(
    ctx: Arc<LoopContext>,
    period: Duration,
    drift_check_every: u32,
    drift_threshold_secs: u64,
) {
    let mut ticker = periodic(period);
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(elapsed) = ctx.state.tick(ctx.generation) else {
                    break;
                };

                ticks = ticks.wrapping_add(1);
                if ticks % drift_check_every == 0 {
                    let ctx = ctx.clone();
                    tokio::spawn(async move {
                        correct_drift(&ctx, elapsed, drift_threshold_secs).await;
                    });
                }
            }
            _ = ctx.cancel.cancelled() => {
                log_debug!("elapsed ticker shutting down");
                break;
            }
        }
    }
}

async fn correct_drift(ctx: &LoopContext, local: u64, threshold: u64) {
    let reading = time::timeout(
        Duration::from_secs(NATIVE_CALL_TIMEOUT_SECS),
        ctx.native.get_elapsed(),
    )
    .await;

    match reading {
        Ok(Ok(native)) => {
            if ctx.cancel.is_cancelled() {
                return;
            }
            if let Some(snapped) = ctx.state.snap_forward(ctx.generation, native, threshold) {
                log_info!("elapsed snapped from {local}s to native {snapped}s");
            }
        }
        Ok(Err(err)) => log_debug!("native elapsed unavailable during drift check: {err:#}"),
        Err(_) => log_debug!("native elapsed timed out during drift check"),
    }
}

/// Pulls usage samples from the native tracker and forwards them upstream.
pub(crate) async fn usage_poll(ctx: Arc<LoopContext>, period: Duration) {
    let mut ticker = periodic(period);
    let mut failures = FailureStreak::default();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = time::timeout(
                    Duration::from_secs(NATIVE_CALL_TIMEOUT_SECS),
                    ctx.native.tick_usage(),
                )
                .await;

                let sample = match sample {
                    Ok(Ok(sample)) => {
                        if let Some(streak) = failures.recover() {
                            log_info!("usage polling recovered after {streak} failures");
                        }
                        sample
                    }
                    Ok(Err(err)) => {
                        failures.record(&format!("{err:#}"));
                        continue;
                    }
                    Err(_) => {
                        failures.record(&format!("timed out after {NATIVE_CALL_TIMEOUT_SECS}s"));
                        continue;
                    }
                };

                // No sample yet is the common case.
                let Some(sample) = sample else {
                    continue;
                };

                if ctx.cancel.is_cancelled() {
                    break;
                }
                ctx.state.set_idle(ctx.generation, sample.is_idle());

                let backend = ctx.backend.clone();
                tokio::spawn(async move {
                    match backend.buffer_usage(&sample).await {
                        Ok(()) => log_debug!("usage buffered: {}", sample.application),
                        Err(err) => log_error!("failed to buffer usage for {}: {err}", sample.application),
                    }
                });
            }
            _ = ctx.cancel.cancelled() => {
                log_debug!("usage poll shutting down");
                break;
            }
        }
    }
}

/// Consecutive usage-poll failures. Only the first of a streak is logged at warn.
#[derive(Debug, Default)]
struct FailureStreak {
    count: u32,
}

impl FailureStreak {
    fn record(&mut self, reason: &str) -> log::Level {
        self.count = self.count.saturating_add(1);
        let level = if self.count == 1 {
            log::Level::Warn
        } else {
            log::Level::Debug
        };

        if level == log::Level::Warn {
            log_warn!("usage poll failed: {reason}");
        } else {
            log_debug!("usage poll failed ({} in a row): {reason}", self.count);
        }
        level
    }

    /// Ends the streak, returning its length if there was one.
    fn recover(&mut self) -> Option<u32> {
        let streak = std::mem::take(&mut self.count);
        (streak > 0).then_some(streak)
    }
}

/// Asks the backend to fold buffered usage into the timesheet.
pub(crate) async fn auto_sync(ctx: Arc<LoopContext>, period: Duration) {
    let mut ticker = periodic(period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let backend = ctx.backend.clone();
                tokio::spawn(async move {
                    match backend.sync().await {
                        Ok(()) => log_info!("auto-sync successful"),
                        Err(err) => log_error!("auto-sync failed: {err}"),
                    }
                });
            }
            _ = ctx.cancel.cancelled() => {
                log_debug!("auto-sync shutting down");
                break;
            }
        }
    }
}
