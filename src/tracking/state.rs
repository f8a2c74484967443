use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;

use super::reconcile::drift_correction;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    #[default]
    Idle,
    Starting,
    Tracking,
    Stopping,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub tracking: bool,
    pub elapsed_seconds: u64,
    pub idle: bool,
}

/// Identifies one tracking session. Writes tagged with a stale generation
/// are dropped, so nothing from a stopped session lands after `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Generation(u64);

#[derive(Debug, Default)]
struct WriterSlot {
    last_issued: u64,
    live: Option<u64>,
}

/// Single source of truth for what the UI shows about the current session.
///
/// Presentation code only reads and subscribes; every write goes through the
/// engine and is serialized by an internal writer lock, which is what keeps
/// `elapsed_seconds` from ever moving backwards mid-session.
#[derive(Debug)]
pub struct SessionState {
    writer: Mutex<WriterSlot>,
    tracking: watch::Sender<bool>,
    elapsed_seconds: watch::Sender<u64>,
    idle: watch::Sender<bool>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(WriterSlot::default()),
            tracking: watch::channel(false).0,
            elapsed_seconds: watch::channel(0).0,
            idle: watch::channel(false).0,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let _writer = self.lock_writer();
        SessionSnapshot {
            tracking: *self.tracking.borrow(),
            elapsed_seconds: *self.elapsed_seconds.borrow(),
            idle: *self.idle.borrow(),
        }
    }

    pub fn is_tracking(&self) -> bool {
        *self.tracking.borrow()
    }

    pub fn elapsed_seconds(&self) -> u64 {
        *self.elapsed_seconds.borrow()
    }

    pub fn is_idle(&self) -> bool {
        *self.idle.borrow()
    }

    pub fn subscribe_tracking(&self) -> watch::Receiver<bool> {
        self.tracking.subscribe()
    }

    pub fn subscribe_elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed_seconds.subscribe()
    }

    pub fn subscribe_idle(&self) -> watch::Receiver<bool> {
        self.idle.subscribe()
    }

    /// Follows all three values at once, yielding a consistent snapshot per change.
    pub fn watch(self: &Arc<Self>) -> SessionWatcher {
        SessionWatcher {
            state: self.clone(),
            tracking: self.subscribe_tracking(),
            elapsed_seconds: self.subscribe_elapsed(),
            idle: self.subscribe_idle(),
        }
    }

    fn lock_writer(&self) -> MutexGuard<'_, WriterSlot> {
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens a new session publishing `elapsed` as its starting value.
    pub(crate) fn begin(&self, elapsed: u64) -> Generation {
        let mut writer = self.lock_writer();
        writer.last_issued += 1;
        writer.live = Some(writer.last_issued);

        self.idle.send_replace(false);
        self.elapsed_seconds.send_replace(elapsed);
        self.tracking.send_replace(true);

        Generation(writer.last_issued)
    }

    /// Closes whatever session is live. Idle is cleared before tracking so
    /// `idle && !tracking` is never observable.
    pub(crate) fn end(&self) {
        let mut writer = self.lock_writer();
        writer.live = None;

        self.idle.send_replace(false);
        self.tracking.send_replace(false);
    }

    /// Adds one second. Returns `None` once the session is gone.
    pub(crate) fn tick(&self, generation: Generation) -> Option<u64> {
        let writer = self.lock_writer();
        if writer.live != Some(generation.0) {
            return None;
        }

        let mut next = 0;
        self.elapsed_seconds.send_modify(|elapsed| {
            *elapsed = elapsed.saturating_add(1);
            next = *elapsed;
        });
        Some(next)
    }

    /// Raises elapsed to `value`; lower values are ignored.
    pub(crate) fn raise_elapsed(&self, generation: Generation, value: u64) -> bool {
        let writer = self.lock_writer();
        if writer.live != Some(generation.0) {
            return false;
        }

        self.elapsed_seconds.send_if_modified(|elapsed| {
            if value > *elapsed {
                *elapsed = value;
                true
            } else {
                false
            }
        })
    }

    /// Snaps elapsed forward to `native` when it leads by more than `threshold`.
    pub(crate) fn snap_forward(
        &self,
        generation: Generation,
        native: u64,
        threshold: u64,
    ) -> Option<u64> {
        let writer = self.lock_writer();
        if writer.live != Some(generation.0) {
            return None;
        }

        let target = drift_correction(*self.elapsed_seconds.borrow(), native, threshold)?;
        self.elapsed_seconds.send_replace(target);
        Some(target)
    }

    pub(crate) fn set_idle(&self, generation: Generation, idle: bool) -> bool {
        let writer = self.lock_writer();
        if writer.live != Some(generation.0) {
            return false;
        }

        self.idle.send_if_modified(|current| {
            if *current != idle {
                *current = idle;
                true
            } else {
                false
            }
        })
    }
}

pub struct SessionWatcher {
    state: Arc<SessionState>,
    tracking: watch::Receiver<bool>,
    elapsed_seconds: watch::Receiver<u64>,
    idle: watch::Receiver<bool>,
}

impl SessionWatcher {
    /// Waits for any value to change. Changes that land together are folded
    /// into one snapshot, read under the writer lock.
    pub async fn changed(&mut self) -> SessionSnapshot {
        // The watcher keeps the senders alive, so `changed` cannot fail here.
        tokio::select! {
            _ = self.tracking.changed() => {}
            _ = self.elapsed_seconds.changed() => {}
            _ = self.idle.changed() => {}
        }

        self.tracking.mark_unchanged();
        self.elapsed_seconds.mark_unchanged();
        self.idle.mark_unchanged();
        self.state.snapshot()
    }
}
