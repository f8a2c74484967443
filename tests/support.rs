//! In-memory collaborators for driving the engine without a network or OS hooks.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use activity_sync::{
    auth::AuthState,
    backend::{BackendError, TimesheetBackend},
    models::{RemoteTimesheet, TimesheetList, UsageSample},
    settings::TrackerSettings,
    tracker::NativeTracker,
    tracking::{ReconciliationEngine, SessionState},
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

/// Handshake calls from both fakes, in the order they happened.
pub type Journal = Arc<Mutex<Vec<&'static str>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<&'static str> {
    journal.lock().unwrap().clone()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackendCalls {
    pub open: usize,
    pub close: usize,
    pub current: usize,
    pub buffered: Vec<UsageSample>,
    pub sync: usize,
    pub screenshots: Vec<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<BackendCalls>,
    current: Mutex<Option<Result<TimesheetList, BackendError>>>,
    open_error: Mutex<Option<BackendError>>,
    close_error: Mutex<Option<BackendError>>,
    journal: Journal,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_journal(journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            journal: journal.clone(),
            ..Self::default()
        })
    }

    fn note(&self, call: &'static str) {
        self.journal.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> BackendCalls {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_current(&self, result: Result<TimesheetList, BackendError>) {
        *self.current.lock().unwrap() = Some(result);
    }

    pub fn set_active_since(&self, start_time: impl Into<String>) {
        self.set_current(Ok(TimesheetList {
            timesheets: Some(vec![RemoteTimesheet {
                id: 7,
                status: Some("active".into()),
                start_time: Some(start_time.into()),
                end_time: None,
            }]),
        }));
    }

    pub fn fail_open(&self, error: BackendError) {
        *self.open_error.lock().unwrap() = Some(error);
    }

    pub fn fail_close(&self, error: BackendError) {
        *self.close_error.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl TimesheetBackend for FakeBackend {
    async fn open_timesheet(&self) -> Result<(), BackendError> {
        self.calls.lock().unwrap().open += 1;
        self.note("open");
        match self.open_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close_timesheet(&self) -> Result<(), BackendError> {
        self.calls.lock().unwrap().close += 1;
        self.note("close");
        match self.close_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn get_current_timesheet(&self) -> Result<TimesheetList, BackendError> {
        self.calls.lock().unwrap().current += 1;
        self.note("current");
        self.current
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(TimesheetList::empty()))
    }

    async fn buffer_usage(&self, sample: &UsageSample) -> Result<(), BackendError> {
        self.calls.lock().unwrap().buffered.push(sample.clone());
        Ok(())
    }

    async fn sync(&self) -> Result<(), BackendError> {
        self.calls.lock().unwrap().sync += 1;
        Ok(())
    }

    async fn upload_screenshot(&self, _png: Vec<u8>, file_name: String) -> Result<(), BackendError> {
        self.calls.lock().unwrap().screenshots.push(file_name);
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NativeCalls {
    pub start: usize,
    pub stop: usize,
    pub resume: Vec<u64>,
    pub tick_usage: usize,
    pub get_elapsed: usize,
}

pub struct FakeNative {
    available: bool,
    reachable: Mutex<bool>,
    fail_start: Mutex<bool>,
    hang_usage: Mutex<bool>,
    elapsed: Mutex<u64>,
    samples: Mutex<VecDeque<UsageSample>>,
    calls: Mutex<NativeCalls>,
    journal: Journal,
}

impl FakeNative {
    /// Available and reachable, reporting zero elapsed.
    pub fn desktop() -> Arc<Self> {
        Self::desktop_with_journal(&journal())
    }

    pub fn desktop_with_journal(journal: &Journal) -> Arc<Self> {
        Arc::new(Self::build(true, true, journal.clone()))
    }

    /// Claims to be present but every call fails.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self::build(true, false, journal()))
    }

    /// Not running inside the desktop shell at all.
    pub fn browser() -> Arc<Self> {
        Arc::new(Self::build(false, false, journal()))
    }

    fn build(available: bool, reachable: bool, journal: Journal) -> Self {
        Self {
            available,
            reachable: Mutex::new(reachable),
            fail_start: Mutex::new(false),
            hang_usage: Mutex::new(false),
            elapsed: Mutex::new(0),
            samples: Mutex::new(VecDeque::new()),
            calls: Mutex::new(NativeCalls::default()),
            journal,
        }
    }

    pub fn calls(&self) -> NativeCalls {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_elapsed(&self, elapsed: u64) {
        *self.elapsed.lock().unwrap() = elapsed;
    }

    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock().unwrap() = reachable;
    }

    pub fn set_fail_start(&self, fail: bool) {
        *self.fail_start.lock().unwrap() = fail;
    }

    /// Usage polls never answer.
    pub fn set_hang_usage(&self, hang: bool) {
        *self.hang_usage.lock().unwrap() = hang;
    }

    pub fn push_sample(&self, sample: UsageSample) {
        self.samples.lock().unwrap().push_back(sample);
    }

    fn note(&self, call: &'static str) {
        self.journal.lock().unwrap().push(call);
    }

    fn ensure_reachable(&self) -> Result<()> {
        if !*self.reachable.lock().unwrap() {
            bail!("native tracker unreachable");
        }
        Ok(())
    }
}

#[async_trait]
impl NativeTracker for FakeNative {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn start(&self) -> Result<()> {
        self.calls.lock().unwrap().start += 1;
        self.note("native_start");
        self.ensure_reachable()?;
        if *self.fail_start.lock().unwrap() {
            bail!("tracker refused to start");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.calls.lock().unwrap().stop += 1;
        self.note("native_stop");
        self.ensure_reachable()
    }

    async fn resume(&self, elapsed: u64) -> Result<()> {
        self.calls.lock().unwrap().resume.push(elapsed);
        self.note("native_resume");
        self.ensure_reachable()
    }

    async fn tick_usage(&self) -> Result<Option<UsageSample>> {
        self.calls.lock().unwrap().tick_usage += 1;
        let hang = *self.hang_usage.lock().unwrap();
        if hang {
            std::future::pending::<()>().await;
        }
        self.ensure_reachable()?;
        Ok(self.samples.lock().unwrap().pop_front())
    }

    async fn get_elapsed(&self) -> Result<u64> {
        self.calls.lock().unwrap().get_elapsed += 1;
        self.ensure_reachable()?;
        Ok(*self.elapsed.lock().unwrap())
    }
}

pub fn sample(app: &str, duration: u64, idle: u64) -> UsageSample {
    UsageSample {
        application: app.into(),
        active_duration: duration,
        idle_duration: idle,
        timestamp: Utc::now(),
    }
}

pub fn signed_in() -> Arc<AuthState> {
    Arc::new(AuthState::with_token("test-token"))
}

pub fn engine(
    auth: Arc<AuthState>,
    backend: Arc<FakeBackend>,
    native: Arc<FakeNative>,
) -> ReconciliationEngine {
    ReconciliationEngine::new(
        Arc::new(SessionState::new()),
        auth,
        backend,
        native,
        &TrackerSettings::default(),
    )
}
