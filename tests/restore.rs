//! Startup reconciliation against an already-active server-side timesheet.

#[path = "support.rs"]
mod support;

use std::{sync::Arc, time::Duration};

use activity_sync::{
    auth::AuthState,
    backend::BackendError,
    models::{RemoteTimesheet, TimesheetList},
    tracking::{EngineStatus, RestoreOutcome},
};
use chrono::Utc;
use support::{engine, entries, journal, signed_in, FakeBackend, FakeNative};

fn started_seconds_ago(secs: i64) -> String {
    (Utc::now() - chrono::Duration::seconds(secs))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn resumed_elapsed(outcome: RestoreOutcome) -> (u64, bool) {
    match outcome {
        RestoreOutcome::Resumed {
            elapsed_seconds,
            native_adopted,
        } => (elapsed_seconds, native_adopted),
        other => panic!("expected a resumed session, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unreachable_native_falls_back_to_server_elapsed() {
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(90));
    let native = FakeNative::unreachable();
    let engine = engine(signed_in(), backend, native.clone());

    let (elapsed, native_adopted) = resumed_elapsed(engine.restore().await);

    assert!((90..=91).contains(&elapsed), "elapsed was {elapsed}");
    assert!(!native_adopted);
    assert!(engine.snapshot().tracking);
    assert_eq!(engine.status(), EngineStatus::Tracking);
    assert_eq!(native.calls().resume.len(), 1);

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(engine.snapshot().elapsed_seconds, elapsed + 3);
}

#[tokio::test(start_paused = true)]
async fn outside_desktop_runtime_native_is_not_consulted() {
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(90));
    let native = FakeNative::browser();
    let engine = engine(signed_in(), backend, native.clone());

    let (elapsed, _) = resumed_elapsed(engine.restore().await);

    assert!((90..=91).contains(&elapsed));
    assert!(native.calls().resume.is_empty());
    assert_eq!(native.calls().get_elapsed, 0);
    assert!(engine.snapshot().tracking);
}

#[tokio::test(start_paused = true)]
async fn native_ahead_of_server_is_adopted() {
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(90));
    let native = FakeNative::desktop();
    native.set_elapsed(200);
    let engine = engine(signed_in(), backend, native.clone());

    let (elapsed, native_adopted) = resumed_elapsed(engine.restore().await);

    assert_eq!(elapsed, 200);
    assert!(native_adopted);
    let resumed_with = native.calls().resume;
    assert_eq!(resumed_with.len(), 1);
    assert!((90..=91).contains(&resumed_with[0]));
}

#[tokio::test(start_paused = true)]
async fn native_behind_server_is_ignored() {
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(90));
    let native = FakeNative::desktop();
    native.set_elapsed(30);
    let engine = engine(signed_in(), backend, native);

    let (elapsed, native_adopted) = resumed_elapsed(engine.restore().await);

    assert!((90..=91).contains(&elapsed));
    assert!(!native_adopted);
}

#[tokio::test(start_paused = true)]
async fn restored_elapsed_never_decreases_afterwards() {
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(600));
    let native = FakeNative::desktop();
    native.set_elapsed(0);
    let engine = engine(signed_in(), backend, native);

    let (restored, _) = resumed_elapsed(engine.restore().await);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let mut previous = restored;
    for _ in 0..25 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let current = engine.snapshot().elapsed_seconds;
        assert!(current >= previous);
        previous = current;
    }
    assert_eq!(previous, restored + 25);
}

#[tokio::test(start_paused = true)]
async fn unparsable_start_time_keeps_previous_elapsed() {
    let backend = FakeBackend::new();
    backend.set_active_since("not a timestamp");
    let native = FakeNative::browser();
    let engine = engine(signed_in(), backend, native);

    let (elapsed, _) = resumed_elapsed(engine.restore().await);

    assert_eq!(elapsed, 0);
    assert!(engine.snapshot().tracking);
}

#[tokio::test(start_paused = true)]
async fn inactive_timesheets_leave_engine_idle() {
    let backend = FakeBackend::new();
    backend.set_current(Ok(TimesheetList {
        timesheets: Some(vec![RemoteTimesheet {
            id: 3,
            status: Some("inactive".into()),
            start_time: Some(started_seconds_ago(3_600)),
            end_time: Some(started_seconds_ago(60)),
        }]),
    }));
    let native = FakeNative::desktop();
    let engine = engine(signed_in(), backend, native.clone());

    assert_eq!(engine.restore().await, RestoreOutcome::NothingActive);
    assert!(!engine.snapshot().tracking);
    assert_eq!(engine.status(), EngineStatus::Idle);
    assert!(native.calls().resume.is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(native.calls().tick_usage, 0);
}

#[tokio::test(start_paused = true)]
async fn not_found_is_an_expected_empty_result() {
    let backend = FakeBackend::new();
    backend.set_current(Err(BackendError::NotFound { detail: None }));
    let engine = engine(signed_in(), backend, FakeNative::desktop());

    assert_eq!(engine.restore().await, RestoreOutcome::NothingActive);
    assert!(!engine.snapshot().tracking);
}

#[tokio::test(start_paused = true)]
async fn backend_failure_is_logged_not_raised() {
    let backend = FakeBackend::new();
    backend.set_current(Err(BackendError::Transport("connection refused".into())));
    let engine = engine(signed_in(), backend, FakeNative::desktop());

    assert_eq!(engine.restore().await, RestoreOutcome::BackendUnavailable);
    assert!(!engine.snapshot().tracking);
    assert_eq!(engine.status(), EngineStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn restore_runs_once_per_engine() {
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(90));
    let engine = engine(signed_in(), backend.clone(), FakeNative::desktop());

    resumed_elapsed(engine.restore().await);
    assert_eq!(engine.restore().await, RestoreOutcome::Skipped);
    assert_eq!(backend.calls().current, 1);
}

#[tokio::test(start_paused = true)]
async fn restore_after_user_start_is_skipped() {
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(90));
    let engine = engine(signed_in(), backend.clone(), FakeNative::desktop());

    engine.start().await.unwrap();

    assert_eq!(engine.restore().await, RestoreOutcome::Skipped);
    assert_eq!(backend.calls().current, 0);
    assert_eq!(engine.snapshot().elapsed_seconds, 0);
}

#[tokio::test(start_paused = true)]
async fn restored_session_can_be_stopped() {
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(90));
    let native = FakeNative::desktop();
    let engine = engine(signed_in(), backend.clone(), native.clone());

    resumed_elapsed(engine.restore().await);
    engine.stop().await.unwrap();

    assert_eq!(native.calls().stop, 1);
    assert_eq!(backend.calls().close, 1);
    assert!(!engine.snapshot().tracking);
}

#[tokio::test(start_paused = true)]
async fn restore_waits_for_sign_in() {
    let auth = Arc::new(AuthState::new());
    let backend = FakeBackend::new();
    backend.set_active_since(started_seconds_ago(90));
    let engine = engine(auth.clone(), backend.clone(), FakeNative::desktop());

    assert_eq!(engine.restore().await, RestoreOutcome::NotSignedIn);
    assert_eq!(backend.calls().current, 0);

    auth.set_token("fresh-token");
    let (elapsed, _) = resumed_elapsed(engine.restore().await);
    assert!(elapsed >= 90);
}

#[tokio::test(start_paused = true)]
async fn rejected_credentials_allow_a_later_restore() {
    let backend = FakeBackend::new();
    backend.set_current(Err(BackendError::Unauthorized {
        detail: Some("Could not validate credentials".into()),
    }));
    let engine = engine(signed_in(), backend.clone(), FakeNative::desktop());

    assert_eq!(engine.restore().await, RestoreOutcome::NotSignedIn);
    assert!(!engine.snapshot().tracking);
    assert_eq!(engine.status(), EngineStatus::Idle);

    backend.set_active_since(started_seconds_ago(60));
    resumed_elapsed(engine.restore().await);
    assert_eq!(backend.calls().current, 2);
}

#[tokio::test(start_paused = true)]
async fn restore_queries_server_before_resuming_native() {
    let calls = journal();
    let backend = FakeBackend::with_journal(&calls);
    backend.set_active_since(started_seconds_ago(90));
    let native = FakeNative::desktop_with_journal(&calls);
    let engine = engine(signed_in(), backend, native);

    resumed_elapsed(engine.restore().await);

    assert_eq!(entries(&calls), ["current", "native_resume"]);
}
