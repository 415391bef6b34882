//! End-to-end behaviour of the gaze, scroll and voice samplers against a
//! scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{uploader, yield_a_while, ScriptedTransport};
use nojoom_telemetry::gaze::{GazeMetrics, GazeTracker, Rect, SharedTarget, Viewport, GAZE_REPORT_INTERVAL};
use nojoom_telemetry::scroll::{ScrollTracker, SCROLL_END_DEBOUNCE};
use nojoom_telemetry::telemetry::{TelemetryKind, TelemetryPayload};
use nojoom_telemetry::voice::{FeedBackend, PermissionState, TeardownStep, VoiceTracker, DEFAULT_BIN_COUNT};

fn video_surface() -> SharedTarget {
    SharedTarget::new(
        Rect::new(0.0, 0.0, 400.0, 300.0),
        Viewport {
            width: 1280.0,
            height: 720.0,
        },
    )
}

fn loud() -> Vec<u8> {
    vec![200; DEFAULT_BIN_COUNT]
}

fn silence() -> Vec<u8> {
    vec![0; DEFAULT_BIN_COUNT]
}

#[tokio::test(start_paused = true)]
async fn gaze_stop_twice_sends_one_final_report() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let gaze = GazeTracker::new(uploader.clone());
    gaze.set_enabled(true).await;

    assert!(gaze.start_tracking(Arc::new(video_surface()), 7).await);
    gaze.on_pointer_move(10.0, 10.0).await;
    gaze.on_pointer_move(900.0, 600.0).await;
    assert!(!gaze.metrics().is_looking_at_target);

    gaze.stop_tracking().await;
    gaze.stop_tracking().await;
    uploader.settle().await;

    let singles = transport.singles();
    assert_eq!(singles.len(), 1);
    assert_eq!(singles[0].subject_id, 7);
    match &singles[0].payload {
        TelemetryPayload::Gaze(report) => {
            assert_eq!(report.gaze_points.len(), 2);
            assert_eq!(report.attention_score, 50.0);
            assert_eq!(report.viewport_data.width, 1280.0);
            assert!(report.viewport_data.target_rect.is_some());
        }
        other => panic!("expected gaze payload, got {other:?}"),
    }
    assert!(!gaze.is_tracking().await);
    assert_eq!(gaze.metrics().attention_score, 0.0);
}

#[tokio::test(start_paused = true)]
async fn gaze_reports_periodically_while_tracking() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let gaze = GazeTracker::new(uploader.clone());
    gaze.set_enabled(true).await;

    gaze.start_tracking(Arc::new(video_surface()), 3).await;
    gaze.on_pointer_move(50.0, 50.0).await;

    tokio::time::sleep(GAZE_REPORT_INTERVAL + Duration::from_millis(10)).await;
    yield_a_while().await;
    uploader.settle().await;
    assert_eq!(transport.singles().len(), 1);

    gaze.stop_tracking().await;
    uploader.settle().await;
    assert_eq!(transport.singles().len(), 2);
    assert!(transport
        .singles()
        .iter()
        .all(|event| event.kind() == TelemetryKind::Gaze));
}

#[tokio::test(start_paused = true)]
async fn gaze_stays_idle_when_disabled() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let gaze = GazeTracker::new(uploader.clone());

    assert!(!gaze.start_tracking(Arc::new(video_surface()), 1).await);
    gaze.on_pointer_move(10.0, 10.0).await;
    gaze.stop_tracking().await;
    uploader.settle().await;

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn gaze_without_samples_sends_nothing_on_stop() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let gaze = GazeTracker::new(uploader.clone());
    gaze.set_enabled(true).await;

    gaze.start_tracking(Arc::new(video_surface()), 1).await;
    gaze.stop_tracking().await;
    uploader.settle().await;

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn gaze_ignores_pointer_while_target_is_unmounted() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let gaze = GazeTracker::new(uploader.clone());
    gaze.set_enabled(true).await;

    let target = video_surface();
    gaze.start_tracking(Arc::new(target.clone()), 4).await;
    gaze.on_pointer_move(20.0, 20.0).await;
    let before = gaze.metrics();

    target.set_rect(None);
    gaze.on_pointer_move(900.0, 600.0).await;
    gaze.on_pointer_move(30.0, 30.0).await;
    assert_eq!(gaze.metrics(), before);

    gaze.stop_tracking().await;
    uploader.settle().await;

    let singles = transport.singles();
    assert_eq!(singles.len(), 1);
    match &singles[0].payload {
        TelemetryPayload::Gaze(report) => {
            assert_eq!(report.gaze_points.len(), 1);
            assert_eq!(report.viewport_data.target_rect, None);
        }
        other => panic!("expected gaze payload, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn gaze_without_target_never_samples() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let gaze = GazeTracker::new(uploader.clone());
    gaze.set_enabled(true).await;

    let target = video_surface();
    target.set_rect(None);
    gaze.start_tracking(Arc::new(target), 4).await;
    gaze.on_pointer_move(20.0, 20.0).await;
    gaze.on_pointer_move(40.0, 40.0).await;
    assert_eq!(gaze.metrics(), GazeMetrics::default());

    tokio::time::sleep(GAZE_REPORT_INTERVAL * 2).await;
    gaze.stop_tracking().await;
    uploader.settle().await;
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_leave_one_report_loop() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let gaze = GazeTracker::new(uploader.clone());
    gaze.set_enabled(true).await;

    gaze.start_tracking(Arc::new(video_surface()), 1).await;
    gaze.on_pointer_move(10.0, 10.0).await;

    let (first, second) = tokio::join!(
        gaze.start_tracking(Arc::new(video_surface()), 2),
        gaze.start_tracking(Arc::new(video_surface()), 3),
    );
    assert!(first && second);
    uploader.settle().await;
    // Only the session holding a sample reports when replaced.
    assert_eq!(transport.singles().len(), 1);

    gaze.on_pointer_move(20.0, 20.0).await;
    tokio::time::sleep(GAZE_REPORT_INTERVAL * 2 + Duration::from_secs(2)).await;
    yield_a_while().await;
    uploader.settle().await;
    assert_eq!(transport.singles().len(), 3);

    gaze.stop_tracking().await;
    uploader.settle().await;
    assert_eq!(transport.singles().len(), 4);
    assert!(!gaze.is_tracking().await);

    tokio::time::sleep(GAZE_REPORT_INTERVAL * 3).await;
    yield_a_while().await;
    uploader.settle().await;
    assert_eq!(transport.singles().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn short_scroll_sends_nothing() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let scroll = ScrollTracker::new(uploader.clone());
    scroll.observe(true, 50.0).await;
    scroll.focus_subject(11).await;

    scroll.on_scroll(0.0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    scroll.on_scroll(30.0).await;
    assert!(scroll.is_scrolling());

    tokio::time::sleep(SCROLL_END_DEBOUNCE * 2).await;
    assert!(!scroll.is_scrolling());
    scroll.on_scroll(30.0).await;
    uploader.settle().await;

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn scroll_after_pause_reports_once() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let scroll = ScrollTracker::new(uploader.clone());
    scroll.observe(true, 50.0).await;
    scroll.focus_subject(11).await;

    scroll.on_scroll(0.0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    scroll.on_scroll(120.0).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    scroll.on_scroll(120.0).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    scroll.on_scroll(125.0).await;
    uploader.settle().await;

    let singles = transport.singles();
    assert_eq!(singles.len(), 1);
    assert_eq!(singles[0].subject_id, 11);
    match &singles[0].payload {
        TelemetryPayload::Scroll(report) => {
            assert!(report.pause_duration >= 800);
            assert!(report.engagement_score > 0.0);
        }
        other => panic!("expected scroll payload, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn scroll_ignored_while_not_observing() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let scroll = ScrollTracker::new(uploader.clone());
    scroll.focus_subject(1).await;

    scroll.on_scroll(0.0).await;
    scroll.on_scroll(500.0).await;
    assert!(!scroll.is_scrolling());
    assert_eq!(scroll.metrics().scroll_speed_px_per_sec, 0.0);
}

#[tokio::test(start_paused = true)]
async fn voice_denied_stays_idle() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let backend = FeedBackend::new(false);
    let voice = VoiceTracker::new(uploader.clone(), Arc::new(backend.clone()));

    voice.toggle_tracking(true).await;
    assert!(!voice.is_tracking().await);
    assert_eq!(voice.permission().await, PermissionState::Denied);

    // Denial sticks for the session even once the OS would allow it.
    backend.set_permission(true);
    voice.toggle_tracking(true).await;
    assert!(voice.permission_denied().await);
    assert_eq!(backend.acquisitions(), 0);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sustained_voice_sends_one_interaction() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let backend = FeedBackend::new(true);
    let voice = VoiceTracker::new(uploader.clone(), Arc::new(backend.clone()));
    voice.focus_subject(5).await;

    backend.push_frame(loud());
    voice.toggle_tracking(true).await;
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(voice.metrics().is_active);

    backend.push_frame(silence());
    tokio::time::sleep(Duration::from_millis(100)).await;
    uploader.settle().await;

    let singles = transport.singles();
    assert_eq!(singles.len(), 1);
    assert_eq!(singles[0].subject_id, 5);
    match &singles[0].payload {
        TelemetryPayload::Voice(report) => {
            assert_eq!(report.interaction_type, "voice_activity");
            assert!((784..=832).contains(&report.duration), "duration {}", report.duration);
            assert!(report.intensity > 70.0);
        }
        other => panic!("expected voice payload, got {other:?}"),
    }
    assert!(!voice.metrics().is_active);
    assert_eq!(voice.metrics().interaction_count, 1);

    voice.stop_tracking().await;
}

#[tokio::test(start_paused = true)]
async fn short_voice_burst_is_ignored() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let backend = FeedBackend::new(true);
    let voice = VoiceTracker::new(uploader.clone(), Arc::new(backend.clone()));
    voice.focus_subject(5).await;

    backend.push_frame(loud());
    voice.toggle_tracking(true).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    backend.push_frame(silence());
    tokio::time::sleep(Duration::from_millis(100)).await;
    uploader.settle().await;

    assert_eq!(transport.call_count(), 0);
    assert_eq!(voice.metrics().interaction_count, 1);
    voice.stop_tracking().await;
}

#[tokio::test(start_paused = true)]
async fn voice_stop_releases_microphone_and_restart_reacquires() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let backend = FeedBackend::new(true);
    let voice = VoiceTracker::new(uploader.clone(), Arc::new(backend.clone()));

    voice.toggle_tracking(true).await;
    assert!(voice.is_tracking().await);
    assert_eq!(backend.open_captures(), 1);

    voice.toggle_tracking(false).await;
    voice.stop_tracking().await;
    assert!(!voice.is_tracking().await);
    assert_eq!(backend.open_captures(), 0);
    assert_eq!(
        backend.teardown_log(),
        vec![
            TeardownStep::CloseContext,
            TeardownStep::DisconnectSource,
            TeardownStep::StopTracks
        ]
    );
    assert!(voice.last_error().is_none());

    voice.toggle_tracking(true).await;
    assert_eq!(backend.acquisitions(), 2);
    assert_eq!(backend.open_captures(), 1);
    voice.stop_tracking().await;
    assert_eq!(backend.open_captures(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_device_surfaces_error() {
    let transport = ScriptedTransport::new();
    let uploader = uploader(&transport);
    let backend = FeedBackend::new(true);
    backend.set_available(false);
    let voice = VoiceTracker::new(uploader, Arc::new(backend.clone()));

    voice.toggle_tracking(true).await;
    assert!(!voice.is_tracking().await);
    assert!(voice.last_error().is_some());
    assert_eq!(voice.permission().await, PermissionState::Granted);

    backend.set_available(true);
    voice.toggle_tracking(true).await;
    assert!(voice.is_tracking().await);
    assert!(voice.last_error().is_none());
    voice.stop_tracking().await;
}
