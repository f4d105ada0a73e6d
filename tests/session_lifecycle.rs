//! Session lifecycle integration tests.
//!
//! Drives the session manager end to end against scripted fakes: state
//! machine transitions, resource teardown, interruption handling, media
//! pumping, and visual-source exclusivity.

mod support;

use bytes::Bytes;
use mommy_live::audio::encode_frame;
use mommy_live::capture::{CaptureHandle, VisualMode};
use mommy_live::error::ClientError;
use mommy_live::live::LiveEvent;
use mommy_live::session::{SessionState, SessionUpdate};

use support::{harness, next_update, wait_for_state, wait_until};

/// PCM16 event carrying `seconds` of audio at 24 kHz.
fn audio_event(seconds: f64) -> LiveEvent {
    let samples = vec![0.25_f32; (seconds * 24_000.0) as usize];
    LiveEvent::Audio {
        data: Bytes::from(encode_frame(&samples)),
        sample_rate: 24_000,
    }
}

// =============================================================================
// Connect / Disconnect
// =============================================================================

#[tokio::test]
async fn test_connect_opens_session_and_reports_state() {
    let mut h = harness();

    h.manager.connect().await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Connected);

    let status = wait_for_state(&mut h.updates, SessionState::Connecting).await;
    assert_eq!(status, "Connecting...");
    let status = wait_for_state(&mut h.updates, SessionState::Connected).await;
    assert_eq!(status, "Connected");

    let setup = h.connector.last_setup();
    assert!(setup.model.starts_with("models/"));
    assert_eq!(h.mic.open_count(), 1);
}

#[tokio::test]
async fn test_connect_is_idempotent_while_connected() {
    let h = harness();

    h.manager.connect().await.unwrap();
    h.manager.connect().await.unwrap();

    assert_eq!(h.connector.connect_count.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(h.mic.open_count(), 1);
}

#[tokio::test]
async fn test_denied_microphone_lands_in_error_state() {
    let mut h = harness();
    h.mic.deny();

    let err = h.manager.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::PermissionDenied(_)));
    assert_eq!(h.manager.state(), SessionState::Error);
    let status = wait_for_state(&mut h.updates, SessionState::Error).await;
    assert!(!status.is_empty());

    h.manager.disconnect().await;
    assert_eq!(h.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_transport_failure_then_reconnect_from_error() {
    let h = harness();
    h.connector.fail_next();

    let err = h.manager.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectError(_)));
    assert_eq!(h.manager.state(), SessionState::Error);
    // The microphone was acquired before the transport failed; it must not
    // stay held in Error.
    assert!(h.mic.handle().is_stopped());

    h.manager.connect().await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Connected);
    assert_eq!(h.mic.open_count(), 2);
}

#[tokio::test]
async fn test_close_during_setup_fails_connect() {
    let h = harness();
    h.connector.script_on_connect(vec![LiveEvent::Closed]);

    let err = h.manager.connect().await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectError(_)));
    assert_eq!(h.manager.state(), SessionState::Error);
    assert!(h.mic.handle().is_stopped());
}

#[tokio::test]
async fn test_disconnect_is_idempotent_from_any_state() {
    let mut h = harness();

    // From Idle: nothing happens, no update emitted.
    h.manager.disconnect().await;
    assert_eq!(h.manager.state(), SessionState::Idle);
    assert!(h.updates.try_recv().is_err());

    h.manager.connect().await.unwrap();
    h.manager.disconnect().await;
    h.manager.disconnect().await;
    assert_eq!(h.manager.state(), SessionState::Idle);

    let mut idle_updates = 0;
    while let Ok(update) = h.updates.try_recv() {
        if matches!(
            update,
            SessionUpdate::StateChanged {
                state: SessionState::Idle,
                ..
            }
        ) {
            idle_updates += 1;
        }
    }
    assert_eq!(idle_updates, 1);
}

#[tokio::test]
async fn test_remote_close_returns_to_idle() {
    let mut h = harness();
    h.manager.connect().await.unwrap();

    h.connector.push(LiveEvent::Closed).await;

    wait_until(|| h.manager.state() == SessionState::Idle, "idle after close").await;
    let status = wait_for_state(&mut h.updates, SessionState::Idle).await;
    assert_eq!(status, "Disconnected");
    assert!(h.mic.handle().is_stopped());
}

#[tokio::test]
async fn test_remote_error_releases_resources() {
    let mut h = harness();
    h.manager.connect().await.unwrap();

    h.connector.push(LiveEvent::Error("boom".to_string())).await;

    wait_until(|| h.manager.state() == SessionState::Error, "error state").await;
    let status = wait_for_state(&mut h.updates, SessionState::Error).await;
    assert_eq!(status, "Connection error");
    assert!(h.mic.handle().is_stopped());
    assert_eq!(h.manager.pending_playback(), 0);
}

// =============================================================================
// Playback and Interruption
// =============================================================================

#[tokio::test]
async fn test_full_scenario_interruption_flush() {
    let mut h = harness();

    h.manager.connect().await.unwrap();
    assert_eq!(h.manager.state(), SessionState::Connected);

    // One half-second chunk lands and is scheduled at t=0.
    h.connector.push(audio_event(0.5)).await;
    wait_until(|| h.manager.pending_playback() == 1, "one pending chunk").await;
    {
        let begun = h.sink.begun.lock();
        assert_eq!(begun.len(), 1);
        assert_eq!(begun[0].start, 0.0);
        assert!((begun[0].duration - 0.5).abs() < 1e-9);
    }
    assert!(h.manager.levels().output > 0.0);

    // The user speaks over the model: everything queued is dropped.
    h.connector.push(LiveEvent::Interrupted).await;
    wait_until(|| h.manager.pending_playback() == 0, "flush on interruption").await;
    assert!(h.sink.stop_count() >= 1);
    assert_eq!(h.manager.levels().output, 0.0);

    h.manager.disconnect().await;
    assert_eq!(h.manager.state(), SessionState::Idle);
    assert!(h.mic.handle().is_stopped());
    assert_eq!(h.manager.pending_playback(), 0);
    wait_for_state(&mut h.updates, SessionState::Idle).await;
}

#[tokio::test]
async fn test_consecutive_chunks_schedule_gapless() {
    let h = harness();
    h.manager.connect().await.unwrap();

    h.connector.push(audio_event(1.0)).await;
    h.connector.push(audio_event(0.5)).await;
    h.connector.push(audio_event(0.25)).await;
    wait_until(|| h.sink.begun_count() == 3, "three chunks scheduled").await;

    let begun = h.sink.begun.lock();
    assert_eq!(begun[0].start, 0.0);
    assert_eq!(begun[1].start, 1.0);
    assert_eq!(begun[2].start, 1.5);
}

#[tokio::test]
async fn test_finished_chunks_remove_themselves() {
    let h = harness();
    h.manager.connect().await.unwrap();

    h.connector.push(audio_event(0.5)).await;
    wait_until(|| h.manager.pending_playback() == 1, "chunk scheduled").await;

    h.clock.advance(0.6);
    assert_eq!(h.manager.pending_playback(), 0);
    // Natural completion is not a stop.
    assert_eq!(h.sink.stop_count(), 0);
}

#[tokio::test]
async fn test_malformed_audio_is_dropped_not_fatal() {
    let h = harness();
    h.manager.connect().await.unwrap();

    // Odd byte count cannot be PCM16.
    h.connector
        .push(LiveEvent::Audio {
            data: Bytes::from(vec![1_u8, 2, 3]),
            sample_rate: 24_000,
        })
        .await;
    h.connector.push(audio_event(0.25)).await;

    wait_until(|| h.manager.pending_playback() == 1, "good chunk survives").await;
    assert_eq!(h.manager.state(), SessionState::Connected);
    assert_eq!(h.sink.begun_count(), 1);
}

// =============================================================================
// Media Pumping
// =============================================================================

#[tokio::test]
async fn test_microphone_audio_is_pumped() {
    let h = harness();
    h.manager.connect().await.unwrap();

    h.mic.feed().send(vec![0.25_f32; 4096]).await.unwrap();

    wait_until(
        || {
            h.connector.outbound_json().iter().any(|message| {
                message["realtimeInput"]["mediaChunks"][0]["mimeType"]
                    == "audio/pcm;rate=16000"
            })
        },
        "audio chunk on the wire",
    )
    .await;
    assert!(h.manager.levels().input > 0.0);
}

#[tokio::test]
async fn test_short_bursts_accumulate_to_block() {
    let h = harness();
    h.manager.connect().await.unwrap();

    // Three bursts under one block, then the remainder.
    for _ in 0..3 {
        h.mic.feed().send(vec![0.1_f32; 1000]).await.unwrap();
    }
    assert_eq!(h.connector.outbound_count(), 0);
    h.mic.feed().send(vec![0.1_f32; 1100]).await.unwrap();

    wait_until(|| h.connector.outbound_count() == 1, "exactly one block sent").await;
}

#[tokio::test]
async fn test_camera_frames_are_pumped() {
    let h = harness();
    h.manager.connect().await.unwrap();
    h.manager.toggle_video().await.unwrap();

    wait_until(
        || {
            h.connector.outbound_json().iter().any(|message| {
                message["realtimeInput"]["mediaChunks"][0]["mimeType"] == "image/jpeg"
            })
        },
        "jpeg frame on the wire",
    )
    .await;
}

// =============================================================================
// Visual Sources
// =============================================================================

#[tokio::test]
async fn test_camera_and_screen_are_mutually_exclusive() {
    let mut h = harness();
    h.manager.connect().await.unwrap();

    h.manager.toggle_video().await.unwrap();
    assert_eq!(h.manager.visual_mode(), Some(VisualMode::Camera));

    h.manager.toggle_screen_share().await.unwrap();
    assert_eq!(h.manager.visual_mode(), Some(VisualMode::Screen));
    assert_eq!(
        h.visual.opened_modes(),
        vec![VisualMode::Camera, VisualMode::Screen]
    );
    assert!(h.visual.handle_at(0).is_stopped());
    assert!(!h.visual.handle_at(1).is_stopped());
    // The camera was already stopped at the moment the screen source opened,
    // not merely by the time the switch settled.
    assert_eq!(h.visual.prior_stopped_at_open(), vec![None, Some(true)]);

    // Toggling the active mode turns it off.
    h.manager.toggle_screen_share().await.unwrap();
    assert_eq!(h.manager.visual_mode(), None);
    assert!(h.visual.handle_at(1).is_stopped());

    let mut seen = Vec::new();
    while let Ok(update) = h.updates.try_recv() {
        if let SessionUpdate::VisualChanged { mode } = update {
            seen.push(mode);
        }
    }
    assert_eq!(
        seen,
        vec![Some(VisualMode::Camera), Some(VisualMode::Screen), None]
    );
}

#[tokio::test]
async fn test_visual_toggle_is_safe_while_idle() {
    let h = harness();
    h.manager.toggle_video().await.unwrap();
    h.manager.toggle_screen_share().await.unwrap();
    assert!(h.visual.opened_modes().is_empty());
    assert_eq!(h.manager.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_visual_source_failure_keeps_session_alive() {
    let h = harness();
    h.manager.connect().await.unwrap();

    h.visual.fail_next();
    let err = h.manager.toggle_video().await.unwrap_err();
    assert!(matches!(err, ClientError::DeviceUnavailable(_)));
    assert_eq!(h.manager.state(), SessionState::Connected);
    assert_eq!(h.manager.visual_mode(), None);
}

#[tokio::test]
async fn test_external_screen_share_stop_is_noticed() {
    let mut h = harness();
    h.manager.connect().await.unwrap();
    h.manager.toggle_screen_share().await.unwrap();
    assert_eq!(h.manager.visual_mode(), Some(VisualMode::Screen));

    // The user ends the share from the host side.
    h.visual.handle().stop_externally();

    wait_until(|| h.manager.visual_mode().is_none(), "share fold-up").await;
    loop {
        if let SessionUpdate::VisualChanged { mode: None } = next_update(&mut h.updates).await {
            break;
        }
    }
}

#[tokio::test]
async fn test_disconnect_stops_visual_capture() {
    let h = harness();
    h.manager.connect().await.unwrap();
    h.manager.toggle_video().await.unwrap();

    h.manager.disconnect().await;
    assert_eq!(h.manager.state(), SessionState::Idle);
    assert_eq!(h.manager.visual_mode(), None);
    assert!(h.visual.handle().is_stopped());
    assert!(h.mic.handle().is_stopped());
}
