//! Scheduler scenarios against scripted channels, on paused tokio time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Connect, FakeCamera, FlakyEncoder, ScriptedChannel, StalledCamera, test_config};
use framecast_core::{
    CaptureDevice, ConnectionState, FrameEncoder, SendOutcome, StopReason, StreamError, StreamScheduler, TransportSession,
    ZstdEncoder,
};
use tokio::sync::broadcast;

// ── Helpers ──────────────────────────────────────────────────────

fn scheduler(
    config: framecast_core::StreamConfig,
    camera: impl CaptureDevice + 'static,
    channel: ScriptedChannel,
) -> (StreamScheduler, Arc<TransportSession>) {
    scheduler_with(config, camera, ZstdEncoder::new(), channel)
}

fn scheduler_with(
    config: framecast_core::StreamConfig,
    camera: impl CaptureDevice + 'static,
    encoder: impl FrameEncoder + 'static,
    channel: ScriptedChannel,
) -> (StreamScheduler, Arc<TransportSession>) {
    let config = Arc::new(config);
    let session = TransportSession::new(Arc::clone(&config), Box::new(channel)).unwrap();
    let scheduler = StreamScheduler::new(
        config,
        Box::new(camera),
        Box::new(encoder),
        Arc::clone(&session),
    )
    .unwrap();
    (scheduler, session)
}

/// Target states of every transition received so far.
fn drain_targets(rx: &mut broadcast::Receiver<framecast_core::StateTransition>) -> Vec<ConnectionState> {
    let mut out = Vec::new();
    while let Ok(t) = rx.try_recv() {
        out.push(t.to);
    }
    out
}

// ── Steady state ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn steady_stream_delivers_every_frame() {
    let (camera, cam) = FakeCamera::new();
    let (channel, link) = ScriptedChannel::new();
    let (scheduler, session) = scheduler(
        test_config(),
        camera.limit(100),
        channel.latency(Duration::from_millis(10)),
    );
    let mut transitions = session.transitions();

    let report = scheduler.run().await.unwrap();

    assert_eq!(report.reason, StopReason::EndOfStream);
    assert_eq!(report.final_state, ConnectionState::Closed);
    assert_eq!(report.stats.captured, 100);
    assert_eq!(report.stats.transmitted, 100);
    assert_eq!(report.stats.dropped, 0);
    assert_eq!(link.sends(), 100);
    assert_eq!(cam.closes(), 1);

    let targets = drain_targets(&mut transitions);
    assert_eq!(
        targets,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Streaming,
            ConnectionState::Closed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn frames_carry_configured_event_tag() {
    let (camera, _cam) = FakeCamera::new();
    let (channel, link) = ScriptedChannel::new();
    let (scheduler, _session) = scheduler(test_config(), camera.limit(3), channel);

    scheduler.run().await.unwrap();

    let payloads = link.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 3);
    assert!(payloads.iter().all(|(tag, p)| tag == "video-frame" && !p.is_json()));
}

// ── Backpressure ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn slow_link_drops_oldest_and_accounts_for_every_frame() {
    let mut config = test_config();
    config.queue_capacity = 2;
    let (camera, _cam) = FakeCamera::new();
    let (channel, _link) = ScriptedChannel::new();
    let (scheduler, _session) = scheduler(
        config,
        camera.limit(60),
        channel.latency(Duration::from_millis(200)),
    );

    let report = scheduler.run().await.unwrap();
    let s = report.stats;

    assert!(s.dropped > 0, "{s}");
    assert!(s.transmitted > 0, "{s}");
    assert_eq!(s.enqueued, 60);
    assert_eq!(s.transmitted + s.transmit_failed + s.dropped + s.discarded, s.enqueued, "{s}");
}

// ── Reconnection ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn link_loss_reconnects_without_stopping_capture() {
    let (camera, cam) = FakeCamera::new();
    let (channel, link) = ScriptedChannel::new();
    let channel = channel
        .script(&[Connect::Accept, Connect::Refuse, Connect::Accept])
        .disconnect_after(10);
    let (scheduler, session) = scheduler(test_config(), camera.limit(60), channel);
    let mut transitions = session.transitions();

    let report = scheduler.run().await.unwrap();

    use ConnectionState::*;
    let targets = drain_targets(&mut transitions);
    assert_eq!(
        targets,
        vec![
            Connecting, Connected, Streaming, Reconnecting, Connecting, Reconnecting, Connecting,
            Connected, Streaming, Closed,
        ]
    );
    assert_eq!(report.reason, StopReason::EndOfStream);
    assert_eq!(report.stats.captured, 60);
    assert_eq!(report.stats.reconnects, 2);
    assert!(report.stats.transmitted > 10);
    assert_eq!(link.connects(), 3);
    assert_eq!(cam.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_close_the_session() {
    let mut config = test_config();
    config.transport.initial_connect_timeout = None;
    config.reconnect.max_attempts = Some(3);
    let (camera, cam) = FakeCamera::new();
    let (channel, link) = ScriptedChannel::new();
    let (scheduler, session) = scheduler(config, camera, channel.refuse_forever());

    let report = scheduler.run().await.unwrap();

    assert_eq!(report.reason, StopReason::TransportClosed);
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(link.connects(), 3);
    assert_eq!(link.sends(), 0);
    assert_eq!(cam.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_while_reconnecting_fails_fast() {
    let mut config = test_config();
    config.transport.initial_connect_timeout = None;
    let (channel, link) = ScriptedChannel::new();
    let session = TransportSession::new(Arc::new(config), Box::new(channel.refuse_forever())).unwrap();
    session.start().unwrap();

    let mut state = session.subscribe();
    state
        .wait_for(|s| *s == ConnectionState::Reconnecting)
        .await
        .unwrap();

    let frame = framecast_core::Frame::new(
        bytes::Bytes::from_static(b"frame"),
        std::time::SystemTime::now(),
        framecast_core::PayloadEncoding::Binary,
    );
    let before = session.state();
    assert_eq!(session.send(&frame).await, SendOutcome::Failed);
    assert_eq!(session.state(), before);
    assert_eq!(link.sends(), 0);

    session.close().await;
    assert_eq!(session.state(), ConnectionState::Closed);
}

// ── Startup and shutdown ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn initial_connect_deadline_is_fatal() {
    let mut config = test_config();
    config.transport.initial_connect_timeout = Some(Duration::from_secs(1));
    let (camera, cam) = FakeCamera::new();
    let (channel, _link) = ScriptedChannel::new();
    let (scheduler, session) = scheduler(config, camera, channel.refuse_forever());

    let err = scheduler.run().await.unwrap_err();

    assert!(matches!(err, StreamError::InitialConnect(_)));
    assert!(err.is_fatal());
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(cam.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn capture_failure_is_fatal_and_releases_everything() {
    let (camera, cam) = FakeCamera::new();
    let (channel, link) = ScriptedChannel::new();
    let (scheduler, session) = scheduler(test_config(), camera.fail_at(5), channel);

    let err = scheduler.run().await.unwrap_err();

    assert!(matches!(err, StreamError::Capture(_)));
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(cam.closes(), 1);
    assert_eq!(link.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn capture_open_failure_closes_session() {
    let (camera, cam) = FakeCamera::new();
    let (channel, link) = ScriptedChannel::new();
    let (scheduler, session) = scheduler(test_config(), camera.fail_open(), channel);

    let err = scheduler.run().await.unwrap_err();

    assert!(matches!(err, StreamError::Capture(_)));
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(link.connects(), 0);
    assert_eq!(cam.closes(), 0);
}

#[tokio::test(start_paused = true)]
async fn end_of_stream_closes_once_and_stops_sending() {
    let (camera, cam) = FakeCamera::new();
    let (channel, link) = ScriptedChannel::new();
    let (scheduler, session) = scheduler(test_config(), camera.limit(5), channel);

    let report = scheduler.run().await.unwrap();
    let sent = link.sends();

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(report.reason, StopReason::EndOfStream);
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(cam.closes(), 1);
    assert_eq!(link.closes(), 1);
    assert_eq!(link.sends(), sent);
    assert_eq!(link.sends_after_close.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_handle_ends_run_as_requested() {
    let (camera, cam) = FakeCamera::new();
    let (channel, _link) = ScriptedChannel::new();
    let (scheduler, session) = scheduler(test_config(), camera, channel);
    let stop = scheduler.stop_handle();

    let run = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(500)).await;
    stop.cancel();

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.reason, StopReason::Requested);
    assert!(report.stats.captured >= 5);
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(cam.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn encode_failures_skip_frames_and_stream_continues() {
    let (camera, cam) = FakeCamera::new();
    let (channel, link) = ScriptedChannel::new();
    let (scheduler, _session) =
        scheduler_with(test_config(), camera.limit(30), FlakyEncoder::every(3), channel);

    let report = scheduler.run().await.unwrap();

    assert_eq!(report.reason, StopReason::EndOfStream);
    let stats = report.stats;
    assert_eq!(stats.captured, 30);
    assert_eq!(stats.encode_failed, 10);
    assert_eq!(stats.encoded, 20);
    assert_eq!(stats.transmitted, stats.captured - stats.encode_failed);
    assert_eq!(link.sends(), 20);
    assert_eq!(cam.closes(), 1);
}

#[tokio::test]
async fn stop_is_observed_while_capture_read_stalls() {
    let (camera, cam, release) = StalledCamera::new();
    let (channel, _link) = ScriptedChannel::new();
    let (scheduler, session) = scheduler(test_config(), camera, channel);
    let stop = scheduler.stop_handle();

    let run = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cam.reads(), 1);
    stop.cancel();

    let report = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("stop not observed while the read was blocked")
        .unwrap()
        .unwrap();
    assert_eq!(report.reason, StopReason::Requested);
    assert_eq!(session.state(), ConnectionState::Closed);
    // The pending read still owns the device.
    assert_eq!(cam.closes(), 0);

    drop(release);
    tokio::time::timeout(Duration::from_secs(1), async {
        while cam.closes() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("device not closed after the read returned");
    assert_eq!(cam.closes(), 1);
}
