//! End-to-end lifecycle tests with scripted collaborators. No audio device
//! and no network: the microphone, transport, and playback sink are all
//! in-memory fakes, so these exercise exactly the state machine.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use skyline_core::{
    session::SessionDiagnostics, wire::pcm, LiveConnector, LiveTransport, MentorSession,
    MicSource, PlaybackSink, RealtimeInput, Result, ServerMessage, SessionConfig, SessionError,
    SessionEvent, SessionPhase, SetupRequest, WsConnector,
};

struct RecordingTransport {
    frames: Arc<Mutex<Vec<RealtimeInput>>>,
    closed: Arc<AtomicBool>,
}

impl LiveTransport for RecordingTransport {
    fn send_realtime(&mut self, input: RealtimeInput) -> Result<()> {
        self.frames.lock().push(input);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct FakeConnector {
    frames: Arc<Mutex<Vec<RealtimeInput>>>,
    closed: Arc<AtomicBool>,
    events: Arc<Mutex<Option<mpsc::Sender<SessionEvent>>>>,
    setups: Arc<Mutex<Vec<SetupRequest>>>,
    fail: bool,
}

impl LiveConnector for FakeConnector {
    fn connect(
        &self,
        setup: SetupRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Box<dyn LiveTransport>> {
        if self.fail {
            return Err(SessionError::Connection("scripted refusal".into()));
        }
        self.setups.lock().push(setup);
        *self.events.lock() = Some(events);
        Ok(Box::new(RecordingTransport {
            frames: Arc::clone(&self.frames),
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[derive(Default)]
struct RecordingSink {
    stops: Arc<Mutex<usize>>,
}

impl PlaybackSink for RecordingSink {
    fn play(&mut self, _samples: Vec<f32>, _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    fn stop_all(&mut self) {
        *self.stops.lock() += 1;
    }
}

struct NullMic {
    fail: bool,
}

impl MicSource for NullMic {
    fn open(
        &self,
        _events: mpsc::Sender<SessionEvent>,
        _live: Arc<AtomicBool>,
        _diagnostics: Arc<SessionDiagnostics>,
        _frame_samples: usize,
    ) -> Result<()> {
        if self.fail {
            Err(SessionError::Permission("scripted denial".into()))
        } else {
            Ok(())
        }
    }
}

/// Microphone that records the liveness flag each `open` receives.
struct RecordingMic {
    flags: Arc<Mutex<Vec<Arc<AtomicBool>>>>,
}

impl MicSource for RecordingMic {
    fn open(
        &self,
        _events: mpsc::Sender<SessionEvent>,
        live: Arc<AtomicBool>,
        _diagnostics: Arc<SessionDiagnostics>,
        _frame_samples: usize,
    ) -> Result<()> {
        self.flags.lock().push(live);
        Ok(())
    }
}

struct Harness {
    session: MentorSession,
    frames: Arc<Mutex<Vec<RealtimeInput>>>,
    closed: Arc<AtomicBool>,
    events: Arc<Mutex<Option<mpsc::Sender<SessionEvent>>>>,
    setups: Arc<Mutex<Vec<SetupRequest>>>,
    stops: Arc<Mutex<usize>>,
}

fn harness_with(mic_fail: bool, connect_fail: bool) -> Harness {
    let connector = FakeConnector {
        fail: connect_fail,
        ..FakeConnector::default()
    };
    let frames = Arc::clone(&connector.frames);
    let closed = Arc::clone(&connector.closed);
    let events = Arc::clone(&connector.events);
    let setups = Arc::clone(&connector.setups);
    let sink = RecordingSink::default();
    let stops = Arc::clone(&sink.stops);

    let session = MentorSession::new(
        SessionConfig::default(),
        Box::new(connector),
        Box::new(NullMic { fail: mic_fail }),
        Box::new(sink),
    );
    Harness {
        session,
        frames,
        closed,
        events,
        setups,
        stops,
    }
}

fn harness() -> Harness {
    harness_with(false, false)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within one second");
}

fn audio_message(samples: &[f32]) -> ServerMessage {
    serde_json::from_value(serde_json::json!({
        "serverContent": {
            "modelTurn": {
                "parts": [{
                    "inlineData": {
                        "data": pcm::encode_frame(samples),
                        "mimeType": "audio/pcm;rate=24000"
                    }
                }]
            }
        }
    }))
    .expect("well-formed audio message")
}

#[tokio::test]
async fn start_negotiates_the_configured_persona() {
    let h = harness();
    h.session.start().expect("start");

    let setups = h.setups.lock();
    assert_eq!(setups.len(), 1);
    assert_eq!(setups[0].voice_name, "Zephyr");
    assert!(setups[0].system_instruction.contains("career mentor"));
    drop(setups);
    h.session.stop();
}

#[tokio::test]
async fn second_start_is_rejected_while_live() {
    let h = harness();
    h.session.start().expect("first start");
    assert!(matches!(
        h.session.start(),
        Err(SessionError::AlreadyActive)
    ));
    // Still rejected mid-Connecting, before any Opened event.
    assert_eq!(h.session.phase(), SessionPhase::Connecting);
    h.session.stop();

    // After teardown the session is reusable.
    h.session.start().expect("restart after stop");
    h.session.stop();
}

#[tokio::test]
async fn microphone_denial_aborts_before_connecting() {
    let h = harness_with(true, false);
    assert!(matches!(
        h.session.start(),
        Err(SessionError::Permission(_))
    ));
    assert_eq!(h.session.phase(), SessionPhase::Disconnected);
    assert!(h.setups.lock().is_empty(), "must not negotiate a connection");
}

#[tokio::test]
async fn connection_refusal_tears_down_cleanly() {
    let h = harness_with(false, true);
    assert!(matches!(
        h.session.start(),
        Err(SessionError::Connection(_))
    ));
    assert_eq!(h.session.phase(), SessionPhase::Disconnected);
    // A later start() is allowed again.
    assert!(matches!(
        h.session.start(),
        Err(SessionError::Connection(_))
    ));
}

#[tokio::test]
async fn stop_is_idempotent_from_every_phase() {
    // Disconnected: no-op.
    let h = harness();
    h.session.stop();
    assert_eq!(h.session.phase(), SessionPhase::Disconnected);
    assert_eq!(h.session.diagnostics_snapshot().teardowns, 0);

    // Connecting: tears down before the endpoint ever opened.
    h.session.start().expect("start");
    h.session.stop();
    assert_eq!(h.session.phase(), SessionPhase::Disconnected);
    assert!(h.closed.load(Ordering::SeqCst));
    assert_eq!(h.session.diagnostics_snapshot().teardowns, 1);

    // Repeated stop stays a no-op.
    h.session.stop();
    assert_eq!(h.session.diagnostics_snapshot().teardowns, 1);
}

#[tokio::test]
async fn stop_while_speaking_flushes_pending_playback() {
    let h = harness();
    h.session.start().expect("start");
    let tx = h.events.lock().clone().expect("captured sender");
    tx.send(SessionEvent::Opened).await.expect("open");
    wait_until(|| h.session.phase() == SessionPhase::Active).await;

    // Two one-second chunks; neither can complete before stop().
    for _ in 0..2 {
        tx.send(SessionEvent::Inbound(audio_message(&[0.2; 24_000])))
            .await
            .expect("audio");
    }
    wait_until(|| h.session.pending_playback() == 2).await;

    h.session.stop();
    assert_eq!(h.session.phase(), SessionPhase::Disconnected);
    assert_eq!(h.session.pending_playback(), 0);
    assert!(h.closed.load(Ordering::SeqCst));
    assert!(*h.stops.lock() >= 1);
}

#[tokio::test]
async fn mute_gates_transmission_at_frame_boundaries() {
    let h = harness();
    h.session.start().expect("start");
    let tx = h.events.lock().clone().expect("captured sender");
    tx.send(SessionEvent::Opened).await.expect("open");

    tx.send(SessionEvent::CaptureFrame(vec![0.1; 2048]))
        .await
        .expect("frame");
    wait_until(|| h.frames.lock().len() == 1).await;

    h.session.set_muted(true);
    assert!(h.session.is_muted());
    for _ in 0..4 {
        tx.send(SessionEvent::CaptureFrame(vec![0.1; 2048]))
            .await
            .expect("frame");
    }
    wait_until(|| h.session.diagnostics_snapshot().frames_muted == 4).await;
    assert_eq!(h.frames.lock().len(), 1, "muted frames must not be sent");

    h.session.set_muted(false);
    tx.send(SessionEvent::CaptureFrame(vec![0.1; 2048]))
        .await
        .expect("frame");
    wait_until(|| h.frames.lock().len() == 2).await;
    h.session.stop();
}

#[tokio::test]
async fn remote_hangup_reports_a_clean_end() {
    let h = harness();
    h.session.start().expect("start");
    let mut status_rx = h.session.subscribe_status();
    let tx = h.events.lock().clone().expect("captured sender");

    tx.send(SessionEvent::Opened).await.expect("open");
    tx.send(SessionEvent::Closed).await.expect("close");
    wait_until(|| h.session.phase() == SessionPhase::Disconnected).await;

    let mut messages = Vec::new();
    while let Ok(event) = status_rx.try_recv() {
        if let Some(message) = event.message {
            messages.push(message);
        }
    }
    assert!(messages.iter().any(|m| m == "Mentor is listening..."));
    assert!(messages.iter().any(|m| m == "Mentor session ended"));
}

#[tokio::test]
async fn each_start_hands_the_microphone_a_fresh_liveness_flag() {
    let flags: Arc<Mutex<Vec<Arc<AtomicBool>>>> = Arc::default();
    let session = MentorSession::new(
        SessionConfig::default(),
        Box::new(FakeConnector::default()),
        Box::new(RecordingMic {
            flags: Arc::clone(&flags),
        }),
        Box::new(RecordingSink::default()),
    );

    session.start().expect("start");
    session.stop();
    session.start().expect("restart");

    let seen = flags.lock();
    assert_eq!(seen.len(), 2);
    assert!(
        !seen[0].load(Ordering::SeqCst),
        "the stopped session's capture must have been released"
    );
    assert!(seen[1].load(Ordering::SeqCst));
    assert!(
        !Arc::ptr_eq(&seen[0], &seen[1]),
        "a restart must not re-arm the previous session's flag"
    );
    drop(seen);
    session.stop();
}

#[tokio::test]
async fn unresponsive_endpoint_times_out_and_tears_down() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");

    // Accept the TCP connection but never answer the websocket upgrade.
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = SessionConfig {
        connect_timeout: Duration::from_millis(200),
        ..SessionConfig::default()
    };
    let connector =
        WsConnector::new("test-key", config.connect_timeout).with_endpoint(format!("ws://{addr}"));
    let session = MentorSession::new(
        config,
        Box::new(connector),
        Box::new(NullMic { fail: false }),
        Box::new(RecordingSink::default()),
    );
    let mut status_rx = session.subscribe_status();

    session.start().expect("start");
    assert_eq!(session.phase(), SessionPhase::Connecting);

    wait_until(|| session.phase() == SessionPhase::Disconnected).await;
    assert_eq!(session.diagnostics_snapshot().teardowns, 1);

    let mut messages = Vec::new();
    while let Ok(event) = status_rx.try_recv() {
        if let Some(message) = event.message {
            messages.push(message);
        }
    }
    assert!(messages
        .iter()
        .any(|m| m == "Connection error. Please start a new session."));
}
