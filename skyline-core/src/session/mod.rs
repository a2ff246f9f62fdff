//! `MentorSession`: top-level lifecycle controller for one duplex voice
//! conversation.
//!
//! ## Lifecycle
//!
//! ```text
//! MentorSession::new()
//!     └─► start()       → mic opened, connection opening, phase = Connecting
//!         └─► (onopen)  → phase = Active, capture frames streaming
//!             └─► stop()/onerror/onclose → teardown, phase = Disconnected
//! ```
//!
//! Sessions are reusable: `Disconnected` is both the initial and the
//! terminal phase, and `start()` may be called again after any teardown.
//! A second `start()` while a session is live is rejected with
//! [`SessionError::AlreadyActive`] rather than implicitly restarting.
//!
//! ## Event model
//!
//! Every downstream effect (connection open, inbound audio, playback
//! completion, transport failure) arrives as a [`SessionEvent`] on one
//! single-consumer queue drained by [`event_loop::run`]. Capture, network,
//! and playback producers only ever `try_send` into that queue, so ordering
//! is the queue order and no callback can block another.
//!
//! `stop()` is synchronous from the caller's perspective: the pending set is
//! cleared, the sink silenced, and the transport closed before it returns,
//! even though device release happens on the audio thread.

pub mod event_loop;
pub mod scheduler;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

use crate::{
    audio::{playback::PlaybackSink, MicSource},
    error::{Result, SessionError},
    events::{SessionPhase, SessionStatusEvent},
    session::event_loop::SessionEvent,
    session::scheduler::PlaybackScheduler,
    transport::{LiveConnector, LiveTransport},
    wire::SetupRequest,
};

/// Broadcast capacity for status events.
const STATUS_BROADCAST_CAP: usize = 64;

pub const STATUS_CONNECTING: &str = "Connecting to AI Mentor...";
pub const STATUS_LISTENING: &str = "Mentor is listening...";
pub const STATUS_SPEAKING: &str = "Mentor is speaking...";
pub const STATUS_ENDED: &str = "Mentor session ended";
pub const STATUS_ERROR: &str = "Connection error. Please start a new session.";
pub const STATUS_MIC_FAILED: &str = "Could not access the microphone";

/// Configuration for a [`MentorSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote conversational model identifier.
    pub model: String,
    /// Prebuilt voice identity for synthesized replies.
    pub voice_name: String,
    /// Mentor persona given to the endpoint at negotiation time.
    pub system_instruction: String,
    /// Bound on connection establishment; expiry tears the session down.
    pub connect_timeout: Duration,
    /// Samples per outbound capture frame at 16 kHz (2048 = 128 ms).
    pub capture_frame_samples: usize,
    /// Session event queue depth. When full, capture frames are dropped
    /// (drop-newest) rather than blocking any producer.
    pub event_queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice_name: "Zephyr".to_string(),
            system_instruction: "You are an expert IT instructor and career mentor for \
                 Tech Skyline IT Solutions. You help learners with roadmaps, technical labs, \
                 and future technology trends. Be encouraging, precise, and professional. \
                 You have deep expertise in Cybersecurity, Cloud, DevOps, AI, and Quantum \
                 Computing."
                .to_string(),
            connect_timeout: Duration::from_secs(10),
            capture_frame_samples: 2_048,
            event_queue_capacity: 256,
        }
    }
}

/// Shared counters for observability. Reset on every `start()`.
#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    pub frames_sent: AtomicUsize,
    pub frames_muted: AtomicUsize,
    pub frames_dropped: AtomicUsize,
    pub chunks_scheduled: AtomicUsize,
    pub chunks_completed: AtomicUsize,
    pub decode_errors: AtomicUsize,
    pub interruptions: AtomicUsize,
    pub teardowns: AtomicUsize,
}

impl SessionDiagnostics {
    pub fn reset(&self) {
        self.frames_sent.store(0, Ordering::Relaxed);
        self.frames_muted.store(0, Ordering::Relaxed);
        self.frames_dropped.store(0, Ordering::Relaxed);
        self.chunks_scheduled.store(0, Ordering::Relaxed);
        self.chunks_completed.store(0, Ordering::Relaxed);
        self.decode_errors.store(0, Ordering::Relaxed);
        self.interruptions.store(0, Ordering::Relaxed);
        // teardowns survives reset: it counts over the object's lifetime.
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_muted: self.frames_muted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            chunks_scheduled: self.chunks_scheduled.load(Ordering::Relaxed),
            chunks_completed: self.chunks_completed.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            interruptions: self.interruptions.load(Ordering::Relaxed),
            teardowns: self.teardowns.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub frames_sent: usize,
    pub frames_muted: usize,
    pub frames_dropped: usize,
    pub chunks_scheduled: usize,
    pub chunks_completed: usize,
    pub decode_errors: usize,
    pub interruptions: usize,
    pub teardowns: usize,
}

/// State shared between the session handle, the event loop, and producers.
pub(crate) struct SessionShared {
    /// Single-session guard. `true` from `start()` until teardown.
    pub running: AtomicBool,
    /// Liveness flag of the current session generation. Every `start()`
    /// installs a fresh flag; the event loop and the capture thread keep the
    /// clone they were started with, so anything left over from a stopped
    /// session observes `false` forever and can never touch its successor.
    pub live: Mutex<Arc<AtomicBool>>,
    /// Bumped on interruption and teardown; stale playback-completion timers
    /// carry the old value and are ignored.
    pub epoch: AtomicU64,
    pub muted: AtomicBool,
    pub phase: Mutex<SessionPhase>,
    pub scheduler: Mutex<PlaybackScheduler>,
    pub sink: Mutex<Box<dyn PlaybackSink>>,
    pub transport: Mutex<Option<Box<dyn LiveTransport>>>,
    pub status_tx: broadcast::Sender<SessionStatusEvent>,
    pub diagnostics: Arc<SessionDiagnostics>,
}

impl SessionShared {
    pub(crate) fn set_phase(&self, phase: SessionPhase, message: Option<&str>) {
        *self.phase.lock() = phase;
        let _ = self.status_tx.send(SessionStatusEvent {
            phase,
            message: message.map(ToOwned::to_owned),
        });
    }

    /// Update the status line without a phase change.
    pub(crate) fn set_status(&self, message: &str) {
        let phase = *self.phase.lock();
        let _ = self.status_tx.send(SessionStatusEvent {
            phase,
            message: Some(message.to_string()),
        });
    }

    /// Release everything the session owns. Runs the expensive half at most
    /// once per session; repeated calls only re-assert `Disconnected`.
    pub(crate) fn teardown(&self, message: &str) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        if was_running {
            self.live.lock().store(false, Ordering::SeqCst);
            *self.phase.lock() = SessionPhase::Closing;
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if let Some(mut transport) = self.transport.lock().take() {
                transport.close();
            }
            self.sink.lock().stop_all();
            let cleared = self.scheduler.lock().interrupt();
            self.diagnostics.teardowns.fetch_add(1, Ordering::Relaxed);
            info!(cleared_chunks = cleared, "session teardown");
        }
        self.set_phase(SessionPhase::Disconnected, Some(message));
        was_running
    }
}

/// One duplex voice-conversation handle.
///
/// `MentorSession` is `Send + Sync`; all fields use interior mutability, so
/// it can live in an `Arc` shared between the UI layer and async tasks.
pub struct MentorSession {
    config: SessionConfig,
    connector: Box<dyn LiveConnector>,
    mic: Box<dyn MicSource>,
    shared: Arc<SessionShared>,
    /// Sender for the current session's event queue; dropped on teardown.
    events_tx: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

impl MentorSession {
    /// Create a session from explicit collaborators. Does not touch any
    /// device or network resource until `start()`.
    pub fn new(
        config: SessionConfig,
        connector: Box<dyn LiveConnector>,
        mic: Box<dyn MicSource>,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_BROADCAST_CAP);
        Self {
            config,
            connector,
            mic,
            shared: Arc::new(SessionShared {
                running: AtomicBool::new(false),
                live: Mutex::new(Arc::new(AtomicBool::new(false))),
                epoch: AtomicU64::new(0),
                muted: AtomicBool::new(false),
                phase: Mutex::new(SessionPhase::Disconnected),
                scheduler: Mutex::new(PlaybackScheduler::new()),
                sink: Mutex::new(sink),
                transport: Mutex::new(None),
                status_tx,
                diagnostics: Arc::new(SessionDiagnostics::default()),
            }),
            events_tx: Mutex::new(None),
        }
    }

    /// Create a session wired to the native microphone, the default output
    /// device, and the real streaming endpoint.
    #[cfg(feature = "audio-native")]
    pub fn with_native_audio(config: SessionConfig, api_key: impl Into<String>) -> Result<Self> {
        let connector = crate::transport::WsConnector::new(api_key, config.connect_timeout);
        let sink = crate::audio::playback::RodioSink::new()?;
        Ok(Self::new(
            config,
            Box::new(connector),
            Box::new(crate::audio::CpalMic),
            Box::new(sink),
        ))
    }

    /// Begin a new duplex conversation.
    ///
    /// Non-blocking beyond microphone acquisition: the connection proceeds
    /// asynchronously and all downstream effects arrive via status events.
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    /// - `SessionError::AlreadyActive` if a session is live or connecting.
    /// - `SessionError::Permission` if the microphone cannot be opened; no
    ///   connection is attempted in that case.
    /// - `SessionError::Connection` if the connection cannot be initiated.
    pub fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyActive);
        }

        // Fresh liveness flag for this generation; everything spawned below
        // holds a clone and dies with it.
        let live = Arc::new(AtomicBool::new(true));
        *self.shared.live.lock() = Arc::clone(&live);

        self.shared.diagnostics.reset();
        self.shared.scheduler.lock().interrupt();
        self.shared
            .set_phase(SessionPhase::Connecting, Some(STATUS_CONNECTING));

        let (events_tx, events_rx) =
            mpsc::channel::<SessionEvent>(self.config.event_queue_capacity);

        // Microphone first: a permission failure must abort before any
        // connection attempt.
        if let Err(e) = self.mic.open(
            events_tx.clone(),
            Arc::clone(&live),
            Arc::clone(&self.shared.diagnostics),
            self.config.capture_frame_samples,
        ) {
            live.store(false, Ordering::SeqCst);
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared
                .set_phase(SessionPhase::Disconnected, Some(STATUS_MIC_FAILED));
            return Err(e);
        }

        let setup = SetupRequest {
            model: self.config.model.clone(),
            voice_name: self.config.voice_name.clone(),
            system_instruction: self.config.system_instruction.clone(),
        };

        match self.connector.connect(setup, events_tx.clone()) {
            Ok(transport) => {
                *self.shared.transport.lock() = Some(transport);
            }
            Err(e) => {
                self.shared.teardown(STATUS_ERROR);
                return Err(e);
            }
        }

        *self.events_tx.lock() = Some(events_tx.clone());

        info!(model = %self.config.model, "mentor session starting");
        tokio::spawn(event_loop::run(event_loop::LoopContext {
            shared: Arc::clone(&self.shared),
            live,
            events_rx,
            events_tx,
        }));

        Ok(())
    }

    /// End the session. Idempotent and safe from any phase, including
    /// mid-`Connecting`: the transport is closed, all pending playback is
    /// halted and discarded, the timeline is zeroed, and the microphone is
    /// signalled to release.
    pub fn stop(&self) {
        if let Some(tx) = self.events_tx.lock().take() {
            // Wakes the loop if it is parked; a full queue means it is about
            // to wake anyway and will observe its live flag as false.
            let _ = tx.try_send(SessionEvent::Stop);
        }
        self.shared.teardown(STATUS_ENDED);
    }

    /// Toggle whether captured frames are transmitted. Capture continues
    /// locally while muted (no device re-negotiation); frames are dropped at
    /// the next frame boundary instead of being sent.
    pub fn set_muted(&self, muted: bool) {
        self.shared.muted.store(muted, Ordering::SeqCst);
        info!(muted, "session mute toggled");
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::SeqCst)
    }

    /// Current connection phase (snapshot).
    pub fn phase(&self) -> SessionPhase {
        *self.shared.phase.lock()
    }

    /// Number of output chunks scheduled but not yet finished.
    pub fn pending_playback(&self) -> usize {
        self.shared.scheduler.lock().pending()
    }

    /// Subscribe to phase/status-line changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.shared.status_tx.subscribe()
    }

    /// Snapshot of session counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }
}

impl Drop for MentorSession {
    fn drop(&mut self) {
        if self.shared.running.load(Ordering::SeqCst) {
            self.stop();
        }
    }
}
