//! Single-consumer event loop driving one live session.
//!
//! Every producer (capture thread, transport reader, playback timers) feeds
//! the same bounded queue; this task is the only consumer. State transitions
//! therefore happen in queue order and no producer can observe a
//! half-applied transition.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    events::SessionPhase,
    session::{
        SessionShared, STATUS_ENDED, STATUS_ERROR, STATUS_LISTENING, STATUS_SPEAKING,
    },
    wire::{pcm, RealtimeInput, ServerMessage},
};

/// Everything that can happen to a live session, in queue order.
#[derive(Debug)]
pub enum SessionEvent {
    /// Transport negotiation finished; the conversation is live.
    Opened,
    /// One 16 kHz mono capture frame from the microphone.
    CaptureFrame(Vec<f32>),
    /// One parsed message from the remote endpoint.
    Inbound(ServerMessage),
    /// A scheduled output chunk reached the end of its play window.
    PlaybackDone { chunk: u64, epoch: u64 },
    /// The transport failed; `detail` is for the log, not the user.
    TransportError(String),
    /// The transport closed cleanly (remote hangup).
    Closed,
    /// `stop()` was called; wake up and exit.
    Stop,
}

pub(crate) struct LoopContext {
    pub shared: Arc<SessionShared>,
    /// This generation's liveness flag. Once false the loop drains nothing
    /// further, even if a newer session has already re-armed the shared
    /// state.
    pub live: Arc<AtomicBool>,
    pub events_rx: mpsc::Receiver<SessionEvent>,
    /// Handed to playback completion timers.
    pub events_tx: mpsc::Sender<SessionEvent>,
}

/// Drain the session queue until teardown.
pub(crate) async fn run(mut ctx: LoopContext) {
    // Zero point of the playback engine clock for this session.
    let started_at = Instant::now();

    while let Some(event) = ctx.events_rx.recv().await {
        if !ctx.live.load(Ordering::SeqCst) {
            break;
        }

        match event {
            SessionEvent::Opened => {
                ctx.shared.set_phase(SessionPhase::Active, Some(STATUS_LISTENING));
                debug!("session active");
            }

            SessionEvent::CaptureFrame(samples) => {
                if ctx.shared.muted.load(Ordering::SeqCst) {
                    ctx.shared
                        .diagnostics
                        .frames_muted
                        .fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let frame = RealtimeInput::audio_frame(&samples);
                let sent = ctx
                    .shared
                    .transport
                    .lock()
                    .as_mut()
                    .map(|t| t.send_realtime(frame))
                    .unwrap_or(Ok(()));
                match sent {
                    Ok(()) => {
                        ctx.shared
                            .diagnostics
                            .frames_sent
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        ctx.shared
                            .diagnostics
                            .frames_dropped
                            .fetch_add(1, Ordering::Relaxed);
                        warn!(error = %e, "capture frame dropped");
                    }
                }
            }

            SessionEvent::Inbound(message) => {
                // Flush before scheduling: audio arriving alongside the
                // interrupt flag belongs to the new reply and must survive
                // the flush, not be cleared by it.
                if message.is_interrupted() {
                    handle_interruption(&ctx.shared);
                }
                if let Some(payload) = message.audio_payload() {
                    handle_audio_chunk(&mut ctx, payload, started_at);
                }
            }

            SessionEvent::PlaybackDone { chunk, epoch } => {
                // Timers armed before an interruption carry the old epoch.
                if epoch != ctx.shared.epoch.load(Ordering::SeqCst) {
                    continue;
                }
                let remaining = {
                    let mut scheduler = ctx.shared.scheduler.lock();
                    scheduler.complete(chunk);
                    scheduler.pending()
                };
                ctx.shared
                    .diagnostics
                    .chunks_completed
                    .fetch_add(1, Ordering::Relaxed);
                if remaining == 0 {
                    ctx.shared.set_status(STATUS_LISTENING);
                }
            }

            SessionEvent::TransportError(detail) => {
                warn!(detail, "transport failed");
                ctx.shared.teardown(STATUS_ERROR);
                break;
            }

            SessionEvent::Closed => {
                ctx.shared.teardown(STATUS_ENDED);
                break;
            }

            SessionEvent::Stop => break,
        }
    }
    debug!("session event loop exited");
}

/// Barge-in: flush everything queued and reset the timeline to zero.
fn handle_interruption(shared: &SessionShared) {
    shared.epoch.fetch_add(1, Ordering::SeqCst);
    let cleared = shared.scheduler.lock().interrupt();
    shared.sink.lock().stop_all();
    shared
        .diagnostics
        .interruptions
        .fetch_add(1, Ordering::Relaxed);
    debug!(cleared_chunks = cleared, "barge-in flush");
    shared.set_status(STATUS_LISTENING);
}

/// Decode, schedule, and start one inbound audio chunk, arming a completion
/// timer for the end of its play window.
fn handle_audio_chunk(ctx: &mut LoopContext, payload: &str, started_at: Instant) {
    let samples = match pcm::decode_payload(payload) {
        Ok(samples) if !samples.is_empty() => samples,
        Ok(_) => return,
        Err(e) => {
            ctx.shared
                .diagnostics
                .decode_errors
                .fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "dropping malformed audio chunk");
            return;
        }
    };

    let now = started_at.elapsed().as_secs_f64();
    let duration = pcm::duration_secs(samples.len(), pcm::OUTPUT_SAMPLE_RATE);

    let (chunk, start, was_idle) = {
        let mut scheduler = ctx.shared.scheduler.lock();
        let was_idle = !scheduler.is_speaking();
        let (chunk, start) = scheduler.schedule(now, duration);
        (chunk, start, was_idle)
    };

    {
        let mut sink = ctx.shared.sink.lock();
        // Teardown may have landed between scheduling and here; its
        // stop_all must be the last thing the sink ever hears, so the
        // chunk is discarded instead of appended behind it.
        if !ctx.live.load(Ordering::SeqCst) {
            drop(sink);
            ctx.shared.scheduler.lock().interrupt();
            return;
        }
        if let Err(e) = sink.play(samples, pcm::OUTPUT_SAMPLE_RATE) {
            drop(sink);
            warn!(error = %e, "playback sink rejected chunk");
            // Nothing will play, so the timeline must not hold the slot.
            ctx.shared.scheduler.lock().retract_last(chunk);
            return;
        }
    }

    ctx.shared
        .diagnostics
        .chunks_scheduled
        .fetch_add(1, Ordering::Relaxed);
    if was_idle {
        ctx.shared.set_status(STATUS_SPEAKING);
    }

    let deadline = started_at + Duration::from_secs_f64(start + duration);
    let epoch = ctx.shared.epoch.load(Ordering::SeqCst);
    let done_tx = ctx.events_tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let _ = done_tx.try_send(SessionEvent::PlaybackDone { chunk, epoch });
    });
}
