//! Microphone capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! The callback therefore writes straight into an SPSC ring buffer producer
//! whose `push_slice` is lock-free and allocation-free. A separate drain
//! thread owns the consumer half, resamples to 16 kHz, slices the stream
//! into fixed frames, and hands each frame to the session event queue.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). The stream is therefore created and dropped inside one
//! `spawn_blocking` closure; `MicSource::open` only returns once that thread
//! has confirmed the device opened.

pub mod playback;
pub mod resample;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ringbuf::{traits::Split, HeapRb};
use tokio::sync::mpsc;

pub use ringbuf::traits::{Consumer, Producer};

use crate::{
    error::Result,
    session::{event_loop::SessionEvent, SessionDiagnostics},
};

/// Producer half — held by the audio callback thread.
pub type CaptureProducer = ringbuf::HeapProd<f32>;

/// Consumer half — held by the drain thread.
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity: 2^18 = 262 144 f32 samples ≈ 5.5 s at 48 kHz. Plenty of
/// slack for a drain thread that wakes every few milliseconds.
pub const RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}

/// Source of 16 kHz mono capture frames.
///
/// Implementations own their threads and devices. `open` may block only for
/// device acquisition, and that wait must be bounded: a wedged audio host
/// returns an error rather than hanging the caller. Once `open` returns
/// `Ok`, frames of exactly `frame_samples` samples flow into `events` until
/// `live` goes false, at which point all resources are released. `live`
/// belongs to one session only; a restarted session hands the implementation
/// a fresh flag.
pub trait MicSource: Send + Sync + 'static {
    fn open(
        &self,
        events: mpsc::Sender<SessionEvent>,
        live: Arc<AtomicBool>,
        diagnostics: Arc<SessionDiagnostics>,
        frame_samples: usize,
    ) -> Result<()>;
}

/// Interleave-aware downmix: average every `channels`-sample frame of `data`
/// into one f32 appended to `out`. `to_f32` lifts the device sample type.
fn downmix_into<T: Copy>(
    data: &[T],
    channels: usize,
    out: &mut Vec<f32>,
    to_f32: impl Fn(T) -> f32,
) {
    let frames = data.len() / channels;
    out.clear();
    out.reserve(frames);
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
        out.push(sum / channels as f32);
    }
}

/// System default microphone via cpal.
#[cfg(feature = "audio-native")]
pub struct CpalMic;

#[cfg(feature = "audio-native")]
mod cpal_mic {
    use super::*;
    use crate::error::SessionError;
    use crate::session::event_loop::SessionEvent;
    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        SampleFormat, SampleRate, Stream, StreamConfig,
    };
    use resample::UplinkResampler;
    use std::sync::mpsc::RecvTimeoutError;
    use std::time::Duration;
    use tokio::sync::mpsc::error::TrySendError;
    use tracing::{error, info, warn};

    /// Samples popped from the ring per drain iteration.
    const DRAIN_CHUNK: usize = 960;
    /// Drain thread sleep when the ring is empty.
    const DRAIN_IDLE: Duration = Duration::from_millis(5);
    /// Upper bound on the device-open confirmation wait.
    const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

    impl MicSource for CpalMic {
        fn open(
            &self,
            events: mpsc::Sender<SessionEvent>,
            live: Arc<AtomicBool>,
            diagnostics: Arc<SessionDiagnostics>,
            frame_samples: usize,
        ) -> Result<()> {
            let (producer, consumer) = create_capture_ring();

            // Sync oneshot: the capture thread signals open success/failure
            // back to the caller, carrying the device sample rate.
            let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

            tokio::task::spawn_blocking(move || {
                // The stream must be created and dropped on THIS thread.
                let capture = match CaptureStream::open_default(producer, Arc::clone(&live)) {
                    Ok(c) => {
                        let _ = open_tx.send(Ok(c.sample_rate));
                        c
                    }
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                drain_loop(
                    consumer,
                    capture.sample_rate,
                    events,
                    Arc::clone(&live),
                    diagnostics,
                    frame_samples,
                );

                // Stream drops here, releasing the device on this thread.
                drop(capture);
            });

            match open_rx.recv_timeout(OPEN_TIMEOUT) {
                Ok(Ok(rate)) => {
                    info!(device_rate = rate, "microphone opened");
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                Err(RecvTimeoutError::Timeout) => Err(SessionError::AudioDevice(format!(
                    "audio host did not open the device within {OPEN_TIMEOUT:?}"
                ))),
                Err(RecvTimeoutError::Disconnected) => Err(SessionError::Permission(
                    "capture thread died before opening the device".into(),
                )),
            }
        }
    }

    /// Pop device-rate samples from the ring, resample to 16 kHz, slice into
    /// fixed frames, and queue them. Exits when `live` goes false or the
    /// session queue closes.
    fn drain_loop(
        mut consumer: CaptureConsumer,
        device_rate: u32,
        events: mpsc::Sender<SessionEvent>,
        live: Arc<AtomicBool>,
        diagnostics: Arc<SessionDiagnostics>,
        frame_samples: usize,
    ) {
        let mut resampler = match UplinkResampler::new(device_rate) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "resampler init failed, capture aborted");
                return;
            }
        };

        let mut raw = vec![0f32; DRAIN_CHUNK];
        let mut frame_buf: Vec<f32> = Vec::with_capacity(frame_samples * 2);

        while live.load(Ordering::SeqCst) {
            let popped = consumer.pop_slice(&mut raw);
            if popped == 0 {
                std::thread::sleep(DRAIN_IDLE);
                continue;
            }

            frame_buf.extend(resampler.convert(&raw[..popped]));

            while frame_buf.len() >= frame_samples {
                let frame: Vec<f32> = frame_buf.drain(..frame_samples).collect();
                match events.try_send(SessionEvent::CaptureFrame(frame)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        // Drop-newest: never block the drain thread on a
                        // congested session queue.
                        diagnostics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Closed(_)) => return,
                }
            }
        }
    }

    /// Handle to an active input stream.
    ///
    /// **Not `Send`** — bound to its creation thread on Windows/macOS.
    struct CaptureStream {
        /// Kept alive so the stream is not dropped prematurely.
        _stream: Stream,
        /// Actual capture sample rate reported by the device (Hz).
        sample_rate: u32,
    }

    impl CaptureStream {
        /// Open the system default microphone and push f32 mono samples into
        /// `producer`. Multi-channel devices are mixed down in the callback.
        ///
        /// # Errors
        /// `SessionError::Permission` when no device is available or the OS
        /// refuses access, `SessionError::AudioStream` for format problems.
        fn open_default(mut producer: CaptureProducer, live: Arc<AtomicBool>) -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_input_device()
                .ok_or_else(|| SessionError::Permission("no default input device".into()))?;

            info!(
                device = device.name().unwrap_or_default().as_str(),
                "opening input device"
            );

            let supported = device
                .default_input_config()
                .map_err(|e| SessionError::Permission(e.to_string()))?;

            let sample_rate = supported.sample_rate().0;
            let channels = supported.channels();
            let config = StreamConfig {
                channels,
                sample_rate: SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let live_f32 = Arc::clone(&live);
            let live_i16 = Arc::clone(&live);

            let stream = match supported.sample_format() {
                SampleFormat::F32 => {
                    let ch = channels as usize;
                    let mut mix_buf: Vec<f32> = Vec::new();
                    device.build_input_stream(
                        &config,
                        move |data: &[f32], _info| {
                            if !live_f32.load(Ordering::Relaxed) {
                                return;
                            }
                            // Mono f32 needs no conversion at all.
                            let written = if ch == 1 {
                                producer.push_slice(data)
                            } else {
                                downmix_into(data, ch, &mut mix_buf, |s| s);
                                producer.push_slice(&mix_buf)
                            };
                            let expected = data.len() / ch;
                            if written < expected {
                                warn!("ring buffer full: dropped {} frames", expected - written);
                            }
                        },
                        |err| error!("audio stream error: {err}"),
                        None,
                    )
                }

                SampleFormat::I16 => {
                    let ch = channels as usize;
                    let mut mix_buf: Vec<f32> = Vec::new();
                    device.build_input_stream(
                        &config,
                        move |data: &[i16], _info| {
                            if !live_i16.load(Ordering::Relaxed) {
                                return;
                            }
                            downmix_into(data, ch, &mut mix_buf, |s| s as f32 / 32768.0);
                            let written = producer.push_slice(&mix_buf);
                            if written < mix_buf.len() {
                                warn!(
                                    "ring buffer full: dropped {} frames",
                                    mix_buf.len() - written
                                );
                            }
                        },
                        |err| error!("audio stream error: {err}"),
                        None,
                    )
                }

                fmt => {
                    return Err(SessionError::AudioStream(format!(
                        "unsupported sample format: {fmt:?}"
                    )))
                }
            }
            .map_err(|e| SessionError::AudioStream(e.to_string()))?;

            stream
                .play()
                .map_err(|e| SessionError::AudioStream(e.to_string()))?;

            Ok(Self {
                _stream: stream,
                sample_rate,
            })
        }
    }
}
