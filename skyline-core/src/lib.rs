//! # skyline-core
//!
//! Real-time voice mentor session engine for Tech Skyline.
//!
//! One [`MentorSession`] runs a full-duplex audio conversation with a
//! streaming speech endpoint: the microphone is captured at the device rate,
//! resampled to 16 kHz mono, encoded as base64 PCM16LE, and transmitted;
//! synthesized 24 kHz replies are scheduled onto a gap-free playback
//! timeline and rendered through the default output device. Barge-in from
//! the remote endpoint flushes everything queued so the mentor never talks
//! over the user.
//!
//! ```text
//!  microphone ──► ring buffer ──► resample 16k ──► frame ──► base64 ─┐
//!                                                                    ▼
//!                                   session event queue ◄──── websocket
//!                                            │                     ▲
//!                 playback timeline ◄────────┤                     │
//!                        │                   └──── status events ──┘
//!                        ▼
//!                  output device (24 kHz FIFO)
//! ```
//!
//! All session state changes flow through one single-consumer event queue,
//! so capture, network, and playback can never race each other.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod error;
pub mod events;
pub mod session;
pub mod transport;
pub mod wire;

pub use audio::{playback::PlaybackSink, MicSource};
pub use error::{Result, SessionError};
pub use events::{SessionPhase, SessionStatusEvent};
pub use session::event_loop::SessionEvent;
pub use session::{DiagnosticsSnapshot, MentorSession, SessionConfig};
pub use transport::{LiveConnector, LiveTransport, WsConnector};
pub use wire::{RealtimeInput, ServerMessage, SetupRequest};

#[cfg(feature = "audio-native")]
pub use audio::playback::RodioSink;
#[cfg(feature = "audio-native")]
pub use audio::CpalMic;
