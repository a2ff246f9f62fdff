//! Outward status surface consumed by the embedding UI layer.
//!
//! This is the only thing a session exposes to the outside: its phase and a
//! short human-readable status line. No raw audio and no transcripts cross
//! this boundary.

use serde::{Deserialize, Serialize};

/// Connection phase of a [`MentorSession`](crate::MentorSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// No session in progress; `start()` may be called.
    Disconnected,
    /// `start()` accepted; waiting for the remote endpoint to open.
    Connecting,
    /// Duplex conversation running (capturing and playing audio).
    Active,
    /// Teardown in progress. Transient; never broadcast.
    Closing,
}

/// Broadcast whenever the phase or the status line changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub phase: SessionPhase,
    /// Human-readable status line (e.g. "Mentor is listening...").
    pub message: Option<String>,
}
