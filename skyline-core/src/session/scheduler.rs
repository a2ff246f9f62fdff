//! Playback timeline bookkeeping.
//!
//! The scheduler owns a single "next start offset" shared by all output
//! chunks plus the set of chunks currently scheduled. A chunk arriving while
//! nothing is queued starts now; otherwise it starts exactly where the
//! previous chunk ends. This yields strict FIFO, gap-free, non-overlapping
//! playback without ever inspecting the audio itself.
//!
//! Barge-in clears the pending set and zeroes the timeline so the next chunk
//! plays immediately rather than after stale scheduled time.
//!
//! All times are seconds on the session's playback engine clock. The
//! scheduler is pure bookkeeping; the event loop supplies `now` and forwards
//! samples to the actual sink.

use std::collections::HashMap;

/// A chunk currently scheduled or playing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    /// Start offset on the engine clock (seconds).
    pub start: f64,
    /// Playback duration (seconds).
    pub duration: f64,
}

/// Tracks the playback timeline and the pending-chunk set.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: f64,
    next_id: u64,
    pending: HashMap<u64, ScheduledChunk>,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a chunk of `duration` seconds given the engine clock `now`.
    ///
    /// Returns the chunk id and its start offset: `max(next_start, now)`.
    /// Advances the timeline by `duration`.
    pub fn schedule(&mut self, now: f64, duration: f64) -> (u64, f64) {
        let start = self.next_start.max(now);
        self.next_start = start + duration;

        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, ScheduledChunk { start, duration });
        (id, start)
    }

    /// Mark a chunk as finished playing. Returns `false` for ids already
    /// cleared by an interruption or teardown.
    pub fn complete(&mut self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Take back the most recently scheduled chunk and rewind the timeline
    /// to its start, as if it had never been scheduled. For chunks the sink
    /// refused; anything scheduled after it would be misplaced, so callers
    /// retract before scheduling the next chunk.
    pub fn retract_last(&mut self, id: u64) -> bool {
        if let Some(chunk) = self.pending.remove(&id) {
            self.next_start = chunk.start;
            true
        } else {
            false
        }
    }

    /// Barge-in or teardown: drop every pending chunk and zero the timeline.
    ///
    /// Returns how many chunks were cleared.
    pub fn interrupt(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        self.next_start = 0.0;
        cleared
    }

    /// Number of chunks scheduled but not yet completed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether synthesized output is currently queued or playing.
    pub fn is_speaking(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Current timeline marker (seconds).
    pub fn next_start(&self) -> f64 {
        self.next_start
    }
}
