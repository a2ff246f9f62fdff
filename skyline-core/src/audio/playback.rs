//! Synthesized-speech playback through the default output device.
//!
//! rodio's `OutputStream` is `!Send`, so `RodioSink` parks it on a dedicated
//! thread and talks to it over a command channel. Appended buffers queue
//! back-to-back inside one rodio `Sink`, which matches the session's
//! gap-free FIFO timeline; `stop_all` maps to `Sink::stop()`, which empties
//! the queue and silences the device in one call.

use crate::error::Result;

/// Where decoded 24 kHz mono chunks go.
///
/// `play` must queue the chunk strictly after everything already queued and
/// return without waiting for playback. `stop_all` discards everything
/// queued or playing; it is the barge-in kill switch and must be cheap.
pub trait PlaybackSink: Send + 'static {
    fn play(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()>;
    fn stop_all(&mut self);
}

#[cfg(feature = "audio-native")]
pub use native::RodioSink;

#[cfg(feature = "audio-native")]
mod native {
    use super::PlaybackSink;
    use crate::error::{Result, SessionError};
    use rodio::buffer::SamplesBuffer;
    use rodio::{OutputStream, Sink};
    use std::sync::mpsc::{self, Sender};
    use tracing::{debug, error};

    enum SinkCmd {
        Play(Vec<f32>, u32),
        StopAll,
        Shutdown,
    }

    /// Default output device behind a dedicated playback thread.
    pub struct RodioSink {
        cmd_tx: Sender<SinkCmd>,
    }

    impl RodioSink {
        /// Open the default output device.
        ///
        /// # Errors
        /// `SessionError::AudioDevice` if no output device is available.
        pub fn new() -> Result<Self> {
            let (cmd_tx, cmd_rx) = mpsc::channel::<SinkCmd>();
            let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<(), String>>();

            std::thread::Builder::new()
                .name("skyline-playback".into())
                .spawn(move || {
                    // OutputStream must live on this thread for the sink's
                    // whole lifetime.
                    let (_stream, handle) = match OutputStream::try_default() {
                        Ok(pair) => pair,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    let sink = match Sink::try_new(&handle) {
                        Ok(s) => s,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    let _ = ready_tx.send(Ok(()));

                    while let Ok(cmd) = cmd_rx.recv() {
                        match cmd {
                            SinkCmd::Play(samples, rate) => {
                                sink.append(SamplesBuffer::new(1, rate, samples));
                            }
                            SinkCmd::StopAll => sink.stop(),
                            SinkCmd::Shutdown => break,
                        }
                    }
                    debug!("playback thread exited");
                })
                .map_err(|e| SessionError::AudioDevice(format!("playback thread: {e}")))?;

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Self { cmd_tx }),
                Ok(Err(e)) => Err(SessionError::AudioDevice(e)),
                Err(_) => Err(SessionError::AudioDevice(
                    "playback thread died during setup".into(),
                )),
            }
        }
    }

    impl PlaybackSink for RodioSink {
        fn play(&mut self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
            self.cmd_tx
                .send(SinkCmd::Play(samples, sample_rate))
                .map_err(|_| SessionError::AudioDevice("playback thread gone".into()))
        }

        fn stop_all(&mut self) {
            if self.cmd_tx.send(SinkCmd::StopAll).is_err() {
                error!("playback thread gone, cannot flush");
            }
        }
    }

    impl Drop for RodioSink {
        fn drop(&mut self) {
            let _ = self.cmd_tx.send(SinkCmd::Shutdown);
        }
    }
}
