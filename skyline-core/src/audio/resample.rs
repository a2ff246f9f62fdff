//! Uplink rate conversion.
//!
//! Microphones deliver whatever rate the OS negotiated (48 kHz and 44.1 kHz
//! are typical); the wire wants 16 kHz mono. `UplinkResampler` owns that one
//! conversion: it is constructed from the device rate, always targets
//! [`INPUT_SAMPLE_RATE`](crate::wire::pcm::INPUT_SAMPLE_RATE), and becomes a
//! plain passthrough when the device already runs at 16 kHz.
//!
//! rubato's `FastFixedIn` wants fixed-size input blocks, so incoming samples
//! are staged until a block is full; the tail shorter than one block waits
//! for the next call. Conversion runs on the capture drain thread, never in
//! the real-time callback.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{info, warn};

use crate::error::{Result, SessionError};
use crate::wire::pcm::INPUT_SAMPLE_RATE;

/// Converts device-rate mono f32 capture to the 16 kHz uplink rate.
pub struct UplinkResampler {
    /// `None` when the device already captures at the uplink rate.
    inner: Option<FastFixedIn<f32>>,
    /// Staged input waiting to fill the next block.
    staged: Vec<f32>,
    /// Device samples per conversion block (10 ms of input).
    block: usize,
    /// Scratch output, `[1][output_frames_max]`, reused across calls.
    scratch: Vec<Vec<f32>>,
}

impl UplinkResampler {
    /// Build a converter for a device capturing at `device_rate` Hz.
    ///
    /// # Errors
    /// `SessionError::AudioDevice` when rubato rejects the rate pair.
    pub fn new(device_rate: u32) -> Result<Self> {
        if device_rate == INPUT_SAMPLE_RATE {
            return Ok(Self {
                inner: None,
                staged: Vec::new(),
                block: 0,
                scratch: Vec::new(),
            });
        }

        // 10 ms blocks keep staging latency well under one capture frame.
        let block = (device_rate / 100) as usize;
        let ratio = f64::from(INPUT_SAMPLE_RATE) / f64::from(device_rate);

        let inner = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, block, 1)
            .map_err(|e| SessionError::AudioDevice(format!("uplink resampler: {e}")))?;

        let scratch = vec![vec![0f32; inner.output_frames_max()]; 1];
        info!(device_rate, block, "uplink resampling enabled");

        Ok(Self {
            inner: Some(inner),
            staged: Vec::new(),
            block,
            scratch,
        })
    }

    /// Feed device samples; returns whatever 16 kHz output became available.
    ///
    /// Output length varies call to call: short inputs stage silently and a
    /// later call flushes several blocks at once.
    pub fn convert(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut inner) = self.inner else {
            return samples.to_vec();
        };

        self.staged.extend_from_slice(samples);

        let mut out = Vec::new();
        while self.staged.len() >= self.block {
            match inner.process_into_buffer(&[&self.staged[..self.block]], &mut self.scratch, None)
            {
                Ok((_consumed, produced)) => out.extend_from_slice(&self.scratch[0][..produced]),
                Err(e) => warn!(error = %e, "uplink conversion dropped a block"),
            }
            self.staged.drain(..self.block);
        }
        out
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_rate_device_needs_no_conversion() {
        let mut resampler = UplinkResampler::new(INPUT_SAMPLE_RATE).unwrap();
        assert!(resampler.is_passthrough());

        let ramp: Vec<f32> = (0..320).map(|i| i as f32 / 320.0).collect();
        assert_eq!(resampler.convert(&ramp), ramp);
    }

    #[test]
    fn one_second_of_device_audio_becomes_one_second_of_uplink() {
        for device_rate in [44_100u32, 48_000] {
            let mut resampler = UplinkResampler::new(device_rate).unwrap();
            assert!(!resampler.is_passthrough());

            // Feed a second of audio in uneven slices, the way cpal
            // callbacks actually arrive.
            let mut produced = 0usize;
            let mut remaining = device_rate as usize;
            for slice in [441usize, 1024, 100, 4096].iter().cycle() {
                let n = (*slice).min(remaining);
                produced += resampler.convert(&vec![0.25f32; n]).len();
                remaining -= n;
                if remaining == 0 {
                    break;
                }
            }

            let drift = produced.abs_diff(INPUT_SAMPLE_RATE as usize);
            assert!(
                drift <= 2 * (device_rate / 100) as usize,
                "rate {device_rate}: produced {produced} uplink samples"
            );
        }
    }

    #[test]
    fn short_input_stages_until_a_block_fills() {
        let mut resampler = UplinkResampler::new(48_000).unwrap();

        // 48 kHz blocks hold 480 samples; 300 is not enough.
        assert!(resampler.convert(&[0.0; 300]).is_empty());
        // 300 more crosses the boundary and flushes one block.
        assert!(!resampler.convert(&[0.0; 300]).is_empty());
    }
}
