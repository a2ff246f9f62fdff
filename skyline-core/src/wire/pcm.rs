//! PCM16LE wire codec.
//!
//! The endpoint speaks 16-bit signed little-endian PCM in base64: mono
//! 16 kHz on the uplink, mono 24 kHz on the downlink. Locally both paths are
//! normalized f32 in [-1.0, 1.0], so the codec is a scale-by-32768 in one
//! direction and a divide in the other. Input is normalized upstream, so the
//! only overflow case is exactly 1.0, which clamps to `i16::MAX` (one
//! quantization step of error).

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Result, SessionError};

/// Uplink (microphone) sample rate in Hz.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Downlink (synthesized speech) sample rate in Hz.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Format tag attached to every outbound frame.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Encode normalized f32 samples as base64 PCM16LE.
pub fn encode_frame(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let quantized = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    STANDARD.encode(&bytes)
}

/// Decode a base64 PCM16LE payload back to normalized f32 samples.
///
/// # Errors
/// Returns `SessionError::Decode` for invalid base64 or an odd byte count.
/// Callers isolate this per chunk; one bad payload never ends the session.
pub fn decode_payload(data: &str) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| SessionError::Decode(format!("invalid base64: {e}")))?;

    if bytes.len() % 2 != 0 {
        return Err(SessionError::Decode(format!(
            "odd byte count: {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Playback duration of `sample_count` mono samples at `sample_rate`.
pub fn duration_secs(sample_count: usize, sample_rate: u32) -> f64 {
    sample_count as f64 / sample_rate as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn round_trip_within_one_quantization_step() {
        let samples: Vec<f32> = (0..1024)
            .map(|i| ((i as f32 / 1024.0) * 2.0 - 1.0).clamp(-1.0, 1.0))
            .collect();

        let decoded = decode_payload(&encode_frame(&samples)).expect("decode own encoding");
        assert_eq!(decoded.len(), samples.len());
        for (original, restored) in samples.iter().zip(decoded.iter()) {
            assert_abs_diff_eq!(*original, *restored, epsilon = 1.0 / 32768.0);
        }
    }

    #[test]
    fn full_scale_positive_clamps_instead_of_wrapping() {
        let decoded = decode_payload(&encode_frame(&[1.0])).unwrap();
        assert_abs_diff_eq!(decoded[0], 1.0, epsilon = 1.0 / 32768.0);
        assert!(decoded[0] > 0.0, "1.0 must not wrap to a negative sample");
    }

    #[test]
    fn known_samples_encode_to_expected_le_bytes() {
        let encoded = encode_frame(&[0.0, -1.0]);
        let bytes = STANDARD.decode(encoded).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn rejects_invalid_base64_and_odd_lengths() {
        assert!(matches!(
            decode_payload("not//valid!!"),
            Err(SessionError::Decode(_))
        ));

        let odd = STANDARD.encode([0u8, 1, 2]);
        assert!(matches!(decode_payload(&odd), Err(SessionError::Decode(_))));
    }

    #[test]
    fn duration_matches_rate() {
        assert_abs_diff_eq!(duration_secs(24_000, OUTPUT_SAMPLE_RATE), 1.0);
        assert_abs_diff_eq!(duration_secs(2_400, OUTPUT_SAMPLE_RATE), 0.1);
    }
}
