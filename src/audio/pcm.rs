//! PCM16 sample conversion and the base64 transport encoding.
//!
//! Captured audio is normalized `f32` in `[-1, 1]`; the wire carries
//! little-endian signed 16-bit PCM wrapped in standard base64.

use crate::error::{Result, VoiceError};
use base64::Engine;

/// Convert normalized float samples to PCM16.
///
/// Samples are clamped to `[-1, 1]`. Negative values scale by 32768 and
/// non-negative values by 32767 so both ends of the `i16` range are reachable.
pub fn float_to_int16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let s = s.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

/// Inverse of [`float_to_int16`].
pub fn int16_to_float(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&s| {
            if s < 0 {
                s as f32 / 32768.0
            } else {
                s as f32 / 32767.0
            }
        })
        .collect()
}

/// Serialize PCM16 samples as little-endian bytes.
pub fn int16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parse little-endian PCM16 bytes. An odd byte count is malformed.
pub fn bytes_to_int16(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Decode(format!(
            "PCM16 payload has odd length ({} bytes)",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

pub fn encode_for_transport(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_from_transport(text: &str) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
}

/// Float samples → PCM16 → base64, as sent on the outbound audio path.
pub fn encode_samples(samples: &[f32]) -> String {
    encode_for_transport(&int16_to_bytes(&float_to_int16(samples)))
}

/// base64 → PCM16 → float samples, as received on the inbound audio path.
pub fn decode_samples(text: &str) -> Result<Vec<f32>> {
    let bytes = decode_from_transport(text)?;
    Ok(int16_to_float(&bytes_to_int16(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_int16_extremes() {
        assert_eq!(float_to_int16(&[-1.0, 0.0, 1.0]), vec![i16::MIN, 0, i16::MAX]);
    }

    #[test]
    fn test_float_to_int16_clamps_out_of_range() {
        assert_eq!(float_to_int16(&[-3.5, 2.0]), vec![i16::MIN, i16::MAX]);
    }

    #[test]
    fn test_int16_to_float_asymmetric_scaling() {
        let out = int16_to_float(&[i16::MIN, -16384, 0, i16::MAX]);
        assert_eq!(out, vec![-1.0, -0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_odd_length_payload_is_decode_error() {
        let err = bytes_to_int16(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn test_malformed_base64_is_decode_error() {
        let err = decode_from_transport("not base64!!").unwrap_err();
        assert!(matches!(err, VoiceError::Decode(_)));
    }

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(int16_to_bytes(&[0x0102, -2]), vec![0x02, 0x01, 0xFE, 0xFF]);
    }
}
