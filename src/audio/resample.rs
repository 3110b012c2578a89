//! Nearest-index sample rate conversion.
//!
//! There is no anti-aliasing filter: downsampling folds energy above the new
//! Nyquist frequency back into the band. Speech at 16 kHz tolerates this, and
//! adding a filter would change the samples we put on the wire.

use std::borrow::Cow;

/// Resample `samples` from `from_rate` to `to_rate` by picking the nearest
/// source index for every output index.
///
/// Equal rates (or a zero rate) return the input borrowed and untouched.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Cow<'_, [f32]> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return Cow::Borrowed(samples);
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio).round() as usize;
    let last = samples.len() - 1;

    let out = (0..new_len)
        .map(|i| {
            let idx = ((i as f64 * ratio).round() as usize).min(last);
            samples[idx]
        })
        .collect();

    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_borrows() {
        let input = [0.1, 0.2, 0.3];
        assert!(matches!(resample(&input, 16000, 16000), Cow::Borrowed(_)));
    }

    #[test]
    fn test_decimation_by_three() {
        let input: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let out = resample(&input, 48000, 16000);
        assert_eq!(out.as_ref(), &[0.0, 3.0, 6.0]);
    }

    #[test]
    fn test_upsampling_repeats_nearest() {
        let out = resample(&[1.0, 2.0], 8000, 16000);
        // indices round(0), round(0.5)=1, round(1.0)=1, round(1.5)=2 -> clamped to 1
        assert_eq!(out.as_ref(), &[1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_fractional_ratio_clamps_last_index() {
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let out = resample(&input, 44100, 16000);
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|s| *s <= 9.0));
    }
}
