//! Microphone level metering for UI feedback.
//!
//! Mirrors a browser analyser node: Blackman window, smoothed magnitude per
//! bin, decibels mapped onto a byte-like `[0, 1]` scale, averaged across bins.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// FFT window length.
pub const METER_FFT_SIZE: usize = 256;

const SMOOTHING: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

pub struct LevelMeter {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl LevelMeter {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(METER_FFT_SIZE);

        let n = METER_FFT_SIZE as f32;
        let window = (0..METER_FFT_SIZE)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            fft,
            window,
            smoothed: vec![0.0; METER_FFT_SIZE / 2],
            buffer: vec![Complex::new(0.0, 0.0); METER_FFT_SIZE],
        }
    }

    /// Feed one capture frame and return the current level in `[0, 1]`.
    ///
    /// Only the most recent [`METER_FFT_SIZE`] samples are analysed; shorter
    /// frames are zero-padded at the front.
    pub fn process(&mut self, samples: &[f32]) -> f32 {
        let tail = &samples[samples.len().saturating_sub(METER_FFT_SIZE)..];
        let pad = METER_FFT_SIZE - tail.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            *slot = Complex::new(s * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        let n = METER_FFT_SIZE as f32;
        let mut total = 0.0;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.buffer[bin].norm() / n;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;

            let db = if *smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                MIN_DECIBELS
            };
            total += ((db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS)).clamp(0.0, 1.0);
        }

        total / self.smoothed.len() as f32
    }

    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|s| *s = 0.0);
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}
