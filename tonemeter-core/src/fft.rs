//! # Fast Fourier Transform (FFT) Module
//!
//! Converts a window of time-domain samples into smoothed byte magnitudes,
//! one per frequency bin up to the Nyquist frequency.
//!
//! ## Pipeline
//! - Blackman window over the full transform size
//! - Forward FFT using RustFFT
//! - Magnitude normalised by the transform size
//! - Exponential smoothing against the previous frame
//! - Conversion to dB, then linear mapping of the dB range onto 0..=255

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::AnalysisConfig;

/// Blackman window coefficient.
const BLACKMAN_ALPHA: f32 = 0.16;

/// Applies a Blackman window to the input buffer to reduce spectral leakage.
///
/// # Arguments
/// * `buffer` - Audio buffer to window (modified in-place)
fn apply_blackman_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n == 0 {
        return;
    }
    let a0 = 0.5 * (1.0 - BLACKMAN_ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * BLACKMAN_ALPHA;
    let len = n as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let phase = 2.0 * std::f32::consts::PI * i as f32 / len;
        let multiplier = a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos();
        *sample *= multiplier;
    }
}

/// Stateful transform producing byte magnitudes from sample windows.
///
/// Holds the planned FFT and the smoothed magnitudes of the previous frame,
/// so each call advances the smoothing state by one step.
pub struct ByteSpectrum {
    fft: Arc<dyn Fft<f32>>,
    transform_size: usize,
    smoothing: f32,
    min_level_db: f32,
    max_level_db: f32,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl ByteSpectrum {
    /// Plans the FFT for the configured transform size.
    ///
    /// The config is expected to have been validated already.
    pub fn new(config: &AnalysisConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.transform_size);
        Self {
            fft,
            transform_size: config.transform_size,
            smoothing: config.smoothing,
            min_level_db: config.min_level_db,
            max_level_db: config.max_level_db,
            smoothed: vec![0.0; config.bin_count()],
            scratch: vec![Complex { re: 0.0, im: 0.0 }; config.transform_size],
        }
    }

    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
    }

    /// Transforms one window of samples into `out`.
    ///
    /// `window` shorter than the transform size is zero-padded at the front,
    /// so the newest samples always line up with the end of the window.
    /// `out` must hold [`bin_count`](Self::bin_count) entries.
    pub fn process(&mut self, window: &[f32], out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.bin_count());

        let mut signal = vec![0.0f32; self.transform_size];
        let take = window.len().min(self.transform_size);
        let offset = self.transform_size - take;
        signal[offset..].copy_from_slice(&window[window.len() - take..]);
        apply_blackman_window(&mut signal);

        for (slot, sample) in self.scratch.iter_mut().zip(signal) {
            *slot = Complex { re: sample, im: 0.0 };
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.transform_size as f32;
        let tau = self.smoothing;
        let range = self.max_level_db - self.min_level_db;
        for ((bin, smoothed), byte) in self
            .scratch
            .iter()
            .zip(self.smoothed.iter_mut())
            .zip(out.iter_mut())
        {
            let magnitude = bin.norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }
            let db = 20.0 * smoothed.log10();
            let scaled = (255.0 / range * (db - self.min_level_db)).floor();
            // Float-to-int casts saturate, and log10(0) = -inf maps to 0.
            *byte = scaled.clamp(0.0, 255.0) as u8;
        }
    }
}
