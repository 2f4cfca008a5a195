//! # Metrics Module
//!
//! Turns a byte magnitude snapshot into the per-tick readings: volume
//! percentage, dominant frequency and the nearest note name.
//!
//! All functions here are pure. The dominant frequency is the centre of the
//! loudest bin, which is a coarse heuristic rather than real pitch tracking.

use std::fmt;

use crate::sampler::MagnitudeSnapshot;
use crate::tuning;

/// Lowest bins skipped by the peak search to avoid DC and sub-bass artifacts.
pub const PEAK_SEARCH_START_BIN: usize = 10;

/// Largest value a single bin magnitude can take.
const MAX_MAGNITUDE: f64 = u8::MAX as f64;

/// Readings derived from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Mean bin magnitude scaled to 0-100.
    pub volume_percent: u8,
    /// Centre frequency of the loudest bin, in Hz.
    pub dominant_frequency_hz: u32,
    /// Nearest note to the dominant frequency, e.g. "A4".
    pub note: Option<String>,
}

impl Metrics {
    pub fn extract(snapshot: &MagnitudeSnapshot, sample_rate: u32) -> Self {
        let bins = snapshot.bins();
        let dominant_frequency_hz = dominant_frequency(bins, sample_rate);
        Self {
            volume_percent: volume_percent(bins),
            dominant_frequency_hz,
            note: tuning::frequency_to_note(dominant_frequency_hz as f32),
        }
    }
}

/// Overlay text for the spectrum view: "`<volume>% | <frequency>Hz | <note>`".
impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}% | {}Hz | {}",
            self.volume_percent,
            self.dominant_frequency_hz,
            self.note.as_deref().unwrap_or("N/A")
        )
    }
}

/// Average magnitude of all bins as a rounded percentage of full scale.
///
/// A single loud, narrow tone averages out to a low reading since every
/// bin carries equal weight.
pub fn volume_percent(bins: &[u8]) -> u8 {
    if bins.is_empty() {
        return 0;
    }
    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    let mean = sum as f64 / bins.len() as f64;
    (mean / MAX_MAGNITUDE * 100.0).round() as u8
}

/// Index of the loudest bin at or above [`PEAK_SEARCH_START_BIN`].
///
/// Ties go to the lowest index. Returns `None` when every scanned bin is
/// zero or the snapshot is too short to scan.
pub fn peak_bin(bins: &[u8]) -> Option<usize> {
    let mut best: Option<(usize, u8)> = None;
    for (index, &magnitude) in bins.iter().enumerate().skip(PEAK_SEARCH_START_BIN) {
        let current_max = best.map_or(0, |(_, m)| m);
        if magnitude > current_max {
            best = Some((index, magnitude));
        }
    }
    best.map(|(index, _)| index)
}

/// Converts a bin index to its frequency in Hz, rounded to an integer.
///
/// Bins span 0 Hz up to the Nyquist frequency.
pub fn bin_to_frequency(index: usize, bin_count: usize, sample_rate: u32) -> u32 {
    if bin_count == 0 {
        return 0;
    }
    let nyquist = sample_rate as f64 / 2.0;
    (index as f64 / bin_count as f64 * nyquist).round() as u32
}

/// Frequency of the loudest bin, or 0 Hz for a silent snapshot.
pub fn dominant_frequency(bins: &[u8], sample_rate: u32) -> u32 {
    match peak_bin(bins) {
        Some(index) => bin_to_frequency(index, bins.len(), sample_rate),
        None => 0,
    }
}
