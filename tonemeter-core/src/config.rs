//! # Configuration Module
//!
//! Analysis parameters fixed at construction time, and the runtime gain
//! controls applied to captured samples before analysis.

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Smallest transform window the sampler accepts.
pub const MIN_TRANSFORM_SIZE: usize = 32;
/// Largest transform window the sampler accepts.
pub const MAX_TRANSFORM_SIZE: usize = 32768;

/// Parameters of the frequency-domain analysis.
///
/// Missing fields fall back to their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Window length of the transform. Must be a power of two.
    pub transform_size: usize,
    /// Exponential averaging constant between snapshots, 0.0 to 1.0.
    pub smoothing: f32,
    /// Level mapped to byte magnitude 0, in dB.
    pub min_level_db: f32,
    /// Level mapped to byte magnitude 255, in dB.
    pub max_level_db: f32,
    /// Delay between the end of one tick and the start of the next.
    pub update_interval_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            transform_size: 2048,
            smoothing: 0.8,
            min_level_db: -90.0,
            max_level_db: -10.0,
            update_interval_ms: 16,
        }
    }
}

impl AnalysisConfig {
    /// Number of magnitude bins produced per snapshot.
    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    /// Checks the invariants the sampler relies on.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !self.transform_size.is_power_of_two()
            || self.transform_size < MIN_TRANSFORM_SIZE
            || self.transform_size > MAX_TRANSFORM_SIZE
        {
            return Err(MonitorError::Config(format!(
                "transform_size must be a power of two between {} and {}, got {}",
                MIN_TRANSFORM_SIZE, MAX_TRANSFORM_SIZE, self.transform_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(MonitorError::Config(format!(
                "smoothing must be within 0.0..=1.0, got {}",
                self.smoothing
            )));
        }
        if !self.min_level_db.is_finite()
            || !self.max_level_db.is_finite()
            || self.min_level_db >= self.max_level_db
        {
            return Err(MonitorError::Config(format!(
                "min_level_db ({}) must be below max_level_db ({})",
                self.min_level_db, self.max_level_db
            )));
        }
        Ok(())
    }
}

/// Runtime gain controls. The applied gain is their product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainSettings {
    pub input_gain: f32,
    pub mic_boost: f32,
}

impl Default for GainSettings {
    fn default() -> Self {
        Self {
            input_gain: 1.0,
            mic_boost: 1.0,
        }
    }
}

impl GainSettings {
    /// Sets the input gain from a slider percentage (100 = unity).
    pub fn set_input_volume(&mut self, percent: f32) {
        self.input_gain = percent_to_factor(percent);
    }

    /// Sets the microphone boost from a slider percentage (100 = 1.0x).
    pub fn set_mic_boost(&mut self, percent: f32) {
        self.mic_boost = percent_to_factor(percent);
    }

    pub fn applied(&self) -> f32 {
        self.input_gain * self.mic_boost
    }
}

fn percent_to_factor(percent: f32) -> f32 {
    if percent.is_finite() && percent > 0.0 {
        percent / 100.0
    } else {
        0.0
    }
}
