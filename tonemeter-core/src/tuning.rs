//! # Musical Tuning Module
//!
//! Maps a frequency to the nearest equal-tempered note name, using C0
//! as the reference so the octave number changes at C.
//!
//! This is an approximation for display purposes. It is not a calibrated
//! pitch detector and should not be trusted for polyphonic or noisy input.

use once_cell::sync::Lazy;

/// Pitch classes ordered from C, matching octave numbering.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Concert pitch used as the tuning reference.
pub const A4_FREQUENCY: f32 = 440.0;

/// Frequencies below this floor never map to a note.
pub const NOTE_FLOOR_HZ: f32 = 80.0;

/// Frequency of C0, 57 semitones below A4.
static C0_FREQUENCY: Lazy<f64> = Lazy::new(|| A4_FREQUENCY as f64 * 2f64.powf(-4.75));

/// Finds the name of the note closest to `frequency`, e.g. "A4".
///
/// # Returns
/// * `Some(name)` - Pitch class followed by the octave number
/// * `None` - The frequency is below the audible floor
pub fn frequency_to_note(frequency: f32) -> Option<String> {
    if !frequency.is_finite() || frequency < NOTE_FLOOR_HZ {
        return None;
    }

    let c0 = *C0_FREQUENCY;
    let frequency = frequency as f64;
    if frequency <= c0 {
        return None;
    }

    let semitones = (12.0 * (frequency / c0).log2()).round() as i64;
    let octave = semitones.div_euclid(12);
    let pitch_class = semitones.rem_euclid(12) as usize;
    Some(format!("{}{}", NOTE_NAMES[pitch_class], octave))
}
