//! Pitch shift state.

use serde::{Deserialize, Serialize};

use crate::settings::Limits;

/// Current pitch shift as owned by the broker.
///
/// `semitones` is always stored clamped; the audio lane never sees an
/// out-of-range or NaN value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchState {
    /// Shift in semitones. Positive raises pitch.
    pub semitones: f32,
    /// The processing graph has been attached to the element.
    pub initialized: bool,
    /// The element's own output is muted because the graph is audible.
    pub muted_for_processing: bool,
}

impl PitchState {
    /// Clamp a requested shift into the accepted range.
    ///
    /// NaN maps to 0 (no shift).
    pub fn clamp_semitones(semitones: f32, limits: &Limits) -> f32 {
        if semitones.is_nan() {
            return 0.0;
        }
        semitones.clamp(limits.min_semitones, limits.max_semitones)
    }

    /// Frequency ratio for a shift: `2^(semitones / 12)`.
    pub fn ratio(semitones: f32) -> f32 {
        (semitones / 12.0).exp2()
    }

    /// Human-readable label in whole tones and semitones.
    ///
    /// `0` is "Original", `+2` is "+1 tone", `-3` is "-1t 1st".
    /// Fractional shifts are rounded to the nearest semitone.
    pub fn label(semitones: f32) -> String {
        let rounded = semitones.round() as i32;
        if rounded == 0 {
            return "Original".to_string();
        }

        let sign = if rounded > 0 { '+' } else { '-' };
        let abs = rounded.unsigned_abs();
        let tones = abs / 2;
        let rest = abs % 2;

        match (tones, rest) {
            (t, 0) => format!("{sign}{t} tone{}", if t > 1 { "s" } else { "" }),
            (0, r) => format!("{sign}{r} semitone"),
            (t, r) => format!("{sign}{t}t {r}st"),
        }
    }
}
