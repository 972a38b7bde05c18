//! Block-wise resampling pitch shifter.
//!
//! Each quantum is resampled on its own by reading the input block at
//! `2^(semitones / 12)` times the normal rate with linear interpolation.
//! The upstream stream keeps advancing at 1.0x, so pitch moves while
//! timing does not. Nothing is carried across blocks: raising the pitch
//! runs out of input before the block ends and the tail is filled with
//! silence, and every block boundary is a small discontinuity when the
//! ratio is not 1. That is the price of the simple design.

use cadence_core::settings::{MAX_SEMITONES, MIN_SEMITONES};
use cadence_core::PitchState;

/// Per-block pitch processor. Owned by the audio lane.
///
/// Holds no audio between blocks, only the ratio for the last shift so
/// the `exp2` is paid once per parameter change.
#[derive(Debug)]
pub struct PitchProcessor {
    last_semitones: f32,
    ratio: f32,
}

impl Default for PitchProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl PitchProcessor {
    pub const fn new() -> Self {
        Self {
            last_semitones: 0.0,
            ratio: 1.0,
        }
    }

    /// Shift applied to the most recent block.
    pub const fn last_semitones(&self) -> f32 {
        self.last_semitones
    }

    /// Clamp a raw parameter value. NaN becomes 0.
    #[inline]
    pub fn sanitize(semitones: f32) -> f32 {
        if semitones.is_nan() {
            0.0
        } else {
            semitones.clamp(MIN_SEMITONES, MAX_SEMITONES)
        }
    }

    /// Process one quantum.
    ///
    /// The frame count is the length of each output channel. Output
    /// channels without a matching input channel are silenced. The value
    /// is applied exactly as given: positive raises pitch.
    ///
    /// Never allocates and never fails.
    pub fn process(&mut self, semitones: f32, inputs: &[&[f32]], outputs: &mut [&mut [f32]]) {
        let semitones = Self::sanitize(semitones);
        if semitones != self.last_semitones {
            self.last_semitones = semitones;
            self.ratio = PitchState::ratio(semitones);
        }

        for (ch, output) in outputs.iter_mut().enumerate() {
            match inputs.get(ch) {
                Some(input) if semitones == 0.0 => passthrough(input, output),
                Some(input) => resample(input, output, self.ratio),
                None => output.fill(0.0),
            }
        }
    }
}

#[inline]
fn passthrough(input: &[f32], output: &mut [f32]) {
    let n = input.len().min(output.len());
    output[..n].copy_from_slice(&input[..n]);
    output[n..].fill(0.0);
}

fn resample(input: &[f32], output: &mut [f32], ratio: f32) {
    let len = input.len();
    for (i, out) in output.iter_mut().enumerate() {
        let src = i as f32 * ratio;
        let i0 = src.floor() as usize;
        let frac = src - i0 as f32;

        *out = if i0 + 1 < len {
            input[i0].mul_add(1.0 - frac, input[i0 + 1] * frac)
        } else if i0 < len {
            input[i0]
        } else {
            0.0
        };
    }
}
