//! Output gain.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Linear output gain in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeLevel(f32);

impl Default for VolumeLevel {
    fn default() -> Self {
        Self::FULL
    }
}

impl VolumeLevel {
    pub const FULL: Self = Self(1.0);
    pub const SILENT: Self = Self(0.0);

    /// Clamp into `[0, 1]`. NaN is rejected.
    pub fn new(gain: f64) -> Result<Self> {
        if gain.is_nan() {
            return Err(Error::validation("volume must be a number"));
        }
        Ok(Self(gain.clamp(0.0, 1.0) as f32))
    }

    /// Clamp a gain read back from an audio node, mapping NaN to silence.
    pub fn saturating(gain: f32) -> Self {
        if gain.is_nan() {
            Self::SILENT
        } else {
            Self(gain.clamp(0.0, 1.0))
        }
    }

    pub const fn gain(self) -> f32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps() {
        assert_eq!(VolumeLevel::new(1.5).unwrap().gain(), 1.0);
        assert_eq!(VolumeLevel::new(-0.2).unwrap().gain(), 0.0);
        assert!((VolumeLevel::new(0.42).unwrap().gain() - 0.42).abs() < 1e-6);
        assert!(VolumeLevel::new(f64::NAN).is_err());
    }

    #[test]
    fn test_saturating() {
        assert_eq!(VolumeLevel::saturating(f32::NAN), VolumeLevel::SILENT);
        assert_eq!(VolumeLevel::saturating(2.0), VolumeLevel::FULL);
    }
}
