//! Playback rate.

use serde::{Deserialize, Serialize};

use crate::settings::Limits;
use crate::{Error, Result};

/// Native playback speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybackRate(f64);

impl Default for PlaybackRate {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl PlaybackRate {
    pub const NORMAL: Self = Self(1.0);

    /// Clamp into range and round to the configured resolution.
    ///
    /// NaN has no meaningful clamp and is rejected.
    pub fn new(speed: f64, limits: &Limits) -> Result<Self> {
        if speed.is_nan() {
            return Err(Error::validation("speed must be a number"));
        }
        let clamped = speed.clamp(limits.min_speed, limits.max_speed);
        let scale = 10f64.powi(limits.speed_decimals as i32);
        let rounded = (clamped * scale).round() / scale;
        Ok(Self(rounded.clamp(limits.min_speed, limits.max_speed)))
    }

    pub const fn value(self) -> f64 {
        self.0
    }

    pub fn is_normal(self) -> bool {
        (self.0 - 1.0).abs() < f64::EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_and_rounds() {
        let limits = Limits::default();
        assert_eq!(PlaybackRate::new(10.0, &limits).unwrap().value(), 4.0);
        assert_eq!(PlaybackRate::new(0.01, &limits).unwrap().value(), 0.25);
        assert_eq!(PlaybackRate::new(1.234_567, &limits).unwrap().value(), 1.23);
        assert_eq!(PlaybackRate::new(1.005_1, &limits).unwrap().value(), 1.01);
        assert_eq!(PlaybackRate::new(f64::INFINITY, &limits).unwrap().value(), 4.0);
    }

    #[test]
    fn test_nan_rejected() {
        assert!(PlaybackRate::new(f64::NAN, &Limits::default()).is_err());
    }

    #[test]
    fn test_default_is_normal() {
        assert!(PlaybackRate::default().is_normal());
    }
}
