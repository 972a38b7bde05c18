//! Loop range.

use serde::{Deserialize, Serialize};

/// A `[start, end)` range to repeat, in seconds.
///
/// When `enabled`, `start < end` and `end` sits at least the safety
/// margin before the end of the stream. When disabled the bounds are
/// only remembered for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopRange {
    pub start: f64,
    pub end: f64,
    pub enabled: bool,
}

impl LoopRange {
    pub const fn new(start: f64, end: f64, enabled: bool) -> Self {
        Self {
            start,
            end,
            enabled,
        }
    }

    /// A disabled range spanning the whole stream.
    pub const fn whole(duration: f64) -> Self {
        Self::new(0.0, duration, false)
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }
}
