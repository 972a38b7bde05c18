//! Heuristic track-change detection.
//!
//! Sampled on a slow timer. A new track is assumed when the title differs
//! from the last non-empty title seen, or when the position jumped back or
//! forward by more than the configured thresholds between two samples.
//! False positives and misses are tolerated; the only consequence is a
//! reset of the session controls.

use std::fmt;

use cadence_audio::MediaElement;
use cadence_core::settings::TrackChangeSettings;
use tracing::debug;

/// Why a track change was assumed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeReason {
    TitleChanged { from: String, to: String },
    JumpedBackward { from: f64, to: f64 },
    JumpedForward { from: f64, to: f64 },
}

impl ChangeReason {
    /// Short machine-readable tag used in notifications.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::TitleChanged { .. } => "titleChanged",
            Self::JumpedBackward { .. } => "jumpedBackward",
            Self::JumpedForward { .. } => "jumpedForward",
        }
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TitleChanged { from, to } => write!(f, "title changed from '{from}' to '{to}'"),
            Self::JumpedBackward { from, to } => {
                write!(f, "position jumped back from {from:.1}s to {to:.1}s")
            }
            Self::JumpedForward { from, to } => {
                write!(f, "position jumped forward from {from:.1}s to {to:.1}s")
            }
        }
    }
}

/// Compares successive samples of title and position.
#[derive(Debug, Clone)]
pub struct TrackChangeDetector {
    settings: TrackChangeSettings,
    last_title: String,
    last_time: f64,
}

impl TrackChangeDetector {
    pub fn new(settings: TrackChangeSettings) -> Self {
        Self {
            settings,
            last_title: String::new(),
            last_time: 0.0,
        }
    }

    /// Record the current title and position without judging them.
    pub fn prime<E>(&mut self, element: &E)
    where
        E: MediaElement + ?Sized,
    {
        self.last_title = element.title();
        self.last_time = element.current_time();
    }

    /// Move the position baseline after a seek made by the controller
    /// itself, so loop restarts and user seeks are not taken for a new
    /// track.
    pub fn rebase(&mut self, position: f64) {
        self.last_time = position;
    }

    /// Take one sample. Always updates the baseline.
    pub fn sample<E>(&mut self, element: &E) -> Option<ChangeReason>
    where
        E: MediaElement + ?Sized,
    {
        if !self.settings.enabled {
            return None;
        }

        let title = element.title();
        let time = element.current_time();

        let reason = if !self.last_title.is_empty() && title != self.last_title {
            Some(ChangeReason::TitleChanged {
                from: self.last_title.clone(),
                to: title.clone(),
            })
        } else if time < self.last_time - self.settings.backward_jump_secs {
            Some(ChangeReason::JumpedBackward {
                from: self.last_time,
                to: time,
            })
        } else if time > self.last_time + self.settings.forward_jump_secs {
            Some(ChangeReason::JumpedForward {
                from: self.last_time,
                to: time,
            })
        } else {
            None
        };

        if let Some(reason) = &reason {
            debug!("Track change suspected: {reason}");
        }

        self.last_title = title;
        self.last_time = time;
        reason
    }
}
