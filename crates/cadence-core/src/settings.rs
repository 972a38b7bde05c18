//! Tunable constants and their TOML loader.
//!
//! Every threshold the control lane and the audio lane depend on lives
//! here so deployments can adjust them without touching code. Missing
//! keys fall back to the defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{Error, Result};

/// Lowest pitch shift accepted, in semitones.
pub const MIN_SEMITONES: f32 = -24.0;
/// Highest pitch shift accepted, in semitones.
pub const MAX_SEMITONES: f32 = 24.0;
/// Slowest playback rate accepted.
pub const MIN_SPEED: f64 = 0.25;
/// Fastest playback rate accepted.
pub const MAX_SPEED: f64 = 4.0;
/// Distance kept between a loop end and the end of the stream.
pub const LOOP_SAFETY_MARGIN_SECS: f64 = 0.5;
/// How far before the loop end the position watcher jumps back.
pub const LOOP_PREEMPT_SECS: f64 = 0.3;
/// Period of the polling fallback.
pub const LOOP_POLL_INTERVAL_MS: u64 = 50;
/// A backward jump larger than this is read as a new track.
pub const TRACK_CHANGE_BACKWARD_SECS: f64 = 30.0;
/// A forward jump larger than this is read as a new track.
pub const TRACK_CHANGE_FORWARD_SECS: f64 = 60.0;
/// How often the track-change detector samples the element.
pub const TRACK_CHANGE_SAMPLE_MS: u64 = 5000;
/// Frames per processing quantum.
pub const BLOCK_FRAMES: usize = 128;

/// All runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub limits: Limits,
    #[serde(rename = "loop")]
    pub loop_guard: LoopSettings,
    pub track_change: TrackChangeSettings,
    pub audio: AudioSettings,
    pub session: SessionSettings,
}

/// Accepted ranges for user-facing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub min_semitones: f32,
    pub max_semitones: f32,
    pub min_speed: f64,
    pub max_speed: f64,
    /// Decimal places kept when storing a speed.
    pub speed_decimals: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_semitones: MIN_SEMITONES,
            max_semitones: MAX_SEMITONES,
            min_speed: MIN_SPEED,
            max_speed: MAX_SPEED,
            speed_decimals: 2,
        }
    }
}

/// Loop boundary handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    pub safety_margin_secs: f64,
    pub preempt_secs: f64,
    pub poll_interval_ms: u64,
    pub triggers: LoopTriggers,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            safety_margin_secs: LOOP_SAFETY_MARGIN_SECS,
            preempt_secs: LOOP_PREEMPT_SECS,
            poll_interval_ms: LOOP_POLL_INTERVAL_MS,
            triggers: LoopTriggers::default(),
        }
    }
}

impl LoopSettings {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Which of the three boundary mechanisms get armed when a loop is enabled.
///
/// All three run together in normal operation. Turning one off is only
/// useful for diagnostics and for exercising each path on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopTriggers {
    pub ended_interceptor: bool,
    pub position_watcher: bool,
    pub poll: bool,
}

impl Default for LoopTriggers {
    fn default() -> Self {
        Self::all()
    }
}

impl LoopTriggers {
    pub const fn all() -> Self {
        Self {
            ended_interceptor: true,
            position_watcher: true,
            poll: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            ended_interceptor: false,
            position_watcher: false,
            poll: false,
        }
    }

    pub const fn only_ended_interceptor() -> Self {
        Self {
            ended_interceptor: true,
            ..Self::none()
        }
    }

    pub const fn only_position_watcher() -> Self {
        Self {
            position_watcher: true,
            ..Self::none()
        }
    }

    pub const fn only_poll() -> Self {
        Self {
            poll: true,
            ..Self::none()
        }
    }
}

/// Heuristic new-track detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackChangeSettings {
    pub enabled: bool,
    pub backward_jump_secs: f64,
    pub forward_jump_secs: f64,
    pub sample_interval_ms: u64,
}

impl Default for TrackChangeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backward_jump_secs: TRACK_CHANGE_BACKWARD_SECS,
            forward_jump_secs: TRACK_CHANGE_FORWARD_SECS,
            sample_interval_ms: TRACK_CHANGE_SAMPLE_MS,
        }
    }
}

impl TrackChangeSettings {
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Audio lane settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Frames handed to the pitch processor per quantum.
    pub block_frames: usize,
    /// Cadence of the element's "time advanced" notifications.
    pub time_update_interval_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            block_frames: BLOCK_FRAMES,
            time_update_interval_ms: 250,
        }
    }
}

impl AudioSettings {
    pub const fn time_update_interval(&self) -> Duration {
        Duration::from_millis(self.time_update_interval_ms)
    }
}

/// Control lane settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How often element events are drained.
    pub event_pump_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            event_pump_interval_ms: 20,
        }
    }
}

impl SessionSettings {
    pub const fn event_pump_interval(&self) -> Duration {
        Duration::from_millis(self.event_pump_interval_ms)
    }
}

impl Settings {
    /// Default location: `<config_dir>/cadence/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "cadence", "Cadence")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load settings from `path`, or from the default location.
    ///
    /// A missing file yields the defaults. A file that exists but does
    /// not parse or validate is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => {
                    debug!("No config directory available, using default settings");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let settings = Self::from_toml_str(&content)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the lanes cannot run with.
    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.min_semitones.is_nan() || limits.min_semitones >= limits.max_semitones {
            return Err(Error::Config(
                "limits.min_semitones must be below limits.max_semitones".to_string(),
            ));
        }
        if limits.min_speed.is_nan() || limits.min_speed <= 0.0 || limits.min_speed >= limits.max_speed {
            return Err(Error::Config(
                "limits.min_speed must be positive and below limits.max_speed".to_string(),
            ));
        }
        if self.loop_guard.safety_margin_secs < 0.0 || self.loop_guard.preempt_secs < 0.0 {
            return Err(Error::Config("loop margins must not be negative".to_string()));
        }
        if self.loop_guard.poll_interval_ms == 0
            || self.track_change.sample_interval_ms == 0
            || self.session.event_pump_interval_ms == 0
            || self.audio.time_update_interval_ms == 0
        {
            return Err(Error::Config("periods must be non-zero".to_string()));
        }
        if self.audio.block_frames == 0 {
            return Err(Error::Config("audio.block_frames must be non-zero".to_string()));
        }
        Ok(())
    }
}
