//! Wire protocol between the UI/transport layer and the player host.
//!
//! Requests are JSON objects tagged by `action`; responses are flat
//! objects carrying `success` and, on failure, `error`.

use serde::{Deserialize, Serialize};

use crate::types::LoopRange;
use crate::{Error, Result};

/// A command addressed by action name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    GetVideoInfo,
    GetVideoState,
    TogglePlayPause,
    SetVolume { volume: f64 },
    SetPlaybackRate { speed: f64 },
    SeekTo { time: f64 },
    SetLoop { start: f64, end: f64, enabled: bool },
    /// `pitch` is the intended shift; positive raises pitch.
    SetPitch { pitch: f64 },
    InitializePitch,
    DisablePitch,
    ResetAll,
    AdjustSpeed { delta: f64 },
    AdjustPitch { delta: f64 },
    GetEnabled,
    SetEnabled { enabled: bool },
}

impl Command {
    /// Parse one request line.
    pub fn from_json(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::validation(format!("Unknown action: {e}")))
    }

    /// Action name, for logging.
    pub const fn action(&self) -> &'static str {
        match self {
            Self::GetVideoInfo => "getVideoInfo",
            Self::GetVideoState => "getVideoState",
            Self::TogglePlayPause => "togglePlayPause",
            Self::SetVolume { .. } => "setVolume",
            Self::SetPlaybackRate { .. } => "setPlaybackRate",
            Self::SeekTo { .. } => "seekTo",
            Self::SetLoop { .. } => "setLoop",
            Self::SetPitch { .. } => "setPitch",
            Self::InitializePitch => "initializePitch",
            Self::DisablePitch => "disablePitch",
            Self::ResetAll => "resetAll",
            Self::AdjustSpeed { .. } => "adjustSpeed",
            Self::AdjustPitch { .. } => "adjustPitch",
            Self::GetEnabled => "getEnabled",
            Self::SetEnabled { .. } => "setEnabled",
        }
    }
}

/// Static facts about the current stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub duration: f64,
    pub current_time: f64,
    pub title: String,
    pub is_playing: bool,
}

/// Live state of the element, the engine and the loop guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    pub is_playing: bool,
    pub volume: f32,
    pub current_time: f64,
    pub duration: f64,
    pub speed: f64,
    pub pitch: f32,
    pub pitch_label: String,
    pub enabled: bool,
    #[serde(rename = "loop")]
    pub loop_range: LoopRange,
}

/// Command-specific response fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Empty,
    VideoInfo(VideoInfo),
    VideoState(VideoState),
    Pitch {
        #[serde(rename = "currentPitch")]
        current_pitch: f32,
    },
    Speed {
        speed: f64,
    },
    Enabled {
        enabled: bool,
    },
}

/// Result of one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    pub const fn ok() -> Self {
        Self::with_body(ResponseBody::Empty)
    }

    pub const fn with_body(body: ResponseBody) -> Self {
        Self {
            success: true,
            error: None,
            body,
        }
    }

    /// A failure that still carries fields, e.g. `setPitch` reporting
    /// the pitch it kept.
    pub fn failure_with_body(message: impl Into<String>, body: ResponseBody) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            body,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::failure_with_body(message, ResponseBody::Empty)
    }

    pub fn from_error(error: &Error) -> Self {
        Self::failure(error.to_string())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Unsolicited messages from the host to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Notification {
    /// The stream ended and no loop intercepted it.
    Ended,
    /// A new track was detected and all controls were reset.
    TrackChanged { reason: String },
}
