//! # cadence-core
//!
//! Core types, settings, wire protocol and error handling shared by the
//! Cadence audio and control lanes.

pub mod error;
pub mod prefs;
pub mod protocol;
pub mod settings;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use prefs::{PreferenceStore, Preferences};
pub use protocol::{Command, Notification, Response, ResponseBody, VideoInfo, VideoState};
pub use settings::{LoopTriggers, Settings};
pub use types::*;
