//! Core domain types for Cadence.

pub mod common;
pub mod loop_range;
pub mod pitch;
pub mod rate;
pub mod volume;

pub use common::format_time;
pub use loop_range::LoopRange;
pub use pitch::PitchState;
pub use rate::PlaybackRate;
pub use volume::VolumeLevel;
