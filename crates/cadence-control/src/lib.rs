//! # cadence-control
//!
//! Control lane of Cadence: the loop guard, the track-change detector,
//! the parameter broker and the session that dispatches commands and
//! drives the periodic timers.

pub mod broker;
pub mod detector;
pub mod loop_guard;
pub mod session;

pub use broker::{Broker, EventOutcome};
pub use detector::{ChangeReason, TrackChangeDetector};
pub use loop_guard::{LoopGuard, LoopOutcome, LoopState, Propagation, Trigger};
pub use session::{Outgoing, Session};
