//! # cadence-audio
//!
//! Real-time audio side of Cadence.
//!
//! Features:
//! - Resampling pitch processor driven by lock-free shared parameters
//! - Processing graph (tap -> pitch -> gain) with a lazily attached renderer
//! - [`MediaElement`] abstraction over the controlled stream
//! - Simulated element for tests and headless runs
//! - File-backed element: symphonia decoding, cpal output with varispeed

pub mod buffer;
pub mod decode;
pub mod element;
pub mod graph;
pub mod output;
pub mod param;
pub mod pitch;
pub mod player;
pub mod sim;

pub use element::{ElementEvent, MediaElement};
pub use graph::{AttachOutcome, GraphRenderer, GraphState, ProcessingGraph};
pub use output::{SourceFormat, Transport};
pub use pitch::PitchProcessor;
pub use player::FilePlayer;
pub use sim::SimulatedElement;
