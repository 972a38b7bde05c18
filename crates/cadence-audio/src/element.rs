//! The controlled media element.
//!
//! Cadence never owns playback itself. It drives an element that exposes
//! the same small surface a browser `<video>` does: a clock, play/pause,
//! a native playback-rate control, volume and mute, and an audio tap the
//! processing graph can be attached to.
//!
//! Audio model: every element produces a pre-volume tap and a direct
//! output. What is heard per quantum is `direct * volume` (unless muted)
//! plus the graph's output while the graph is attached and active.

use std::sync::Arc;
use std::time::Duration;

use cadence_core::Result;

use crate::graph::ProcessingGraph;

/// Notifications raised by an element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementEvent {
    /// The position advanced during playback (seconds).
    TimeUpdate(f64),
    /// The stream reached its end. The element is now paused at the end.
    Ended,
    /// Playback started or resumed.
    Play,
    /// Playback paused.
    Pause,
    /// The position was set explicitly (seconds).
    Seeked(f64),
}

/// A playable stream under external control.
pub trait MediaElement: Send {
    /// Current position in seconds.
    fn current_time(&self) -> f64;

    /// Total length in seconds, or `0.0` when unknown.
    fn duration(&self) -> f64;

    /// Title of the current track.
    fn title(&self) -> String;

    fn paused(&self) -> bool;

    /// Start or resume playback. May be refused by the host.
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Move the play head. Values are clamped into `[0, duration]`.
    fn set_current_time(&mut self, seconds: f64);

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&mut self, rate: f64);

    /// Gain of the element's direct output.
    fn volume(&self) -> f32;

    fn set_volume(&mut self, volume: f32);

    fn muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    /// Route the element's audio tap into `graph`.
    ///
    /// Called at most once per graph; see [`ProcessingGraph::attach`].
    fn attach_graph(&mut self, graph: Arc<ProcessingGraph>) -> Result<()>;

    /// Next pending event, if any. Never blocks.
    fn try_recv_event(&mut self) -> Option<ElementEvent>;

    /// Wall time passed on the control lane. Hosts with their own clock
    /// ignore it; virtual-clock hosts advance by it.
    fn tick(&mut self, _elapsed: Duration) {}
}

impl<E: MediaElement + ?Sized> MediaElement for Box<E> {
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn duration(&self) -> f64 {
        (**self).duration()
    }

    fn title(&self) -> String {
        (**self).title()
    }

    fn paused(&self) -> bool {
        (**self).paused()
    }

    fn play(&mut self) -> Result<()> {
        (**self).play()
    }

    fn pause(&mut self) {
        (**self).pause();
    }

    fn set_current_time(&mut self, seconds: f64) {
        (**self).set_current_time(seconds);
    }

    fn playback_rate(&self) -> f64 {
        (**self).playback_rate()
    }

    fn set_playback_rate(&mut self, rate: f64) {
        (**self).set_playback_rate(rate);
    }

    fn volume(&self) -> f32 {
        (**self).volume()
    }

    fn set_volume(&mut self, volume: f32) {
        (**self).set_volume(volume);
    }

    fn muted(&self) -> bool {
        (**self).muted()
    }

    fn set_muted(&mut self, muted: bool) {
        (**self).set_muted(muted);
    }

    fn attach_graph(&mut self, graph: Arc<ProcessingGraph>) -> Result<()> {
        (**self).attach_graph(graph)
    }

    fn try_recv_event(&mut self) -> Option<ElementEvent> {
        (**self).try_recv_event()
    }

    fn tick(&mut self, elapsed: Duration) {
        (**self).tick(elapsed);
    }
}
