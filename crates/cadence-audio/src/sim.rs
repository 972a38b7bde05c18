//! Virtual-clock media element.
//!
//! Behaves like a browser media element driven by an explicit clock:
//! [`SimulatedElement::advance`] moves the play head by wall time times
//! the playback rate, raising `TimeUpdate` at the configured cadence and
//! `Pause` + `Ended` when the end is reached. Used by tests and by the
//! `--simulate` mode of the binary, where no audio device is needed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Error, Result};
use tracing::{debug, trace};

use crate::element::{ElementEvent, MediaElement};
use crate::graph::{GraphRenderer, ProcessingGraph};

/// Cadence of `TimeUpdate` events in browsers.
const DEFAULT_TIME_UPDATE: Duration = Duration::from_millis(250);

/// Media element with a manually advanced clock.
#[derive(Debug)]
pub struct SimulatedElement {
    title: String,
    duration: f64,
    position: f64,
    paused: bool,
    rate: f64,
    volume: f32,
    muted: bool,
    events: VecDeque<ElementEvent>,
    renderer: Option<GraphRenderer>,
    attach_count: usize,
    time_update_interval: f64,
    since_time_update: f64,
    reject_play: bool,
    seek_count: usize,
}

impl SimulatedElement {
    /// A paused element at position 0.
    pub fn new(title: impl Into<String>, duration: f64) -> Self {
        Self {
            title: title.into(),
            duration: duration.max(0.0),
            position: 0.0,
            paused: true,
            rate: 1.0,
            volume: 1.0,
            muted: false,
            events: VecDeque::new(),
            renderer: None,
            attach_count: 0,
            time_update_interval: DEFAULT_TIME_UPDATE.as_secs_f64(),
            since_time_update: 0.0,
            reject_play: false,
            seek_count: 0,
        }
    }

    pub fn with_time_update_interval(mut self, interval: Duration) -> Self {
        self.time_update_interval = interval.as_secs_f64().max(f64::EPSILON);
        self
    }

    /// Advance wall-clock time. Does nothing while paused.
    pub fn advance(&mut self, wall: Duration) {
        let mut remaining = wall.as_secs_f64();

        while remaining > 0.0 && !self.paused {
            let step = remaining.min(self.time_update_interval - self.since_time_update);
            remaining -= step;
            self.since_time_update += step;
            self.position += step * self.rate;

            if self.duration > 0.0 && self.position >= self.duration {
                self.position = self.duration;
                self.since_time_update = 0.0;
                self.paused = true;
                self.events.push_back(ElementEvent::TimeUpdate(self.position));
                self.events.push_back(ElementEvent::Pause);
                self.events.push_back(ElementEvent::Ended);
                debug!("Simulated stream '{}' ended", self.title);
                break;
            }

            if self.since_time_update >= self.time_update_interval {
                self.since_time_update = 0.0;
                self.events.push_back(ElementEvent::TimeUpdate(self.position));
            }
        }
    }

    /// Replace the current track, as a host does when the next video loads.
    pub fn load(&mut self, title: impl Into<String>, duration: f64) {
        self.title = title.into();
        self.duration = duration.max(0.0);
        self.position = 0.0;
        self.since_time_update = 0.0;
        self.events.push_back(ElementEvent::Seeked(0.0));
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Make subsequent `play()` calls fail, like an autoplay policy would.
    pub fn set_reject_play(&mut self, reject: bool) {
        self.reject_play = reject;
    }

    /// How many times a graph was attached.
    pub const fn attach_count(&self) -> usize {
        self.attach_count
    }

    /// How many explicit seeks happened.
    pub const fn seek_count(&self) -> usize {
        self.seek_count
    }

    /// Drop all pending events.
    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Render one interleaved block of audible output for `tap`.
    pub fn render_block(&mut self, tap: &[f32], channels: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; tap.len()];
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render_interleaved(tap, channels, &mut out);
        }
        if !self.muted {
            for (o, s) in out.iter_mut().zip(tap) {
                *o += s * self.volume;
            }
        }
        out
    }
}

impl MediaElement for SimulatedElement {
    fn current_time(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn paused(&self) -> bool {
        self.paused
    }

    fn play(&mut self) -> Result<()> {
        if self.reject_play {
            return Err(Error::unavailable("play() was rejected by the host"));
        }
        if self.duration > 0.0 && self.position >= self.duration {
            self.position = 0.0;
        }
        if self.paused {
            self.paused = false;
            self.events.push_back(ElementEvent::Play);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            self.events.push_back(ElementEvent::Pause);
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        let upper = if self.duration > 0.0 {
            self.duration
        } else {
            f64::MAX
        };
        self.position = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, upper)
        };
        self.seek_count += 1;
        trace!("Simulated seek to {:.3}", self.position);
        self.events.push_back(ElementEvent::Seeked(self.position));
    }

    fn playback_rate(&self) -> f64 {
        self.rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn muted(&self) -> bool {
        self.muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn attach_graph(&mut self, graph: Arc<ProcessingGraph>) -> Result<()> {
        self.renderer = Some(GraphRenderer::new(graph));
        self.attach_count += 1;
        Ok(())
    }

    fn try_recv_event(&mut self) -> Option<ElementEvent> {
        self.events.pop_front()
    }

    fn tick(&mut self, elapsed: Duration) {
        self.advance(elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(element: &mut SimulatedElement) -> Vec<ElementEvent> {
        std::iter::from_fn(|| element.try_recv_event()).collect()
    }

    #[test]
    fn test_paused_element_does_not_advance() {
        let mut element = SimulatedElement::new("Song", 10.0);
        element.advance(Duration::from_secs(1));
        assert_eq!(element.current_time(), 0.0);
        assert!(drain(&mut element).is_empty());
    }

    #[test]
    fn test_advance_respects_rate_and_time_updates() {
        let mut element = SimulatedElement::new("Song", 100.0);
        element.play().ok();
        element.set_playback_rate(2.0);
        drain(&mut element);

        element.advance(Duration::from_secs(1));

        assert!((element.current_time() - 2.0).abs() < 1e-9);
        let updates = drain(&mut element)
            .into_iter()
            .filter(|e| matches!(e, ElementEvent::TimeUpdate(_)))
            .count();
        assert_eq!(updates, 4);
    }

    #[test]
    fn test_end_of_stream_pauses_and_fires_ended() {
        let mut element = SimulatedElement::new("Song", 1.0);
        element.play().ok();
        drain(&mut element);

        element.advance(Duration::from_secs(3));

        assert_eq!(element.current_time(), 1.0);
        assert!(element.paused());
        let events = drain(&mut element);
        assert_eq!(events.last(), Some(&ElementEvent::Ended));
        assert!(events.contains(&ElementEvent::Pause));
    }

    #[test]
    fn test_play_at_end_restarts() {
        let mut element = SimulatedElement::new("Song", 1.0);
        element.play().ok();
        element.advance(Duration::from_secs(2));
        element.play().ok();
        assert_eq!(element.current_time(), 0.0);
        assert!(!element.paused());
    }

    #[test]
    fn test_rejected_play() {
        let mut element = SimulatedElement::new("Song", 10.0);
        element.set_reject_play(true);
        assert!(element.play().is_err());
        assert!(element.paused());
    }

    #[test]
    fn test_seek_is_clamped() {
        let mut element = SimulatedElement::new("Song", 10.0);
        element.set_current_time(50.0);
        assert_eq!(element.current_time(), 10.0);
        element.set_current_time(-1.0);
        assert_eq!(element.current_time(), 0.0);
        assert_eq!(element.seek_count(), 2);
    }

    #[test]
    fn test_render_block_mixes_direct_output() {
        let mut element = SimulatedElement::new("Song", 10.0);
        element.set_volume(0.5);
        let out = element.render_block(&[1.0, 1.0], 2);
        assert_eq!(out, vec![0.5, 0.5]);

        element.set_muted(true);
        let out = element.render_block(&[1.0, 1.0], 2);
        assert_eq!(out, vec![0.0, 0.0]);
    }
}
