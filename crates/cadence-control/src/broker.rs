//! Playback parameter broker.
//!
//! Single owner of speed, pitch, loop and volume for one element. Inputs
//! are validated and clamped here, then written to the element, the
//! processing graph or the loop guard. Reads always go to whichever
//! component currently owns a value, never to a local copy.

use std::sync::Arc;

use cadence_audio::{AttachOutcome, ElementEvent, MediaElement, ProcessingGraph};
use cadence_core::settings::{Limits, Settings};
use cadence_core::{
    Error, LoopRange, PitchState, PlaybackRate, Result, VideoInfo, VideoState, VolumeLevel,
};
use tracing::{debug, info, warn};

use crate::loop_guard::{LoopGuard, LoopOutcome, Propagation, Trigger};

/// What handling one element event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Nothing,
    /// The loop guard moved the play head back to the loop start.
    Looped(Trigger),
    /// The stream ended and nothing intercepted it.
    EndOfStream,
}

/// Owner of the playback parameters of one element.
pub struct Broker<E: MediaElement> {
    element: Option<E>,
    graph: Arc<ProcessingGraph>,
    limits: Limits,
    pitch: PitchState,
    loop_guard: LoopGuard,
}

impl<E: MediaElement> Broker<E> {
    pub fn new(element: E, settings: &Settings) -> Self {
        Self::with_element(Some(element), settings)
    }

    /// A broker with nothing to control yet. Every command reports the
    /// element as unavailable.
    pub fn without_element(settings: &Settings) -> Self {
        Self::with_element(None, settings)
    }

    fn with_element(element: Option<E>, settings: &Settings) -> Self {
        Self {
            element,
            graph: ProcessingGraph::shared(),
            limits: settings.limits.clone(),
            pitch: PitchState::default(),
            loop_guard: LoopGuard::new(settings.loop_guard.clone()),
        }
    }

    pub const fn element(&self) -> Option<&E> {
        self.element.as_ref()
    }

    pub fn element_mut(&mut self) -> Option<&mut E> {
        self.element.as_mut()
    }

    fn element_or_err(&mut self) -> Result<&mut E> {
        self.element
            .as_mut()
            .ok_or_else(|| Error::unavailable("No media element"))
    }

    pub const fn graph(&self) -> &Arc<ProcessingGraph> {
        &self.graph
    }

    pub const fn pitch(&self) -> PitchState {
        self.pitch
    }

    pub const fn loop_guard(&self) -> &LoopGuard {
        &self.loop_guard
    }

    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Current native speed, as the element reports it.
    pub fn speed(&self) -> Result<f64> {
        self.element
            .as_ref()
            .map(MediaElement::playback_rate)
            .ok_or_else(|| Error::unavailable("No media element"))
    }

    /// Clamp, round and apply a native playback rate.
    pub fn set_speed(&mut self, speed: f64) -> Result<PlaybackRate> {
        let rate = PlaybackRate::new(speed, &self.limits)?;
        let element = self.element_or_err()?;
        element.set_playback_rate(rate.value());
        debug!("Playback rate set to {}", rate.value());
        Ok(rate)
    }

    /// Shift pitch, attaching the graph on first non-zero use.
    ///
    /// Returns the stored (clamped) shift.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_pitch_semitones(&mut self, semitones: f64) -> Result<f32> {
        let semitones = PitchState::clamp_semitones(semitones as f32, &self.limits);
        self.element_or_err()?;

        if semitones != 0.0 || self.graph.is_attached() {
            self.ensure_attached()?;
            self.graph.set_semitones(semitones);
            self.activate_graph()?;
        }

        self.pitch.semitones = semitones;
        info!("Pitch set to {semitones} ({})", PitchState::label(semitones));
        Ok(semitones)
    }

    /// Attach the graph without making it audible.
    pub fn initialize_pitch(&mut self) -> Result<()> {
        self.ensure_attached()
    }

    /// Reset pitch to 0 and give output back to the element.
    ///
    /// The graph stays attached so re-enabling is cheap.
    pub fn disable_pitch(&mut self) -> Result<()> {
        let element = self
            .element
            .as_mut()
            .ok_or_else(|| Error::unavailable("No media element"))?;

        self.graph.set_semitones(0.0);
        if self.graph.deactivate() {
            // The element becomes the volume owner again.
            element.set_volume(self.graph.gain());
        }
        if self.pitch.muted_for_processing || element.muted() {
            element.set_muted(false);
        }

        self.pitch.semitones = 0.0;
        self.pitch.muted_for_processing = false;
        debug!("Pitch processing disabled");
        Ok(())
    }

    /// Write volume to its current owner.
    pub fn set_volume(&mut self, volume: f64) -> Result<VolumeLevel> {
        let level = VolumeLevel::new(volume)?;
        let graph_owns = self.graph.is_active();
        let element = self.element_or_err()?;

        if graph_owns {
            self.graph.set_gain(level.gain());
        } else {
            element.set_volume(level.gain());
        }
        debug!(
            "Volume set to {:.2} on {}",
            level.gain(),
            if graph_owns { "graph" } else { "element" }
        );
        Ok(level)
    }

    /// Read volume back from its current owner.
    pub fn volume(&self) -> Result<f32> {
        let element = self
            .element
            .as_ref()
            .ok_or_else(|| Error::unavailable("No media element"))?;

        let gain = if self.graph.is_active() {
            self.graph.gain()
        } else {
            element.volume()
        };
        Ok(VolumeLevel::saturating(gain).gain())
    }

    /// Move the play head and wake the audio context.
    pub fn seek(&mut self, time: f64) -> Result<f64> {
        if !time.is_finite() {
            return Err(Error::validation("Seek time must be a number"));
        }
        let element = self.element_or_err()?;
        element.set_current_time(time);
        let position = element.current_time();
        if self.graph.is_attached() {
            self.graph.resume();
        }
        Ok(position)
    }

    /// Returns true if the element is now playing.
    pub fn toggle_play_pause(&mut self) -> Result<bool> {
        let element = self.element_or_err()?;
        if element.paused() {
            element.play()?;
            if self.graph.is_attached() {
                self.graph.resume();
            }
            Ok(true)
        } else {
            element.pause();
            Ok(false)
        }
    }

    pub fn set_loop(&mut self, start: f64, end: f64, enabled: bool) -> Result<LoopOutcome> {
        let duration = self
            .element
            .as_ref()
            .map(MediaElement::duration)
            .ok_or_else(|| Error::unavailable("No media element"))?;
        self.loop_guard.set_loop(start, end, enabled, duration)
    }

    /// Loop idle, pitch disabled, rate 1.0. Volume is kept.
    pub fn reset_all(&mut self) -> Result<()> {
        let element = self.element_or_err()?;
        let duration = element.duration();
        element.set_playback_rate(PlaybackRate::NORMAL.value());

        self.loop_guard.reset(duration);
        self.disable_pitch()?;
        info!("All controls reset");
        Ok(())
    }

    /// Handle the next pending element event, if any.
    pub fn poll_event(&mut self) -> Option<(ElementEvent, EventOutcome)> {
        let element = self.element.as_mut()?;
        let event = element.try_recv_event()?;

        let outcome = match event {
            ElementEvent::TimeUpdate(_) => self
                .loop_guard
                .on_time_update(element)
                .map_or(EventOutcome::Nothing, EventOutcome::Looped),
            ElementEvent::Ended => match self.loop_guard.on_ended(element) {
                Propagation::Stopped => EventOutcome::Looped(Trigger::EndedInterceptor),
                Propagation::Continue => EventOutcome::EndOfStream,
            },
            ElementEvent::Play => {
                if self.graph.is_attached() {
                    self.graph.resume();
                }
                EventOutcome::Nothing
            }
            ElementEvent::Pause | ElementEvent::Seeked(_) => EventOutcome::Nothing,
        };

        Some((event, outcome))
    }

    /// Run the periodic loop check.
    pub fn poll_loop(&mut self) -> Option<Trigger> {
        let element = self.element.as_mut()?;
        self.loop_guard.on_poll(element)
    }

    pub fn video_info(&self) -> Result<VideoInfo> {
        let element = self
            .element
            .as_ref()
            .ok_or_else(|| Error::unavailable("No media element"))?;

        Ok(VideoInfo {
            duration: element.duration(),
            current_time: element.current_time(),
            title: element.title(),
            is_playing: !element.paused(),
        })
    }

    pub fn video_state(&self, enabled: bool) -> Result<VideoState> {
        let volume = self.volume()?;
        let element = self
            .element
            .as_ref()
            .ok_or_else(|| Error::unavailable("No media element"))?;

        Ok(VideoState {
            is_playing: !element.paused(),
            volume,
            current_time: element.current_time(),
            duration: element.duration(),
            speed: element.playback_rate(),
            pitch: self.pitch.semitones,
            pitch_label: PitchState::label(self.pitch.semitones),
            enabled,
            loop_range: self.loop_guard.range(),
        })
    }

    /// The loop range currently reported.
    pub const fn loop_range(&self) -> LoopRange {
        self.loop_guard.range()
    }

    fn ensure_attached(&mut self) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let element = self.element_or_err()?;
        if graph.attach(element)? == AttachOutcome::Attached {
            debug!("Pitch engine attached to '{}'", element.title());
        }
        self.pitch.initialized = true;
        Ok(())
    }

    /// Make the graph audible, handing volume ownership to its gain node.
    fn activate_graph(&mut self) -> Result<()> {
        let element = self
            .element
            .as_mut()
            .ok_or_else(|| Error::unavailable("No media element"))?;

        if self.graph.activate() {
            self.graph.set_gain(element.volume());
        }
        if !element.muted() {
            element.set_muted(true);
        }
        if !self.pitch.muted_for_processing {
            self.pitch.muted_for_processing = true;
            debug!("Element output muted while the graph is audible");
        }
        if !self.graph.is_running() {
            warn!("Audio context suspended; pitch will apply once playback starts");
        }
        Ok(())
    }
}
