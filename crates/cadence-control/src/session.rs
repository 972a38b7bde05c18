//! Control session: command dispatch and the timer-driven run loop.
//!
//! A session owns the [`Broker`], the track-change detector and the
//! global on/off switch. Commands are handled one at a time; every error
//! becomes a failure response, nothing panics or aborts.

use cadence_audio::{ElementEvent, MediaElement};
use cadence_core::settings::Settings;
use cadence_core::{
    Command, Error, LoopRange, Notification, PitchState, PlaybackRate, PreferenceStore,
    Preferences, Response, ResponseBody, Result,
};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broker::{Broker, EventOutcome};
use crate::detector::TrackChangeDetector;

/// A message for the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Response(Response),
    Notification(Notification),
}

impl Outgoing {
    pub fn to_json(&self) -> Result<String> {
        Ok(match self {
            Self::Response(response) => serde_json::to_string(response)?,
            Self::Notification(notification) => serde_json::to_string(notification)?,
        })
    }
}

/// Session values kept while globally disabled, re-applied on enable.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Remembered {
    speed: PlaybackRate,
    semitones: f32,
    loop_range: LoopRange,
}

impl Remembered {
    const fn defaults(duration: f64) -> Self {
        Self {
            speed: PlaybackRate::NORMAL,
            semitones: 0.0,
            loop_range: LoopRange::whole(duration),
        }
    }
}

/// One controlled element plus everything that reacts to it.
pub struct Session<E: MediaElement> {
    broker: Broker<E>,
    detector: TrackChangeDetector,
    prefs: PreferenceStore,
    enabled: bool,
    remembered: Remembered,
    settings: Settings,
}

impl<E: MediaElement> Session<E> {
    pub fn new(broker: Broker<E>, settings: Settings, prefs: PreferenceStore) -> Self {
        let enabled = prefs.load().globally_enabled;
        let mut detector = TrackChangeDetector::new(settings.track_change.clone());
        let duration = broker.element().map_or(0.0, |element| {
            detector.prime(element);
            element.duration()
        });

        info!(
            "Session started ({})",
            if enabled { "enabled" } else { "disabled" }
        );

        Self {
            broker,
            detector,
            prefs,
            enabled,
            remembered: Remembered::defaults(duration),
            settings,
        }
    }

    pub const fn broker(&self) -> &Broker<E> {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut Broker<E> {
        &mut self.broker
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Handle one command.
    pub fn dispatch(&mut self, command: Command) -> Response {
        let action = command.action();
        debug!("Command: {:?}", command);

        match self.execute(command) {
            Ok(response) => response,
            Err(e) => {
                warn!("{action} failed: {e}");
                Response::from_error(&e)
            }
        }
    }

    fn execute(&mut self, command: Command) -> Result<Response> {
        match command {
            Command::GetVideoInfo => Ok(Response::with_body(ResponseBody::VideoInfo(
                self.broker.video_info()?,
            ))),
            Command::GetVideoState => Ok(Response::with_body(ResponseBody::VideoState(
                self.broker.video_state(self.enabled)?,
            ))),
            Command::TogglePlayPause => {
                self.broker.toggle_play_pause()?;
                Ok(Response::ok())
            }
            Command::SetVolume { volume } => {
                self.broker.set_volume(volume)?;
                Ok(Response::ok())
            }
            Command::SetPlaybackRate { speed } => {
                self.apply_speed(speed)?;
                Ok(Response::ok())
            }
            Command::SeekTo { time } => {
                let position = self.broker.seek(time)?;
                self.detector.rebase(position);
                Ok(Response::ok())
            }
            Command::SetLoop {
                start,
                end,
                enabled,
            } => {
                self.apply_loop(start, end, enabled)?;
                Ok(Response::ok())
            }
            Command::SetPitch { pitch } => {
                let result = self.apply_pitch(pitch);
                Ok(self.pitch_response(result))
            }
            Command::InitializePitch => {
                self.broker.initialize_pitch()?;
                Ok(Response::ok())
            }
            Command::DisablePitch => {
                self.broker.disable_pitch()?;
                self.remembered.semitones = 0.0;
                Ok(Response::ok())
            }
            Command::ResetAll => {
                self.reset_all()?;
                Ok(Response::ok())
            }
            Command::AdjustSpeed { delta } => {
                let current = if self.enabled {
                    self.broker.speed()?
                } else {
                    self.remembered.speed.value()
                };
                let speed = self.apply_speed(current + delta)?;
                Ok(Response::with_body(ResponseBody::Speed { speed }))
            }
            Command::AdjustPitch { delta } => {
                let result = self.apply_pitch(f64::from(self.current_semitones()) + delta);
                Ok(self.pitch_response(result))
            }
            Command::GetEnabled => Ok(Response::with_body(ResponseBody::Enabled {
                enabled: self.enabled,
            })),
            Command::SetEnabled { enabled } => {
                self.set_enabled(enabled)?;
                Ok(Response::ok())
            }
        }
    }

    fn current_semitones(&self) -> f32 {
        if self.enabled {
            self.broker.pitch().semitones
        } else {
            self.remembered.semitones
        }
    }

    /// Pitch commands report the pitch in effect even when they fail.
    fn pitch_response(&self, result: Result<f32>) -> Response {
        match result {
            Ok(current_pitch) => Response::with_body(ResponseBody::Pitch { current_pitch }),
            Err(e) => {
                warn!("Pitch change failed: {e}");
                Response::failure_with_body(
                    e.to_string(),
                    ResponseBody::Pitch {
                        current_pitch: self.current_semitones(),
                    },
                )
            }
        }
    }

    fn apply_speed(&mut self, speed: f64) -> Result<f64> {
        let rate = if self.enabled {
            self.broker.set_speed(speed)?
        } else {
            PlaybackRate::new(speed, self.broker.limits())?
        };
        self.remembered.speed = rate;
        Ok(rate.value())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply_pitch(&mut self, semitones: f64) -> Result<f32> {
        let stored = if self.enabled {
            self.broker.set_pitch_semitones(semitones)?
        } else {
            PitchState::clamp_semitones(semitones as f32, self.broker.limits())
        };
        self.remembered.semitones = stored;
        Ok(stored)
    }

    fn apply_loop(&mut self, start: f64, end: f64, enabled: bool) -> Result<()> {
        if self.enabled || !enabled {
            self.broker.set_loop(start, end, enabled)?;
            self.remembered.loop_range = self.broker.loop_range();
        } else if start.is_finite() && end.is_finite() && 0.0 <= start && start < end {
            self.remembered.loop_range = LoopRange::new(start, end, true);
        } else {
            return Err(Error::validation(format!(
                "Invalid loop range {start:.2}..{end:.2}"
            )));
        }
        Ok(())
    }

    /// Flip the persisted global switch.
    ///
    /// Disabling neutralises speed, loop and pitch but keeps their values;
    /// enabling puts them back.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.prefs.save(&Preferences {
            globally_enabled: enabled,
        })?;

        if enabled == self.enabled {
            return Ok(());
        }
        self.enabled = enabled;

        if enabled {
            info!("Controls enabled, restoring session values");
            self.restore_remembered();
        } else {
            info!("Controls disabled");
            let range = self.broker.loop_range();
            for result in [
                self.broker.set_speed(PlaybackRate::NORMAL.value()).map(drop),
                self.broker.set_loop(range.start, range.end, false).map(drop),
                self.broker.disable_pitch(),
            ] {
                if let Err(e) = result {
                    debug!("While disabling: {e}");
                }
            }
        }
        Ok(())
    }

    fn restore_remembered(&mut self) {
        let Remembered {
            speed,
            semitones,
            loop_range,
        } = self.remembered;

        if !speed.is_normal() {
            if let Err(e) = self.broker.set_speed(speed.value()) {
                warn!("Could not restore speed: {e}");
            }
        }
        if loop_range.enabled {
            if let Err(e) = self.broker.set_loop(loop_range.start, loop_range.end, true) {
                warn!("Could not restore loop: {e}");
            }
            self.remembered.loop_range = self.broker.loop_range();
        }
        if semitones != 0.0 {
            if let Err(e) = self.broker.set_pitch_semitones(f64::from(semitones)) {
                warn!("Could not restore pitch: {e}");
            }
        }
    }

    fn reset_all(&mut self) -> Result<()> {
        self.broker.reset_all()?;
        let duration = self.broker.element().map_or(0.0, MediaElement::duration);
        self.remembered = Remembered::defaults(duration);
        Ok(())
    }

    /// Drain and handle pending element events.
    pub fn pump_events(&mut self) -> Vec<Notification> {
        let mut notifications = Vec::new();

        while let Some((event, outcome)) = self.broker.poll_event() {
            match outcome {
                EventOutcome::Looped(trigger) => {
                    debug!("Loop restart via {trigger}");
                    self.rebase_detector();
                }
                EventOutcome::EndOfStream => {
                    info!("Stream ended");
                    notifications.push(Notification::Ended);
                }
                EventOutcome::Nothing => {
                    if let ElementEvent::Seeked(position) = event {
                        debug!("Seeked to {}", cadence_core::format_time(position));
                    }
                }
            }
        }

        notifications
    }

    /// Run the periodic loop check.
    pub fn poll_loop(&mut self) {
        if self.broker.poll_loop().is_some() {
            self.rebase_detector();
        }
    }

    /// Sample the track-change detector, resetting everything on a hit.
    pub fn check_track_change(&mut self) -> Option<Notification> {
        let reason = self.detector.sample(self.broker.element()?)?;
        info!("New track detected: {reason}");

        if let Err(e) = self.reset_all() {
            warn!("Reset after track change failed: {e}");
        }
        if let Some(element) = self.broker.element() {
            self.detector.prime(element);
        }

        Some(Notification::TrackChanged {
            reason: reason.tag().to_string(),
        })
    }

    fn rebase_detector(&mut self) {
        if let Some(element) = self.broker.element() {
            self.detector.rebase(element.current_time());
        }
    }

    /// Serve commands until the command channel closes or the transport
    /// goes away.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, outgoing: mpsc::Sender<Outgoing>) {
        let mut pump = interval(self.settings.session.event_pump_interval());
        let mut loop_poll = interval(self.settings.loop_guard.poll_interval());
        let mut sampler = interval(self.settings.track_change.sample_interval());
        for timer in [&mut pump, &mut loop_poll, &mut sampler] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }
        // The first tick of an interval fires immediately.
        sampler.tick().await;

        let mut last_pump = Instant::now();
        info!("Session loop running");

        loop {
            let mut messages = Vec::new();

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("Command channel closed");
                        break;
                    };
                    messages.push(Outgoing::Response(self.dispatch(command)));
                }
                _ = pump.tick() => {
                    let now = Instant::now();
                    if let Some(element) = self.broker.element_mut() {
                        element.tick(now - last_pump);
                    }
                    last_pump = now;
                    messages.extend(self.pump_events().into_iter().map(Outgoing::Notification));
                }
                _ = loop_poll.tick(), if self.broker.loop_guard().poll_armed() => {
                    self.poll_loop();
                }
                _ = sampler.tick(), if self.settings.track_change.enabled => {
                    if let Some(notification) = self.check_track_change() {
                        messages.push(Outgoing::Notification(notification));
                    }
                }
            }

            for message in messages {
                if outgoing.send(message).await.is_err() {
                    debug!("Transport closed");
                    return;
                }
            }
        }

        info!("Session loop stopped");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use cadence_audio::SimulatedElement;

    use super::*;

    fn session() -> Session<SimulatedElement> {
        let settings = Settings::default();
        let broker = Broker::new(SimulatedElement::new("Track", 200.0), &settings);
        Session::new(broker, settings, PreferenceStore::ephemeral())
    }

    #[test]
    fn test_unknown_element_reports_failure() {
        let settings = Settings::default();
        let broker: Broker<SimulatedElement> = Broker::without_element(&settings);
        let mut session = Session::new(broker, settings, PreferenceStore::ephemeral());

        let response = session.dispatch(Command::GetVideoInfo);
        assert!(!response.success);
        assert!(response.error.is_some());
    }

    #[test]
    fn test_adjust_speed_steps_from_current() {
        let mut session = session();
        session.dispatch(Command::SetPlaybackRate { speed: 1.5 });
        let response = session.dispatch(Command::AdjustSpeed { delta: 0.25 });
        assert_eq!(response.body, ResponseBody::Speed { speed: 1.75 });

        let response = session.dispatch(Command::AdjustSpeed { delta: 10.0 });
        assert_eq!(response.body, ResponseBody::Speed { speed: 4.0 });
    }

    #[test]
    fn test_adjust_pitch_steps_from_current() {
        let mut session = session();
        session.dispatch(Command::SetPitch { pitch: 2.0 });
        let response = session.dispatch(Command::AdjustPitch { delta: -3.0 });
        assert_eq!(response.body, ResponseBody::Pitch { current_pitch: -1.0 });
    }

    #[test]
    fn test_failed_pitch_change_reports_current_pitch() {
        let settings = Settings::default();
        let broker: Broker<SimulatedElement> = Broker::without_element(&settings);
        let mut session = Session::new(broker, settings, PreferenceStore::ephemeral());

        let response = session.dispatch(Command::SetPitch { pitch: 3.0 });
        assert!(!response.success);
        assert!(response.error.is_some());
        assert_eq!(response.body, ResponseBody::Pitch { current_pitch: 0.0 });
        assert_eq!(
            Outgoing::Response(response).to_json().unwrap(),
            r#"{"success":false,"error":"Resource unavailable: No media element","currentPitch":0.0}"#
        );

        let response = session.dispatch(Command::AdjustPitch { delta: 1.0 });
        assert!(!response.success);
        assert_eq!(response.body, ResponseBody::Pitch { current_pitch: 0.0 });
    }

    #[test]
    fn test_outgoing_json_shapes() {
        let response = Outgoing::Response(Response::with_body(ResponseBody::Pitch {
            current_pitch: 3.0,
        }));
        assert_eq!(
            response.to_json().unwrap(),
            r#"{"success":true,"currentPitch":3.0}"#
        );
        let ended = Outgoing::Notification(Notification::Ended);
        assert_eq!(ended.to_json().unwrap(), r#"{"event":"ended"}"#);
    }
}
