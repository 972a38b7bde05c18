//! Loop guard: keeps playback inside `[start, end)`.
//!
//! Three boundary mechanisms are armed together while looping, because
//! none of them is guaranteed to fire in time on its own:
//!
//! 1. the end-of-stream interceptor swallows `Ended` and restarts at `start`,
//! 2. the position watcher reacts to every time update, jumping a little
//!    before `end` to hide the seek latency,
//! 3. the poll checks `end` on a fixed period in case updates stall.
//!
//! Each mechanism is a subscription holding its own copy of the
//! boundary. Disarming drops all three in one assignment.

use cadence_audio::MediaElement;
use cadence_core::settings::LoopSettings;
use cadence_core::{Error, LoopRange, LoopTriggers, Result};
use tracing::{debug, info, warn};

/// State of the guard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoopState {
    Idle,
    Looping { start: f64, end: f64 },
}

/// Which mechanism caused a jump back to the loop start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    EndedInterceptor,
    PositionWatcher,
    Poll,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EndedInterceptor => "ended interceptor",
            Self::PositionWatcher => "position watcher",
            Self::Poll => "poll",
        })
    }
}

/// Whether an `Ended` event should reach the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// The loop swallowed it.
    Stopped,
    Continue,
}

/// Result of an accepted `set_loop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Armed,
    Disabled,
    /// The range covered the whole stream; left idle.
    WholeStream,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Boundary {
    start: f64,
    end: f64,
}

/// The three named boundary subscriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Subscriptions {
    ended_interceptor: Option<Boundary>,
    position_watcher: Option<Boundary>,
    poll: Option<Boundary>,
}

/// Loop state machine over a [`MediaElement`].
#[derive(Debug)]
pub struct LoopGuard {
    settings: LoopSettings,
    state: LoopState,
    range: LoopRange,
    subscriptions: Subscriptions,
    jumps: u64,
}

impl LoopGuard {
    pub fn new(settings: LoopSettings) -> Self {
        Self {
            settings,
            state: LoopState::Idle,
            range: LoopRange::default(),
            subscriptions: Subscriptions::default(),
            jumps: 0,
        }
    }

    pub const fn state(&self) -> LoopState {
        self.state
    }

    pub const fn is_looping(&self) -> bool {
        matches!(self.state, LoopState::Looping { .. })
    }

    /// The range as reported to callers.
    pub const fn range(&self) -> LoopRange {
        self.range
    }

    /// Which subscriptions are currently live.
    pub const fn armed(&self) -> LoopTriggers {
        LoopTriggers {
            ended_interceptor: self.subscriptions.ended_interceptor.is_some(),
            position_watcher: self.subscriptions.position_watcher.is_some(),
            poll: self.subscriptions.poll.is_some(),
        }
    }

    /// The poll needs a timer only while it is subscribed.
    pub const fn poll_armed(&self) -> bool {
        self.subscriptions.poll.is_some()
    }

    /// Total jumps back to the loop start.
    pub const fn jumps(&self) -> u64 {
        self.jumps
    }

    /// Enable or disable looping for a stream of `duration` seconds.
    ///
    /// Rejected requests leave the previous state untouched.
    pub fn set_loop(&mut self, start: f64, end: f64, enabled: bool, duration: f64) -> Result<LoopOutcome> {
        if !enabled {
            self.disarm();
            self.range.enabled = false;
            info!("Loop disabled");
            return Ok(LoopOutcome::Disabled);
        }

        if !(start.is_finite() && end.is_finite()) {
            return Err(Error::validation("Loop bounds must be finite"));
        }
        if !(duration.is_finite() && duration > 0.0) {
            return Err(Error::unavailable("Stream duration is unknown"));
        }
        if start < 0.0 || start >= end || end > duration {
            return Err(Error::validation(format!(
                "Invalid loop range {start:.2}..{end:.2} for duration {duration:.2}"
            )));
        }

        let margin = self.settings.safety_margin_secs;

        if start == 0.0 && end >= duration - margin {
            self.disarm();
            self.range = LoopRange::whole(duration);
            info!("Loop covers the whole stream, leaving it disabled");
            return Ok(LoopOutcome::WholeStream);
        }

        let end = end.min(duration - margin);
        if start >= end {
            return Err(Error::validation(format!(
                "Loop range {start:.2}..{end:.2} is empty after the end-of-stream margin"
            )));
        }

        // Old subscriptions go before new ones are armed.
        self.disarm();

        let boundary = Boundary { start, end };
        let triggers = self.settings.triggers;
        self.subscriptions = Subscriptions {
            ended_interceptor: triggers.ended_interceptor.then_some(boundary),
            position_watcher: triggers.position_watcher.then_some(boundary),
            poll: triggers.poll.then_some(boundary),
        };
        self.state = LoopState::Looping { start, end };
        self.range = LoopRange::new(start, end, true);

        info!("Loop armed: {:.2}s -> {:.2}s ({:?})", start, end, triggers);
        Ok(LoopOutcome::Armed)
    }

    /// Handle the element's end-of-stream signal.
    pub fn on_ended<E>(&mut self, element: &mut E) -> Propagation
    where
        E: MediaElement + ?Sized,
    {
        let Some(boundary) = self.subscriptions.ended_interceptor else {
            return Propagation::Continue;
        };

        self.jump(element, boundary, Trigger::EndedInterceptor);
        if let Err(e) = element.play() {
            warn!("Could not resume after loop restart: {e}");
        }
        Propagation::Stopped
    }

    /// Handle a time update. Returns the trigger if a jump happened.
    pub fn on_time_update<E>(&mut self, element: &mut E) -> Option<Trigger>
    where
        E: MediaElement + ?Sized,
    {
        let boundary = self.subscriptions.position_watcher?;
        if element.paused() {
            return None;
        }

        let position = element.current_time();
        let near_end = position >= boundary.end - self.settings.preempt_secs;
        if near_end || position >= boundary.end || position < boundary.start {
            self.jump(element, boundary, Trigger::PositionWatcher);
            return Some(Trigger::PositionWatcher);
        }
        None
    }

    /// Periodic check. Returns the trigger if a jump happened.
    pub fn on_poll<E>(&mut self, element: &mut E) -> Option<Trigger>
    where
        E: MediaElement + ?Sized,
    {
        let boundary = self.subscriptions.poll?;
        if element.paused() {
            return None;
        }

        if element.current_time() >= boundary.end {
            self.jump(element, boundary, Trigger::Poll);
            return Some(Trigger::Poll);
        }
        None
    }

    /// Back to idle with bounds spanning the whole stream.
    pub fn reset(&mut self, duration: f64) {
        self.disarm();
        self.range = LoopRange::whole(duration.max(0.0));
    }

    fn disarm(&mut self) {
        if self.subscriptions != Subscriptions::default() {
            debug!("Loop subscriptions torn down");
        }
        self.subscriptions = Subscriptions::default();
        self.state = LoopState::Idle;
    }

    fn jump<E>(&mut self, element: &mut E, boundary: Boundary, trigger: Trigger)
    where
        E: MediaElement + ?Sized,
    {
        debug!(
            "Loop jump to {:.2}s from {:.2}s via {trigger}",
            boundary.start,
            element.current_time()
        );
        element.set_current_time(boundary.start);
        self.jumps += 1;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use std::time::Duration;

    use cadence_audio::SimulatedElement;

    use super::*;

    fn guard(triggers: LoopTriggers) -> LoopGuard {
        LoopGuard::new(LoopSettings {
            triggers,
            ..LoopSettings::default()
        })
    }

    fn playing(duration: f64) -> SimulatedElement {
        let mut element = SimulatedElement::new("Track", duration);
        element.play().unwrap();
        element.clear_events();
        element
    }

    #[test]
    fn test_disabled_request_goes_idle() {
        let mut guard = guard(LoopTriggers::all());
        guard.set_loop(10.0, 50.0, true, 120.0).unwrap();
        assert_eq!(
            guard.set_loop(0.0, 0.0, false, 120.0).unwrap(),
            LoopOutcome::Disabled
        );
        assert_eq!(guard.state(), LoopState::Idle);
        assert_eq!(guard.armed(), LoopTriggers::none());
        assert!(!guard.range().enabled);
    }

    #[test]
    fn test_invalid_ranges_leave_state_unchanged() {
        let mut guard = guard(LoopTriggers::all());
        guard.set_loop(10.0, 50.0, true, 120.0).unwrap();

        for (start, end) in [(50.0, 10.0), (20.0, 20.0), (-1.0, 5.0), (10.0, 130.0)] {
            let err = guard.set_loop(start, end, true, 120.0).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{start}..{end}");
        }
        assert!(guard.set_loop(f64::NAN, 5.0, true, 120.0).is_err());

        assert_eq!(guard.state(), LoopState::Looping { start: 10.0, end: 50.0 });
        assert_eq!(guard.armed(), LoopTriggers::all());
    }

    #[test]
    fn test_whole_stream_is_coerced_to_idle() {
        let mut guard = guard(LoopTriggers::all());
        assert_eq!(
            guard.set_loop(0.0, 120.0, true, 120.0).unwrap(),
            LoopOutcome::WholeStream
        );
        assert_eq!(
            guard.set_loop(0.0, 119.6, true, 120.0).unwrap(),
            LoopOutcome::WholeStream
        );
        assert_eq!(guard.state(), LoopState::Idle);
        assert_eq!(guard.range(), LoopRange::whole(120.0));
    }

    #[test]
    fn test_end_is_clamped_to_safety_margin() {
        let mut guard = guard(LoopTriggers::all());
        guard.set_loop(30.0, 120.0, true, 120.0).unwrap();
        assert_eq!(guard.state(), LoopState::Looping { start: 30.0, end: 119.5 });
    }

    #[test]
    fn test_range_emptied_by_margin_is_rejected() {
        let mut guard = guard(LoopTriggers::all());
        assert!(guard.set_loop(119.7, 120.0, true, 120.0).is_err());
        assert_eq!(guard.state(), LoopState::Idle);
    }

    #[test]
    fn test_unknown_duration_is_unavailable() {
        let mut guard = guard(LoopTriggers::all());
        let err = guard.set_loop(1.0, 2.0, true, 0.0).unwrap_err();
        assert!(matches!(err, Error::Unavailable(_)));
    }

    #[test]
    fn test_only_selected_triggers_are_armed() {
        let mut guard = guard(LoopTriggers::only_poll());
        guard.set_loop(1.0, 5.0, true, 60.0).unwrap();
        assert_eq!(guard.armed(), LoopTriggers::only_poll());
        assert!(guard.poll_armed());
    }

    #[test]
    fn test_ended_interceptor_restarts_at_start() {
        let mut guard = guard(LoopTriggers::only_ended_interceptor());
        let mut element = playing(20.0);
        guard.set_loop(5.0, 10.0, true, 20.0).unwrap();

        element.advance(Duration::from_secs(25));
        assert!(element.paused());

        assert_eq!(guard.on_ended(&mut element), Propagation::Stopped);
        assert_eq!(element.current_time(), 5.0);
        assert!(!element.paused());
    }

    #[test]
    fn test_ended_passes_through_when_idle() {
        let mut guard = guard(LoopTriggers::all());
        let mut element = playing(20.0);
        element.advance(Duration::from_secs(25));

        assert_eq!(guard.on_ended(&mut element), Propagation::Continue);
        assert_eq!(element.current_time(), 20.0);
    }

    #[test]
    fn test_rejected_resume_is_tolerated() {
        let mut guard = guard(LoopTriggers::all());
        let mut element = playing(20.0);
        guard.set_loop(5.0, 10.0, true, 20.0).unwrap();
        element.advance(Duration::from_secs(25));
        element.set_reject_play(true);

        assert_eq!(guard.on_ended(&mut element), Propagation::Stopped);
        assert_eq!(element.current_time(), 5.0);
    }

    #[test]
    fn test_position_watcher_jumps_early() {
        let mut guard = guard(LoopTriggers::only_position_watcher());
        let mut element = playing(60.0);
        guard.set_loop(10.0, 20.0, true, 60.0).unwrap();

        element.set_current_time(19.5);
        assert_eq!(guard.on_time_update(&mut element), None);

        element.set_current_time(19.75);
        assert_eq!(
            guard.on_time_update(&mut element),
            Some(Trigger::PositionWatcher)
        );
        assert_eq!(element.current_time(), 10.0);
    }

    #[test]
    fn test_position_watcher_catches_undershoot() {
        let mut guard = guard(LoopTriggers::only_position_watcher());
        let mut element = playing(60.0);
        guard.set_loop(10.0, 20.0, true, 60.0).unwrap();

        element.set_current_time(3.0);
        assert!(guard.on_time_update(&mut element).is_some());
        assert_eq!(element.current_time(), 10.0);
    }

    #[test]
    fn test_poll_jumps_only_past_end() {
        let mut guard = guard(LoopTriggers::only_poll());
        let mut element = playing(60.0);
        guard.set_loop(10.0, 20.0, true, 60.0).unwrap();

        element.set_current_time(19.9);
        assert_eq!(guard.on_poll(&mut element), None);
        element.set_current_time(20.0);
        assert_eq!(guard.on_poll(&mut element), Some(Trigger::Poll));
        assert_eq!(element.current_time(), 10.0);
        assert_eq!(guard.jumps(), 1);
    }

    #[test]
    fn test_paused_element_is_left_alone() {
        let mut guard = guard(LoopTriggers::all());
        let mut element = SimulatedElement::new("Track", 60.0);
        guard.set_loop(10.0, 20.0, true, 60.0).unwrap();
        element.set_current_time(30.0);

        assert_eq!(guard.on_time_update(&mut element), None);
        assert_eq!(guard.on_poll(&mut element), None);
        assert_eq!(element.current_time(), 30.0);
    }

    #[test]
    fn test_disable_then_enable_uses_new_bounds_only() {
        let mut guard = guard(LoopTriggers::all());
        let mut element = playing(120.0);
        guard.set_loop(10.0, 20.0, true, 120.0).unwrap();
        guard.set_loop(0.0, 0.0, false, 120.0).unwrap();
        guard.set_loop(40.0, 60.0, true, 120.0).unwrap();

        element.set_current_time(45.0);
        assert_eq!(guard.on_time_update(&mut element), None);
        assert_eq!(guard.on_poll(&mut element), None);

        element.set_current_time(61.0);
        assert!(guard.on_poll(&mut element).is_some());
        assert_eq!(element.current_time(), 40.0);
    }

    #[test]
    fn test_reset_widens_bounds() {
        let mut guard = guard(LoopTriggers::all());
        guard.set_loop(10.0, 50.0, true, 120.0).unwrap();
        guard.reset(200.0);
        assert_eq!(guard.state(), LoopState::Idle);
        assert_eq!(guard.range(), LoopRange::new(0.0, 200.0, false));
        assert_eq!(guard.armed(), LoopTriggers::none());
    }
}
