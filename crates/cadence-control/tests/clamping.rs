//! Property-based tests for broker input handling.

use cadence_audio::{MediaElement, SimulatedElement};
use cadence_control::Broker;
use cadence_core::{LoopRange, Settings};
use proptest::prelude::*;

fn broker(duration: f64) -> Broker<SimulatedElement> {
    Broker::new(SimulatedElement::new("Track", duration), &Settings::default())
}

proptest! {
    /// Property: any finite speed lands in range at two-decimal resolution
    #[test]
    fn speed_is_always_in_range(speed in -100.0f64..100.0) {
        let mut broker = broker(60.0);
        let stored = broker.set_speed(speed).map_err(|e| TestCaseError::fail(e.to_string()))?.value();

        prop_assert!((0.25..=4.0).contains(&stored));
        prop_assert!(((stored * 100.0).round() - stored * 100.0).abs() < 1e-9);
        prop_assert_eq!(broker.element().map(MediaElement::playback_rate), Some(stored));
    }

    /// Property: any pitch request is stored clamped and reaches the graph unchanged
    #[test]
    fn pitch_is_always_in_range(semitones in -1000.0f64..1000.0) {
        let mut broker = broker(60.0);
        let stored = broker
            .set_pitch_semitones(semitones)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert!((-24.0..=24.0).contains(&stored));
        prop_assert_eq!(broker.pitch().semitones, stored);
        prop_assert_eq!(broker.graph().semitones(), stored);
    }

    /// Property: volume reads back what was written, whoever owns it
    #[test]
    fn volume_round_trips(volume in 0.0f64..=1.0, with_graph in any::<bool>()) {
        let mut broker = broker(60.0);
        if with_graph {
            broker.set_pitch_semitones(2.0).map_err(|e| TestCaseError::fail(e.to_string()))?;
        }
        broker.set_volume(volume).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let read = broker.volume().map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert!((f64::from(read) - volume).abs() < 1e-6);
    }

    /// Property: an accepted loop always satisfies the range invariants
    #[test]
    fn accepted_loops_respect_the_margin(
        duration in 5.0f64..600.0,
        a in 0.0f64..1.0,
        b in 0.0f64..1.0
    ) {
        let mut broker = broker(duration);
        let (start, end) = (a.min(b) * duration, a.max(b) * duration);

        if broker.set_loop(start, end, true).is_ok() {
            let range = broker.loop_range();
            if range.enabled {
                prop_assert!(range.start >= 0.0);
                prop_assert!(range.start < range.end);
                prop_assert!(range.end <= duration - 0.5 + 1e-9);
            } else {
                prop_assert_eq!(range, LoopRange::whole(duration));
            }
        } else {
            prop_assert!(!broker.loop_range().enabled);
        }
    }
}
