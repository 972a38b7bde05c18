//! Property-based tests for the pitch processor and processing graph.

use std::sync::Arc;

use cadence_audio::{GraphRenderer, MediaElement, PitchProcessor, ProcessingGraph, SimulatedElement};
use proptest::prelude::*;

fn peak(buffer: &[f32]) -> f32 {
    buffer.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

fn run(semitones: f32, input: &[f32]) -> Vec<f32> {
    let mut processor = PitchProcessor::new();
    let mut output = vec![f32::NAN; input.len()];
    {
        let inputs: [&[f32]; 1] = [input];
        let mut outputs: [&mut [f32]; 1] = [&mut output];
        processor.process(semitones, &inputs, &mut outputs);
    }
    output
}

proptest! {
    /// Property: a zero shift is an exact copy of the input
    #[test]
    fn zero_shift_is_identity(samples in prop::collection::vec(-1.0f32..1.0, 1..512)) {
        prop_assert_eq!(run(0.0, &samples), samples);
    }

    /// Property: every output sample is written, finite and within the input peak
    #[test]
    fn output_is_complete_and_bounded(
        semitones in -24.0f32..24.0,
        samples in prop::collection::vec(-1.0f32..1.0, 1..512)
    ) {
        let output = run(semitones, &samples);

        prop_assert_eq!(output.len(), samples.len());
        prop_assert!(output.iter().all(|s| s.is_finite()));
        prop_assert!(peak(&output) <= peak(&samples) + 1e-6);
    }

    /// Property: lowering the pitch never reads past the block
    #[test]
    fn downward_shift_has_no_silent_tail(
        semitones in -24.0f32..-0.5,
        samples in prop::collection::vec(0.5f32..1.0, 2..256)
    ) {
        let output = run(semitones, &samples);
        prop_assert!(output.iter().all(|&s| s >= 0.5 - 1e-6));
    }

    /// Property: any raw value lands inside the supported range
    #[test]
    fn stored_semitones_are_always_in_range(raw in any::<f32>()) {
        let graph = ProcessingGraph::new();
        graph.set_semitones(raw);
        let stored = graph.semitones();
        prop_assert!((-24.0..=24.0).contains(&stored));
    }

    /// Property: the renderer preserves buffer length for any channel layout
    #[test]
    fn renderer_writes_whole_buffer(
        channels in 1usize..4,
        frames in 1usize..400,
        semitones in -24.0f32..24.0
    ) {
        let graph = ProcessingGraph::shared();
        let mut element = SimulatedElement::new("Track", 60.0);
        graph.attach(&mut element).map_err(|e| TestCaseError::fail(e.to_string()))?;
        graph.activate();
        graph.set_semitones(semitones);

        let mut renderer = GraphRenderer::new(Arc::clone(&graph));
        let tap = vec![0.25f32; frames * channels];
        let mut out = vec![f32::NAN; frames * channels];
        renderer.render_interleaved(&tap, channels, &mut out);

        prop_assert!(out.iter().all(|s| s.is_finite()));
        prop_assert!(peak(&out) <= 0.25 + 1e-6);
    }
}

#[test]
fn element_hears_graph_only_after_activation() {
    let graph = ProcessingGraph::shared();
    let mut element = SimulatedElement::new("Track", 60.0);
    graph.attach(&mut element).ok();
    element.set_muted(true);

    let tap = vec![0.5f32; 256];
    assert!(element.render_block(&tap, 2).iter().all(|&s| s == 0.0));

    graph.activate();
    // The first quantum after activation is still being gathered.
    assert!(element.render_block(&tap, 2).iter().all(|&s| s == 0.0));
    let out = element.render_block(&tap, 2);
    assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-6));
}
