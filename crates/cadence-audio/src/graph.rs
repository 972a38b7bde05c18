//! Processing graph: element tap -> pitch processor -> gain -> output.
//!
//! [`ProcessingGraph`] is the control-lane half. It only holds atomics, so
//! it can be shared with the audio callback through an `Arc`. The audio
//! half, [`GraphRenderer`], owns the [`PitchProcessor`] and the scratch
//! buffers and reads the shared parameters once per quantum. Quanta have a
//! fixed size whatever the device callback size, at the cost of one
//! quantum of latency.

use std::sync::Arc;

use cadence_core::settings::BLOCK_FRAMES;
use cadence_core::{Result, VolumeLevel};
use tracing::{debug, info};

use crate::element::MediaElement;
use crate::param::{SharedFlag, SharedParam};
use crate::pitch::PitchProcessor;

/// Most channels the renderer handles. Extra channels are silenced.
pub const MAX_CHANNELS: usize = 8;

/// Attachment state of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Not yet connected to any element.
    Detached,
    /// Connected. `active` graphs are audible; inactive ones output silence
    /// and leave the element's own output in charge.
    Attached { active: bool },
}

/// Result of [`ProcessingGraph::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    AlreadyAttached,
}

/// Shared parameters and state of the processing graph.
#[derive(Debug)]
pub struct ProcessingGraph {
    attached: SharedFlag,
    active: SharedFlag,
    running: SharedFlag,
    semitones: SharedParam,
    gain: SharedParam,
}

impl Default for ProcessingGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingGraph {
    /// A detached, suspended graph with unity gain and no shift.
    pub fn new() -> Self {
        Self {
            attached: SharedFlag::new(false),
            active: SharedFlag::new(false),
            running: SharedFlag::new(false),
            semitones: SharedParam::new(0.0),
            gain: SharedParam::new(1.0),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn state(&self) -> GraphState {
        if self.attached.get() {
            GraphState::Attached {
                active: self.active.get(),
            }
        } else {
            GraphState::Detached
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.get()
    }

    /// Attached and audible.
    pub fn is_active(&self) -> bool {
        self.attached.get() && self.active.get()
    }

    /// Connect the graph to an element's audio tap.
    ///
    /// Idempotent: a second call only resumes the audio context. The
    /// graph starts inactive; call [`activate`](Self::activate) to make
    /// it audible.
    pub fn attach<E>(self: &Arc<Self>, element: &mut E) -> Result<AttachOutcome>
    where
        E: MediaElement + ?Sized,
    {
        if self.attached.get() {
            self.resume();
            return Ok(AttachOutcome::AlreadyAttached);
        }

        element.attach_graph(Arc::clone(self))?;
        self.attached.set(true);
        self.resume();
        info!("Processing graph attached");
        Ok(AttachOutcome::Attached)
    }

    /// Make an attached graph audible. Returns true if it was inactive.
    pub fn activate(&self) -> bool {
        if !self.attached.get() {
            return false;
        }
        let was_active = self.active.replace(true);
        if !was_active {
            debug!("Processing graph activated");
        }
        !was_active
    }

    /// Silence the graph without detaching it. Returns true if it was active.
    pub fn deactivate(&self) -> bool {
        let was_active = self.active.replace(false);
        if was_active {
            debug!("Processing graph deactivated");
        }
        was_active
    }

    /// Audio context run state. A suspended graph renders silence.
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Resume the audio context if it is suspended.
    pub fn resume(&self) {
        if !self.running.replace(true) {
            debug!("Audio context resumed");
        }
    }

    pub fn suspend(&self) {
        if self.running.replace(false) {
            debug!("Audio context suspended");
        }
    }

    pub fn semitones(&self) -> f32 {
        self.semitones.get()
    }

    /// Store an already clamped shift for the audio lane.
    pub fn set_semitones(&self, semitones: f32) {
        self.semitones.set(PitchProcessor::sanitize(semitones));
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.set(VolumeLevel::saturating(gain).gain());
    }
}

/// Audio-lane half of the graph.
///
/// Gathers incoming audio into fixed quanta regardless of how the device
/// sizes its callbacks, runs the pitch processor and applies the gain
/// node. A quantum can only be processed once it is complete, so output
/// trails the tap by one quantum. All buffers are allocated up front.
#[derive(Debug)]
pub struct GraphRenderer {
    graph: Arc<ProcessingGraph>,
    processor: PitchProcessor,
    block_frames: usize,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
    /// Frames gathered into the current quantum. The same number of frames
    /// of the previous quantum have been played.
    filled: usize,
    /// Gain sampled when the quantum in `output` was processed.
    block_gain: f32,
    channels: usize,
    primed: bool,
}

impl GraphRenderer {
    pub fn new(graph: Arc<ProcessingGraph>) -> Self {
        Self::with_block_frames(graph, BLOCK_FRAMES)
    }

    pub fn with_block_frames(graph: Arc<ProcessingGraph>, block_frames: usize) -> Self {
        let block_frames = block_frames.max(1);
        Self {
            graph,
            processor: PitchProcessor::new(),
            block_frames,
            input: vec![vec![0.0; block_frames]; MAX_CHANNELS],
            output: vec![vec![0.0; block_frames]; MAX_CHANNELS],
            filled: 0,
            block_gain: 0.0,
            channels: 0,
            primed: false,
        }
    }

    pub const fn block_frames(&self) -> usize {
        self.block_frames
    }

    /// Delay between a tap frame and its processed output, in frames.
    pub const fn latency_frames(&self) -> usize {
        self.block_frames
    }

    pub fn graph(&self) -> &Arc<ProcessingGraph> {
        &self.graph
    }

    /// Render the graph's contribution for interleaved `tap` into `out`.
    ///
    /// `out` is overwritten; it is silence when the graph is detached,
    /// inactive or suspended. Lengths are in samples; only whole frames
    /// present in both buffers are rendered, the rest of `out` is zeroed.
    /// A quantum left incomplete at the end of the call is finished by the
    /// next call.
    pub fn render_interleaved(&mut self, tap: &[f32], channels: usize, out: &mut [f32]) {
        if channels == 0 {
            out.fill(0.0);
            return;
        }

        let frames = (tap.len() / channels).min(out.len() / channels);
        out[frames * channels..].fill(0.0);

        let audible = self.graph.is_active() && self.graph.is_running();
        if !audible || channels != self.channels {
            self.reset(channels);
        }
        if !audible {
            out[..frames * channels].fill(0.0);
            return;
        }

        let used = channels.min(MAX_CHANNELS);
        for frame in 0..frames {
            let base = frame * channels;
            for ch in 0..channels {
                out[base + ch] = if ch < used {
                    self.output[ch][self.filled] * self.block_gain
                } else {
                    0.0
                };
            }
            for ch in 0..used {
                self.input[ch][self.filled] = tap[base + ch];
            }

            self.filled += 1;
            if self.filled == self.block_frames {
                self.process_quantum(used);
                self.filled = 0;
            }
        }
    }

    fn process_quantum(&mut self, used: usize) {
        // Parameters are sampled once per quantum.
        let semitones = self.graph.semitones();
        self.block_gain = self.graph.gain();

        let inputs: [&[f32]; MAX_CHANNELS] = std::array::from_fn(|ch| self.input[ch].as_slice());
        let mut blocks = self.output.iter_mut();
        let mut outputs: [&mut [f32]; MAX_CHANNELS] =
            std::array::from_fn(|_| match blocks.next() {
                Some(block) => block.as_mut_slice(),
                None => &mut [],
            });
        self.processor
            .process(semitones, &inputs[..used], &mut outputs[..used]);
        self.primed = true;
    }

    /// Drop any partial quantum and stale output.
    fn reset(&mut self, channels: usize) {
        if self.primed {
            for block in &mut self.output {
                block.fill(0.0);
            }
            self.primed = false;
        }
        self.filled = 0;
        self.channels = channels;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use crate::sim::SimulatedElement;

    #[test]
    fn test_attach_is_idempotent() {
        let graph = ProcessingGraph::shared();
        let mut element = SimulatedElement::new("Track", 120.0);

        assert_eq!(graph.state(), GraphState::Detached);
        assert_eq!(graph.attach(&mut element).unwrap(), AttachOutcome::Attached);
        assert_eq!(
            graph.attach(&mut element).unwrap(),
            AttachOutcome::AlreadyAttached
        );
        assert_eq!(graph.state(), GraphState::Attached { active: false });
        assert_eq!(element.attach_count(), 1);
        assert!(graph.is_running());
    }

    #[test]
    fn test_activate_requires_attach() {
        let graph = ProcessingGraph::shared();
        assert!(!graph.activate());
        assert!(!graph.is_active());

        let mut element = SimulatedElement::new("Track", 120.0);
        graph.attach(&mut element).unwrap();
        assert!(graph.activate());
        assert!(!graph.activate());
        assert!(graph.is_active());
        assert!(graph.deactivate());
        assert_eq!(graph.state(), GraphState::Attached { active: false });
    }

    #[test]
    fn test_parameters_are_sanitized() {
        let graph = ProcessingGraph::new();
        graph.set_semitones(f32::NAN);
        assert_eq!(graph.semitones(), 0.0);
        graph.set_semitones(-40.0);
        assert_eq!(graph.semitones(), -24.0);
        graph.set_gain(1.7);
        assert_eq!(graph.gain(), 1.0);
        graph.set_gain(f32::NAN);
        assert_eq!(graph.gain(), 0.0);
    }

    #[test]
    fn test_inactive_graph_renders_silence() {
        let graph = ProcessingGraph::shared();
        let mut renderer = GraphRenderer::new(Arc::clone(&graph));
        let tap = vec![0.5f32; 256];
        let mut out = vec![1.0f32; 256];

        renderer.render_interleaved(&tap, 2, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_active_graph_applies_gain_and_passthrough() {
        let graph = ProcessingGraph::shared();
        let mut element = SimulatedElement::new("Track", 120.0);
        graph.attach(&mut element).unwrap();
        graph.activate();
        graph.set_gain(0.5);

        let mut renderer = GraphRenderer::with_block_frames(Arc::clone(&graph), 4);
        let tap: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let mut out = vec![1.0f32; 20];

        renderer.render_interleaved(&tap, 2, &mut out);

        // One quantum (4 stereo frames) of latency, then the tap at half gain.
        assert!(out[..8].iter().all(|&s| s == 0.0));
        let expected: Vec<f32> = tap[..12].iter().map(|s| s * 0.5).collect();
        assert_eq!(&out[8..], expected.as_slice());
    }

    #[test]
    fn test_suspended_context_is_silent() {
        let graph = ProcessingGraph::shared();
        let mut element = SimulatedElement::new("Track", 120.0);
        graph.attach(&mut element).unwrap();
        graph.activate();
        graph.suspend();

        let mut renderer = GraphRenderer::new(Arc::clone(&graph));
        let tap = vec![0.25f32; 64];
        let mut out = vec![1.0f32; 64];
        renderer.render_interleaved(&tap, 1, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_each_quantum_is_resampled_independently() {
        let graph = ProcessingGraph::shared();
        let mut element = SimulatedElement::new("Track", 120.0);
        graph.attach(&mut element).unwrap();
        graph.activate();
        graph.set_semitones(12.0);

        let mut renderer = GraphRenderer::with_block_frames(Arc::clone(&graph), 4);
        let tap: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let mut out = vec![0.0f32; 12];
        renderer.render_interleaved(&tap, 1, &mut out);

        // Blocks of 4 read at double rate: [0,2,_,_] and [4,6,_,_], one
        // quantum late.
        assert_eq!(
            out,
            vec![0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 4.0, 6.0, 0.0, 0.0]
        );
    }

    fn pitched_renderer(block_frames: usize) -> GraphRenderer {
        let graph = ProcessingGraph::shared();
        let mut element = SimulatedElement::new("Track", 120.0);
        graph.attach(&mut element).unwrap();
        graph.activate();
        graph.set_semitones(12.0);
        GraphRenderer::with_block_frames(graph, block_frames)
    }

    #[test]
    fn test_quanta_span_device_callbacks() {
        let tap: Vec<f32> = (0..24).map(|i| i as f32).collect();

        let mut whole = pitched_renderer(4);
        let mut expected = vec![0.0f32; 24];
        whole.render_interleaved(&tap, 1, &mut expected);

        // Callbacks of 3 and 5 frames never line up with the quantum.
        let mut split = pitched_renderer(4);
        let mut out = vec![0.0f32; 24];
        let mut at = 0;
        for len in [3, 5, 3, 5, 3, 5] {
            split.render_interleaved(&tap[at..at + len], 1, &mut out[at..at + len]);
            at += len;
        }

        assert_eq!(out, expected);
        assert_eq!(&out[4..8], &[0.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_deactivation_drops_pending_audio() {
        let mut renderer = pitched_renderer(4);
        renderer.graph().set_semitones(0.0);
        let tap = [1.0f32; 6];
        let mut out = [0.0f32; 6];
        renderer.render_interleaved(&tap, 1, &mut out);
        assert_eq!(&out[4..], &[1.0, 1.0]);

        renderer.graph().deactivate();
        renderer.render_interleaved(&tap, 1, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));

        renderer.graph().activate();
        renderer.render_interleaved(&tap, 1, &mut out);
        assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(renderer.latency_frames(), 4);
    }
}
