//! Audio output using cpal.
//!
//! The output callback is the element's playback clock. It pulls decoded
//! frames from the ring at `rate` frames per output frame (linear
//! interpolation between neighbours), which is how the native playback
//! rate changes tempo and pitch together. The resulting pre-volume tap
//! feeds both the direct path (`tap * volume`, unless muted) and the
//! processing graph, and the two are summed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF64;
use cadence_core::{Error, Result, VolumeLevel};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig,
};
use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};

use crate::buffer::{SampleRing, SharedSampleRing};
use crate::graph::{GraphRenderer, MAX_CHANNELS};
use crate::param::{SharedFlag, SharedParam};

/// Frames rendered per scratch pass inside one callback.
const SCRATCH_FRAMES: usize = 2048;

/// Above this magnitude the output is soft limited.
const SOFT_LIMIT: f32 = 0.9;

/// Playback controls shared between the element handle and the callback.
#[derive(Debug)]
pub struct Transport {
    playing: SharedFlag,
    ended: SharedFlag,
    muted: SharedFlag,
    flush: SharedFlag,
    starved: SharedFlag,
    volume: SharedParam,
    rate: AtomicF64,
    frames_consumed: AtomicU64,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    /// Paused, unmuted, full volume, normal rate.
    pub fn new() -> Self {
        Self {
            playing: SharedFlag::new(false),
            ended: SharedFlag::new(false),
            muted: SharedFlag::new(false),
            flush: SharedFlag::new(false),
            starved: SharedFlag::new(false),
            volume: SharedParam::new(1.0),
            rate: AtomicF64::new(1.0),
            frames_consumed: AtomicU64::new(0),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    pub fn set_playing(&self, playing: bool) -> bool {
        self.playing.replace(playing)
    }

    /// Set when the source ran out; cleared by the next play or seek.
    pub fn is_ended(&self) -> bool {
        self.ended.get()
    }

    pub fn set_ended(&self, ended: bool) {
        self.ended.set(ended);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.get()
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.set(muted);
    }

    pub fn volume(&self) -> f32 {
        self.volume.get()
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.set(VolumeLevel::saturating(volume).gain());
    }

    pub fn rate(&self) -> f64 {
        self.rate.load(Ordering::Acquire)
    }

    pub fn set_rate(&self, rate: f64) {
        self.rate.store(rate, Ordering::Release);
    }

    /// Source frames the callback has played since the last reset.
    pub fn frames_consumed(&self) -> u64 {
        self.frames_consumed.load(Ordering::Acquire)
    }

    pub fn reset_frames(&self) {
        self.frames_consumed.store(0, Ordering::Release);
    }

    fn add_frames(&self, frames: u64) {
        if frames > 0 {
            self.frames_consumed.fetch_add(frames, Ordering::AcqRel);
        }
    }

    /// Ask the callback to drop its interpolation state (after a seek).
    pub fn request_flush(&self) {
        self.flush.set(true);
    }

    fn take_flush(&self) -> bool {
        self.flush.replace(false)
    }

    /// The last callback ran out of source data before its end.
    pub fn is_starved(&self) -> bool {
        self.starved.get()
    }
}

/// Layout of the decoded source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

/// Variable-rate reader over the source ring.
#[derive(Debug)]
struct Varispeed {
    channels: usize,
    phase: f64,
    current: [f32; MAX_CHANNELS],
    next: [f32; MAX_CHANNELS],
    incoming: [f32; MAX_CHANNELS],
    consumed: u64,
}

impl Varispeed {
    fn new(channels: usize) -> Self {
        Self {
            channels: channels.clamp(1, MAX_CHANNELS),
            phase: 1.0,
            current: [0.0; MAX_CHANNELS],
            next: [0.0; MAX_CHANNELS],
            incoming: [0.0; MAX_CHANNELS],
            consumed: 0,
        }
    }

    fn reset(&mut self) {
        self.phase = 1.0;
        self.current = [0.0; MAX_CHANNELS];
        self.next = [0.0; MAX_CHANNELS];
    }

    /// Produce one output frame into `out` (device layout).
    ///
    /// Returns false when the ring cannot supply the frames needed.
    fn next_frame(&mut self, ring: &SampleRing, step: f64, out: &mut [f32]) -> bool {
        while self.phase >= 1.0 {
            if !ring.read_frame(&mut self.incoming[..self.channels]) {
                return false;
            }
            self.current = self.next;
            self.next = self.incoming;
            self.phase -= 1.0;
            self.consumed += 1;
        }

        #[allow(clippy::cast_possible_truncation)]
        let t = self.phase as f32;
        for (ch, sample) in out.iter_mut().enumerate() {
            let src = ch.min(self.channels - 1);
            let a = self.current[src];
            *sample = (self.next[src] - a).mul_add(t, a);
        }

        self.phase += step;
        true
    }
}

/// Everything the output callback owns.
///
/// Buffers are allocated on construction; [`render`](Self::render) never
/// allocates or blocks.
pub struct OutputRenderer {
    ring: SharedSampleRing,
    transport: Arc<Transport>,
    graph_rx: Receiver<GraphRenderer>,
    graph: Option<GraphRenderer>,
    varispeed: Varispeed,
    device_channels: usize,
    /// Source frames per device frame at rate 1.
    rate_scale: f64,
    tap: Vec<f32>,
    wet: Vec<f32>,
}

impl OutputRenderer {
    pub fn new(
        ring: SharedSampleRing,
        transport: Arc<Transport>,
        graph_rx: Receiver<GraphRenderer>,
        source: SourceFormat,
        device_sample_rate: u32,
        device_channels: usize,
    ) -> Self {
        let device_channels = device_channels.max(1);
        Self {
            ring,
            transport,
            graph_rx,
            graph: None,
            varispeed: Varispeed::new(source.channels),
            device_channels,
            rate_scale: f64::from(source.sample_rate.max(1)) / f64::from(device_sample_rate.max(1)),
            tap: vec![0.0; SCRATCH_FRAMES * device_channels],
            wet: vec![0.0; SCRATCH_FRAMES * device_channels],
        }
    }

    /// Fill one device buffer.
    pub fn render<T>(&mut self, data: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        if let Ok(renderer) = self.graph_rx.try_recv() {
            self.graph = Some(renderer);
        }
        if self.transport.take_flush() {
            self.varispeed.reset();
        }

        if !self.transport.is_playing() {
            self.transport.starved.set(false);
            data.fill(T::from_sample(0.0f32));
            return;
        }

        let rate = self.transport.rate();
        let step = if rate.is_finite() && rate > 0.0 {
            rate * self.rate_scale
        } else {
            self.rate_scale
        };
        let volume = if self.transport.is_muted() {
            0.0
        } else {
            self.transport.volume()
        };

        let ch = self.device_channels;
        let mut starved = false;

        for chunk in data.chunks_mut(SCRATCH_FRAMES * ch) {
            let frames = chunk.len() / ch;
            let len = frames * ch;
            let tap = &mut self.tap[..len];
            let wet = &mut self.wet[..len];

            for frame in tap.chunks_exact_mut(ch) {
                if !self.varispeed.next_frame(&self.ring, step, frame) {
                    frame.fill(0.0);
                    starved = true;
                }
            }

            match self.graph.as_mut() {
                Some(graph) => graph.render_interleaved(tap, ch, wet),
                None => wet.fill(0.0),
            }

            for (i, sample) in chunk.iter_mut().enumerate() {
                let s = if i < len {
                    wet[i] + tap[i] * volume
                } else {
                    0.0
                };
                let limited = if s.abs() > SOFT_LIMIT { s.tanh() } else { s };
                *sample = T::from_sample(limited);
            }
        }

        self.transport
            .add_frames(std::mem::take(&mut self.varispeed.consumed));
        self.transport.starved.set(starved);
    }
}

/// Audio output stream wrapper.
pub struct AudioOutput {
    _stream: Stream,
    sample_rate: u32,
    channels: u16,
    device_name: String,
}

impl AudioOutput {
    /// Open the default output device and start streaming.
    pub fn open(
        ring: SharedSampleRing,
        transport: Arc<Transport>,
        graph_rx: Receiver<GraphRenderer>,
        source: SourceFormat,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        let supported = Self::pick_config(&device, source)?;
        debug!("Output config: {:?}", supported);

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();

        let renderer = OutputRenderer::new(
            ring,
            transport,
            graph_rx,
            source,
            config.sample_rate.0,
            usize::from(config.channels),
        );

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, renderer)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, renderer)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, renderer)?,
            _ => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            sample_rate: config.sample_rate.0,
            channels: config.channels,
            device_name,
        })
    }

    /// Prefer a config running at the source rate so the varispeed step
    /// is exactly the playback rate; fall back to the device default.
    fn pick_config(device: &Device, source: SourceFormat) -> Result<SupportedStreamConfig> {
        let wanted = SampleRate(source.sample_rate);

        if let Ok(ranges) = device.supported_output_configs() {
            let mut matching: Vec<_> = ranges
                .filter(|r| r.min_sample_rate() <= wanted && wanted <= r.max_sample_rate())
                .collect();
            matching.sort_by_key(|r| {
                (
                    usize::from(r.channels()).abs_diff(source.channels.max(2)),
                    r.sample_format() != SampleFormat::F32,
                )
            });
            if let Some(range) = matching.into_iter().next() {
                return Ok(range.with_sample_rate(wanted));
            }
        }

        warn!(
            "Device cannot run at {} Hz, resampling to its default rate",
            source.sample_rate
        );
        device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mut renderer: OutputRenderer,
    ) -> Result<Stream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.render(data),
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}
