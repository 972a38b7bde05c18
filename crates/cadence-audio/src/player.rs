//! File-backed media element.
//!
//! [`FilePlayer`] is the handle the controller drives; a worker thread owns
//! the decoder and the cpal stream (which is not `Send`) and keeps the
//! sample ring topped up. Position is derived from frames the output
//! callback actually played, so it tracks the playback rate exactly.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_core::settings::AudioSettings;
use cadence_core::{Error, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use tracing::{debug, error, info, trace, warn};

use crate::buffer::{shared_sample_ring, SharedSampleRing};
use crate::decode::AudioDecoder;
use crate::element::{ElementEvent, MediaElement};
use crate::graph::{GraphRenderer, ProcessingGraph};
use crate::output::{AudioOutput, SourceFormat, Transport};

/// Seconds of decoded audio kept ahead of the output.
const RING_SECONDS: usize = 2;

/// Minimum free space (samples) before decoding another packet.
const MIN_FREE: usize = 2048;

/// Commands to the worker.
#[derive(Debug, Clone)]
enum PlayerCommand {
    Seek(f64),
    Shutdown,
}

/// A local audio file played through the default output device.
pub struct FilePlayer {
    title: String,
    duration: f64,
    source: SourceFormat,
    block_frames: usize,
    transport: Arc<Transport>,
    /// Position of the last seek; played frames are counted from here.
    position_base: Arc<RwLock<f64>>,
    command_tx: Sender<PlayerCommand>,
    event_tx: Sender<ElementEvent>,
    event_rx: Receiver<ElementEvent>,
    graph_tx: Sender<GraphRenderer>,
}

impl FilePlayer {
    /// Open `path` and start the output stream, paused at 0.
    pub fn open(path: &Path, settings: &AudioSettings) -> Result<Self> {
        let decoder = AudioDecoder::open(path)?;

        let title = decoder
            .title()
            .map(str::to_owned)
            .or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "Untitled".to_string());
        let duration = decoder.duration().unwrap_or(0.0);
        let source = SourceFormat {
            sample_rate: decoder.sample_rate(),
            channels: decoder.channels(),
        };

        let ring = shared_sample_ring(source.sample_rate as usize * source.channels * RING_SECONDS);
        let transport = Arc::new(Transport::new());
        let position_base = Arc::new(RwLock::new(0.0f64));

        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (graph_tx, graph_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

        let worker_transport = Arc::clone(&transport);
        let worker_base = Arc::clone(&position_base);
        let worker_events = event_tx.clone();
        let time_update_interval = settings.time_update_interval();

        std::thread::Builder::new()
            .name("cadence-player".to_string())
            .spawn(move || {
                // The stream must be created on the thread that keeps it alive.
                match AudioOutput::open(
                    Arc::clone(&ring),
                    Arc::clone(&worker_transport),
                    graph_rx,
                    source,
                ) {
                    Ok(output) => {
                        info!(
                            "Audio output initialized: {} Hz, {} channels, device: {}",
                            output.sample_rate(),
                            output.channels(),
                            output.device_name()
                        );
                        let _ = ready_tx.send(Ok(()));
                        PlayerWorker {
                            command_rx,
                            event_tx: worker_events,
                            transport: worker_transport,
                            position_base: worker_base,
                            ring,
                            decoder,
                            source,
                            time_update_interval,
                            pending: Vec::new(),
                            pending_pos: 0,
                            exhausted: false,
                            _output: output,
                        }
                        .run();
                    }
                    Err(e) => {
                        error!("Failed to initialize audio output: {e}");
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn player thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Player thread exited during startup".to_string()))??;

        info!("Loaded '{}' ({:.1}s)", title, duration);

        Ok(Self {
            title,
            duration,
            source,
            block_frames: settings.block_frames,
            transport,
            position_base,
            command_tx,
            event_tx,
            event_rx,
            graph_tx,
        })
    }

    fn send_command(&self, command: PlayerCommand) {
        if self.command_tx.send(command).is_err() {
            warn!("Player worker is gone");
        }
    }

    fn emit(&self, event: ElementEvent) {
        let _ = self.event_tx.send(event);
    }
}

impl Drop for FilePlayer {
    fn drop(&mut self) {
        let _ = self.command_tx.send(PlayerCommand::Shutdown);
    }
}

impl MediaElement for FilePlayer {
    #[allow(clippy::cast_precision_loss)]
    fn current_time(&self) -> f64 {
        let played = self.transport.frames_consumed() as f64 / f64::from(self.source.sample_rate);
        let position = *self.position_base.read() + played;
        if self.duration > 0.0 {
            position.min(self.duration)
        } else {
            position
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn paused(&self) -> bool {
        !self.transport.is_playing()
    }

    fn play(&mut self) -> Result<()> {
        if self.transport.is_ended() {
            self.set_current_time(0.0);
        }
        if !self.transport.set_playing(true) {
            self.emit(ElementEvent::Play);
        }
        Ok(())
    }

    fn pause(&mut self) {
        if self.transport.set_playing(false) {
            self.emit(ElementEvent::Pause);
        }
    }

    fn set_current_time(&mut self, seconds: f64) {
        let upper = if self.duration > 0.0 {
            self.duration
        } else {
            f64::MAX
        };
        let target = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, upper)
        };

        *self.position_base.write() = target;
        self.transport.reset_frames();
        self.transport.set_ended(false);
        self.send_command(PlayerCommand::Seek(target));
        self.emit(ElementEvent::Seeked(target));
    }

    fn playback_rate(&self) -> f64 {
        self.transport.rate()
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.transport.set_rate(rate);
    }

    fn volume(&self) -> f32 {
        self.transport.volume()
    }

    fn set_volume(&mut self, volume: f32) {
        self.transport.set_volume(volume);
    }

    fn muted(&self) -> bool {
        self.transport.is_muted()
    }

    fn set_muted(&mut self, muted: bool) {
        self.transport.set_muted(muted);
    }

    fn attach_graph(&mut self, graph: Arc<ProcessingGraph>) -> Result<()> {
        self.graph_tx
            .send(GraphRenderer::with_block_frames(graph, self.block_frames))
            .map_err(|_| Error::unavailable("Audio output is not running"))
    }

    fn try_recv_event(&mut self) -> Option<ElementEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Decode loop running on the player thread.
struct PlayerWorker {
    command_rx: Receiver<PlayerCommand>,
    event_tx: Sender<ElementEvent>,
    transport: Arc<Transport>,
    position_base: Arc<RwLock<f64>>,
    ring: SharedSampleRing,
    decoder: AudioDecoder,
    source: SourceFormat,
    time_update_interval: Duration,
    /// Decoded samples that did not fit in the ring yet.
    pending: Vec<f32>,
    pending_pos: usize,
    exhausted: bool,
    /// Keep output alive for the duration of the worker.
    _output: AudioOutput,
}

impl PlayerWorker {
    fn run(mut self) {
        info!("Player worker started");

        let mut last_time_update = Instant::now();
        let mut was_starved = false;

        loop {
            let command = if self.transport.is_playing() {
                match self.command_rx.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => {
                        debug!("Command channel closed, shutting down");
                        break;
                    }
                }
            } else {
                match self.command_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(cmd) => Some(cmd),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                        debug!("Command channel closed, shutting down");
                        break;
                    }
                }
            };

            match command {
                Some(PlayerCommand::Shutdown) => {
                    info!("Player worker shutting down");
                    break;
                }
                Some(PlayerCommand::Seek(position)) => self.seek_to(position),
                None => {}
            }

            self.fill();

            let starved = self.transport.is_starved();
            if starved && !was_starved && !self.exhausted {
                debug!("Output starved: ring has {} samples", self.ring.available());
            }
            was_starved = starved;

            if self.transport.is_playing() {
                if self.exhausted && self.ring.available() < self.source.channels {
                    self.finish();
                } else if last_time_update.elapsed() >= self.time_update_interval {
                    let _ = self.event_tx.send(ElementEvent::TimeUpdate(self.position()));
                    last_time_update = Instant::now();
                }
            }

            if self.exhausted {
                std::thread::sleep(Duration::from_millis(5));
            } else if self.ring.free() < MIN_FREE {
                std::thread::sleep(Duration::from_micros(500));
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn position(&self) -> f64 {
        *self.position_base.read()
            + self.transport.frames_consumed() as f64 / f64::from(self.source.sample_rate)
    }

    /// Top up the ring from pending samples and the decoder.
    fn fill(&mut self) {
        while !self.exhausted && self.ring.free() >= MIN_FREE {
            if self.pending_pos < self.pending.len() {
                let written = self.ring.write(&self.pending[self.pending_pos..]);
                self.pending_pos += written;
                if written == 0 {
                    break;
                }
                continue;
            }

            match self.decoder.decode_next() {
                Ok(Some(samples)) => {
                    trace!("Decoded {} samples", samples.len());
                    self.pending = samples;
                    self.pending_pos = 0;
                }
                Ok(None) => {
                    debug!("Decoder reached end of stream");
                    self.exhausted = true;
                }
                Err(e) => {
                    error!("Decode error: {e}");
                    self.exhausted = true;
                }
            }
        }
    }

    fn seek_to(&mut self, position: f64) {
        debug!("Seeking to {:.2} seconds", position);

        if let Err(e) = self.decoder.seek(position) {
            warn!("Seek failed: {e}");
        }

        self.pending.clear();
        self.pending_pos = 0;
        self.exhausted = false;
        self.ring.clear();
        self.transport.reset_frames();
        self.transport.request_flush();
    }

    /// The source ran dry: pause at the end, like a media element does.
    fn finish(&mut self) {
        info!("Playback finished");
        self.transport.set_playing(false);
        self.transport.set_ended(true);

        let position = self.position();
        let _ = self.event_tx.send(ElementEvent::TimeUpdate(position));
        let _ = self.event_tx.send(ElementEvent::Pause);
        let _ = self.event_tx.send(ElementEvent::Ended);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_fails_before_touching_the_device() {
        let result = FilePlayer::open(
            Path::new("/definitely/not/here.wav"),
            &AudioSettings::default(),
        );
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }
}
