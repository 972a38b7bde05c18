//! Local file decoding using symphonia.

use std::fs::File;
use std::path::Path;

use cadence_core::{Error, Result};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::{MetadataOptions, MetadataRevision, StandardTagKey},
    probe::Hint,
    units::Time,
};
use tracing::{debug, warn};

/// Audio decoder for one file, producing interleaved `f32` samples.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    title: Option<String>,
    samples: Option<SampleBuffer<f32>>,
}

impl AudioDecoder {
    /// Open and probe a file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::unavailable(format!("Cannot open {}: {e}", path.display())))?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let mut probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to probe format: {e}")))?;

        let mut title = probed
            .metadata
            .get()
            .as_ref()
            .and_then(|m| m.current())
            .and_then(track_title);
        if title.is_none() {
            title = probed.format.metadata().current().and_then(track_title);
        }

        let format = probed.format;

        // First decodable audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(48000);
        let channels = track.codec_params.channels.map_or(2, |c| c.count());

        debug!(
            "Audio track: id={}, sample_rate={}, channels={}, title={:?}",
            track_id, sample_rate, channels, title
        );

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to create decoder: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            title,
            samples: None,
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Title tag, if the file carries one.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Total length in seconds, when the container reports it.
    pub fn duration(&self) -> Option<f64> {
        let track = self
            .format
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)?;

        let time_base = track.codec_params.time_base?;
        let n_frames = track.codec_params.n_frames?;
        let time = time_base.calc_time(n_frames);
        Some(time.seconds as f64 + time.frac)
    }

    /// Decode the next packet of this track as interleaved samples.
    ///
    /// `Ok(None)` at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Failed to read packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let needed = decoded.capacity() * spec.channels.count();
                    if self.samples.as_ref().map_or(true, |b| b.capacity() < needed) {
                        self.samples = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                    }
                    let Some(buffer) = self.samples.as_mut() else {
                        continue;
                    };
                    buffer.copy_interleaved_ref(decoded);
                    return Ok(Some(buffer.samples().to_vec()));
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    warn!("Decode error (skipping packet): {e}");
                }
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Decode failed: {e}")));
                }
            }
        }
    }

    /// Seek to a position in seconds.
    pub fn seek(&mut self, position_secs: f64) -> Result<()> {
        self.format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(position_secs.max(0.0)),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::AudioDecode(format!("Seek failed: {e}")))?;

        self.decoder.reset();
        Ok(())
    }
}

fn track_title(revision: &MetadataRevision) -> Option<String> {
    revision
        .tags()
        .iter()
        .find(|tag| matches!(tag.std_key, Some(StandardTagKey::TrackTitle)))
        .map(|tag| tag.value.to_string())
        .filter(|title| !title.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_unavailable() {
        let result = AudioDecoder::open(Path::new("/definitely/not/here.flac"));
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }
}
