// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Blocking file decoding into [`Sample`] buffers.
//!
//! Only the loader worker (and synchronous startup/restore) may call into the
//! store: every call does file I/O and allocates the whole buffer.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, info};

use super::error::SampleError;
use super::Sample;

/// Decodes audio files (WAV, FLAC, OGG, MP3, ...) into mono samples.
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleStore;

impl SampleStore {
    pub fn new() -> SampleStore {
        SampleStore
    }

    /// Loads the file at `path` into memory.
    ///
    /// Fails if the file cannot be opened or decoded, is not mono, or holds
    /// no frames.
    pub fn load(&self, path: &Path) -> Result<Box<Sample>, SampleError> {
        debug!(path = ?path, "Loading sample");

        let file = File::open(path).map_err(|e| SampleError::Open(path.to_path_buf(), e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| unsupported(path, e))?;
        let mut format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| unsupported(path, "no audio track found"))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| unsupported(path, "sample rate not specified"))?;

        // Containers that report the layout up front can be rejected before
        // anything is decoded.
        if let Some(channels) = params.channels.map(|c| c.count()) {
            check_mono(path, channels)?;
        }

        let mut data = Vec::new();
        if let Some(frames) = params.n_frames {
            if frames == 0 {
                return Err(SampleError::Empty(path.to_path_buf()));
            }
            data.try_reserve_exact(frames as usize)
                .map_err(|_| SampleError::Allocation(path.to_path_buf(), frames))?;
        }

        let mut decoder = get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| unsupported(path, e))?;

        decode_track(
            path,
            format_reader.as_mut(),
            decoder.as_mut(),
            track_id,
            &mut data,
        )?;

        let sample = Sample::new(data, sample_rate, Arc::from(path))?;
        info!(
            path = ?path,
            frames = sample.frame_count(),
            sample_rate,
            memory_kb = sample.memory_size() / 1024,
            "Sample loaded"
        );

        Ok(Box::new(sample))
    }
}

/// Decodes every packet of `track_id` into `data`.
fn decode_track(
    path: &Path,
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
    data: &mut Vec<f32>,
) -> Result<(), SampleError> {
    let mut buffer: Option<SampleBuffer<f32>> = None;

    while let Some(packet) = next_packet(format_reader)? {
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                decoder.decode(&packet)?
            }
            // A corrupt packet is skipped; symphonia reports recoverable errors this way.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = ?path, error = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        check_mono(path, spec.channels.count())?;

        if decoded.frames() == 0 {
            continue;
        }

        let capacity = decoded.capacity();
        let mut buf = match buffer.take() {
            Some(buf) if buf.capacity() >= capacity => buf,
            _ => SampleBuffer::new(capacity as u64, spec),
        };
        buf.copy_interleaved_ref(decoded);

        let samples = buf.samples();
        data.try_reserve(samples.len())
            .map_err(|_| SampleError::Allocation(path.to_path_buf(), samples.len() as u64))?;
        data.extend_from_slice(samples);
        buffer = Some(buf);
    }

    Ok(())
}

/// Reads the next packet, mapping the end of the stream to `None`.
fn next_packet(format_reader: &mut dyn FormatReader) -> Result<Option<Packet>, SampleError> {
    loop {
        match format_reader.next_packet() {
            Ok(packet) => return Ok(Some(packet)),
            Err(SymphoniaError::ResetRequired) => continue,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn check_mono(path: &Path, channels: usize) -> Result<(), SampleError> {
    if channels != 1 {
        return Err(SampleError::ChannelCount {
            path: PathBuf::from(path),
            channels,
        });
    }
    Ok(())
}

fn unsupported(path: &Path, reason: impl std::fmt::Display) -> SampleError {
    SampleError::Unsupported(path.to_path_buf(), reason.to_string())
}
