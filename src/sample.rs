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

//! Immutable in-memory sample buffers.
//!
//! A [`Sample`] is only ever created by the [`SampleStore`] and is moved, never
//! shared, between the loader worker and the engine. Whoever holds the `Box`
//! owns the buffer; dropping it releases the storage.

mod error;
mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub use error::SampleError;
pub use store::SampleStore;

/// A decoded mono audio buffer plus the location it was loaded from.
pub struct Sample {
    /// Mono sample data, one value per frame. Never empty.
    data: Box<[f32]>,
    /// Sample rate of the decoded data.
    sample_rate: u32,
    /// Where the sample was loaded from. Shared so notifications can refer to
    /// it without copying the string on the audio thread.
    source_path: Arc<Path>,
}

impl Sample {
    /// Builds a sample from already decoded mono data.
    pub(crate) fn new(
        data: Vec<f32>,
        sample_rate: u32,
        source_path: Arc<Path>,
    ) -> Result<Sample, SampleError> {
        if data.is_empty() {
            return Err(SampleError::Empty(source_path.to_path_buf()));
        }

        Ok(Sample {
            data: data.into_boxed_slice(),
            sample_rate,
            source_path,
        })
    }

    /// Always 1. Multi-channel files are rejected by the store.
    pub fn channel_count(&self) -> u16 {
        1
    }

    /// Number of frames in the sample. Always at least 1.
    pub fn frame_count(&self) -> usize {
        self.data.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn source_path(&self) -> &Arc<Path> {
        &self.source_path
    }

    /// Playback length at the sample's own rate.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.data.len() as f64 / self.sample_rate.max(1) as f64)
    }

    /// Returns the memory size of the audio data in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("source_path", &self.source_path)
            .field("frames", &self.data.len())
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
impl Sample {
    /// Creates a sample directly from data (test only).
    pub fn from_data(data: Vec<f32>, path: &str) -> Sample {
        Sample::new(data, 48000, Arc::from(Path::new(path))).expect("non-empty test sample")
    }
}
