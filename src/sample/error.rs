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
use std::path::PathBuf;

/// Reasons a file cannot become a [`super::Sample`].
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("Failed to open sample {0}: {1}")]
    Open(PathBuf, #[source] std::io::Error),

    #[error("Unsupported sample {0}: {1}")]
    Unsupported(PathBuf, String),

    #[error("Sample {path} has {channels} channels, only mono samples are supported")]
    ChannelCount { path: PathBuf, channels: usize },

    #[error("Failed to allocate {1} frames for sample {0}")]
    Allocation(PathBuf, u64),

    #[error("Sample {0} contains no audio frames")]
    Empty(PathBuf),

    #[error("Audio file error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
}
