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

//! A MIDI-triggered sampler that loops a scan window over a mono sample.
//!
//! The [`engine`] runs on the audio thread and never blocks. Loading new
//! samples and freeing replaced ones is handed to the [`loader`] worker, with
//! each [`sample::Sample`] moving between the two by ownership transfer.

pub mod config;
pub mod engine;
pub mod host;
pub mod loader;
pub mod persist;
pub mod protocol;
pub mod sample;
#[cfg(test)]
mod testutil;
