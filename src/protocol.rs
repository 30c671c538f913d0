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

//! The message vocabulary exchanged between a controller, the engine and the
//! host.
//!
//! There are three layers:
//! - [`urid`]: symbolic names mapped once to integer identities.
//! - [`atom`]: self-describing, variable-length records and their binary
//!   wire encoding, plus timestamped event sequences.
//! - [`message`]: typed interpretation of atoms (trigger, set, get) and the
//!   notifications the engine emits.
//!
//! Validation failures never propagate past the engine: a record that does not
//! decode is logged and dropped.

pub mod atom;
pub mod message;
pub mod urid;

pub use atom::{Atom, CodecError, Object, Sequence, TimedEvent};
pub use message::{Message, Notification, ProtocolError};
pub use urid::{Urid, UridMap, Urids};
