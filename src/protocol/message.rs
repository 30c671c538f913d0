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
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use midly::live::LiveEvent;
use midly::MidiMessage;

use super::atom::{Atom, Object};
use super::urid::{Urid, Urids};

/// Why a record was not understood. None of these are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid MIDI message: {0}")]
    Midi(#[from] midly::Error),

    #[error("Unhandled MIDI message")]
    UnhandledMidi,

    #[error("Unknown event type {0}")]
    UnknownEvent(&'static str),

    #[error("Unknown object type {0}")]
    UnknownObject(Urid),

    #[error("Set message with no property")]
    MissingProperty,

    #[error("Set property is a {0}, not a urid")]
    PropertyNotUrid(&'static str),

    #[error("Set message for unknown property {0}")]
    UnknownProperty(Urid),

    #[error("Set message has no value")]
    MissingValue,

    #[error("Set value is a {found}, expected a {expected}")]
    WrongValueType {
        expected: &'static str,
        found: &'static str,
    },
}

/// A controller or trigger message the engine understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Start playback. The velocity is carried along but only logged.
    TriggerOn { key: u8, velocity: u8 },
    /// Stop playback.
    TriggerOff { key: u8 },
    /// Request a new sample to be loaded.
    SetSamplePath(PathBuf),
    /// Set the output gain in decibels.
    SetGain(f32),
    /// Ask for the current state.
    Get,
}

impl Message {
    /// Interprets a record in place.
    ///
    /// The record is only borrowed so that its storage is released by whoever
    /// owns the sequence, never by the caller. A sample path is the one payload
    /// that is moved out, leaving an empty string behind.
    pub fn decode(atom: &mut Atom, urids: &Urids) -> Result<Message, ProtocolError> {
        match atom {
            Atom::Midi(bytes) => decode_midi(bytes),
            Atom::Object(object) if object.otype == urids.set => decode_set(object, urids),
            Atom::Object(object) if object.otype == urids.get => Ok(Message::Get),
            Atom::Object(object) => Err(ProtocolError::UnknownObject(object.otype)),
            other => Err(ProtocolError::UnknownEvent(other.kind())),
        }
    }

    /// Puts a sample path taken by [`Message::decode`] back into its record,
    /// so a request that goes nowhere is released along with the sequence.
    pub fn return_path(atom: &mut Atom, path: PathBuf, urids: &Urids) {
        let Atom::Object(object) = atom else {
            return;
        };
        if let Some(Atom::Path(slot)) = object.get_mut(urids.value) {
            if let Ok(path) = path.into_os_string().into_string() {
                *slot = path;
            }
        }
    }

    /// Builds the record for this message, as a controller would send it.
    pub fn encode(&self, urids: &Urids) -> Atom {
        match self {
            Message::TriggerOn { key, velocity } => {
                Atom::Midi(vec![0x90, key & 0x7f, velocity & 0x7f])
            }
            Message::TriggerOff { key } => Atom::Midi(vec![0x80, key & 0x7f, 0]),
            Message::SetSamplePath(path) => {
                set_object(urids, urids.sample, Atom::Path(path_string(path)))
            }
            Message::SetGain(db) => set_object(urids, urids.gain, Atom::Float(*db)),
            Message::Get => Atom::Object(Object::new(urids.get)),
        }
    }
}

/// Events the engine emits on its notification output.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The sample currently in use, sent after a swap, a restore or a get.
    SamplePath(Arc<Path>),
}

impl Notification {
    /// Builds the `set{sample, path}` record for this notification.
    pub fn encode(&self, urids: &Urids) -> Atom {
        match self {
            Notification::SamplePath(path) => {
                set_object(urids, urids.sample, Atom::Path(path_string(path)))
            }
        }
    }
}

fn set_object(urids: &Urids, property: Urid, value: Atom) -> Atom {
    Atom::Object(
        Object::new(urids.set)
            .with(urids.property, Atom::Urid(property))
            .with(urids.value, value),
    )
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn decode_midi(bytes: &[u8]) -> Result<Message, ProtocolError> {
    let LiveEvent::Midi { message, .. } = LiveEvent::parse(bytes)? else {
        return Err(ProtocolError::UnhandledMidi);
    };

    match message {
        // Note On with velocity 0 is equivalent to Note Off
        MidiMessage::NoteOn { key, vel } if u8::from(vel) == 0 => Ok(Message::TriggerOff {
            key: u8::from(key),
        }),
        MidiMessage::NoteOn { key, vel } => Ok(Message::TriggerOn {
            key: u8::from(key),
            velocity: u8::from(vel),
        }),
        MidiMessage::NoteOff { key, .. } => Ok(Message::TriggerOff {
            key: u8::from(key),
        }),
        _ => Err(ProtocolError::UnhandledMidi),
    }
}

fn decode_set(object: &mut Object, urids: &Urids) -> Result<Message, ProtocolError> {
    let property = match object.get(urids.property) {
        None => return Err(ProtocolError::MissingProperty),
        Some(Atom::Urid(property)) => *property,
        Some(other) => return Err(ProtocolError::PropertyNotUrid(other.kind())),
    };

    if property == urids.sample {
        match object.get_mut(urids.value) {
            None => Err(ProtocolError::MissingValue),
            Some(Atom::Path(path)) => Ok(Message::SetSamplePath(PathBuf::from(mem::take(path)))),
            Some(other) => Err(ProtocolError::WrongValueType {
                expected: "path",
                found: other.kind(),
            }),
        }
    } else if property == urids.gain {
        match object.get(urids.value) {
            None => Err(ProtocolError::MissingValue),
            Some(Atom::Float(db)) => Ok(Message::SetGain(*db)),
            Some(other) => Err(ProtocolError::WrongValueType {
                expected: "float",
                found: other.kind(),
            }),
        }
    } else {
        Err(ProtocolError::UnknownProperty(property))
    }
}
