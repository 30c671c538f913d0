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

//! Self-describing records and their wire encoding.
//!
//! Every record is a little-endian header of `(type tag: u32, body size: u32)`
//! followed by the body, padded with zeroes to an 8-byte boundary:
//!
//! | type      | body                                                    |
//! |-----------|---------------------------------------------------------|
//! | int       | `i32`                                                   |
//! | float     | `f32`                                                   |
//! | urid      | `u32`                                                   |
//! | path      | UTF-8 bytes                                             |
//! | string    | UTF-8 bytes                                             |
//! | midi      | raw MIDI message bytes                                  |
//! | object    | `otype: u32`, `0: u32`, then `(key: u32, 0: u32, record)`* |
//! | sequence  | `(frames: u32, 0: u32, record)`*                        |

use super::urid::Urid;

const HEADER_SIZE: usize = 8;
const ALIGN: usize = 8;

/// Objects may nest, but not without bound.
const MAX_DEPTH: usize = 8;

mod tag {
    pub const INT: u32 = 1;
    pub const FLOAT: u32 = 2;
    pub const URID: u32 = 3;
    pub const PATH: u32 = 4;
    pub const STRING: u32 = 5;
    pub const MIDI: u32 = 6;
    pub const OBJECT: u32 = 7;
    pub const SEQUENCE: u32 = 8;
}

/// Structural decoding failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Truncated record: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("Unknown record type {0}")]
    UnknownType(u32),

    #[error("Record type {tag} has invalid body size {size}")]
    BadSize { tag: u32, size: usize },

    #[error("Text record is not valid UTF-8")]
    InvalidUtf8,

    #[error("Event at frame {frames} precedes an event at frame {previous}")]
    OutOfOrder { previous: u32, frames: u32 },

    #[error("Records nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("Expected a sequence record, found type {0}")]
    NotASequence(u32),
}

/// A single decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Int(i32),
    Float(f32),
    Urid(Urid),
    Path(String),
    String(String),
    Midi(Vec<u8>),
    Object(Object),
}

/// A record made of `(key, value)` properties, typed by `otype`.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub otype: Urid,
    pub properties: Vec<(Urid, Atom)>,
}

impl Object {
    pub fn new(otype: Urid) -> Object {
        Object {
            otype,
            properties: Vec::new(),
        }
    }

    /// Appends a property.
    pub fn with(mut self, key: Urid, value: Atom) -> Object {
        self.properties.push((key, value));
        self
    }

    /// Returns the first value stored under `key`.
    pub fn get(&self, key: Urid) -> Option<&Atom> {
        self.properties
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Returns the first value stored under `key` for in-place access.
    pub fn get_mut(&mut self, key: Urid) -> Option<&mut Atom> {
        self.properties
            .iter_mut()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// A record stamped with the frame offset inside the block it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent<T = Atom> {
    pub frames: u32,
    pub body: T,
}

impl<T> TimedEvent<T> {
    pub fn new(frames: u32, body: T) -> TimedEvent<T> {
        TimedEvent { frames, body }
    }
}

/// An ordered list of events for one block.
pub type Sequence = Vec<TimedEvent<Atom>>;

impl Atom {
    /// Human readable kind, used in log and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Atom::Int(_) => "int",
            Atom::Float(_) => "float",
            Atom::Urid(_) => "urid",
            Atom::Path(_) => "path",
            Atom::String(_) => "string",
            Atom::Midi(_) => "midi",
            Atom::Object(_) => "object",
        }
    }

    fn tag(&self) -> u32 {
        match self {
            Atom::Int(_) => tag::INT,
            Atom::Float(_) => tag::FLOAT,
            Atom::Urid(_) => tag::URID,
            Atom::Path(_) => tag::PATH,
            Atom::String(_) => tag::STRING,
            Atom::Midi(_) => tag::MIDI,
            Atom::Object(_) => tag::OBJECT,
        }
    }

    /// Appends the encoded record to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let start = begin_record(out, self.tag());
        match self {
            Atom::Int(v) => out.extend_from_slice(&v.to_le_bytes()),
            Atom::Float(v) => out.extend_from_slice(&v.to_le_bytes()),
            Atom::Urid(v) => out.extend_from_slice(&v.to_le_bytes()),
            Atom::Path(s) | Atom::String(s) => out.extend_from_slice(s.as_bytes()),
            Atom::Midi(bytes) => out.extend_from_slice(bytes),
            Atom::Object(object) => {
                out.extend_from_slice(&object.otype.to_le_bytes());
                out.extend_from_slice(&0u32.to_le_bytes());
                for (key, value) in &object.properties {
                    out.extend_from_slice(&key.to_le_bytes());
                    out.extend_from_slice(&0u32.to_le_bytes());
                    value.encode(out);
                }
            }
        }
        end_record(out, start);
    }

    /// Decodes one record from the front of `bytes`, returning it together with
    /// the number of bytes it occupied (including padding).
    pub fn decode(bytes: &[u8]) -> Result<(Atom, usize), CodecError> {
        decode_atom(bytes, 0)
    }
}

/// Encodes a whole block's events as one sequence record.
pub fn encode_sequence(events: &[TimedEvent<Atom>], out: &mut Vec<u8>) {
    let start = begin_record(out, tag::SEQUENCE);
    for event in events {
        out.extend_from_slice(&event.frames.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        event.body.encode(out);
    }
    end_record(out, start);
}

/// Decodes a sequence record into `events`, replacing its contents but keeping
/// its allocation.
///
/// Offsets must be non-decreasing.
pub fn decode_sequence_into(bytes: &[u8], events: &mut Sequence) -> Result<(), CodecError> {
    events.clear();

    let (record_tag, body) = split_record(bytes)?;
    if record_tag != tag::SEQUENCE {
        return Err(CodecError::NotASequence(record_tag));
    }

    let mut offset = 0;
    let mut previous = 0;
    while offset < body.len() {
        let frames = read_u32(body, offset)?;
        let event_start = offset + HEADER_SIZE;
        let (atom, used) = decode_atom(body.get(event_start..).unwrap_or_default(), 1)?;
        if frames < previous {
            return Err(CodecError::OutOfOrder { previous, frames });
        }
        previous = frames;
        events.push(TimedEvent::new(frames, atom));
        offset = event_start + used;
    }

    Ok(())
}

pub fn decode_sequence(bytes: &[u8]) -> Result<Sequence, CodecError> {
    let mut events = Vec::new();
    decode_sequence_into(bytes, &mut events)?;
    Ok(events)
}

fn begin_record(out: &mut Vec<u8>, record_tag: u32) -> usize {
    let start = out.len();
    out.extend_from_slice(&record_tag.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    start
}

fn end_record(out: &mut Vec<u8>, start: usize) {
    let size = (out.len() - start - HEADER_SIZE) as u32;
    out[start + 4..start + HEADER_SIZE].copy_from_slice(&size.to_le_bytes());
    out.resize(start + HEADER_SIZE + padded(size as usize), 0);
}

fn padded(size: usize) -> usize {
    size.div_ceil(ALIGN) * ALIGN
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, CodecError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(CodecError::Truncated {
            needed: offset + 4,
            available: bytes.len(),
        })
}

/// Splits a record into its tag and unpadded body, checking that the padded
/// record fits in `bytes`.
fn split_record(bytes: &[u8]) -> Result<(u32, &[u8]), CodecError> {
    let record_tag = read_u32(bytes, 0)?;
    let size = read_u32(bytes, 4)? as usize;
    let needed = HEADER_SIZE + padded(size);
    if bytes.len() < needed {
        return Err(CodecError::Truncated {
            needed,
            available: bytes.len(),
        });
    }
    Ok((record_tag, &bytes[HEADER_SIZE..HEADER_SIZE + size]))
}

fn decode_atom(bytes: &[u8], depth: usize) -> Result<(Atom, usize), CodecError> {
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep(MAX_DEPTH));
    }

    let (record_tag, body) = split_record(bytes)?;
    let atom = match record_tag {
        tag::INT => Atom::Int(i32::from_le_bytes(word(record_tag, body)?)),
        tag::FLOAT => Atom::Float(f32::from_le_bytes(word(record_tag, body)?)),
        tag::URID => Atom::Urid(u32::from_le_bytes(word(record_tag, body)?)),
        tag::PATH => Atom::Path(text(body)?),
        tag::STRING => Atom::String(text(body)?),
        tag::MIDI => Atom::Midi(body.to_vec()),
        tag::OBJECT => Atom::Object(decode_object(body, depth)?),
        other => return Err(CodecError::UnknownType(other)),
    };

    Ok((atom, HEADER_SIZE + padded(body.len())))
}

fn decode_object(body: &[u8], depth: usize) -> Result<Object, CodecError> {
    if body.len() < HEADER_SIZE {
        return Err(CodecError::BadSize {
            tag: tag::OBJECT,
            size: body.len(),
        });
    }

    let mut object = Object::new(read_u32(body, 0)?);
    let mut offset = HEADER_SIZE;
    while offset < body.len() {
        let key = read_u32(body, offset)?;
        let value_start = offset + HEADER_SIZE;
        let (value, used) = decode_atom(body.get(value_start..).unwrap_or_default(), depth + 1)?;
        object.properties.push((key, value));
        offset = value_start + used;
    }

    Ok(object)
}

fn word(record_tag: u32, body: &[u8]) -> Result<[u8; 4], CodecError> {
    body.try_into().map_err(|_| CodecError::BadSize {
        tag: record_tag,
        size: body.len(),
    })
}

fn text(body: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(body.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_path_object() -> Atom {
        Atom::Object(
            Object::new(10)
                .with(11, Atom::Urid(12))
                .with(13, Atom::Path("/samples/kick.wav".to_string())),
        )
    }

    #[test]
    fn test_records_are_padded() {
        let mut out = Vec::new();
        Atom::Path("abc".to_string()).encode(&mut out);
        assert_eq!(out.len(), 16);
        assert_eq!(&out[0..4], &tag::PATH.to_le_bytes());
        assert_eq!(&out[4..8], &3u32.to_le_bytes());
        assert_eq!(&out[8..11], b"abc");
        assert!(out[11..].iter().all(|b| *b == 0));

        out.clear();
        Atom::Float(1.5).encode(&mut out);
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn test_object_decode() {
        let mut out = Vec::new();
        set_path_object().encode(&mut out);

        let (atom, used) = Atom::decode(&out).unwrap();
        assert_eq!(used, out.len());
        let Atom::Object(object) = atom else {
            panic!("expected object");
        };
        assert_eq!(object.otype, 10);
        assert_eq!(object.get(11), Some(&Atom::Urid(12)));
        assert_eq!(
            object.get(13),
            Some(&Atom::Path("/samples/kick.wav".to_string()))
        );
        assert_eq!(object.get(99), None);
    }

    #[test]
    fn test_sequence_decode_keeps_order_and_offsets() {
        let events = vec![
            TimedEvent::new(0, Atom::Midi(vec![0x90, 60, 100])),
            TimedEvent::new(64, set_path_object()),
            TimedEvent::new(64, Atom::Midi(vec![0x80, 60, 0])),
        ];
        let mut out = Vec::new();
        encode_sequence(&events, &mut out);

        let mut decoded = Vec::with_capacity(8);
        decode_sequence_into(&out, &mut decoded).unwrap();
        assert_eq!(decoded, events);

        // The buffer is reused rather than appended to.
        decode_sequence_into(&out, &mut decoded).unwrap();
        assert_eq!(decoded.len(), 3);
    }

    #[test]
    fn test_sequence_out_of_order_rejected() {
        let events = vec![
            TimedEvent::new(32, Atom::Int(1)),
            TimedEvent::new(16, Atom::Int(2)),
        ];
        let mut out = Vec::new();
        encode_sequence(&events, &mut out);

        assert_eq!(
            decode_sequence(&out),
            Err(CodecError::OutOfOrder {
                previous: 32,
                frames: 16
            })
        );
    }

    #[test]
    fn test_truncated_rejected() {
        let mut out = Vec::new();
        set_path_object().encode(&mut out);

        for len in [0, 4, 7, out.len() - 8, out.len() - 1] {
            assert!(
                matches!(Atom::decode(&out[..len]), Err(CodecError::Truncated { .. })),
                "length {} should be truncated",
                len
            );
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut out = Vec::new();
        out.extend_from_slice(&99u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        assert_eq!(Atom::decode(&out), Err(CodecError::UnknownType(99)));
    }

    #[test]
    fn test_bad_scalar_size_rejected() {
        let mut out = Vec::new();
        out.extend_from_slice(&tag::FLOAT.to_le_bytes());
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 8]);
        assert_eq!(
            Atom::decode(&out),
            Err(CodecError::BadSize {
                tag: tag::FLOAT,
                size: 2
            })
        );
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let mut out = Vec::new();
        out.extend_from_slice(&tag::PATH.to_le_bytes());
        out.extend_from_slice(&2u32.to_le_bytes());
        out.extend_from_slice(&[0xff, 0xfe, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Atom::decode(&out), Err(CodecError::InvalidUtf8));
    }

    #[test]
    fn test_nesting_limit() {
        let mut atom = Atom::Int(0);
        for _ in 0..=MAX_DEPTH {
            atom = Atom::Object(Object::new(1).with(2, atom));
        }
        let mut out = Vec::new();
        atom.encode(&mut out);
        assert_eq!(Atom::decode(&out), Err(CodecError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn test_not_a_sequence() {
        let mut out = Vec::new();
        Atom::Int(3).encode(&mut out);
        assert_eq!(
            decode_sequence(&out),
            Err(CodecError::NotASequence(tag::INT))
        );
    }

    #[test]
    fn test_object_get_mut() {
        let Atom::Object(mut object) = set_path_object() else {
            unreachable!()
        };
        if let Some(value) = object.get_mut(11) {
            *value = Atom::Int(5);
        }
        assert_eq!(object.get(11), Some(&Atom::Int(5)));
        assert_eq!(object.get_mut(99), None);
        assert_eq!(object.properties.len(), 2);
    }
}
