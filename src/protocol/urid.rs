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
use std::collections::HashMap;

use parking_lot::Mutex;

/// An integer identity for a symbolic name. 0 is never handed out.
pub type Urid = u32;

/// Names of every identity the sampler uses.
pub mod names {
    pub const SET: &str = "urn:loopscan:patch#Set";
    pub const GET: &str = "urn:loopscan:patch#Get";
    pub const PROPERTY: &str = "urn:loopscan:patch#property";
    pub const VALUE: &str = "urn:loopscan:patch#value";
    pub const SAMPLE: &str = "urn:loopscan#sample";
    pub const GAIN: &str = "urn:loopscan:parameters#gain";
}

/// Host-side name interner. Mapping the same name twice yields the same id.
#[derive(Default)]
pub struct UridMap {
    ids: Mutex<HashMap<String, Urid>>,
}

impl UridMap {
    pub fn new() -> UridMap {
        UridMap::default()
    }

    /// Maps a name to its identity, allocating a new one on first use.
    pub fn map(&self, name: &str) -> Urid {
        let mut ids = self.ids.lock();
        if let Some(id) = ids.get(name) {
            return *id;
        }

        let id = ids.len() as Urid + 1;
        ids.insert(name.to_string(), id);
        id
    }
}

impl std::fmt::Debug for UridMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UridMap")
            .field("mapped", &self.ids.lock().len())
            .finish()
    }
}

/// The identities resolved once at startup so the audio thread only compares
/// integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Urids {
    pub set: Urid,
    pub get: Urid,
    pub property: Urid,
    pub value: Urid,
    pub sample: Urid,
    pub gain: Urid,
}

impl Urids {
    pub fn new(map: &UridMap) -> Urids {
        Urids {
            set: map.map(names::SET),
            get: map.map(names::GET),
            property: map.map(names::PROPERTY),
            value: map.map(names::VALUE),
            sample: map.map(names::SAMPLE),
            gain: map.map(names::GAIN),
        }
    }
}
