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

//! Session save and restore.
//!
//! A session holds a single property, `sample`, whose value is the current
//! sample's location in portable form. The host supplies a [`PathMapper`] to
//! convert between portable and absolute paths.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::engine::Engine;
use crate::sample::{SampleError, SampleStore};

/// Key the sample location is stored under.
pub const SAMPLE_KEY: &str = "sample";

/// Converts sample locations to and from a form that survives moving the
/// session to another machine.
pub trait PathMapper {
    /// Returns the portable form of `absolute`, or `None` if it has none.
    fn abstract_path(&self, absolute: &Path) -> Option<String>;

    /// Resolves a portable path back to an absolute one.
    fn absolute_path(&self, portable: &str) -> PathBuf;
}

/// Maps paths inside the bundle to bundle-relative ones. Paths outside it are
/// stored as they are.
#[derive(Debug, Clone)]
pub struct BundlePathMapper {
    root: PathBuf,
}

impl BundlePathMapper {
    pub fn new(root: &Path) -> BundlePathMapper {
        BundlePathMapper {
            root: root.to_path_buf(),
        }
    }
}

impl PathMapper for BundlePathMapper {
    fn abstract_path(&self, absolute: &Path) -> Option<String> {
        let portable = absolute.strip_prefix(&self.root).unwrap_or(absolute);
        portable.to_str().map(str::to_string)
    }

    fn absolute_path(&self, portable: &str) -> PathBuf {
        // Joining an absolute path replaces the root.
        self.root.join(portable)
    }
}

/// Machine readable outcome of a failed save or restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStatus {
    NoFeature,
    NoProperty,
    BadType,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("Host does not provide {0}")]
    NoFeature(&'static str),

    #[error("Session has no {0} property")]
    NoProperty(&'static str),

    #[error("Session property {key} is a {found}, expected a {expected}")]
    BadType {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Sample path {0} has no portable form")]
    Unmappable(PathBuf),

    #[error("Unable to load restored sample: {0}")]
    Load(#[from] SampleError),

    #[error("Session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session format error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PersistError {
    pub fn code(&self) -> PersistStatus {
        match self {
            PersistError::NoFeature(_) => PersistStatus::NoFeature,
            PersistError::NoProperty(_) => PersistStatus::NoProperty,
            PersistError::BadType { .. } => PersistStatus::BadType,
            PersistError::Unmappable(_)
            | PersistError::Load(_)
            | PersistError::Io(_)
            | PersistError::Serialize(_) => PersistStatus::Unknown,
        }
    }
}

/// A typed session value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Path(String),
    String(String),
    Int(i64),
    Float(f64),
}

impl StateValue {
    fn kind(&self) -> &'static str {
        match self {
            StateValue::Path(_) => "path",
            StateValue::String(_) => "string",
            StateValue::Int(_) => "int",
            StateValue::Float(_) => "float",
        }
    }
}

/// Saved session properties, keyed by name.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct SessionState {
    properties: BTreeMap<String, StateValue>,
}

impl SessionState {
    pub fn new() -> SessionState {
        SessionState::default()
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.properties.get(key)
    }

    pub fn insert(&mut self, key: &str, value: StateValue) {
        self.properties.insert(key.to_string(), value);
    }

    /// Reads a session from a JSON file.
    pub fn read(path: &Path) -> Result<SessionState, PersistError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Writes the session to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), PersistError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Captures the engine's current sample in portable form.
pub fn save(engine: &Engine, mapper: Option<&dyn PathMapper>) -> Result<SessionState, PersistError> {
    let mapper = mapper.ok_or(PersistError::NoFeature("a path mapper"))?;

    let absolute = engine.current_sample().source_path();
    let portable = mapper
        .abstract_path(absolute)
        .ok_or_else(|| PersistError::Unmappable(absolute.to_path_buf()))?;

    info!(path = ?absolute, portable = %portable, "Saving session");
    let mut state = SessionState::new();
    state.insert(SAMPLE_KEY, StateValue::Path(portable));
    Ok(state)
}

/// Loads the session's sample synchronously and installs it.
///
/// Must not run concurrently with [`Engine::run`]. On any error the engine
/// keeps its current sample.
pub fn restore(
    engine: &mut Engine,
    state: &SessionState,
    mapper: Option<&dyn PathMapper>,
    store: &SampleStore,
) -> Result<(), PersistError> {
    let mapper = mapper.ok_or(PersistError::NoFeature("a path mapper"))?;

    let portable = match state.get(SAMPLE_KEY) {
        None => return Err(PersistError::NoProperty(SAMPLE_KEY)),
        Some(StateValue::Path(portable)) => portable,
        Some(other) => {
            return Err(PersistError::BadType {
                key: SAMPLE_KEY,
                expected: "path",
                found: other.kind(),
            })
        }
    };

    let path = mapper.absolute_path(portable);
    let sample = store.load(&path).inspect_err(|e| {
        error!(path = ?path, error = %e, "Failed to restore sample, keeping current one");
    })?;

    // Restore runs off the audio thread, so the old sample is released here.
    drop(engine.replace_sample_now(sample));
    Ok(())
}
