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
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;

/// A timed list of controller actions for an offline render.
#[derive(Deserialize, Clone, Debug)]
pub struct Script {
    /// Number of cycles to render. Defaults to one past the last event.
    #[serde(default)]
    blocks: Option<usize>,

    /// Start control value before any `controls` action.
    #[serde(default)]
    start: f32,

    /// Step control value before any `controls` action.
    #[serde(default)]
    step: f32,

    #[serde(default)]
    events: Vec<ScriptEvent>,
}

/// One action, delivered in the given cycle at the given frame offset.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ScriptEvent {
    pub block: usize,
    #[serde(default)]
    pub offset: u32,
    pub action: Action,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    TriggerOn {
        #[serde(default = "default_key")]
        key: u8,
        #[serde(default = "default_velocity")]
        velocity: u8,
    },
    TriggerOff {
        #[serde(default = "default_key")]
        key: u8,
    },
    SetSample {
        path: PathBuf,
    },
    SetGain {
        db: f32,
    },
    Get,
    /// Changes the continuous start/step controls from this cycle on.
    Controls {
        start: f32,
        step: f32,
    },
}

fn default_key() -> u8 {
    60
}

fn default_velocity() -> u8 {
    100
}

impl Script {
    /// Parse a script from a YAML or JSON file.
    pub fn deserialize(path: &Path) -> Result<Script, ConfigError> {
        let mut script = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Script>()?;

        // Events are replayed in order, so sort by time up front.
        script.events.sort_by_key(|event| (event.block, event.offset));
        Ok(script)
    }

    pub fn blocks(&self) -> usize {
        self.blocks.unwrap_or_else(|| {
            self.events
                .iter()
                .map(|event| event.block + 1)
                .max()
                .unwrap_or(0)
        })
    }

    pub fn start(&self) -> f32 {
        self.start
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    /// All events, ordered by cycle then offset.
    pub fn events(&self) -> &[ScriptEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_yaml_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.yaml");
        fs::write(
            &path,
            r#"
start: 0.2
step: 20
events:
  - block: 3
    offset: 10
    action: { type: trigger_off }
  - block: 0
    action: { type: trigger_on, velocity: 90 }
  - block: 1
    offset: 5
    action: { type: set_sample, path: other.wav }
  - block: 1
    action: { type: set_gain, db: -6 }
  - block: 2
    action: { type: controls, start: 0.5, step: 1.5 }
  - block: 2
    offset: 7
    action: { type: get }
"#,
        )
        .unwrap();

        let script = Script::deserialize(&path).unwrap();
        assert_eq!(script.start(), 0.2);
        assert_eq!(script.step(), 20.0);
        assert_eq!(script.blocks(), 4);

        let actions: Vec<_> = script
            .events()
            .iter()
            .map(|event| (event.block, event.offset, event.action.clone()))
            .collect();
        assert_eq!(
            actions,
            vec![
                (
                    0,
                    0,
                    Action::TriggerOn {
                        key: 60,
                        velocity: 90
                    }
                ),
                (1, 0, Action::SetGain { db: -6.0 }),
                (
                    1,
                    5,
                    Action::SetSample {
                        path: PathBuf::from("other.wav")
                    }
                ),
                (
                    2,
                    0,
                    Action::Controls {
                        start: 0.5,
                        step: 1.5
                    }
                ),
                (2, 7, Action::Get),
                (3, 10, Action::TriggerOff { key: 60 }),
            ]
        );
    }

    #[test]
    fn test_json_script_with_explicit_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        fs::write(
            &path,
            r#"{"blocks": 10, "events": [{"block": 0, "action": {"type": "trigger_on"}}]}"#,
        )
        .unwrap();

        let script = Script::deserialize(&path).unwrap();
        assert_eq!(script.blocks(), 10);
        assert_eq!(script.start(), 0.0);
        assert_eq!(script.events().len(), 1);
    }

    #[test]
    fn test_unknown_action() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.yaml");
        fs::write(
            &path,
            "events:\n  - block: 0\n    action: { type: explode }\n",
        )
        .unwrap();

        assert!(Script::deserialize(&path).is_err());
    }
}
