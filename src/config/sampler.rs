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
use tracing::debug;

use super::error::ConfigError;

pub const DEFAULT_SAMPLE_RATE: u32 = 48000;
pub const DEFAULT_BLOCK_SIZE: usize = 256;
pub const DEFAULT_STEP_SCALE: f32 = 10.0;
pub const DEFAULT_JOB_QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_NOTIFY_CAPACITY: usize = 32;
pub const DEFAULT_INPUT_CAPACITY: usize = 64;

/// The configuration for a sampler instance.
#[derive(Deserialize, Clone, Debug)]
pub struct SamplerConfig {
    /// The installation root. The default sample and portable session paths
    /// resolve against it.
    #[serde(default = "default_bundle_path")]
    bundle_path: PathBuf,

    /// File name of the sample loaded at startup, inside the bundle.
    #[serde(default = "default_sample")]
    default_sample: PathBuf,

    #[serde(default = "default_sample_rate")]
    sample_rate: u32,

    /// Frames per processing cycle.
    #[serde(default = "default_block_size")]
    block_size: usize,

    /// Frames of scan range per unit of the step control.
    #[serde(default = "default_step_scale")]
    step_scale: f32,

    /// Initial output gain in decibels.
    #[serde(default)]
    gain_db: f32,

    #[serde(default = "default_job_queue_capacity")]
    job_queue_capacity: usize,

    /// Maximum number of notifications emitted per cycle.
    #[serde(default = "default_notify_capacity")]
    notify_capacity: usize,

    /// Maximum number of input events accepted per cycle.
    #[serde(default = "default_input_capacity")]
    input_capacity: usize,
}

fn default_bundle_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_sample() -> PathBuf {
    PathBuf::from("clip.wav")
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_step_scale() -> f32 {
    DEFAULT_STEP_SCALE
}

fn default_job_queue_capacity() -> usize {
    DEFAULT_JOB_QUEUE_CAPACITY
}

fn default_notify_capacity() -> usize {
    DEFAULT_NOTIFY_CAPACITY
}

fn default_input_capacity() -> usize {
    DEFAULT_INPUT_CAPACITY
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            bundle_path: default_bundle_path(),
            default_sample: default_sample(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            step_scale: DEFAULT_STEP_SCALE,
            gain_db: 0.0,
            job_queue_capacity: DEFAULT_JOB_QUEUE_CAPACITY,
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
            input_capacity: DEFAULT_INPUT_CAPACITY,
        }
    }
}

impl SamplerConfig {
    /// Creates a configuration rooted at the given bundle with all other
    /// settings at their defaults.
    pub fn new(bundle_path: &Path) -> SamplerConfig {
        SamplerConfig {
            bundle_path: bundle_path.to_path_buf(),
            ..Default::default()
        }
    }

    /// Parses a sampler configuration from a YAML (or JSON) file. A relative
    /// bundle path is taken relative to the file's directory.
    pub fn deserialize(path: &Path) -> Result<SamplerConfig, ConfigError> {
        let mut config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<SamplerConfig>()?;

        if config.bundle_path.is_relative() {
            if let Some(parent) = path.parent() {
                config.bundle_path = parent.join(&config.bundle_path);
            }
        }
        config.validate()?;

        debug!(
            path = ?path,
            bundle = ?config.bundle_path,
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            "Loaded sampler config"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".into()));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.job_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "job_queue_capacity must be positive".into(),
            ));
        }
        if !self.step_scale.is_finite() || self.step_scale < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "step_scale must be a non-negative number, got {}",
                self.step_scale
            )));
        }
        Ok(())
    }

    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    /// The absolute location of the startup sample.
    pub fn default_sample_path(&self) -> PathBuf {
        self.bundle_path.join(&self.default_sample)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn step_scale(&self) -> f32 {
        self.step_scale
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn job_queue_capacity(&self) -> usize {
        self.job_queue_capacity
    }

    pub fn notify_capacity(&self) -> usize {
        self.notify_capacity
    }

    pub fn input_capacity(&self) -> usize {
        self.input_capacity
    }

    pub fn with_gain_db(mut self, gain_db: f32) -> SamplerConfig {
        self.gain_db = gain_db;
        self
    }

    pub fn with_job_queue_capacity(mut self, capacity: usize) -> SamplerConfig {
        self.job_queue_capacity = capacity;
        self
    }
}
