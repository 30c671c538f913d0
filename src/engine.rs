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

//! The real-time sampler engine.
//!
//! [`Engine::run`] is called once per audio block. It installs samples the
//! loader has finished, dispatches the block's input events in order, and
//! renders the scan loop into the output buffer. It never blocks and never
//! performs I/O: loads and frees go to the loader through the
//! [`WorkerTransport`].

mod render;

use std::collections::VecDeque;
use std::mem;
use std::path::PathBuf;

use tracing::{debug, error, info, trace, warn};

use crate::config::SamplerConfig;
use crate::loader::{Job, Reply, WorkerTransport};
use crate::protocol::{Atom, Message, Notification, Sequence, TimedEvent, UridMap, Urids};
use crate::sample::{Sample, SampleError, SampleStore};

use self::render::ScanRange;

/// Gains at or below this level are treated as silence.
const GAIN_FLOOR_DB: f32 = -90.0;

/// Converts a gain in decibels to a linear factor, with everything at or below
/// -90 dB mapping to exactly 0.
pub fn db_to_linear(db: f32) -> f32 {
    if db > GAIN_FLOOR_DB {
        10f32.powf(db * 0.05)
    } else {
        0.0
    }
}

/// The two continuously sampled controls. Read fresh every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Controls {
    /// Scan start as a fraction of the sample, in `[0, 1]`.
    pub start: f32,
    /// Scan length in steps. Multiplied by the configured step scale.
    pub step: f32,
}

/// Capabilities the host hands the engine at instantiation.
#[derive(Default)]
pub struct HostFeatures<'a> {
    pub urid_map: Option<&'a UridMap>,
    pub transport: Option<Box<dyn WorkerTransport>>,
}

/// Reasons an engine cannot be created.
#[derive(Debug, thiserror::Error)]
pub enum InstantiateError {
    #[error("Host does not provide required feature: {0}")]
    MissingFeature(&'static str),

    #[error("Unable to load default sample: {0}")]
    DefaultSample(#[from] SampleError),
}

/// Per-cycle facts gathered while dispatching events.
#[derive(Debug, Default)]
struct CycleState {
    /// Offset of the last trigger-on this cycle, if any.
    trigger_offset: Option<usize>,
    /// A trigger-off followed that trigger-on; stop once this block is done.
    stop_after_block: bool,
}

pub struct Engine {
    urids: Urids,
    transport: Box<dyn WorkerTransport>,

    sample: Box<Sample>,
    generation: u64,
    playing: bool,
    play_position: usize,
    gain: f32,

    step_scale: f32,
    notify_capacity: usize,

    /// Free jobs the transport could not take yet, retried every cycle in
    /// order. Never grows past `free_capacity`.
    pending_frees: VecDeque<Job>,
    free_capacity: usize,
    /// Set by a restore. The next cycle announces the restored sample.
    restored: bool,
    dropped_messages: u64,
}

impl Engine {
    /// Creates an engine, loading the configured default sample synchronously.
    ///
    /// Must not be called from the audio thread.
    pub fn instantiate(
        config: &SamplerConfig,
        features: HostFeatures<'_>,
        store: &SampleStore,
    ) -> Result<Engine, InstantiateError> {
        let urid_map = features
            .urid_map
            .ok_or(InstantiateError::MissingFeature("urid map"))?;
        let transport = features
            .transport
            .ok_or(InstantiateError::MissingFeature("worker transport"))?;

        let path = config.default_sample_path();
        let sample = store.load(&path)?;
        info!(
            path = ?path,
            frames = sample.frame_count(),
            sample_rate = config.sample_rate(),
            "Sampler instantiated"
        );
        if sample.sample_rate() != config.sample_rate() {
            warn!(
                path = ?path,
                file_rate = sample.sample_rate(),
                sample_rate = config.sample_rate(),
                "Default sample rate differs from output rate, playing without resampling"
            );
        }

        Ok(Engine::with_sample(
            sample,
            Urids::new(urid_map),
            transport,
            config,
        ))
    }

    pub(crate) fn with_sample(
        sample: Box<Sample>,
        urids: Urids,
        transport: Box<dyn WorkerTransport>,
        config: &SamplerConfig,
    ) -> Engine {
        Engine {
            urids,
            transport,
            sample,
            generation: 0,
            playing: false,
            play_position: 0,
            gain: db_to_linear(config.gain_db()),
            step_scale: config.step_scale(),
            notify_capacity: config.notify_capacity(),
            pending_frees: VecDeque::with_capacity(config.job_queue_capacity()),
            free_capacity: config.job_queue_capacity(),
            restored: false,
            dropped_messages: 0,
        }
    }

    /// Runs one cycle.
    ///
    /// Nothing is allocated or freed here. `input` is read in place; its
    /// records (minus any sample path handed to the loader) stay with the
    /// caller, who clears it between cycles. `output` is completely
    /// overwritten. Notifications are appended to `notify`, at most
    /// `notify_capacity` in total, so callers clear it between cycles and give
    /// it that much capacity up front.
    pub fn run(
        &mut self,
        controls: Controls,
        input: &mut Sequence,
        output: &mut [f32],
        notify: &mut Vec<TimedEvent<Notification>>,
    ) {
        self.retry_pending_frees();

        if mem::take(&mut self.restored) {
            self.notify_sample_path(0, notify);
        }

        // Every install parks at most one free, so only take replies while
        // there is room for it. The rest wait in the transport.
        while self.pending_frees.len() < self.free_capacity {
            let Some(reply) = self.transport.next_reply() else {
                break;
            };
            match reply {
                Reply::Loaded(sample) => self.install(sample, notify),
            }
        }

        let mut cycle = CycleState::default();
        for event in input.iter_mut() {
            let offset = (event.frames as usize).min(output.len());
            match Message::decode(&mut event.body, &self.urids) {
                Ok(message) => {
                    self.dispatch(message, &mut event.body, offset, controls, &mut cycle, notify)
                }
                Err(e) => {
                    self.dropped_messages += 1;
                    warn!(error = %e, offset, "Dropping message");
                }
            }
        }

        output.fill(0.0);
        if self.playing {
            let range = ScanRange::new(
                self.sample.frame_count(),
                controls.start,
                controls.step,
                self.step_scale,
            );
            render::render(
                self.sample.data(),
                range,
                &mut self.play_position,
                self.gain,
                &mut output[cycle.trigger_offset.unwrap_or(0)..],
            );
        }

        if cycle.stop_after_block {
            self.playing = false;
        }
    }

    fn dispatch(
        &mut self,
        message: Message,
        atom: &mut Atom,
        offset: usize,
        controls: Controls,
        cycle: &mut CycleState,
        notify: &mut Vec<TimedEvent<Notification>>,
    ) {
        match message {
            Message::TriggerOn { key, velocity } => {
                self.playing = true;
                self.play_position = render::start_frame(controls.start, self.sample.frame_count());
                cycle.trigger_offset = Some(offset);
                cycle.stop_after_block = false;
                trace!(key, velocity, offset, position = self.play_position, "Trigger on");
            }
            Message::TriggerOff { key } => {
                if cycle.trigger_offset.is_some() {
                    cycle.stop_after_block = true;
                } else {
                    self.playing = false;
                }
                trace!(key, offset, "Trigger off");
            }
            Message::SetSamplePath(path) => self.request_load(path, atom),
            Message::SetGain(db) => {
                self.gain = db_to_linear(db);
                trace!(db, gain = self.gain, "Gain changed");
            }
            Message::Get => self.notify_sample_path(offset, notify),
        }
    }

    /// Sends a load job. A refused request is dropped, with its path handed
    /// back to `atom` so the caller releases it along with the sequence.
    fn request_load(&mut self, path: PathBuf, atom: &mut Atom) {
        debug!(path = ?path, "Requesting sample load");
        if let Err(Job::Load { path }) = self.transport.schedule(Job::Load { path }) {
            error!(path = ?path, "Loader queue is full, dropping load request");
            Message::return_path(atom, path, &self.urids);
        }
    }

    /// Makes `sample` current and hands the previous one back to the loader.
    fn install(&mut self, sample: Box<Sample>, notify: &mut Vec<TimedEvent<Notification>>) {
        let old = mem::replace(&mut self.sample, sample);
        self.free(old);

        self.generation += 1;
        self.play_position = self.play_position.min(self.sample.frame_count());
        debug!(
            path = ?self.sample.source_path(),
            generation = self.generation,
            "Installed sample"
        );
        self.notify_sample_path(0, notify);
    }

    /// Hands a sample to the loader, behind any frees still waiting. Callers
    /// make sure `pending_frees` has room.
    fn free(&mut self, sample: Box<Sample>) {
        let job = Job::Free(sample);
        if !self.pending_frees.is_empty() {
            self.pending_frees.push_back(job);
        } else if let Err(job) = self.transport.schedule(job) {
            warn!("Loader queue is full, deferring free");
            self.pending_frees.push_back(job);
        }
    }

    fn retry_pending_frees(&mut self) {
        while let Some(job) = self.pending_frees.pop_front() {
            if let Err(job) = self.transport.schedule(job) {
                self.pending_frees.push_front(job);
                break;
            }
        }
    }

    fn notify_sample_path(&self, offset: usize, notify: &mut Vec<TimedEvent<Notification>>) {
        if notify.len() >= self.notify_capacity {
            warn!(offset, "Notification buffer full, dropping sample path");
            return;
        }
        notify.push(TimedEvent::new(
            offset as u32,
            Notification::SamplePath(self.sample.source_path().clone()),
        ));
    }

    /// Installs a sample immediately, outside of any cycle, and returns the
    /// previous one. Used by session restore before rendering starts.
    pub(crate) fn replace_sample_now(&mut self, sample: Box<Sample>) -> Box<Sample> {
        let old = mem::replace(&mut self.sample, sample);
        self.generation += 1;
        self.play_position = self.play_position.min(self.sample.frame_count());
        self.restored = true;
        info!(
            path = ?self.sample.source_path(),
            generation = self.generation,
            "Restored sample"
        );
        old
    }

    pub fn current_sample(&self) -> &Sample {
        &self.sample
    }

    /// Number of successful swaps since instantiation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play_position(&self) -> usize {
        self.play_position
    }

    /// The current linear gain factor.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Input events that could not be decoded and were ignored.
    pub fn dropped_messages(&self) -> u64 {
        self.dropped_messages
    }

    pub fn pending_frees(&self) -> usize {
        self.pending_frees.len()
    }

    pub fn urids(&self) -> &Urids {
        &self.urids
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sample", &self.sample)
            .field("generation", &self.generation)
            .field("playing", &self.playing)
            .field("play_position", &self.play_position)
            .field("gain", &self.gain)
            .field("pending_frees", &self.pending_frees.len())
            .field("dropped_messages", &self.dropped_messages)
            .finish()
    }
}
