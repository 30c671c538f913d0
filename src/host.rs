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

//! An offline host that drives the engine block by block.
//!
//! It plays the part a plugin host would: it owns the loader worker and the
//! transport between the two, decodes each block's control traffic from its
//! wire form, and encodes the engine's notifications back.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SamplerConfig;
use crate::engine::{Controls, Engine, HostFeatures, InstantiateError};
use crate::loader::{Loader, LoaderStats};
use crate::persist::{self, BundlePathMapper, PersistError, SessionState};
use crate::protocol::atom::{decode_sequence_into, encode_sequence};
use crate::protocol::{Atom, Notification, Sequence, TimedEvent, UridMap};
use crate::sample::SampleStore;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Unable to start sample loader: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Instantiate(#[from] InstantiateError),
}

pub struct OfflineHost {
    engine: Engine,
    loader: Loader,
    store: SampleStore,
    mapper: BundlePathMapper,
    urid_map: UridMap,

    input: Sequence,
    notify: Vec<TimedEvent<Notification>>,
    wire: Vec<TimedEvent<Atom>>,
    dropped_sequences: u64,
}

impl OfflineHost {
    pub fn new(config: &SamplerConfig) -> Result<OfflineHost, HostError> {
        let store = SampleStore::new();
        let urid_map = UridMap::new();
        let (loader, transport) = Loader::spawn(store, config.job_queue_capacity())?;

        let engine = Engine::instantiate(
            config,
            HostFeatures {
                urid_map: Some(&urid_map),
                transport: Some(Box::new(transport)),
            },
            &store,
        );
        let engine = match engine {
            Ok(engine) => engine,
            Err(e) => {
                // The transport went down with the failed engine, so the
                // worker is already on its way out.
                loader.join();
                return Err(e.into());
            }
        };

        Ok(OfflineHost {
            engine,
            loader,
            store,
            mapper: BundlePathMapper::new(config.bundle_path()),
            urid_map,
            input: Sequence::with_capacity(config.input_capacity()),
            notify: Vec::with_capacity(config.notify_capacity()),
            wire: Vec::with_capacity(config.notify_capacity()),
            dropped_sequences: 0,
        })
    }

    /// Runs one cycle with the given encoded input sequence. Empty input
    /// means no events.
    ///
    /// A sequence that fails to decode is dropped as a whole and the block is
    /// rendered without input. Returns the cycle's notifications.
    pub fn run_block(
        &mut self,
        controls: Controls,
        input: &[u8],
        output: &mut [f32],
    ) -> &[TimedEvent<Notification>] {
        if input.is_empty() {
            self.input.clear();
        } else if let Err(e) = decode_sequence_into(input, &mut self.input) {
            self.dropped_sequences += 1;
            warn!(error = %e, bytes = input.len(), "Dropping malformed input sequence");
            self.input.clear();
        }

        self.notify.clear();
        self.engine
            .run(controls, &mut self.input, output, &mut self.notify);
        &self.notify
    }

    /// Encodes the last cycle's notifications as a sequence.
    pub fn encode_notifications(&mut self, out: &mut Vec<u8>) {
        let urids = *self.engine.urids();
        self.wire.clear();
        self.wire.extend(
            self.notify
                .iter()
                .map(|event| TimedEvent::new(event.frames, event.body.encode(&urids))),
        );
        encode_sequence(&self.wire, out);
    }

    /// Captures the session state, with paths relative to the bundle.
    pub fn save(&self) -> Result<SessionState, PersistError> {
        persist::save(&self.engine, Some(&self.mapper))
    }

    /// Restores a saved session. Must be called between cycles.
    pub fn restore(&mut self, state: &SessionState) -> Result<(), PersistError> {
        persist::restore(&mut self.engine, state, Some(&self.mapper), &self.store)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), PersistError> {
        self.save()?.write(path)
    }

    pub fn restore_from(&mut self, path: &Path) -> Result<(), PersistError> {
        let state = SessionState::read(path)?;
        self.restore(&state)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn urid_map(&self) -> &UridMap {
        &self.urid_map
    }

    pub fn loader_stats(&self) -> &Arc<LoaderStats> {
        self.loader.stats()
    }

    /// Input sequences rejected by the wire decoder.
    pub fn dropped_sequences(&self) -> u64 {
        self.dropped_sequences
    }

    /// Stops the engine and waits for the loader to finish outstanding jobs.
    pub fn shutdown(self) {
        let OfflineHost { engine, loader, .. } = self;
        info!(
            generation = engine.generation(),
            dropped_messages = engine.dropped_messages(),
            "Shutting down sampler"
        );
        drop(engine);
        loader.join();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::protocol::atom::decode_sequence;
    use crate::protocol::{Message, Urids};
    use crate::testutil::{count_allocations, eventually, ramp, write_wav};

    const BLOCK: usize = 64;

    fn encode(host: &OfflineHost, events: &[(u32, Message)]) -> Vec<u8> {
        let urids = Urids::new(host.urid_map());
        let events: Vec<_> = events
            .iter()
            .map(|(offset, message)| TimedEvent::new(*offset, message.encode(&urids)))
            .collect();
        let mut bytes = Vec::new();
        encode_sequence(&events, &mut bytes);
        bytes
    }

    fn setup() -> (tempfile::TempDir, OfflineHost) {
        let dir = tempfile::tempdir().unwrap();
        write_wav(dir.path().join("clip.wav"), vec![ramp(1000)], 48000).unwrap();
        write_wav(dir.path().join("other.wav"), vec![vec![0.25f32; 500]], 48000).unwrap();
        write_wav(
            dir.path().join("stereo.wav"),
            vec![vec![0.1f32; 100], vec![0.2f32; 100]],
            48000,
        )
        .unwrap();
        let host = OfflineHost::new(&SamplerConfig::new(dir.path())).unwrap();
        (dir, host)
    }

    #[test]
    fn test_missing_default_sample() {
        let dir = tempfile::tempdir().unwrap();
        let result = OfflineHost::new(&SamplerConfig::new(dir.path()));
        assert!(matches!(
            result,
            Err(HostError::Instantiate(InstantiateError::DefaultSample(_)))
        ));
    }

    #[test]
    fn test_swap_through_loader() {
        let (dir, mut host) = setup();
        let mut output = vec![0.0; BLOCK];
        let controls = Controls {
            start: 0.0,
            step: 100.0,
        };

        let input = encode(
            &host,
            &[
                (0, Message::TriggerOn { key: 60, velocity: 1 }),
                (
                    0,
                    Message::SetSamplePath(dir.path().join("other.wav")),
                ),
            ],
        );
        host.run_block(controls, &input, &mut output);
        assert_eq!(host.engine().generation(), 0);

        let mut announced = Vec::new();
        eventually(
            || {
                let notify = host.run_block(controls, &[], &mut output);
                announced.extend(notify.iter().cloned());
                host.engine().generation() == 1
            },
            "sample never swapped",
        );

        assert_eq!(
            announced,
            vec![TimedEvent::new(
                0,
                Notification::SamplePath(Arc::from(dir.path().join("other.wav").as_path()))
            )]
        );
        host.run_block(controls, &[], &mut output);
        assert!(output.iter().all(|s| *s == 0.25));

        let stats = host.loader_stats().clone();
        eventually(|| stats.freed() == 1, "old sample never freed");
        assert_eq!(stats.loaded(), 1);
        host.shutdown();
    }

    #[test]
    fn test_failed_load_is_invisible() {
        let (dir, mut host) = setup();
        let mut output = vec![0.0; BLOCK];

        let input = encode(
            &host,
            &[
                (0, Message::SetSamplePath(PathBuf::from("/nonexistent/x.wav"))),
                (1, Message::SetSamplePath(dir.path().join("stereo.wav"))),
            ],
        );
        host.run_block(Controls::default(), &input, &mut output);

        let stats = host.loader_stats().clone();
        eventually(|| stats.failed() == 2, "loads never failed");

        for _ in 0..4 {
            let notify = host.run_block(Controls::default(), &[], &mut output);
            assert!(notify.is_empty());
        }
        assert_eq!(host.engine().generation(), 0);
        assert_eq!(
            host.engine().current_sample().source_path().as_ref(),
            dir.path().join("clip.wav")
        );
        assert_eq!(stats.loaded(), 0);
        host.shutdown();
    }

    #[test]
    fn test_get_round_trips_over_wire() {
        let (dir, mut host) = setup();
        let mut output = vec![0.0; BLOCK];

        let input = encode(&host, &[(9, Message::Get)]);
        host.run_block(Controls::default(), &input, &mut output);

        let mut bytes = Vec::new();
        host.encode_notifications(&mut bytes);
        let urids = Urids::new(host.urid_map());
        let mut events = decode_sequence(&bytes).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].frames, 9);
        assert_eq!(
            Message::decode(&mut events[0].body, &urids).unwrap(),
            Message::SetSamplePath(dir.path().join("clip.wav"))
        );
        host.shutdown();
    }

    #[test]
    fn test_input_buffer_sized_for_input() {
        let (_dir, mut host) = setup();
        let mut output = vec![0.0; BLOCK];

        // More events than notifications fit in a cycle, all in plain
        // records that decode without touching the heap.
        let config = SamplerConfig::default();
        assert!(config.input_capacity() > config.notify_capacity());
        let events: Vec<_> = (0..config.notify_capacity() as u32 + 8)
            .map(|offset| TimedEvent::new(offset, Atom::Int(1)))
            .collect();
        let mut input = Vec::new();
        encode_sequence(&events, &mut input);

        host.run_block(Controls::default(), &input, &mut output);
        let (_, counts) = count_allocations(|| {
            host.run_block(Controls::default(), &input, &mut output);
        });
        assert_eq!((counts.allocs, counts.deallocs), (0, 0));
        assert_eq!(
            host.engine().dropped_messages(),
            2 * events.len() as u64
        );
        host.shutdown();
    }

    #[test]
    fn test_malformed_sequence_dropped() {
        let (_dir, mut host) = setup();
        let mut output = vec![1.0; BLOCK];

        let notify = host.run_block(Controls::default(), &[1, 2, 3], &mut output);
        assert!(notify.is_empty());
        assert_eq!(host.dropped_sequences(), 1);
        assert!(output.iter().all(|s| *s == 0.0));
        host.shutdown();
    }

    #[test]
    fn test_save_and_restore() {
        let (dir, mut host) = setup();
        let mut output = vec![0.0; BLOCK];
        let session = dir.path().join("session.json");

        host.save_to(&session).unwrap();

        let input = encode(
            &host,
            &[(0, Message::SetSamplePath(dir.path().join("other.wav")))],
        );
        host.run_block(Controls::default(), &input, &mut output);
        eventually(
            || {
                host.run_block(Controls::default(), &[], &mut output);
                host.engine().generation() == 1
            },
            "sample never swapped",
        );

        host.restore_from(&session).unwrap();
        assert_eq!(
            host.engine().current_sample().source_path().as_ref(),
            dir.path().join("clip.wav")
        );

        let notify = host.run_block(Controls::default(), &[], &mut output).to_vec();
        assert_eq!(
            notify,
            vec![TimedEvent::new(
                0,
                Notification::SamplePath(Arc::from(dir.path().join("clip.wav").as_path()))
            )]
        );
        host.shutdown();
    }
}
