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

//! Non-real-time worker that loads and frees samples for the engine.
//!
//! The engine never blocks on the worker. It submits [`Job`]s through a
//! [`WorkerTransport`] and picks up [`Reply`]s on a later cycle. A sample
//! travels by value the whole way: store -> worker -> engine -> worker, where
//! it is dropped.
//!
//! A failed load produces no reply at all. Callers only ever observe the
//! absence of a new sample.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use tracing::{debug, error, info, trace};

use crate::sample::{Sample, SampleStore};

/// Work submitted by the engine.
pub enum Job {
    /// Decode the file at `path`.
    Load { path: PathBuf },
    /// Release a sample the engine no longer references.
    Free(Box<Sample>),
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Load { path } => f.debug_struct("Load").field("path", path).finish(),
            Job::Free(sample) => f.debug_tuple("Free").field(sample).finish(),
        }
    }
}

/// Work completed for the engine.
#[derive(Debug)]
pub enum Reply {
    /// A sample was loaded and is ready to be installed.
    Loaded(Box<Sample>),
}

/// The job/reply plumbing between the audio thread and the worker.
///
/// Both directions must preserve order and deliver each message exactly once.
/// Neither method may block or allocate.
pub trait WorkerTransport: Send {
    /// Submits a job. Hands the job back if it could not be queued.
    fn schedule(&mut self, job: Job) -> Result<(), Job>;

    /// Takes the next completed reply, if any.
    fn next_reply(&mut self) -> Option<Reply>;
}

/// [`WorkerTransport`] over a pair of bounded channels.
pub struct ChannelTransport {
    jobs: Sender<Job>,
    replies: Receiver<Reply>,
}

impl WorkerTransport for ChannelTransport {
    fn schedule(&mut self, job: Job) -> Result<(), Job> {
        self.jobs.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) | TrySendError::Disconnected(job) => job,
        })
    }

    fn next_reply(&mut self) -> Option<Reply> {
        match self.replies.try_recv() {
            Ok(reply) => Some(reply),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Counters describing what the worker has done so far.
#[derive(Debug, Default)]
pub struct LoaderStats {
    loaded: AtomicU64,
    failed: AtomicU64,
    freed: AtomicU64,
}

impl LoaderStats {
    pub fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    pub fn freed(&self) -> u64 {
        self.freed.load(Ordering::Acquire)
    }
}

/// Handle to the worker thread.
pub struct Loader {
    handle: JoinHandle<()>,
    stats: Arc<LoaderStats>,
}

impl Loader {
    /// Spawns the worker and returns it along with the engine's end of the
    /// transport. Each direction holds at most `capacity` messages.
    ///
    /// The worker exits once the transport is dropped.
    pub fn spawn(
        store: SampleStore,
        capacity: usize,
    ) -> Result<(Loader, ChannelTransport), std::io::Error> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<Job>(capacity);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<Reply>(capacity);
        let stats = Arc::new(LoaderStats::default());

        let worker_stats = stats.clone();
        let handle = thread::Builder::new()
            .name("sample-loader".to_string())
            .spawn(move || run_worker(store, job_rx, reply_tx, worker_stats))?;

        info!(capacity, "Sample loader spawned");

        Ok((
            Loader { handle, stats },
            ChannelTransport {
                jobs: job_tx,
                replies: reply_rx,
            },
        ))
    }

    pub fn stats(&self) -> &Arc<LoaderStats> {
        &self.stats
    }

    /// Waits for the worker to finish. The transport must have been dropped
    /// first or this never returns.
    pub fn join(self) {
        if self.handle.join().is_err() {
            error!("Sample loader thread panicked");
        }
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("loaded", &self.stats.loaded())
            .field("failed", &self.stats.failed())
            .field("freed", &self.stats.freed())
            .finish()
    }
}

fn run_worker(
    store: SampleStore,
    jobs: Receiver<Job>,
    replies: Sender<Reply>,
    stats: Arc<LoaderStats>,
) {
    debug!("Sample loader started");

    while let Ok(job) = jobs.recv() {
        if let Some(reply) = perform(&store, job, &stats) {
            // Blocking is fine here; the engine drains replies every cycle.
            if replies.send(reply).is_err() {
                debug!("Engine went away, dropping reply");
                break;
            }
        }
    }

    debug!("Sample loader shutting down");
}

/// Executes one job, returning the reply to send back, if any.
pub(crate) fn perform(store: &SampleStore, job: Job, stats: &LoaderStats) -> Option<Reply> {
    match job {
        Job::Load { path } => match store.load(&path) {
            Ok(sample) => {
                stats.loaded.fetch_add(1, Ordering::AcqRel);
                Some(Reply::Loaded(sample))
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::AcqRel);
                error!(path = ?path, error = %e, "Failed to load sample");
                None
            }
        },
        Job::Free(sample) => {
            trace!(path = ?sample.source_path(), "Freeing sample");
            drop(sample);
            stats.freed.fetch_add(1, Ordering::AcqRel);
            None
        }
    }
}
