// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Batching Journal
//!
//! Non-blocking front for slow journal stores. `append` pushes onto a bounded
//! queue and returns immediately; a background task drains the queue on a
//! fixed interval and hands up to `batch_size` entries at a time to a
//! [`JournalBatchWriter`].
//!
//! - A full queue drops the entry and bumps the dropped counter. The control
//!   loop is never made to wait on storage.
//! - A failed batch is kept and retried on the next flush tick. New entries
//!   keep queueing behind it (and drop once the queue fills).
//! - `shutdown` drains what is queued, makes one final write attempt, then
//!   stops the task.

use crate::domain::controller_config::JournalSection;
use crate::domain::journal::{Journal, JournalEntry, JournalError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Store that accepts journal entries in batches
#[async_trait]
pub trait JournalBatchWriter: Send + Sync + 'static {
    async fn write_batch(&self, batch: &[JournalEntry]) -> Result<(), JournalError>;
}

/// Floor for the drain tick; a zero period would stop the drain task.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self::from(&JournalSection::default())
    }
}

impl From<&JournalSection> for BatchSettings {
    fn from(section: &JournalSection) -> Self {
        Self {
            capacity: section.capacity.max(1),
            batch_size: section.batch_size.max(1),
            flush_interval: section.flush_interval.max(MIN_FLUSH_INTERVAL),
        }
    }
}

#[derive(Debug, Default)]
struct BatchStats {
    dropped: AtomicU64,
    written: AtomicU64,
    failed_flushes: AtomicU64,
}

pub struct BatchingJournal {
    sender: mpsc::Sender<JournalEntry>,
    shutdown: watch::Sender<bool>,
    stats: Arc<BatchStats>,
}

impl BatchingJournal {
    /// Spawn the drain task and return the journal front plus the task
    /// handle. The task ends after `shutdown` or once every journal clone
    /// is dropped.
    pub fn start<W: JournalBatchWriter>(
        writer: Arc<W>,
        settings: BatchSettings,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(settings.capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(BatchStats::default());

        let drain = BatchDrain {
            writer,
            receiver,
            batch_size: settings.batch_size.max(1),
            retry: Vec::new(),
            stats: stats.clone(),
        };

        info!(
            capacity = settings.capacity,
            batch_size = settings.batch_size,
            flush_interval_ms = settings.flush_interval.as_millis() as u64,
            "Starting batching journal"
        );
        let handle = tokio::spawn(drain.run(settings.flush_interval, shutdown_rx));

        let journal = Arc::new(Self {
            sender,
            shutdown,
            stats,
        });
        (journal, handle)
    }

    /// Entries rejected because the queue was full
    pub fn dropped(&self) -> u64 {
        self.stats.dropped.load(Ordering::Relaxed)
    }

    /// Entries successfully handed to the writer
    pub fn written(&self) -> u64 {
        self.stats.written.load(Ordering::Relaxed)
    }

    pub fn failed_flushes(&self) -> u64 {
        self.stats.failed_flushes.load(Ordering::Relaxed)
    }

    /// Ask the drain task to flush what is queued and stop
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Journal for BatchingJournal {
    fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        match self.sender.try_send(entry) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!("aegis_swarm_journal_dropped_total").increment(1);
                if dropped == 1 || dropped % 1000 == 0 {
                    warn!(dropped, "Journal buffer full, dropping entries");
                }
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(JournalError::Closed),
        }
    }
}

enum DrainState {
    Open,
    Closed,
}

struct BatchDrain<W> {
    writer: Arc<W>,
    receiver: mpsc::Receiver<JournalEntry>,
    batch_size: usize,
    retry: Vec<JournalEntry>,
    stats: Arc<BatchStats>,
}

impl<W: JournalBatchWriter> BatchDrain<W> {
    async fn run(mut self, flush_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(flush_interval.max(MIN_FLUSH_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let DrainState::Closed = self.flush().await {
                        break;
                    }
                }
                // Only `true` is ever sent; a closed channel means the journal is gone.
                _ = shutdown.changed() => {
                    self.receiver.close();
                    self.flush().await;
                    break;
                }
            }
        }

        if !self.retry.is_empty() {
            error!(lost = self.retry.len(), "Journal batch could not be written before shutdown");
        }
        info!(
            written = self.stats.written.load(Ordering::Relaxed),
            dropped = self.stats.dropped.load(Ordering::Relaxed),
            "Batching journal shut down"
        );
    }

    /// Write queued entries until the queue is empty or a write fails.
    async fn flush(&mut self) -> DrainState {
        loop {
            let mut state = DrainState::Open;
            while self.retry.len() < self.batch_size {
                match self.receiver.try_recv() {
                    Ok(entry) => self.retry.push(entry),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        state = DrainState::Closed;
                        break;
                    }
                }
            }

            if self.retry.is_empty() {
                return state;
            }

            let full = self.retry.len() >= self.batch_size;
            match self.writer.write_batch(&self.retry).await {
                Ok(()) => {
                    debug!(count = self.retry.len(), "Wrote journal batch");
                    self.stats
                        .written
                        .fetch_add(self.retry.len() as u64, Ordering::Relaxed);
                    self.retry.clear();
                }
                Err(e) => {
                    let failures = self.stats.failed_flushes.fetch_add(1, Ordering::Relaxed) + 1;
                    error!(error = %e, pending = self.retry.len(), failures, "Failed to write journal batch");
                    return state;
                }
            }

            if !full {
                return state;
            }
        }
    }
}


