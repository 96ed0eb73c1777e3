// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::journal::{Journal, JournalEntry, JournalError};
use crate::infrastructure::journal::batch::JournalBatchWriter;
use async_trait::async_trait;
use parking_lot::RwLock;

/// In-memory journal for tests and journal-less local runs.
///
/// Also usable as the store behind a `BatchingJournal`, in which case the
/// size of every written batch is recorded.
#[derive(Default)]
pub struct InMemoryJournal {
    entries: RwLock<Vec<JournalEntry>>,
    batches: RwLock<Vec<usize>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.read().clone()
    }

    pub fn find_by_type(&self, entry_type: &str) -> Vec<JournalEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.entry_type == entry_type)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.batches.write().clear();
    }
}

impl Journal for InMemoryJournal {
    fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        self.entries.write().push(entry);
        Ok(())
    }
}

#[async_trait]
impl JournalBatchWriter for InMemoryJournal {
    async fn write_batch(&self, batch: &[JournalEntry]) -> Result<(), JournalError> {
        self.entries.write().extend_from_slice(batch);
        self.batches.write().push(batch.len());
        Ok(())
    }
}
