// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Journal sinks
//!
//! - `file`: NDJSON file per swarm run
//! - `batch`: bounded, non-blocking batching front for slow stores
//! - `postgres`: `swarm_journal` table writer used behind `batch`
//! - `memory`: in-process store for tests

pub mod batch;
pub mod file;
pub mod memory;
pub mod postgres;

pub use batch::{BatchSettings, BatchingJournal, JournalBatchWriter};
pub use file::FileJournal;
pub use memory::InMemoryJournal;
pub use postgres::PostgresJournalWriter;

use crate::domain::controller_config::{JournalBackend, JournalSection};
use crate::domain::journal::{Journal, JournalEntry, JournalError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Journal that discards everything; used when the backend is `none`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJournal;

impl Journal for NoopJournal {
    fn append(&self, _entry: JournalEntry) -> Result<(), JournalError> {
        Ok(())
    }
}

/// An opened journal plus whatever background task feeds its store.
pub struct JournalHandle {
    journal: Arc<dyn Journal>,
    batching: Option<(Arc<BatchingJournal>, JoinHandle<()>)>,
}

impl JournalHandle {
    pub fn journal(&self) -> Arc<dyn Journal> {
        self.journal.clone()
    }

    /// Flush buffered entries (batching backends) and wait for the drain
    /// task to finish.
    pub async fn shutdown(self) {
        if let Some((batching, handle)) = self.batching {
            batching.shutdown();
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Journal drain task panicked");
            }
        }
    }
}

/// Open the journal configured in `section` for one swarm.
pub async fn open_journal(
    section: &JournalSection,
    swarm_id: &str,
) -> Result<JournalHandle, JournalError> {
    match section.backend {
        JournalBackend::None => {
            info!("Swarm journal disabled");
            Ok(JournalHandle {
                journal: Arc::new(NoopJournal),
                batching: None,
            })
        }
        JournalBackend::File => {
            let journal = FileJournal::open(&section.directory, swarm_id, None)?;
            Ok(JournalHandle {
                journal: Arc::new(journal),
                batching: None,
            })
        }
        JournalBackend::Postgres => {
            let url = section.database_url.as_deref().ok_or_else(|| {
                JournalError::Database("database_url is required for the postgres journal".to_string())
            })?;
            let writer = PostgresJournalWriter::connect(url).await?;
            writer.ensure_schema().await?;

            let (batching, handle) = BatchingJournal::start(Arc::new(writer), BatchSettings::from(section));
            Ok(JournalHandle {
                journal: batching.clone(),
                batching: Some((batching, handle)),
            })
        }
    }
}


