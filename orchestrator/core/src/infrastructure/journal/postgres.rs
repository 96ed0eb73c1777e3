// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Journal Store
//!
//! Batch writer for the `swarm_journal` table. Meant to sit behind a
//! [`BatchingJournal`](super::batch::BatchingJournal); each flush is one
//! transaction of multi-row INSERTs, so a retried batch is never written twice.

use crate::domain::journal::{JournalEntry, JournalError};
use crate::infrastructure::journal::batch::JournalBatchWriter;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::info;

const INSERT_PREFIX: &str = "INSERT INTO swarm_journal (\
    ts, swarm_id, severity, direction, kind, entry_type, origin, \
    scope_swarm_id, scope_role, scope_instance, \
    correlation_id, idempotency_key, routing_key, data, raw, extra) ";

const COLUMNS_PER_ROW: usize = 16;

/// Postgres caps bind parameters per statement at 65535.
const MAX_ROWS_PER_INSERT: usize = 4000;

#[derive(Clone)]
pub struct PostgresJournalWriter {
    pool: PgPool,
}

impl PostgresJournalWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, JournalError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the journal table and its lookup index if missing
    pub async fn ensure_schema(&self) -> Result<(), JournalError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS swarm_journal (
                id BIGSERIAL PRIMARY KEY,
                ts TIMESTAMPTZ NOT NULL,
                swarm_id TEXT NOT NULL,
                severity TEXT NOT NULL,
                direction TEXT NOT NULL,
                kind TEXT NOT NULL,
                entry_type TEXT NOT NULL,
                origin TEXT NOT NULL,
                scope_swarm_id TEXT,
                scope_role TEXT,
                scope_instance TEXT,
                correlation_id UUID,
                idempotency_key UUID,
                routing_key TEXT,
                data JSONB NOT NULL,
                raw TEXT,
                extra JSONB NOT NULL DEFAULT '{}'::jsonb
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| JournalError::Database(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS swarm_journal_swarm_ts_idx ON swarm_journal (swarm_id, ts)")
            .execute(&self.pool)
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;

        info!("Swarm journal schema ready");
        Ok(())
    }

    async fn insert_chunk(
        tx: &mut Transaction<'_, Postgres>,
        chunk: &[JournalEntry],
    ) -> Result<(), JournalError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_PREFIX);
        builder.push_values(chunk, |mut row, entry| {
            row.push_bind(entry.timestamp)
                .push_bind(entry.swarm_id.clone())
                .push_bind(entry.severity.to_string())
                .push_bind(entry.direction.to_string())
                .push_bind(entry.kind.clone())
                .push_bind(entry.entry_type.clone())
                .push_bind(entry.origin.clone())
                .push_bind(entry.scope.swarm_id.clone())
                .push_bind(entry.scope.role.clone())
                .push_bind(entry.scope.instance.clone())
                .push_bind(entry.correlation_id)
                .push_bind(entry.idempotency_key)
                .push_bind(entry.routing_key.clone())
                .push_bind(entry.data.clone())
                .push_bind(entry.raw.clone())
                .push_bind(serde_json::Value::Object(entry.extra.clone()));
        });

        builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl JournalBatchWriter for PostgresJournalWriter {
    async fn write_batch(&self, batch: &[JournalEntry]) -> Result<(), JournalError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| JournalError::Database(e.to_string()))?;
        for chunk in batch.chunks(MAX_ROWS_PER_INSERT) {
            // Dropping `tx` on error rolls back the chunks already inserted.
            Self::insert_chunk(&mut tx, chunk).await?;
        }
        tx.commit()
            .await
            .map_err(|e| JournalError::Database(e.to_string()))
    }
}


