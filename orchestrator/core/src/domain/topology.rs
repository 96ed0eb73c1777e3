// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Queue topology and queue statistics ports.
//!
//! The controller never talks to the broker directly; the host wires these
//! ports to whatever transport binding it runs on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Failed to declare {0}: {1}")]
    DeclareFailed(String, String),
    #[error("Failed to delete {0}: {1}")]
    DeleteFailed(String, String),
    #[error("Queue not found: {0}")]
    QueueNotFound(String),
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Transport/topology port.
#[async_trait]
pub trait QueueTopology: Send + Sync {
    /// Declare the swarm's work exchange and return its name.
    async fn declare_work_exchange(&self) -> Result<String, TopologyError>;

    /// Declare one work queue per suffix bound to `exchange`. Every queue
    /// actually declared is added to `declared` (full queue names).
    async fn declare_work_queues(
        &self,
        exchange: &str,
        suffixes: &BTreeSet<String>,
        declared: &mut BTreeSet<String>,
    ) -> Result<(), TopologyError>;

    async fn delete_work_queues(&self, suffixes: &BTreeSet<String>) -> Result<(), TopologyError>;

    async fn delete_work_exchange(&self) -> Result<(), TopologyError>;

    /// Delete a control queue (a worker's or the controller's own).
    async fn delete_control_queue(&self, queue: &str) -> Result<(), TopologyError>;
}

/// Snapshot of one queue as reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub depth: u64,
    pub consumers: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_age_seconds: Option<u64>,
}

/// Queue-stats port.
#[async_trait]
pub trait QueueStatsProvider: Send + Sync {
    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, TopologyError>;
}
