// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Identifier assigned to a launched worker container by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the runtime needs to launch one bee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub image: String,
    /// Unique container name; doubles as the worker's instance id.
    pub name: String,
    pub env: BTreeMap<String, String>,
}

impl WorkerSpec {
    /// Environment rendered as `KEY=VALUE` strings.
    pub fn env_pairs(&self) -> Vec<String> {
        self.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect()
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to start worker: {0}")]
    StartFailed(String),
    #[error("Failed to stop worker: {0}")]
    StopFailed(String),
    #[error("Container not found: {0}")]
    ContainerNotFound(String),
    #[error("Runtime unavailable: {0}")]
    Unavailable(String),
}

/// Workload port: launches and stops worker containers.
#[async_trait]
pub trait WorkloadRuntime: Send + Sync {
    async fn start_worker(&self, spec: WorkerSpec) -> Result<ContainerId, RuntimeError>;
    /// Stop and remove a worker container.
    async fn stop_worker(&self, id: &ContainerId) -> Result<(), RuntimeError>;
}
