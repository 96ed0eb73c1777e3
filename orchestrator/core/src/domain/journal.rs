// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control-Plane Journal
//!
//! Append-only audit record of every control-plane signal, outcome and alert
//! that crosses the controller boundary, plus controller-local lifecycle
//! events. Entries are never mutated; ordering is insertion order per sink.
//!
//! | Sink | Module |
//! |------|--------|
//! | newline-delimited JSON file | `infrastructure::journal::file` |
//! | batched relational rows | `infrastructure::journal::postgres` |
//! | in-memory | `infrastructure::journal::memory` |

use crate::domain::control_plane::ControlScope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalDirection {
    /// Received from the control plane.
    In,
    /// Published by the controller.
    Out,
    /// Controller-internal.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JournalSeverity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for JournalSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

impl fmt::Display for JournalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::Local => "LOCAL",
        };
        f.write_str(s)
    }
}

/// One journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub swarm_id: String,
    pub severity: JournalSeverity,
    pub direction: JournalDirection,
    /// Broad category: `signal`, `outcome`, `metric`, `alert`, `lifecycle`.
    pub kind: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub origin: String,
    pub scope: ControlScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JournalEntry {
    /// Entry stamped now with empty optional fields.
    pub fn new(
        swarm_id: impl Into<String>,
        severity: JournalSeverity,
        direction: JournalDirection,
        kind: impl Into<String>,
        entry_type: impl Into<String>,
        origin: impl Into<String>,
        scope: ControlScope,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            swarm_id: swarm_id.into(),
            severity,
            direction,
            kind: kind.into(),
            entry_type: entry_type.into(),
            origin: origin.into(),
            scope,
            correlation_id: None,
            idempotency_key: None,
            routing_key: None,
            data: serde_json::Value::Null,
            raw: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn with_ids(mut self, correlation_id: Option<Uuid>, idempotency_key: Option<Uuid>) -> Self {
        self.correlation_id = correlation_id;
        self.idempotency_key = idempotency_key;
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = Some(raw.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Journal I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Journal database error: {0}")]
    Database(String),
    #[error("Invalid journal path: {0}")]
    InvalidPath(String),
    #[error("Journal is closed")]
    Closed,
}

/// Journal sink.
///
/// `append` must not block the caller on slow storage; sinks that persist
/// remotely buffer internally. Errors are reported to the caller, which
/// decides whether to swallow them (the control plane always acknowledges
/// its inbound message regardless of journaling outcome).
pub trait Journal: Send + Sync {
    fn append(&self, entry: JournalEntry) -> Result<(), JournalError>;
}


