// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Status Aggregators
//!
//! Fold per-worker status reports into swarm-level views.
//!
//! | Module | View |
//! |--------|------|
//! | [`workers`] | latest state per worker, with staleness computed at read time |
//! | [`io_state`] | worst input and output state across the swarm |
//! | [`diagnostics`] | latest diagnostics object per role |
//! | [`capabilities`] | capability manifests grouped by role and version |

pub mod capabilities;
pub mod diagnostics;
pub mod io_state;
pub mod workers;

pub use capabilities::{CapabilitiesRegistry, CapabilityGroup, CapabilityManifest, CapabilityView};
pub use diagnostics::DiagnosticsAggregator;
pub use io_state::{InputState, IoState, IoStateAggregator, OutputState, WorkIoState};
pub use workers::{WorkerView, WorkersAggregator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status payload a worker publishes about itself. Every field is optional;
/// absent fields leave the previously reported value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatusReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Messages per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_state: Option<IoState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CapabilityManifest>,
}
