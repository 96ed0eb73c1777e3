// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm status report
//!
//! The per-swarm payload published as `metric.status-full` /
//! `metric.status-delta`: lifecycle status, readiness metrics and every
//! aggregator view, plus broker stats for the declared work queues.

use crate::application::aggregators::{CapabilityView, WorkIoState, WorkerView};
use crate::application::readiness::ReadinessMetrics;
use crate::domain::swarm::SwarmStatus;
use aegis_core::domain::topology::{QueueStats, QueueStatsProvider};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmStatusReport {
    pub swarm_id: String,
    pub status: SwarmStatus,
    pub controller_enabled: bool,
    pub ready_for_work: bool,
    pub timestamp: DateTime<Utc>,
    pub metrics: ReadinessMetrics,
    pub workers: Vec<WorkerView>,
    pub work: WorkIoState,
    pub diagnostics: BTreeMap<String, serde_json::Value>,
    pub capabilities: CapabilityView,
    pub queues: BTreeMap<String, QueueStats>,
}

impl SwarmStatusReport {
    /// Compact form for `status-delta` events: everything except the
    /// per-worker rows, diagnostics and capabilities.
    pub fn delta(&self) -> serde_json::Value {
        serde_json::json!({
            "swarmId": self.swarm_id,
            "status": self.status,
            "controllerEnabled": self.controller_enabled,
            "readyForWork": self.ready_for_work,
            "timestamp": self.timestamp,
            "metrics": self.metrics,
            "work": self.work,
            "queues": self.queues,
        })
    }
}

/// Fetch stats for every queue. A failed lookup is logged and the queue is
/// left out of the result.
pub async fn collect_queue_stats(
    provider: &dyn QueueStatsProvider,
    queues: &BTreeSet<String>,
) -> BTreeMap<String, QueueStats> {
    let mut stats = BTreeMap::new();
    for queue in queues {
        match provider.queue_stats(queue).await {
            Ok(s) => {
                stats.insert(queue.clone(), s);
            }
            Err(e) => warn!(queue = %queue, error = %e, "Queue stats lookup failed"),
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::domain::topology::TopologyError;
    use async_trait::async_trait;

    struct HalfBroken;

    #[async_trait]
    impl QueueStatsProvider for HalfBroken {
        async fn queue_stats(&self, queue: &str) -> Result<QueueStats, TopologyError> {
            if queue.ends_with("broken") {
                return Err(TopologyError::QueueNotFound(queue.to_string()));
            }
            Ok(QueueStats {
                depth: 7,
                consumers: 2,
                oldest_age_seconds: Some(3),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_lookups_are_omitted() {
        let queues: BTreeSet<String> = ["aegis.work.sw1.gen", "aegis.work.sw1.broken"]
            .into_iter()
            .map(String::from)
            .collect();
        let stats = collect_queue_stats(&HalfBroken, &queues).await;

        assert_eq!(stats.len(), 1);
        assert_eq!(stats["aegis.work.sw1.gen"].depth, 7);
    }
}
