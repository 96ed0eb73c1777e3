// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::application::aggregators::io_state::IoState;
use crate::application::aggregators::WorkerStatusReport;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct WorkerEntry {
    enabled: bool,
    throughput: f64,
    io_state: IoState,
    last_seen_at: Option<DateTime<Utc>>,
}

/// One row of the workers snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerView {
    pub role: String,
    pub instance: String,
    pub enabled: bool,
    pub throughput: f64,
    pub io_state: IoState,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

/// Latest reported state per worker. Staleness is computed when the
/// snapshot is taken; nothing sweeps old entries in the background.
pub struct WorkersAggregator {
    stale_after: chrono::Duration,
    workers: DashMap<(String, String), WorkerEntry>,
}

impl WorkersAggregator {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after: chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::seconds(30)),
            workers: DashMap::new(),
        }
    }

    pub fn record(&self, role: &str, instance: &str, report: &WorkerStatusReport, seen_at: DateTime<Utc>) {
        let mut entry = self
            .workers
            .entry((role.to_string(), instance.to_string()))
            .or_default();
        if let Some(enabled) = report.enabled {
            entry.enabled = enabled;
        }
        if let Some(throughput) = report.throughput {
            entry.throughput = throughput;
        }
        if let Some(io_state) = report.io_state {
            entry.io_state = io_state;
        }
        entry.last_seen_at = Some(seen_at);
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn snapshot(&self) -> Vec<WorkerView> {
        self.snapshot_at(Utc::now())
    }

    /// All workers sorted by (role, instance).
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<WorkerView> {
        let mut views: Vec<WorkerView> = self
            .workers
            .iter()
            .map(|entry| {
                let (role, instance) = entry.key();
                let worker = entry.value();
                let stale = worker
                    .last_seen_at
                    .is_none_or(|seen| now.signed_duration_since(seen) > self.stale_after);
                WorkerView {
                    role: role.clone(),
                    instance: instance.clone(),
                    enabled: worker.enabled,
                    throughput: worker.throughput,
                    io_state: worker.io_state,
                    last_seen_at: worker.last_seen_at,
                    stale,
                }
            })
            .collect();
        views.sort_by(|a, b| (&a.role, &a.instance).cmp(&(&b.role, &b.instance)));
        views
    }

    pub fn clear(&self) {
        self.workers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::aggregators::io_state::{InputState, OutputState};

    fn report(enabled: bool, throughput: f64) -> WorkerStatusReport {
        WorkerStatusReport {
            enabled: Some(enabled),
            throughput: Some(throughput),
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_sorted_with_staleness() {
        let agg = WorkersAggregator::new(Duration::from_secs(30));
        let now = Utc::now();
        agg.record("proc", "p-2", &report(true, 5.0), now);
        agg.record("gen", "g-1", &report(true, 10.0), now - chrono::Duration::seconds(31));
        agg.record("proc", "p-1", &report(false, 0.0), now - chrono::Duration::seconds(29));

        let snapshot = agg.snapshot_at(now);
        let keys: Vec<_> = snapshot.iter().map(|w| (w.role.as_str(), w.instance.as_str(), w.stale)).collect();
        assert_eq!(
            keys,
            vec![("gen", "g-1", true), ("proc", "p-1", false), ("proc", "p-2", false)]
        );
    }

    #[test]
    fn test_partial_reports_keep_previous_values() {
        let agg = WorkersAggregator::new(Duration::from_secs(30));
        let now = Utc::now();
        agg.record("gen", "g-1", &report(true, 10.0), now);
        agg.record(
            "gen",
            "g-1",
            &WorkerStatusReport {
                io_state: Some(IoState {
                    input: InputState::Ok,
                    output: OutputState::Throttled,
                }),
                ..Default::default()
            },
            now,
        );

        let view = &agg.snapshot_at(now)[0];
        assert!(view.enabled);
        assert_eq!(view.throughput, 10.0);
        assert_eq!(view.io_state.output, OutputState::Throttled);
    }

    #[test]
    fn test_view_wire_shape() {
        let agg = WorkersAggregator::new(Duration::from_secs(30));
        let now = Utc::now();
        agg.record("gen", "g-1", &report(true, 1.5), now);
        let json = serde_json::to_value(&agg.snapshot_at(now)[0]).unwrap();
        assert_eq!(json["ioState"]["input"], "unknown");
        assert_eq!(json["stale"], false);
    }
}
