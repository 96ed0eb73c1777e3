// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Readiness Tracker
//!
//! Heartbeat, snapshot and enabled-flag recording goes through concurrent
//! maps and never blocks on readiness evaluation. Evaluation itself
//! (`mark_ready`, `is_fully_ready`) is serialized by one mutex because it
//! reads and mutates the ready-instance lists together with the freshness
//! check.
//!
//! A stale ready instance makes evaluation return `false` and is reported to
//! the [`StatusRequestSink`] so its owner can ask the worker to re-announce.
//! There is no debounce: every evaluation that hits a stale instance reports
//! it again.

use aegis_core::domain::controller_config::ControllerConfigManifest;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Receives `(role, instance)` of ready instances whose heartbeat went stale.
pub trait StatusRequestSink: Send + Sync {
    fn request_status(&self, role: &str, instance: &str);
}

impl<F> StatusRequestSink for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn request_status(&self, role: &str, instance: &str) {
        self(role, instance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub heartbeat_ttl: Duration,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            heartbeat_ttl: Duration::from_secs(15),
        }
    }
}

impl From<&ControllerConfigManifest> for ReadinessSettings {
    fn from(config: &ControllerConfigManifest) -> Self {
        Self {
            heartbeat_ttl: config.spec.readiness.heartbeat_ttl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct InstanceKey {
    role: String,
    instance: String,
}

impl InstanceKey {
    fn new(role: &str, instance: &str) -> Self {
        Self {
            role: role.to_string(),
            instance: instance.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessMetrics {
    /// Sum of expected instance counts
    pub desired: usize,
    /// Instances with a heartbeat inside the TTL
    pub healthy: usize,
    /// Instances both enabled and healthy
    pub running: usize,
    pub enabled: usize,
    /// Oldest heartbeat on record, or the evaluation time if none
    pub watermark: DateTime<Utc>,
}

#[derive(Default)]
struct ReadySets {
    expected: BTreeMap<String, usize>,
    ready: BTreeMap<String, Vec<String>>,
}

pub struct ReadinessTracker {
    ttl: chrono::Duration,
    heartbeats: DashMap<InstanceKey, DateTime<Utc>>,
    snapshots: DashMap<InstanceKey, DateTime<Utc>>,
    enabled: DashMap<InstanceKey, bool>,
    sets: Mutex<ReadySets>,
    status_requests: Arc<dyn StatusRequestSink>,
}

impl ReadinessTracker {
    pub fn new(settings: ReadinessSettings, status_requests: Arc<dyn StatusRequestSink>) -> Self {
        Self {
            ttl: chrono::Duration::from_std(settings.heartbeat_ttl).unwrap_or(chrono::Duration::seconds(15)),
            heartbeats: DashMap::new(),
            snapshots: DashMap::new(),
            enabled: DashMap::new(),
            sets: Mutex::new(ReadySets::default()),
            status_requests,
        }
    }

    /// Forget everything; called at the start of every `prepare`.
    pub fn reset(&self) {
        let mut sets = self.sets.lock();
        sets.expected.clear();
        sets.ready.clear();
        self.heartbeats.clear();
        self.snapshots.clear();
        self.enabled.clear();
    }

    pub fn register_expected(&self, role: &str) {
        let mut sets = self.sets.lock();
        *sets.expected.entry(role.to_string()).or_insert(0) += 1;
    }

    pub fn expected_total(&self) -> usize {
        self.sets.lock().expected.values().sum()
    }

    pub fn record_heartbeat(&self, role: &str, instance: &str, at: DateTime<Utc>) {
        self.heartbeats.insert(InstanceKey::new(role, instance), at);
    }

    pub fn record_status_snapshot(&self, role: &str, instance: &str, at: DateTime<Utc>) {
        self.snapshots.insert(InstanceKey::new(role, instance), at);
    }

    pub fn record_enabled(&self, role: &str, instance: &str, enabled: bool) {
        self.enabled.insert(InstanceKey::new(role, instance), enabled);
    }

    pub fn last_heartbeat(&self, role: &str, instance: &str) -> Option<DateTime<Utc>> {
        self.heartbeats.get(&InstanceKey::new(role, instance)).map(|ts| *ts)
    }

    pub fn ready_instances(&self, role: &str) -> Vec<String> {
        self.sets.lock().ready.get(role).cloned().unwrap_or_default()
    }

    /// Add `instance` to its role's ready set (idempotent) and report
    /// whether the whole swarm is now fully ready.
    pub fn mark_ready(&self, role: &str, instance: &str) -> bool {
        self.mark_ready_at(role, instance, Utc::now())
    }

    pub fn mark_ready_at(&self, role: &str, instance: &str, now: DateTime<Utc>) -> bool {
        let (ready, stale) = {
            let mut sets = self.sets.lock();
            let instances = sets.ready.entry(role.to_string()).or_default();
            if !instances.iter().any(|i| i == instance) {
                instances.push(instance.to_string());
                info!(role, instance, "Instance marked ready");
            }
            self.evaluate(&sets, now)
        };
        self.report_stale(stale);
        ready
    }

    pub fn is_fully_ready(&self) -> bool {
        self.is_fully_ready_at(Utc::now())
    }

    /// True iff every expected role has at least its expected number of
    /// ready instances and each of those has a heartbeat within the TTL.
    /// With nothing expected this is vacuously true.
    pub fn is_fully_ready_at(&self, now: DateTime<Utc>) -> bool {
        let (ready, stale) = {
            let sets = self.sets.lock();
            self.evaluate(&sets, now)
        };
        self.report_stale(stale);
        ready
    }

    fn evaluate(&self, sets: &ReadySets, now: DateTime<Utc>) -> (bool, Option<InstanceKey>) {
        for (role, expected) in &sets.expected {
            let ready = sets.ready.get(role).map(Vec::as_slice).unwrap_or_default();
            if ready.len() < *expected {
                debug!(role = %role, ready = ready.len(), expected, "Role not ready yet");
                return (false, None);
            }
            for instance in ready {
                let key = InstanceKey::new(role, instance);
                if !self.is_fresh(&key, now) {
                    return (false, Some(key));
                }
            }
        }
        (true, None)
    }

    fn is_fresh(&self, key: &InstanceKey, now: DateTime<Utc>) -> bool {
        self.heartbeats
            .get(key)
            .is_some_and(|ts| now.signed_duration_since(*ts) <= self.ttl)
    }

    fn report_stale(&self, stale: Option<InstanceKey>) {
        if let Some(key) = stale {
            info!(role = %key.role, instance = %key.instance, "Ready instance heartbeat is stale; requesting status");
            metrics::counter!("aegis_swarm_status_requests_total").increment(1);
            self.status_requests.request_status(&key.role, &key.instance);
        }
    }

    pub fn metrics(&self) -> ReadinessMetrics {
        self.metrics_at(Utc::now())
    }

    pub fn metrics_at(&self, now: DateTime<Utc>) -> ReadinessMetrics {
        let desired = self.expected_total();

        let mut healthy = 0;
        let mut running = 0;
        let mut watermark: Option<DateTime<Utc>> = None;
        for entry in self.heartbeats.iter() {
            let at = *entry.value();
            watermark = Some(watermark.map_or(at, |w| w.min(at)));
            if now.signed_duration_since(at) <= self.ttl {
                healthy += 1;
                if self.enabled.get(entry.key()).is_some_and(|e| *e) {
                    running += 1;
                }
            }
        }

        let enabled = self.enabled.iter().filter(|e| *e.value()).count();

        ReadinessMetrics {
            desired,
            healthy,
            running,
            enabled,
            watermark: watermark.unwrap_or(now),
        }
    }

    /// Side-effect-free gate: every ready instance has a snapshot at or
    /// after `cutoff`.
    pub fn has_fresh_snapshots_since(&self, cutoff: DateTime<Utc>) -> bool {
        let sets = self.sets.lock();
        sets.ready.iter().all(|(role, instances)| {
            instances.iter().all(|instance| {
                self.snapshots
                    .get(&InstanceKey::new(role, instance))
                    .is_some_and(|ts| *ts >= cutoff)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(String, String)>>);

    impl StatusRequestSink for RecordingSink {
        fn request_status(&self, role: &str, instance: &str) {
            self.0.lock().push((role.to_string(), instance.to_string()));
        }
    }

    fn tracker() -> (ReadinessTracker, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (ReadinessTracker::new(ReadinessSettings::default(), sink.clone()), sink)
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn test_ready_when_all_expected_instances_fresh() {
        let (tracker, sink) = tracker();
        let now = Utc::now();
        tracker.register_expected("gen");
        tracker.register_expected("proc");

        tracker.record_heartbeat("gen", "g-1", now);
        tracker.record_heartbeat("proc", "p-1", now);
        assert!(!tracker.mark_ready_at("gen", "g-1", now));
        assert!(tracker.mark_ready_at("proc", "p-1", now));
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_mark_ready_is_idempotent() {
        let (tracker, _) = tracker();
        let now = Utc::now();
        tracker.register_expected("gen");
        tracker.register_expected("gen");
        tracker.record_heartbeat("gen", "g-1", now);

        assert!(!tracker.mark_ready_at("gen", "g-1", now));
        assert!(!tracker.mark_ready_at("gen", "g-1", now));
        assert_eq!(tracker.ready_instances("gen"), vec!["g-1"]);
    }

    #[test]
    fn test_missing_instances_block_readiness() {
        let (tracker, sink) = tracker();
        let now = Utc::now();
        tracker.register_expected("gen");
        assert!(!tracker.is_fully_ready_at(now));
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_stale_heartbeat_requests_status() {
        let (tracker, sink) = tracker();
        let now = Utc::now();
        tracker.register_expected("gen");
        tracker.record_heartbeat("gen", "g-1", now - secs(16));
        tracker.mark_ready_at("gen", "g-1", now - secs(16));

        assert!(!tracker.is_fully_ready_at(now));
        assert_eq!(sink.0.lock().as_slice(), &[("gen".to_string(), "g-1".to_string())]);

        // No debounce: a second evaluation asks again.
        assert!(!tracker.is_fully_ready_at(now));
        assert_eq!(sink.0.lock().len(), 2);

        tracker.record_heartbeat("gen", "g-1", now);
        assert!(tracker.is_fully_ready_at(now));
        assert_eq!(sink.0.lock().len(), 2);
    }

    #[test]
    fn test_heartbeat_exactly_at_ttl_is_fresh() {
        let (tracker, _) = tracker();
        let now = Utc::now();
        tracker.register_expected("gen");
        tracker.record_heartbeat("gen", "g-1", now - secs(15));
        assert!(tracker.mark_ready_at("gen", "g-1", now));
    }

    #[test]
    fn test_nothing_expected_is_vacuously_ready() {
        let (tracker, _) = tracker();
        assert!(tracker.is_fully_ready());
        assert_eq!(tracker.expected_total(), 0);
    }

    #[test]
    fn test_metrics() {
        let (tracker, _) = tracker();
        let now = Utc::now();
        tracker.register_expected("gen");
        tracker.register_expected("proc");
        tracker.register_expected("proc");

        tracker.record_heartbeat("gen", "g-1", now - secs(2));
        tracker.record_heartbeat("proc", "p-1", now - secs(60));
        tracker.record_heartbeat("proc", "p-2", now);
        tracker.record_enabled("gen", "g-1", true);
        tracker.record_enabled("proc", "p-1", true);
        tracker.record_enabled("proc", "p-2", false);

        let metrics = tracker.metrics_at(now);
        assert_eq!(metrics.desired, 3);
        assert_eq!(metrics.healthy, 2);
        assert_eq!(metrics.running, 1);
        assert_eq!(metrics.enabled, 2);
        assert_eq!(metrics.watermark, now - secs(60));
    }

    #[test]
    fn test_metrics_watermark_defaults_to_now() {
        let (tracker, _) = tracker();
        let now = Utc::now();
        assert_eq!(tracker.metrics_at(now).watermark, now);
    }

    #[test]
    fn test_fresh_snapshots_gate_has_no_side_effect() {
        let (tracker, sink) = tracker();
        let now = Utc::now();
        tracker.register_expected("gen");
        tracker.record_heartbeat("gen", "g-1", now);
        tracker.mark_ready_at("gen", "g-1", now);

        assert!(!tracker.has_fresh_snapshots_since(now));
        tracker.record_status_snapshot("gen", "g-1", now - secs(1));
        assert!(!tracker.has_fresh_snapshots_since(now));
        tracker.record_status_snapshot("gen", "g-1", now);
        assert!(tracker.has_fresh_snapshots_since(now));
        assert!(sink.0.lock().is_empty());
    }

    #[test]
    fn test_reset_clears_state() {
        let (tracker, _) = tracker();
        let now = Utc::now();
        tracker.register_expected("gen");
        tracker.record_heartbeat("gen", "g-1", now);
        tracker.mark_ready_at("gen", "g-1", now);

        tracker.reset();
        assert_eq!(tracker.expected_total(), 0);
        assert!(tracker.ready_instances("gen").is_empty());
        assert!(tracker.last_heartbeat("gen", "g-1").is_none());
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let tracker = ReadinessTracker::new(
            ReadinessSettings::default(),
            Arc::new(move |role: &str, instance: &str| {
                recorder.lock().push(format!("{}/{}", role, instance));
            }),
        );
        let now = Utc::now();
        tracker.register_expected("gen");
        tracker.mark_ready_at("gen", "g-1", now);
        assert_eq!(seen.lock().as_slice(), &["gen/g-1".to_string()]);
    }
}
