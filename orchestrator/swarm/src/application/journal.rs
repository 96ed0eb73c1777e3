// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Swarm journal facade and failure suppression
//!
//! [`SwarmJournal`] stamps entries with the swarm id and the controller as
//! origin, and swallows sink errors: journaling never fails an ingestion
//! path. [`JournalFailureSuppressor`] sits in front of it for transport
//! drops and publish errors, which tend to arrive in floods.

use aegis_core::domain::control_plane::{ControlEvent, ControlScope, ControlSignal, ControllerIdentity, RoutingKey};
use aegis_core::domain::controller_config::ControllerConfigManifest;
use aegis_core::domain::journal::{Journal, JournalDirection, JournalEntry, JournalError, JournalSeverity};
use aegis_core::infrastructure::journal::NoopJournal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SwarmJournal {
    sink: Arc<dyn Journal>,
    swarm_id: String,
    origin: String,
}

impl SwarmJournal {
    pub fn new(sink: Arc<dyn Journal>, identity: &ControllerIdentity) -> Self {
        Self {
            sink,
            swarm_id: identity.swarm_id.clone(),
            origin: identity.instance_id.clone(),
        }
    }

    pub fn disabled(identity: &ControllerIdentity) -> Self {
        Self::new(Arc::new(NoopJournal), identity)
    }

    pub fn swarm_id(&self) -> &str {
        &self.swarm_id
    }

    /// Start an entry stamped with this swarm and origin.
    pub fn entry(
        &self,
        severity: JournalSeverity,
        direction: JournalDirection,
        kind: &str,
        entry_type: &str,
        scope: ControlScope,
    ) -> JournalEntry {
        JournalEntry::new(&self.swarm_id, severity, direction, kind, entry_type, &self.origin, scope)
    }

    pub fn try_append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        self.sink.append(entry)
    }

    /// Append and swallow sink errors. Returns whether the entry was accepted.
    pub fn append(&self, entry: JournalEntry) -> bool {
        let entry_type = entry.entry_type.clone();
        match self.sink.append(entry) {
            Ok(()) => true,
            Err(e) => {
                warn!(swarm_id = %self.swarm_id, entry_type = %entry_type, error = %e, "Failed to append journal entry");
                false
            }
        }
    }

    pub fn signal_out(&self, routing_key: &RoutingKey, signal: &ControlSignal) {
        let entry = self
            .entry(JournalSeverity::Info, JournalDirection::Out, "signal", &signal.signal, signal.scope())
            .with_routing_key(routing_key.as_str())
            .with_ids(Some(signal.correlation_id), Some(signal.idempotency_key))
            .with_data(serde_json::json!({
                "commandTarget": signal.command_target,
                "args": signal.args,
            }));
        self.append(entry);
    }

    pub fn event_out(&self, routing_key: &RoutingKey, event: &ControlEvent, severity: JournalSeverity) {
        let entry = self
            .entry(severity, JournalDirection::Out, &event.kind, &event.event_type, event.scope())
            .with_routing_key(routing_key.as_str())
            .with_ids(event.correlation_id, event.idempotency_key)
            .with_data(event.data.clone())
            .with_timestamp(event.timestamp);
        self.append(entry);
    }

    pub fn inbound(
        &self,
        severity: JournalSeverity,
        kind: &str,
        entry_type: &str,
        scope: ControlScope,
        data: serde_json::Value,
        raw: Option<&str>,
    ) {
        let mut entry = self
            .entry(severity, JournalDirection::In, kind, entry_type, scope)
            .with_data(data);
        if let Some(raw) = raw {
            entry = entry.with_raw(raw);
        }
        self.append(entry);
    }

    pub fn local(&self, severity: JournalSeverity, entry_type: &str, scope: ControlScope, data: serde_json::Value) {
        let entry = self
            .entry(severity, JournalDirection::Local, "lifecycle", entry_type, scope)
            .with_data(data);
        self.append(entry);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuppressionSettings {
    pub quiet_period: Duration,
    pub max_keys: usize,
    pub failure_backoff: Duration,
}

impl Default for SuppressionSettings {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(2000),
            max_keys: 10_000,
            failure_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&ControllerConfigManifest> for SuppressionSettings {
    fn from(config: &ControllerConfigManifest) -> Self {
        let journal = &config.spec.journal;
        Self {
            quiet_period: journal.suppression_quiet_period,
            max_keys: journal.suppression_max_keys.max(1),
            failure_backoff: journal.failure_backoff,
        }
    }
}

/// What happened to a failure handed to the suppressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionOutcome {
    /// Written; `suppressed_count` repeats were swallowed since the last write
    Emitted { suppressed_count: u64 },
    /// Swallowed inside the quiet period of its key
    Suppressed,
    /// The sink failed recently; journaling is paused
    JournalDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SuppressionKey {
    entry_type: String,
    routing_key: String,
    reason: String,
}

struct KeyWindow {
    opened_at: Instant,
    suppressed: u64,
}

#[derive(Default)]
struct SuppressorState {
    windows: HashMap<SuppressionKey, KeyWindow>,
    disabled_until: Option<Instant>,
}

/// Rate limiter for journaling transport-level failures.
///
/// Per `(type, routingKey, reason)` key the first failure is written at
/// once and repeats within the quiet period are only counted. The first
/// failure after the period is written with `extra.suppressedCount`.
///
/// The key table is bounded; when full it is cleared outright, so a burst of
/// duplicates may be written right after a clear. If the sink itself errors,
/// journaling through the suppressor pauses for the failure backoff.
pub struct JournalFailureSuppressor {
    journal: SwarmJournal,
    settings: SuppressionSettings,
    state: Mutex<SuppressorState>,
}

impl JournalFailureSuppressor {
    pub fn new(journal: SwarmJournal, settings: SuppressionSettings) -> Self {
        Self {
            journal,
            settings,
            state: Mutex::new(SuppressorState::default()),
        }
    }

    pub fn record(&self, routing_key: &str, reason: &str, entry: JournalEntry) -> SuppressionOutcome {
        self.record_at(routing_key, reason, entry, Instant::now())
    }

    pub fn record_at(
        &self,
        routing_key: &str,
        reason: &str,
        entry: JournalEntry,
        now: Instant,
    ) -> SuppressionOutcome {
        let key = SuppressionKey {
            entry_type: entry.entry_type.clone(),
            routing_key: routing_key.to_string(),
            reason: reason.to_string(),
        };

        let suppressed_count = {
            let mut state = self.state.lock();

            if let Some(until) = state.disabled_until {
                if now < until {
                    return SuppressionOutcome::JournalDisabled;
                }
                state.disabled_until = None;
            }

            if !state.windows.contains_key(&key) && state.windows.len() >= self.settings.max_keys {
                warn!(keys = state.windows.len(), "Journal suppression table full; clearing");
                state.windows.clear();
            }

            match state.windows.get_mut(&key) {
                Some(window) if now.duration_since(window.opened_at) < self.settings.quiet_period => {
                    window.suppressed += 1;
                    metrics::counter!("aegis_swarm_journal_suppressed_total").increment(1);
                    debug!(routing_key, reason, suppressed = window.suppressed, "Suppressed journal entry");
                    return SuppressionOutcome::Suppressed;
                }
                Some(window) => {
                    let count = window.suppressed;
                    window.opened_at = now;
                    window.suppressed = 0;
                    count
                }
                None => {
                    state.windows.insert(
                        key,
                        KeyWindow {
                            opened_at: now,
                            suppressed: 0,
                        },
                    );
                    0
                }
            }
        };

        let entry = entry.with_routing_key(routing_key).with_extra("reason", reason.into());
        let entry = if suppressed_count > 0 {
            entry.with_extra("suppressedCount", suppressed_count.into())
        } else {
            entry
        };

        match self.journal.try_append(entry) {
            Ok(()) => SuppressionOutcome::Emitted { suppressed_count },
            Err(e) => {
                warn!(
                    error = %e,
                    backoff_secs = self.settings.failure_backoff.as_secs(),
                    "Journal sink failed; pausing failure journaling"
                );
                self.state.lock().disabled_until = Some(now + self.settings.failure_backoff);
                SuppressionOutcome::JournalDisabled
            }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.state.lock().windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::infrastructure::journal::InMemoryJournal;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn identity() -> ControllerIdentity {
        ControllerIdentity::new("sw1", "ctrl-1")
    }

    fn drop_entry(journal: &SwarmJournal) -> JournalEntry {
        journal.entry(
            JournalSeverity::Warn,
            JournalDirection::In,
            "transport",
            "message-dropped",
            ControlScope::swarm("sw1"),
        )
    }

    fn settings() -> SuppressionSettings {
        SuppressionSettings {
            quiet_period: Duration::from_millis(2000),
            max_keys: 3,
            failure_backoff: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_facade_stamps_swarm_and_origin() {
        let sink = Arc::new(InMemoryJournal::new());
        let journal = SwarmJournal::new(sink.clone(), &identity());
        journal.local(JournalSeverity::Info, "prepare", ControlScope::swarm("sw1"), serde_json::json!({}));

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].swarm_id, "sw1");
        assert_eq!(entries[0].origin, "ctrl-1");
        assert_eq!(entries[0].direction, JournalDirection::Local);
    }

    #[test]
    fn test_repeats_within_quiet_period_are_counted() {
        let sink = Arc::new(InMemoryJournal::new());
        let journal = SwarmJournal::new(sink.clone(), &identity());
        let suppressor = JournalFailureSuppressor::new(journal.clone(), settings());
        let t0 = Instant::now();

        let first = suppressor.record_at("rk", "queue full", drop_entry(&journal), t0);
        assert_eq!(first, SuppressionOutcome::Emitted { suppressed_count: 0 });
        for i in 1..5u64 {
            let outcome = suppressor.record_at("rk", "queue full", drop_entry(&journal), t0 + Duration::from_millis(i * 100));
            assert_eq!(outcome, SuppressionOutcome::Suppressed);
        }
        assert_eq!(sink.len(), 1);

        let later = suppressor.record_at("rk", "queue full", drop_entry(&journal), t0 + Duration::from_millis(2500));
        assert_eq!(later, SuppressionOutcome::Emitted { suppressed_count: 4 });

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].extra.get("suppressedCount").is_none());
        assert_eq!(entries[1].extra.get("suppressedCount"), Some(&serde_json::json!(4)));
        assert_eq!(entries[1].routing_key.as_deref(), Some("rk"));
    }

    #[test]
    fn test_distinct_reasons_are_separate_keys() {
        let sink = Arc::new(InMemoryJournal::new());
        let journal = SwarmJournal::new(sink.clone(), &identity());
        let suppressor = JournalFailureSuppressor::new(journal.clone(), settings());
        let t0 = Instant::now();

        suppressor.record_at("rk", "queue full", drop_entry(&journal), t0);
        suppressor.record_at("rk", "nack", drop_entry(&journal), t0);
        suppressor.record_at("rk2", "queue full", drop_entry(&journal), t0);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn test_key_table_is_cleared_when_full() {
        let sink = Arc::new(InMemoryJournal::new());
        let journal = SwarmJournal::new(sink.clone(), &identity());
        let suppressor = JournalFailureSuppressor::new(journal.clone(), settings());
        let t0 = Instant::now();

        for rk in ["a", "b", "c"] {
            suppressor.record_at(rk, "x", drop_entry(&journal), t0);
        }
        assert_eq!(suppressor.tracked_keys(), 3);

        suppressor.record_at("d", "x", drop_entry(&journal), t0);
        assert_eq!(suppressor.tracked_keys(), 1);

        // "a" was forgotten by the clear, so it is written again immediately.
        let again = suppressor.record_at("a", "x", drop_entry(&journal), t0);
        assert_eq!(again, SuppressionOutcome::Emitted { suppressed_count: 0 });
    }

    struct FailingSink {
        fail: AtomicBool,
        inner: InMemoryJournal,
    }

    impl Journal for FailingSink {
        fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(JournalError::Closed);
            }
            self.inner.append(entry)
        }
    }

    #[test]
    fn test_sink_failure_disables_journaling_for_backoff() {
        let sink = Arc::new(FailingSink {
            fail: AtomicBool::new(true),
            inner: InMemoryJournal::new(),
        });
        let journal = SwarmJournal::new(sink.clone(), &identity());
        let suppressor = JournalFailureSuppressor::new(journal.clone(), settings());
        let t0 = Instant::now();

        assert_eq!(
            suppressor.record_at("rk", "x", drop_entry(&journal), t0),
            SuppressionOutcome::JournalDisabled
        );
        sink.fail.store(false, Ordering::SeqCst);
        assert_eq!(
            suppressor.record_at("other", "y", drop_entry(&journal), t0 + Duration::from_secs(10)),
            SuppressionOutcome::JournalDisabled
        );
        assert!(sink.inner.is_empty());

        let resumed = suppressor.record_at("other", "y", drop_entry(&journal), t0 + Duration::from_secs(31));
        assert_eq!(resumed, SuppressionOutcome::Emitted { suppressed_count: 0 });
        assert_eq!(sink.inner.len(), 1);
    }

    #[test]
    fn test_facade_swallows_sink_errors() {
        let sink = Arc::new(FailingSink {
            fail: AtomicBool::new(true),
            inner: InMemoryJournal::new(),
        });
        let journal = SwarmJournal::new(sink, &identity());
        assert!(!journal.append(drop_entry(&journal)));
    }
}
