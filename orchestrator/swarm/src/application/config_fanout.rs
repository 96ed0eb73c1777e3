// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Config Fanout
//!
//! Publishes `config-update` signals and tracks the bootstrap config each
//! launched instance must acknowledge.
//!
//! Bootstrap retries reuse the idempotency key chosen when the config was
//! registered, so a worker that sees the same pending config twice can drop
//! the duplicate. Each publish attempt still gets its own correlation id.

use crate::application::journal::SwarmJournal;
use crate::domain::fanout::{ConfigUpdateRequest, FanoutError, ResolvedTarget};
use aegis_core::domain::control_plane::{
    signals, CommandTarget, ControlPlanePublisher, ControlSignal, ControllerIdentity,
};
use aegis_core::domain::controller_config::ControllerConfigManifest;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutSettings {
    pub bootstrap_retry_interval: Duration,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            bootstrap_retry_interval: Duration::from_millis(5000),
        }
    }
}

impl From<&ControllerConfigManifest> for FanoutSettings {
    fn from(config: &ControllerConfigManifest) -> Self {
        Self {
            bootstrap_retry_interval: config.spec.fanout.bootstrap_retry_interval,
        }
    }
}

/// Bootstrap config waiting for an instance's acknowledgement. Present only
/// while the ack is outstanding.
#[derive(Debug, Clone)]
pub struct PendingConfig {
    pub role: String,
    pub values: serde_json::Map<String, serde_json::Value>,
    pub awaiting_ack: bool,
    pub last_published_at: Option<Instant>,
    pub idempotency_key: Uuid,
}

pub struct ConfigFanout {
    identity: ControllerIdentity,
    publisher: Arc<dyn ControlPlanePublisher>,
    journal: SwarmJournal,
    settings: FanoutSettings,
    pending: DashMap<String, PendingConfig>,
}

impl ConfigFanout {
    pub fn new(
        identity: ControllerIdentity,
        publisher: Arc<dyn ControlPlanePublisher>,
        journal: SwarmJournal,
        settings: FanoutSettings,
    ) -> Self {
        Self {
            identity,
            publisher,
            journal,
            settings,
            pending: DashMap::new(),
        }
    }

    /// Store bootstrap config for `instance`. Empty config is not tracked.
    pub fn register_bootstrap_config(
        &self,
        instance: &str,
        role: &str,
        values: serde_json::Map<String, serde_json::Value>,
    ) -> bool {
        if values.is_empty() {
            return false;
        }
        debug!(role, instance, keys = values.len(), "Registered bootstrap config");
        self.pending.insert(
            instance.to_string(),
            PendingConfig {
                role: role.to_string(),
                values,
                awaiting_ack: true,
                last_published_at: None,
                idempotency_key: Uuid::new_v4(),
            },
        );
        true
    }

    /// Drop the pending entry for `instance`. Returns whether one existed.
    pub fn acknowledge_bootstrap(&self, instance: &str) -> bool {
        match self.pending.remove(instance) {
            Some((_, pending)) => {
                info!(role = %pending.role, instance, "Bootstrap config acknowledged");
                true
            }
            None => false,
        }
    }

    pub fn is_awaiting_ack(&self, instance: &str) -> bool {
        self.pending.get(instance).is_some_and(|p| p.awaiting_ack)
    }

    pub fn pending(&self, instance: &str) -> Option<PendingConfig> {
        self.pending.get(instance).map(|p| p.clone())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&self) {
        self.pending.clear();
    }

    pub async fn publish_bootstrap_config_if_necessary(
        &self,
        instance: &str,
        force: bool,
    ) -> Result<bool, FanoutError> {
        self.publish_bootstrap_config_if_necessary_at(instance, force, Instant::now())
            .await
    }

    /// Publish the pending config for `instance` when forced, never
    /// published, or the retry interval has passed since the last attempt.
    /// Returns whether a publish happened.
    pub async fn publish_bootstrap_config_if_necessary_at(
        &self,
        instance: &str,
        force: bool,
        now: Instant,
    ) -> Result<bool, FanoutError> {
        // Claim the slot under the entry lock, publish outside it.
        let claimed = {
            let Some(mut pending) = self.pending.get_mut(instance) else {
                return Ok(false);
            };
            let due = pending.last_published_at.is_none_or(|last| {
                now.saturating_duration_since(last) >= self.settings.bootstrap_retry_interval
            });
            if !pending.awaiting_ack || !(force || due) {
                return Ok(false);
            }
            let previous = pending.last_published_at.replace(now);
            (pending.clone(), previous)
        };
        let (pending, previous) = claimed;

        let target = ResolvedTarget {
            target: CommandTarget::Instance,
            role: Some(pending.role.clone()),
            instance: Some(instance.to_string()),
        };
        let result = self
            .publish(&target, serde_json::Value::Object(pending.values), pending.idempotency_key, "bootstrap")
            .await;

        if let Err(e) = result {
            warn!(role = %pending.role, instance, error = %e, "Bootstrap config publish failed; will retry");
            if let Some(mut entry) = self.pending.get_mut(instance) {
                if entry.last_published_at == Some(now) {
                    entry.last_published_at = previous;
                }
            }
            return Err(e);
        }
        Ok(true)
    }

    /// Drop the pending entry after `instance` rejected its config and
    /// return the failure message for the swarm. `None` when nothing was
    /// pending for that instance.
    pub fn handle_config_update_error(&self, instance: &str, error: &str) -> Option<String> {
        let (_, pending) = self.pending.remove(instance)?;
        let message = format!(
            "Config update for instance '{}' (role '{}') failed: {}",
            instance, pending.role, error
        );
        warn!(role = %pending.role, instance, error, "Bootstrap config rejected");
        Some(message)
    }

    /// General-purpose config-update entry point. Resolves the audience,
    /// publishes with fresh correlation id and idempotency key, and returns
    /// the signal that went out.
    pub async fn publish_config_update(
        &self,
        request: &ConfigUpdateRequest,
        context: &str,
    ) -> Result<ControlSignal, FanoutError> {
        let target = request.resolve(&self.identity)?;
        self.publish(
            &target,
            serde_json::Value::Object(request.data.clone()),
            Uuid::new_v4(),
            context,
        )
        .await
    }

    async fn publish(
        &self,
        target: &ResolvedTarget,
        args: serde_json::Value,
        idempotency_key: Uuid,
        context: &str,
    ) -> Result<ControlSignal, FanoutError> {
        let signal = ControlSignal {
            signal: signals::CONFIG_UPDATE.to_string(),
            correlation_id: Uuid::new_v4(),
            idempotency_key,
            swarm_id: self.identity.swarm_id.clone(),
            role: target.role.clone(),
            instance: target.instance.clone(),
            command_target: target.target,
            origin: self.identity.instance_id.clone(),
            args,
        };
        let routing_key = signal.routing_key();

        self.publisher.publish_signal(&routing_key, &signal).await?;
        metrics::counter!("aegis_swarm_config_publish_total").increment(1);
        info!(
            routing_key = %routing_key,
            target = %signal.command_target,
            context,
            "Published config update"
        );
        self.journal.signal_out(&routing_key, &signal);
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::infrastructure::event_bus::{ControlMessage, ControlPlaneBus};
    use aegis_core::infrastructure::journal::InMemoryJournal;
    use serde_json::json;

    fn fanout() -> (ConfigFanout, ControlPlaneBus, Arc<InMemoryJournal>) {
        let identity = ControllerIdentity::new("sw1", "ctrl-1");
        let bus = ControlPlaneBus::new(64);
        let sink = Arc::new(InMemoryJournal::new());
        let journal = SwarmJournal::new(sink.clone(), &identity);
        let fanout = ConfigFanout::new(identity, Arc::new(bus.clone()), journal, FanoutSettings::default());
        (fanout, bus, sink)
    }

    fn values() -> serde_json::Map<String, serde_json::Value> {
        json!({"ratePerSec": 10}).as_object().cloned().unwrap()
    }

    fn drain(receiver: &mut aegis_core::infrastructure::event_bus::ControlReceiver) -> Vec<ControlSignal> {
        let mut signals = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            if let ControlMessage::Signal { signal, .. } = message {
                signals.push(signal);
            }
        }
        signals
    }

    #[test]
    fn test_empty_config_is_not_tracked() {
        let (fanout, _, _) = fanout();
        assert!(!fanout.register_bootstrap_config("g-1", "gen", serde_json::Map::new()));
        assert_eq!(fanout.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_retry_window() {
        let (fanout, bus, _) = fanout();
        let mut rx = bus.subscribe();
        fanout.register_bootstrap_config("g-1", "gen", values());
        let t0 = Instant::now();

        assert!(fanout.publish_bootstrap_config_if_necessary_at("g-1", false, t0).await.unwrap());
        assert!(!fanout
            .publish_bootstrap_config_if_necessary_at("g-1", false, t0 + Duration::from_millis(4999))
            .await
            .unwrap());
        assert!(fanout
            .publish_bootstrap_config_if_necessary_at("g-1", true, t0 + Duration::from_millis(100))
            .await
            .unwrap());
        assert!(fanout
            .publish_bootstrap_config_if_necessary_at("g-1", false, t0 + Duration::from_millis(5100))
            .await
            .unwrap());

        let signals = drain(&mut rx);
        assert_eq!(signals.len(), 3);
        assert!(signals.iter().all(|s| s.idempotency_key == signals[0].idempotency_key));
        assert_ne!(signals[0].correlation_id, signals[1].correlation_id);
        assert_eq!(signals[0].routing_key().as_str(), "signal.config-update.sw1.gen.g-1");
        assert_eq!(signals[0].args, json!({"ratePerSec": 10}));
    }

    #[tokio::test]
    async fn test_no_publish_after_ack() {
        let (fanout, bus, _) = fanout();
        let mut rx = bus.subscribe();
        fanout.register_bootstrap_config("g-1", "gen", values());
        assert!(fanout.acknowledge_bootstrap("g-1"));

        assert!(!fanout.publish_bootstrap_config_if_necessary("g-1", true).await.unwrap());
        assert!(drain(&mut rx).is_empty());
        assert!(!fanout.acknowledge_bootstrap("g-1"));
    }

    #[test]
    fn test_config_update_error_removes_pending() {
        let (fanout, _, _) = fanout();
        fanout.register_bootstrap_config("g-1", "gen", values());

        let message = fanout.handle_config_update_error("g-1", "unknown key ratePerSec").unwrap();
        assert!(message.contains("g-1"));
        assert!(message.contains("unknown key ratePerSec"));
        assert!(!fanout.is_awaiting_ack("g-1"));
        assert!(fanout.handle_config_update_error("g-1", "again").is_none());
    }

    #[tokio::test]
    async fn test_publish_config_update_resolves_target_and_journals() {
        let (fanout, bus, sink) = fanout();
        let mut rx = bus.bind("signal.config-update.sw1.processor.*");

        let first = fanout
            .publish_config_update(&ConfigUpdateRequest::for_role("processor", values()), "api")
            .await
            .unwrap();
        let second = fanout
            .publish_config_update(&ConfigUpdateRequest::for_role("processor", values()), "api")
            .await
            .unwrap();

        assert_eq!(first.command_target, CommandTarget::Role);
        assert_eq!(first.instance, None);
        assert_ne!(first.idempotency_key, second.idempotency_key);
        assert_eq!(drain(&mut rx).len(), 2);

        let entries = sink.find_by_type("config-update");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].routing_key.as_deref(), Some("signal.config-update.sw1.processor.ALL"));
    }

    #[tokio::test]
    async fn test_role_target_without_role_is_rejected() {
        let (fanout, _, _) = fanout();
        let request = ConfigUpdateRequest::from_value(json!({"commandTarget": "role"})).unwrap();
        assert!(matches!(
            fanout.publish_config_update(&request, "api").await,
            Err(FanoutError::MissingRole)
        ));
    }
}
