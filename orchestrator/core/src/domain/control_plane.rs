// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control Plane Contract
//!
//! Routing key scheme, message envelopes and naming conventions shared by the
//! swarm controller and its workers.
//!
//! ## Routing keys
//!
//! | Kind | Shape |
//! |------|-------|
//! | signal | `signal.<type>.<swarmId>.<role>.<instance>` |
//! | event | `event.<category>.<type>.<swarmId>.<role>.<instance>` |
//!
//! Any of swarm/role/instance may be the wildcard [`WILDCARD`] (`ALL`), so a
//! subscriber can bind on any combination.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Control-plane publish port and wire envelopes

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Routing key segment matching every swarm, role or instance.
pub const WILDCARD: &str = "ALL";

/// Whether `value` can stand alone as one routing key or queue name segment:
/// non-empty, not the wildcard in any case, and free of `.`, `*`, `#` and
/// whitespace.
pub fn is_routing_segment(value: &str) -> bool {
    !value.is_empty()
        && !value.eq_ignore_ascii_case(WILDCARD)
        && !value
            .chars()
            .any(|c| matches!(c, '.' | '*' | '#') || c.is_whitespace())
}

/// Role name the controller announces itself with.
pub const CONTROLLER_ROLE: &str = "swarm-controller";

pub mod signals {
    pub const CONFIG_UPDATE: &str = "config-update";
    pub const STATUS_REQUEST: &str = "status-request";
}

pub mod events {
    pub const OUTCOME: &str = "outcome";
    pub const METRIC: &str = "metric";
    pub const ALERT: &str = "alert";

    pub const SWARM_CREATE: &str = "swarm-create";
    pub const SWARM_START: &str = "swarm-start";
    pub const SWARM_STOP: &str = "swarm-stop";
    pub const SWARM_REMOVE: &str = "swarm-remove";
    pub const STATUS_FULL: &str = "status-full";
    pub const STATUS_DELTA: &str = "status-delta";
    pub const ALERT_RAISED: &str = "alert";
}

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("Failed to publish on '{routing_key}': {reason}")]
    PublishFailed { routing_key: String, reason: String },
    #[error("Failed to encode control-plane payload: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Control plane closed")]
    Closed,
}

/// Who a control command is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandTarget {
    Instance,
    Role,
    Swarm,
    All,
}

impl FromStr for CommandTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instance" => Ok(Self::Instance),
            "role" => Ok(Self::Role),
            "swarm" => Ok(Self::Swarm),
            "all" => Ok(Self::All),
            other => Err(format!("unknown command target '{}'", other)),
        }
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Instance => "instance",
            Self::Role => "role",
            Self::Swarm => "swarm",
            Self::All => "all",
        };
        f.write_str(s)
    }
}

/// Addressing triple carried by routing keys and journal entries. `None`
/// renders as the wildcard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ControlScope {
    /// Every swarm, role and instance.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn swarm(swarm_id: impl Into<String>) -> Self {
        Self {
            swarm_id: Some(swarm_id.into()),
            ..Self::default()
        }
    }

    pub fn role(swarm_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            swarm_id: Some(swarm_id.into()),
            role: Some(role.into()),
            instance: None,
        }
    }

    pub fn instance(
        swarm_id: impl Into<String>,
        role: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        Self {
            swarm_id: Some(swarm_id.into()),
            role: Some(role.into()),
            instance: Some(instance.into()),
        }
    }

    fn segments(&self) -> [&str; 3] {
        [
            self.swarm_id.as_deref().unwrap_or(WILDCARD),
            self.role.as_deref().unwrap_or(WILDCARD),
            self.instance.as_deref().unwrap_or(WILDCARD),
        ]
    }
}

/// Hierarchical topic routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey(String);

impl RoutingKey {
    pub fn signal(signal: &str, scope: &ControlScope) -> Self {
        let [swarm, role, instance] = scope.segments();
        Self(format!("signal.{}.{}.{}.{}", signal, swarm, role, instance))
    }

    pub fn event(category: &str, event_type: &str, scope: &ControlScope) -> Self {
        let [swarm, role, instance] = scope.segments();
        Self(format!(
            "event.{}.{}.{}.{}.{}",
            category, event_type, swarm, role, instance
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Topic-style match against a binding pattern: `*` matches exactly one
    /// segment, a trailing `#` matches the rest, and an `ALL` segment in this
    /// key matches whatever the pattern binds at that position.
    pub fn matches(&self, pattern: &str) -> bool {
        let key: Vec<&str> = self.0.split('.').collect();
        let pat: Vec<&str> = pattern.split('.').collect();
        for (idx, p) in pat.iter().enumerate() {
            if *p == "#" {
                return idx == pat.len() - 1;
            }
            match key.get(idx) {
                None => return false,
                Some(k) if *p == "*" || k == p || *k == WILDCARD => {}
                Some(_) => return false,
            }
        }
        key.len() == pat.len()
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Command envelope published on `signal.*` routing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlSignal {
    pub signal: String,
    pub correlation_id: Uuid,
    pub idempotency_key: Uuid,
    pub swarm_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub command_target: CommandTarget,
    pub origin: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ControlSignal {
    pub fn scope(&self) -> ControlScope {
        let swarm_id = match self.command_target {
            CommandTarget::All => None,
            _ => Some(self.swarm_id.clone()),
        };
        ControlScope {
            swarm_id,
            role: self.role.clone(),
            instance: self.instance.clone(),
        }
    }

    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey::signal(&self.signal, &self.scope())
    }
}

/// Outcome, metric and alert envelope published on `event.*` routing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEvent {
    pub kind: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub swarm_id: String,
    pub role: String,
    pub instance: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ControlEvent {
    pub fn scope(&self) -> ControlScope {
        ControlScope::instance(&self.swarm_id, &self.role, &self.instance)
    }

    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey::event(&self.kind, &self.event_type, &self.scope())
    }
}

/// Control-plane publish port.
#[async_trait]
pub trait ControlPlanePublisher: Send + Sync {
    async fn publish_signal(
        &self,
        routing_key: &RoutingKey,
        signal: &ControlSignal,
    ) -> Result<(), ControlPlaneError>;

    async fn publish_event(
        &self,
        routing_key: &RoutingKey,
        event: &ControlEvent,
    ) -> Result<(), ControlPlaneError>;
}

/// Identity of the controller process on the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerIdentity {
    pub swarm_id: String,
    pub role: String,
    pub instance_id: String,
}

impl ControllerIdentity {
    pub fn new(swarm_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            swarm_id: swarm_id.into(),
            role: CONTROLLER_ROLE.to_string(),
            instance_id: instance_id.into(),
        }
    }

    pub fn scope(&self) -> ControlScope {
        ControlScope::instance(&self.swarm_id, &self.role, &self.instance_id)
    }
}

/// Exchange and queue naming for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneNaming {
    pub control_exchange: String,
    pub control_queue_prefix: String,
    pub traffic_exchange_prefix: String,
    pub work_queue_prefix: String,
}

impl Default for ControlPlaneNaming {
    fn default() -> Self {
        Self {
            control_exchange: "aegis.control".to_string(),
            control_queue_prefix: "aegis.control".to_string(),
            traffic_exchange_prefix: "aegis.traffic".to_string(),
            work_queue_prefix: "aegis.work".to_string(),
        }
    }
}

impl ControlPlaneNaming {
    pub fn control_queue(&self, swarm_id: &str, role: &str, instance: &str) -> String {
        format!("{}.{}.{}.{}", self.control_queue_prefix, swarm_id, role, instance)
    }

    pub fn work_exchange(&self, swarm_id: &str) -> String {
        format!("{}.{}", self.traffic_exchange_prefix, swarm_id)
    }

    pub fn work_queue(&self, swarm_id: &str, suffix: &str) -> String {
        format!("{}.{}.{}", self.work_queue_prefix, swarm_id, suffix)
    }
}


