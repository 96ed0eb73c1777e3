// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Aggregates
//!
//! - [`SwarmStatus`]: lifecycle state machine of one swarm incarnation.
//! - [`RuntimeContext`]: immutable projection of an accepted plan.
//! - [`RuntimeState`]: containers and instances launched for each role.
//! - [`SwarmError`]: everything a lifecycle operation can fail with.

use crate::domain::fanout::FanoutError;
use crate::domain::planner::StartOrder;
use aegis_core::domain::control_plane::ControlPlaneError;
use aegis_core::domain::plan::{PlanError, SutEnvironment, SwarmPlan};
use aegis_core::domain::runtime::{ContainerId, RuntimeError};
use aegis_core::domain::topology::TopologyError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwarmStatus {
    New,
    Creating,
    Ready,
    Starting,
    Running,
    Stopping,
    Stopped,
    Removing,
    Removed,
    Failed,
}

impl SwarmStatus {
    /// Whether the lifecycle may move from `self` to `next`.
    ///
    /// `Removed` only accepts `Creating` (a fresh incarnation). Every other
    /// state may fail, and every live state may be removed.
    pub fn can_transition_to(self, next: SwarmStatus) -> bool {
        use SwarmStatus::*;

        match (self, next) {
            (Removed, Creating) => true,
            (Removed, _) => false,
            (_, Failed) => true,
            (Removing, Removed) => true,
            (Removing, _) => false,
            (_, Removing) => true,
            (New, Creating) => true,
            (Creating, Ready) => true,
            (Ready, Starting) | (Ready, Stopping) => true,
            (Starting, Running) => true,
            (Running, Stopping) => true,
            (Stopping, Stopped) => true,
            (Stopped, Starting) | (Stopped, Stopping) => true,
            (Failed, Creating) | (Failed, Stopping) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == SwarmStatus::Removed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Creating => "CREATING",
            Self::Ready => "READY",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Removing => "REMOVING",
            Self::Removed => "REMOVED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SwarmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable projection of a plan, created once per successful `prepare`.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub plan: SwarmPlan,
    pub start_order: StartOrder,
    pub queue_suffixes: BTreeSet<String>,
    pub sut_environment: Option<SutEnvironment>,
}

impl RuntimeContext {
    pub fn new(plan: SwarmPlan, start_order: StartOrder) -> Self {
        let queue_suffixes = plan.queue_suffixes();
        let sut_environment = plan.sut_environment.clone();
        Self {
            plan,
            start_order,
            queue_suffixes,
            sut_environment,
        }
    }
}

/// Workers launched for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleWorkers {
    pub role: String,
    pub containers: Vec<ContainerId>,
    pub instances: Vec<String>,
}

/// Per-swarm runtime bookkeeping, kept in the order roles were first seen.
#[derive(Debug, Clone, Default)]
pub struct RuntimeState {
    roles: Vec<RoleWorkers>,
}

impl RuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, role: &str, container: ContainerId, instance: impl Into<String>) {
        let idx = match self.roles.iter().position(|r| r.role == role) {
            Some(idx) => idx,
            None => {
                self.roles.push(RoleWorkers {
                    role: role.to_string(),
                    containers: Vec::new(),
                    instances: Vec::new(),
                });
                self.roles.len() - 1
            }
        };
        self.roles[idx].containers.push(container);
        self.roles[idx].instances.push(instance.into());
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleWorkers> {
        self.roles.iter()
    }

    pub fn role(&self, role: &str) -> Option<&RoleWorkers> {
        self.roles.iter().find(|r| r.role == role)
    }

    pub fn containers_by_role(&self) -> Vec<(&str, &[ContainerId])> {
        self.roles
            .iter()
            .map(|r| (r.role.as_str(), r.containers.as_slice()))
            .collect()
    }

    pub fn instances_by_role(&self) -> Vec<(&str, &[String])> {
        self.roles
            .iter()
            .map(|r| (r.role.as_str(), r.instances.as_slice()))
            .collect()
    }

    /// Every (role, instance) pair in insertion order.
    pub fn instances(&self) -> impl Iterator<Item = (&str, &str)> {
        self.roles
            .iter()
            .flat_map(|r| r.instances.iter().map(move |i| (r.role.as_str(), i.as_str())))
    }

    pub fn container_count(&self) -> usize {
        self.roles.iter().map(|r| r.containers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.container_count() == 0
    }

    pub fn clear(&mut self) {
        self.roles.clear();
    }
}

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Invalid plan: {0}")]
    Plan(#[from] PlanError),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: SwarmStatus, to: SwarmStatus },

    #[error("Swarm '{0}' already has provisioned containers; remove it first")]
    AlreadyProvisioned(String),

    #[error("Swarm '{0}' has not been prepared")]
    NotPrepared(String),

    #[error("Another lifecycle operation is in flight for swarm '{0}'")]
    OperationInFlight(String),

    #[error("Workload runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Queue topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error(transparent)]
    Fanout(#[from] FanoutError),

    /// Inbound payload violated the control-plane contract; reject, never retry.
    #[error("Contract violation: {0}")]
    Contract(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use SwarmStatus::*;
        let path = [New, Creating, Ready, Starting, Running, Stopping, Stopped, Removing, Removed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_removed_is_terminal() {
        use SwarmStatus::*;
        assert!(Removed.is_terminal());
        assert!(Removed.can_transition_to(Creating));
        for next in [Ready, Starting, Running, Stopping, Stopped, Removing, Failed] {
            assert!(!Removed.can_transition_to(next), "REMOVED -> {}", next);
        }
    }

    #[test]
    fn test_any_live_state_can_fail_or_be_removed() {
        use SwarmStatus::*;
        for from in [New, Creating, Ready, Starting, Running, Stopping, Stopped, Failed] {
            assert!(from.can_transition_to(Failed));
            assert!(from.can_transition_to(Removing));
        }
    }

    #[test]
    fn test_rejected_transitions() {
        use SwarmStatus::*;
        assert!(!New.can_transition_to(Running));
        assert!(!Running.can_transition_to(Creating));
        assert!(!Stopping.can_transition_to(Running));
        assert!(!Removing.can_transition_to(Running));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&SwarmStatus::Running).unwrap(), "\"RUNNING\"");
        assert_eq!(SwarmStatus::Removed.to_string(), "REMOVED");
    }

    #[test]
    fn test_runtime_state_keeps_insertion_order() {
        let mut state = RuntimeState::new();
        state.record("proc", ContainerId::new("c2"), "sw1-proc-1");
        state.record("gen", ContainerId::new("c1"), "sw1-gen-1");
        state.record("proc", ContainerId::new("c3"), "sw1-proc-2");

        let roles: Vec<_> = state.containers_by_role().into_iter().map(|(r, c)| (r, c.len())).collect();
        assert_eq!(roles, vec![("proc", 2), ("gen", 1)]);
        assert_eq!(state.container_count(), 3);

        let instances: Vec<_> = state.instances().collect();
        assert_eq!(instances[1], ("proc", "sw1-proc-2"));

        state.clear();
        assert!(state.is_empty());
    }
}
