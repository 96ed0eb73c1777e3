// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Plan
//!
//! Declarative description of a swarm: an ordered list of [`Bee`]s (one per
//! worker role), a traffic policy, and an optional system-under-test
//! environment. Plans arrive as JSON on the control plane and are immutable
//! once parsed.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Parse and validate swarm plans

use crate::domain::control_plane::WILDCARD;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

/// Errors raised while parsing or validating a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Plan is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Plan bee at position {0} has an empty role")]
    EmptyRole(usize),

    #[error("Role '{0}' may only contain letters, digits, '-' and '_'")]
    InvalidRole(String),

    #[error("Role '{0}' is reserved for routing wildcards")]
    ReservedRole(String),

    #[error("Plan declares role '{0}' more than once")]
    DuplicateRole(String),

    #[error("Bee '{role}' declares an invalid queue suffix '{suffix}'")]
    InvalidQueueSuffix { role: String, suffix: String },
}

/// Queue wiring for a bee: the suffix it consumes from and the suffix it
/// produces into. Suffixes are expanded into full queue names by the
/// controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(rename = "out", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Work {
    /// Input suffix, ignoring blank values.
    pub fn input_suffix(&self) -> Option<&str> {
        self.input.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Output suffix, ignoring blank values.
    pub fn output_suffix(&self) -> Option<&str> {
        self.output.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// One worker role in the swarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bee {
    pub role: String,
    /// Container image. A bee without an image takes part in the dependency
    /// graph but is never launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work: Option<Work>,
    /// Environment overrides, layered over the controller-provided env.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Initial configuration pushed to every instance of this role once it
    /// announces itself.
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl Bee {
    pub fn is_runnable(&self) -> bool {
        self.image.as_deref().is_some_and(|i| !i.trim().is_empty())
    }

    pub fn input_suffix(&self) -> Option<&str> {
        self.work.as_ref().and_then(Work::input_suffix)
    }

    pub fn output_suffix(&self) -> Option<&str> {
        self.work.as_ref().and_then(Work::output_suffix)
    }
}

/// Free-form traffic shaping policy forwarded to workers untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficPolicy(pub serde_json::Value);

/// Descriptor of the system under test the swarm is pointed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SutEnvironment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, serde_json::Value>,
}

/// Parsed, validated swarm plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmPlan {
    /// Identifier of the template the plan was rendered from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub bees: Vec<Bee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_policy: Option<TrafficPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sut_environment: Option<SutEnvironment>,
}

impl SwarmPlan {
    /// Parse and validate a plan from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let plan: SwarmPlan = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Check role uniqueness and queue suffix shape.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut seen = HashSet::new();
        for (idx, bee) in self.bees.iter().enumerate() {
            if bee.role.trim().is_empty() {
                return Err(PlanError::EmptyRole(idx));
            }
            if !bee
                .role
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
            {
                return Err(PlanError::InvalidRole(bee.role.clone()));
            }
            if bee.role.eq_ignore_ascii_case(WILDCARD) {
                return Err(PlanError::ReservedRole(bee.role.clone()));
            }
            if !seen.insert(bee.role.as_str()) {
                return Err(PlanError::DuplicateRole(bee.role.clone()));
            }
            for suffix in bee.input_suffix().into_iter().chain(bee.output_suffix()) {
                if !is_valid_suffix(suffix) {
                    return Err(PlanError::InvalidQueueSuffix {
                        role: bee.role.clone(),
                        suffix: suffix.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.bees.iter().map(|b| b.role.as_str())
    }

    pub fn bee(&self, role: &str) -> Option<&Bee> {
        self.bees.iter().find(|b| b.role == role)
    }

    /// Bees that will get a container, in plan order.
    pub fn runnable_bees(&self) -> impl Iterator<Item = &Bee> {
        self.bees.iter().filter(|b| b.is_runnable())
    }

    /// Union of every declared input/output queue suffix.
    pub fn queue_suffixes(&self) -> BTreeSet<String> {
        self.bees
            .iter()
            .flat_map(|b| b.input_suffix().into_iter().chain(b.output_suffix()))
            .map(str::to_string)
            .collect()
    }
}

fn is_valid_suffix(suffix: &str) -> bool {
    suffix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !suffix.starts_with('.')
        && !suffix.ends_with('.')
}


