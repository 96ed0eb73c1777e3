// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Config-update targeting
//!
//! A config-update request can name its audience in several ways. They are
//! consulted in this order:
//!
//! 1. an explicit `commandTarget`
//! 2. a `scope` hint (`{role, instance}`)
//! 3. a legacy `target` string, `"role.instance"` or `"role:instance"`
//! 4. nothing, which means the whole swarm
//!
//! An `INSTANCE` target missing its role or instance falls back to the
//! controller's own identity. A `ROLE` target without a role is rejected.

use aegis_core::domain::control_plane::{CommandTarget, ControlPlaneError, ControllerIdentity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("Config update for a ROLE target requires a role")]
    MissingRole,

    #[error("Unknown command target '{0}'")]
    UnknownTarget(String),

    #[error("Malformed config update: {0}")]
    Malformed(String),

    #[error("Failed to publish config update: {0}")]
    Publish(#[from] ControlPlaneError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// A config update as submitted to the fanout, before target resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeHint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Configuration values delivered as the signal's `args`
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl ConfigUpdateRequest {
    pub fn from_value(value: serde_json::Value) -> Result<Self, FanoutError> {
        serde_json::from_value(value).map_err(|e| FanoutError::Malformed(e.to_string()))
    }

    pub fn for_instance(
        role: impl Into<String>,
        instance: impl Into<String>,
        data: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            command_target: Some(CommandTarget::Instance.to_string()),
            role: Some(role.into()),
            instance: Some(instance.into()),
            data,
            ..Default::default()
        }
    }

    pub fn for_role(role: impl Into<String>, data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            command_target: Some(CommandTarget::Role.to_string()),
            role: Some(role.into()),
            data,
            ..Default::default()
        }
    }

    pub fn for_swarm(data: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            command_target: Some(CommandTarget::Swarm.to_string()),
            data,
            ..Default::default()
        }
    }

    /// Resolve the audience of this request.
    pub fn resolve(&self, controller: &ControllerIdentity) -> Result<ResolvedTarget, FanoutError> {
        let legacy = self.target.as_deref().map(parse_legacy_target);
        let hint = self.scope.clone().unwrap_or_default();

        let role = non_blank(&self.role)
            .or_else(|| non_blank(&hint.role))
            .or_else(|| legacy.as_ref().and_then(|l| l.role.clone()));
        let instance = non_blank(&self.instance)
            .or_else(|| non_blank(&hint.instance))
            .or_else(|| legacy.as_ref().and_then(|l| l.instance.clone()));

        let target = if let Some(explicit) = non_blank(&self.command_target) {
            explicit
                .parse::<CommandTarget>()
                .map_err(|_| FanoutError::UnknownTarget(explicit.clone()))?
        } else if let Some(scope) = &self.scope {
            if non_blank(&scope.instance).is_some() {
                CommandTarget::Instance
            } else if non_blank(&scope.role).is_some() {
                CommandTarget::Role
            } else {
                CommandTarget::Swarm
            }
        } else if let Some(legacy) = &legacy {
            legacy.target
        } else {
            CommandTarget::Swarm
        };

        match target {
            CommandTarget::Instance => match (role, instance) {
                (Some(role), Some(instance)) => Ok(ResolvedTarget {
                    target,
                    role: Some(role),
                    instance: Some(instance),
                }),
                _ => Ok(ResolvedTarget {
                    target,
                    role: Some(controller.role.clone()),
                    instance: Some(controller.instance_id.clone()),
                }),
            },
            CommandTarget::Role => {
                let role = role.ok_or(FanoutError::MissingRole)?;
                Ok(ResolvedTarget {
                    target,
                    role: Some(role),
                    instance: None,
                })
            }
            CommandTarget::Swarm | CommandTarget::All => Ok(ResolvedTarget {
                target,
                role: None,
                instance: None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub target: CommandTarget,
    pub role: Option<String>,
    pub instance: Option<String>,
}

struct LegacyTarget {
    target: CommandTarget,
    role: Option<String>,
    instance: Option<String>,
}

fn parse_legacy_target(raw: &str) -> LegacyTarget {
    let raw = raw.trim();
    if let Ok(target) = raw.parse::<CommandTarget>() {
        return LegacyTarget {
            target,
            role: None,
            instance: None,
        };
    }

    match raw.split_once(['.', ':']) {
        Some((role, instance)) if !role.is_empty() && !instance.is_empty() => LegacyTarget {
            target: CommandTarget::Instance,
            role: Some(role.to_string()),
            instance: Some(instance.to_string()),
        },
        _ if raw.is_empty() => LegacyTarget {
            target: CommandTarget::Swarm,
            role: None,
            instance: None,
        },
        _ => LegacyTarget {
            target: CommandTarget::Role,
            role: Some(raw.trim_matches(['.', ':']).to_string()),
            instance: None,
        },
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}


