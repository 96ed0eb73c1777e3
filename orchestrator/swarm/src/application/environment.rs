// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Worker environment composition
//!
//! Builds the environment handed to each launched container: control-plane
//! identity and queue bindings first, export settings next, the bee's own
//! `env` overrides last.

use aegis_core::domain::control_plane::ControlPlaneNaming;
use aegis_core::domain::controller_config::ControllerConfigManifest;
use aegis_core::domain::plan::{Bee, SutEnvironment};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

pub const ENV_SWARM_ID: &str = "AEGIS_SWARM_ID";
pub const ENV_BEE_ROLE: &str = "AEGIS_BEE_ROLE";
pub const ENV_INSTANCE_ID: &str = "AEGIS_INSTANCE_ID";
pub const ENV_CONTROL_EXCHANGE: &str = "AEGIS_CONTROL_EXCHANGE";
pub const ENV_CONTROL_QUEUE: &str = "AEGIS_CONTROL_QUEUE";
pub const ENV_TRAFFIC_EXCHANGE: &str = "AEGIS_TRAFFIC_EXCHANGE";
pub const ENV_INPUT_QUEUE: &str = "AEGIS_INPUT_QUEUE";
pub const ENV_OUTPUT_QUEUE: &str = "AEGIS_OUTPUT_QUEUE";
pub const ENV_METRICS_PUSH_URL: &str = "AEGIS_METRICS_PUSH_URL";
pub const ENV_METRICS_PUSH_INTERVAL: &str = "AEGIS_METRICS_PUSH_INTERVAL_SECS";
pub const ENV_LOG_EXPORT_ENABLED: &str = "AEGIS_LOG_EXPORT_ENABLED";
pub const ENV_LOG_EXPORT_ENDPOINT: &str = "AEGIS_LOG_EXPORT_ENDPOINT";
pub const ENV_SUT_ID: &str = "AEGIS_SUT_ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnvSettings {
    pub naming: ControlPlaneNaming,
    pub metrics_push_url: Option<String>,
    pub metrics_push_interval: Duration,
    pub log_export_enabled: bool,
    pub log_export_endpoint: Option<String>,
}

impl Default for WorkerEnvSettings {
    fn default() -> Self {
        Self {
            naming: ControlPlaneNaming::default(),
            metrics_push_url: None,
            metrics_push_interval: Duration::from_secs(10),
            log_export_enabled: false,
            log_export_endpoint: None,
        }
    }
}

impl From<&ControllerConfigManifest> for WorkerEnvSettings {
    fn from(config: &ControllerConfigManifest) -> Self {
        Self {
            naming: config.naming(),
            metrics_push_url: config.spec.metrics.push_endpoint.clone(),
            metrics_push_interval: config.spec.metrics.push_interval,
            log_export_enabled: config.spec.logging.export_enabled,
            log_export_endpoint: config.spec.logging.export_endpoint.clone(),
        }
    }
}

/// `<swarmId>-<role>-<8 hex chars>`
pub fn instance_name(swarm_id: &str, role: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", swarm_id, role, &suffix[..8])
}

impl WorkerEnvSettings {
    pub fn compose(
        &self,
        swarm_id: &str,
        bee: &Bee,
        instance_id: &str,
        sut: Option<&SutEnvironment>,
    ) -> BTreeMap<String, String> {
        let naming = &self.naming;
        let mut env = BTreeMap::new();
        let mut set = |key: &str, value: String| {
            env.insert(key.to_string(), value);
        };

        set(ENV_SWARM_ID, swarm_id.to_string());
        set(ENV_BEE_ROLE, bee.role.clone());
        set(ENV_INSTANCE_ID, instance_id.to_string());
        set(ENV_CONTROL_EXCHANGE, naming.control_exchange.clone());
        set(ENV_CONTROL_QUEUE, naming.control_queue(swarm_id, &bee.role, instance_id));
        set(ENV_TRAFFIC_EXCHANGE, naming.work_exchange(swarm_id));
        if let Some(input) = bee.input_suffix() {
            set(ENV_INPUT_QUEUE, naming.work_queue(swarm_id, input));
        }
        if let Some(output) = bee.output_suffix() {
            set(ENV_OUTPUT_QUEUE, naming.work_queue(swarm_id, output));
        }

        if let Some(url) = &self.metrics_push_url {
            set(ENV_METRICS_PUSH_URL, url.clone());
        }
        set(ENV_METRICS_PUSH_INTERVAL, self.metrics_push_interval.as_secs().to_string());
        set(ENV_LOG_EXPORT_ENABLED, self.log_export_enabled.to_string());
        if let Some(endpoint) = &self.log_export_endpoint {
            set(ENV_LOG_EXPORT_ENDPOINT, endpoint.clone());
        }
        if let Some(sut) = sut {
            set(ENV_SUT_ID, sut.id.clone());
        }

        env.extend(bee.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bee(json: serde_json::Value) -> Bee {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_instance_name_shape() {
        let name = instance_name("sw1", "gen");
        assert!(name.starts_with("sw1-gen-"));
        let suffix = name.trim_start_matches("sw1-gen-");
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, instance_name("sw1", "gen"));
    }

    #[test]
    fn test_compose_core_variables() {
        let settings = WorkerEnvSettings::default();
        let bee = bee(serde_json::json!({
            "role": "proc", "image": "p", "work": {"in": "gen", "out": "final"}
        }));
        let env = settings.compose("sw1", &bee, "sw1-proc-0a1b2c3d", None);

        assert_eq!(env[ENV_SWARM_ID], "sw1");
        assert_eq!(env[ENV_BEE_ROLE], "proc");
        assert_eq!(env[ENV_CONTROL_QUEUE], "aegis.control.sw1.proc.sw1-proc-0a1b2c3d");
        assert_eq!(env[ENV_TRAFFIC_EXCHANGE], "aegis.traffic.sw1");
        assert_eq!(env[ENV_INPUT_QUEUE], "aegis.work.sw1.gen");
        assert_eq!(env[ENV_OUTPUT_QUEUE], "aegis.work.sw1.final");
        assert_eq!(env[ENV_METRICS_PUSH_INTERVAL], "10");
        assert_eq!(env[ENV_LOG_EXPORT_ENABLED], "false");
        assert!(!env.contains_key(ENV_METRICS_PUSH_URL));
        assert!(!env.contains_key(ENV_SUT_ID));
    }

    #[test]
    fn test_user_overrides_are_layered_last() {
        let settings = WorkerEnvSettings {
            metrics_push_url: Some("http://pushgateway:9091".to_string()),
            log_export_enabled: true,
            log_export_endpoint: Some("http://loki:3100".to_string()),
            ..Default::default()
        };
        let bee = bee(serde_json::json!({
            "role": "gen", "image": "g",
            "env": {"AEGIS_METRICS_PUSH_INTERVAL_SECS": "1", "RATE": "50"}
        }));
        let sut = SutEnvironment {
            id: "sut-a".to_string(),
            name: None,
            endpoints: Default::default(),
        };
        let env = settings.compose("sw1", &bee, "sw1-gen-1", Some(&sut));

        assert_eq!(env[ENV_METRICS_PUSH_INTERVAL], "1");
        assert_eq!(env["RATE"], "50");
        assert_eq!(env[ENV_METRICS_PUSH_URL], "http://pushgateway:9091");
        assert_eq!(env[ENV_LOG_EXPORT_ENDPOINT], "http://loki:3100");
        assert_eq!(env[ENV_SUT_ID], "sut-a");
        assert!(!env.contains_key(ENV_INPUT_QUEUE));
    }
}
