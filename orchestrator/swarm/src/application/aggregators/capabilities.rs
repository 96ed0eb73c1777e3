// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capabilities Registry
//!
//! Keeps the latest capability manifest of every instance and presents them
//! as `role -> version -> {manifest, instances}`. Instances reporting the
//! same version of a role are merged under one entry.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Self-description a worker publishes: a version plus arbitrary fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityManifest {
    pub version: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityGroup {
    pub manifest: CapabilityManifest,
    pub instances: Vec<String>,
}

pub type CapabilityView = BTreeMap<String, BTreeMap<String, CapabilityGroup>>;

#[derive(Default)]
pub struct CapabilitiesRegistry {
    manifests: DashMap<(String, String), CapabilityManifest>,
}

impl CapabilitiesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, role: &str, instance: &str, manifest: CapabilityManifest) {
        self.manifests
            .insert((role.to_string(), instance.to_string()), manifest);
    }

    /// Grouped read view. Within a group, instances are sorted and the
    /// manifest is the one reported by the first of them.
    pub fn view(&self) -> CapabilityView {
        let mut entries: Vec<((String, String), CapabilityManifest)> = self
            .manifests
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut view = CapabilityView::new();
        for ((role, instance), manifest) in entries {
            let versions = view.entry(role).or_default();
            versions
                .entry(manifest.version.clone())
                .or_insert_with(|| CapabilityGroup {
                    manifest,
                    instances: Vec::new(),
                })
                .instances
                .push(instance);
        }
        view
    }

    pub fn clear(&self) {
        self.manifests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(version: &str) -> CapabilityManifest {
        serde_json::from_value(json!({"version": version, "protocols": ["http"]})).unwrap()
    }

    #[test]
    fn test_same_version_is_merged() {
        let registry = CapabilitiesRegistry::new();
        registry.record("proc", "p-2", manifest("1.2.0"));
        registry.record("proc", "p-1", manifest("1.2.0"));
        registry.record("proc", "p-3", manifest("1.3.0"));
        registry.record("gen", "g-1", manifest("0.9.0"));

        let view = registry.view();
        assert_eq!(view.len(), 2);
        assert_eq!(view["proc"].len(), 2);
        assert_eq!(view["proc"]["1.2.0"].instances, vec!["p-1", "p-2"]);
        assert_eq!(view["proc"]["1.3.0"].instances, vec!["p-3"]);
        assert_eq!(view["gen"]["0.9.0"].manifest.fields["protocols"], json!(["http"]));
    }

    #[test]
    fn test_instance_upgrade_moves_between_versions() {
        let registry = CapabilitiesRegistry::new();
        registry.record("proc", "p-1", manifest("1.2.0"));
        registry.record("proc", "p-1", manifest("1.3.0"));

        let view = registry.view();
        assert_eq!(view["proc"].len(), 1);
        assert!(view["proc"].contains_key("1.3.0"));
    }

    #[test]
    fn test_manifest_round_trips_extra_fields() {
        let m = manifest("1.0.0");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json, json!({"version": "1.0.0", "protocols": ["http"]}));
    }
}
