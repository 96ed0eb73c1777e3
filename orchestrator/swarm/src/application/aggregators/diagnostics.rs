// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use dashmap::DashMap;
use std::collections::BTreeMap;

/// Latest diagnostics object per role. Last write wins, whichever instance
/// of the role sent it.
#[derive(Default)]
pub struct DiagnosticsAggregator {
    by_role: DashMap<String, serde_json::Value>,
}

impl DiagnosticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, role: &str, diagnostics: serde_json::Value) {
        if diagnostics.is_null() {
            return;
        }
        self.by_role.insert(role.to_string(), diagnostics);
    }

    pub fn get(&self, role: &str) -> Option<serde_json::Value> {
        self.by_role.get(role).map(|d| d.clone())
    }

    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        self.by_role
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.by_role.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_last_write_wins_per_role() {
        let agg = DiagnosticsAggregator::new();
        agg.record("proc", json!({"errors": 1, "from": "p-1"}));
        agg.record("proc", json!({"errors": 0, "from": "p-2"}));
        agg.record("gen", json!({"lag": 3}));

        let snapshot = agg.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["proc"]["from"], "p-2");
        assert_eq!(agg.get("gen"), Some(json!({"lag": 3})));
    }

    #[test]
    fn test_null_is_ignored() {
        let agg = DiagnosticsAggregator::new();
        agg.record("gen", json!({"lag": 3}));
        agg.record("gen", serde_json::Value::Null);
        assert_eq!(agg.get("gen"), Some(json!({"lag": 3})));
    }
}
