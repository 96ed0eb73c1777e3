// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Dependency Graph Planner
//!
//! Orders a plan's roles so that every role consuming from a work queue comes
//! after all roles producing into it. Kahn's algorithm over role indexes;
//! among roles that are ready at the same time the lowest plan index wins,
//! which keeps the order deterministic and equal to plan order for
//! independent roles.
//!
//! A cycle does not fail planning. The roles left over once no more roles
//! have zero in-degree are appended in plan order and reported in
//! [`StartOrder::cyclic`].

use aegis_core::domain::plan::SwarmPlan;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOrder {
    pub roles: Vec<String>,
    /// Roles appended in plan order because they sit on a dependency cycle
    pub cyclic: Vec<String>,
}

impl StartOrder {
    /// True when the order is a total dependency order (no cycle).
    pub fn is_strict(&self) -> bool {
        self.cyclic.is_empty()
    }

    pub fn position(&self, role: &str) -> Option<usize> {
        self.roles.iter().position(|r| r == role)
    }

    /// Roles in teardown order.
    pub fn reversed(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().rev().map(String::as_str)
    }
}

pub fn compute_start_order(plan: &SwarmPlan) -> StartOrder {
    let bees = &plan.bees;
    let n = bees.len();

    let mut producers: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, bee) in bees.iter().enumerate() {
        if let Some(out) = bee.output_suffix() {
            producers.entry(out).or_default().push(idx);
        }
    }

    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut in_degree = vec![0usize; n];
    for (consumer, bee) in bees.iter().enumerate() {
        let Some(input) = bee.input_suffix() else {
            continue;
        };
        for &producer in producers.get(input).map(Vec::as_slice).unwrap_or_default() {
            // A bee reading its own output queue is not a start dependency.
            if producer != consumer && successors[producer].insert(consumer) {
                in_degree[consumer] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut placed = vec![false; n];
    let mut roles = Vec::with_capacity(n);

    while let Some(idx) = ready.pop_first() {
        placed[idx] = true;
        roles.push(bees[idx].role.clone());
        for &next in &successors[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    let cyclic: Vec<String> = (0..n)
        .filter(|&i| !placed[i])
        .map(|i| bees[i].role.clone())
        .collect();

    if !cyclic.is_empty() {
        warn!(
            roles = ?cyclic,
            "Work queue dependency cycle detected; appending remaining roles in plan order"
        );
        roles.extend(cyclic.iter().cloned());
    }

    StartOrder { roles, cyclic }
}


