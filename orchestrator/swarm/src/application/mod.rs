// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! Use cases of the swarm controller. [`lifecycle::SwarmLifecycleManager`]
//! composes the other modules and is the only entry point a host needs.

pub mod aggregators;
pub mod config_fanout;
pub mod environment;
pub mod journal;
pub mod lifecycle;
pub mod readiness;
pub mod status;
