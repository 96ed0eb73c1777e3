// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for one swarm. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `SwarmStatus`, `RuntimeContext`, `RuntimeState`, `SwarmError` |
//! | [`planner`] | `StartOrder`, `compute_start_order` |
//! | [`fanout`] | `ConfigUpdateRequest`, `ResolvedTarget` |

pub mod fanout;
pub mod planner;
pub mod swarm;

pub use fanout::{ConfigUpdateRequest, FanoutError, ResolvedTarget, ScopeHint};
pub use planner::{compute_start_order, StartOrder};
pub use swarm::*;
