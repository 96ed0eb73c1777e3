// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types and ports shared by the swarm controller. No I/O.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`plan`] | `SwarmPlan`, `Bee`, `Work` |
//! | [`runtime`] | `WorkloadRuntime` port, `WorkerSpec`, `ContainerId` |
//! | [`topology`] | `QueueTopology`, `QueueStatsProvider` ports |
//! | [`control_plane`] | `ControlPlanePublisher` port, `RoutingKey`, envelopes |
//! | [`journal`] | `JournalEntry`, `Journal` sink trait |
//! | [`path_sanitizer`] | `PathSanitizer` |
//! | [`controller_config`] | `ControllerConfigManifest` |

pub mod plan;
pub mod runtime;
pub mod topology;
pub mod control_plane;
pub mod journal;
pub mod path_sanitizer;
pub mod controller_config;
