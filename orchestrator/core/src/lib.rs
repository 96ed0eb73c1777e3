// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-core`: Swarm Controller Shared Kernel
//!
//! Domain types, ports and infrastructure adapters shared by the swarm
//! controller crate (`aegis-swarm`).
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Plan model, control-plane contract, journal sinks, Docker runtime

pub mod domain;
pub mod infrastructure;

pub use domain::*;
