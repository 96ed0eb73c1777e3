// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-swarm`: Swarm Controller Core
//!
//! Brings a swarm of worker containers ("bees") up and down from a JSON
//! plan, tracks their readiness, fans out configuration over the control
//! plane and folds worker status into a swarm-level report.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `SwarmStatus` state machine, runtime bookkeeping, start-order planner, config-update targeting |
//! | [`application`] | Application | `SwarmLifecycleManager`, readiness, config fanout, journal, aggregators |
//!
//! ## Key Concepts
//!
//! - **Plan**: roles with an optional image and `work.in` / `work.out` queue
//!   suffixes. Only bees with an image are launched.
//! - **Start order**: producers of a queue suffix precede its consumers.
//!   Provisioning stays in plan order; teardown runs in reverse start order.
//! - **Bootstrap config**: each launched instance receives its `config` via a
//!   `config-update` signal, retried on heartbeats until acknowledged.
//! - **Journal**: append-only record of control-plane traffic and lifecycle
//!   changes. Repeated transport failures are rate limited.
//!
//! Transport, container runtime and journal storage are ports defined in
//! `aegis_core`; this crate only drives them.

pub mod application;
pub mod domain;

pub use application::lifecycle::{LifecyclePorts, LifecycleSettings, SwarmLifecycleManager};
pub use domain::*;
