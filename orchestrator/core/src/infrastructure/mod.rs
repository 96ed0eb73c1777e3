// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod runtime;
pub mod event_bus;
pub mod journal;
pub mod logging;
