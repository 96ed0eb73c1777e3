// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::controller_config::LoggingSection;
use anyhow::{Context, Result};

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured
/// level; `format` is `"json"` or anything else for compact text.
pub fn init_logging(settings: &LoggingSection) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&settings.level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = if settings.format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_target(false).compact().try_init()
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
