use anyhow::Context;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, prelude::*, EnvFilter};

use crate::core::config::TelemetrySettings;

/// `RUST_LOG` wins over `GRADER_LOG_LEVEL` when both are set.
pub(crate) fn init_tracing(telemetry: &TelemetrySettings) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&telemetry.log_level)
            .with_context(|| format!("invalid GRADER_LOG_LEVEL: {}", telemetry.log_level))?,
    };

    let layer = fmt::layer().with_target(false).with_span_events(FmtSpan::CLOSE);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if telemetry.json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer.compact()).try_init()
    };

    installed.context("failed to install tracing subscriber")
}
