use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::TelemetryConfig;

/// Install the global subscriber. `RUST_LOG`, when set, wins over
/// `telemetry.log_level`. Fails if a subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level '{}'", config.log_level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);

    // Span close events carry probe and reload timings
    if config.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().pretty().with_span_events(FmtSpan::CLOSE))
            .try_init()?;
    }

    info!(
        log_level = %config.log_level,
        json = config.json_logs,
        "logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_level() {
        let config = TelemetryConfig {
            log_level: "cdnd=loud".to_string(),
            json_logs: false,
        };
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(init_tracing(&config).is_err());
        }
    }
}
