//! Tracing subscriber bootstrap.

use anyhow::Context;
use libris_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `telemetry.filter`. Installing twice is
/// not an error: the first subscriber stays in place.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)
            .with_context(|| format!("invalid log filter '{}'", settings.filter))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match settings.log_format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };

    match installed {
        Ok(()) => tracing::info!(
            target: "libris-telemetry",
            format = ?settings.log_format,
            "telemetry initialized"
        ),
        Err(error) => tracing::debug!(
            target: "libris-telemetry",
            %error,
            "tracing subscriber already installed"
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let settings = TelemetrySettings::default();
        init(&settings).unwrap();
        init(&TelemetrySettings {
            log_format: LogFormat::Json,
            ..settings
        })
        .unwrap();
    }

    #[test]
    fn invalid_filter_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let settings = TelemetrySettings {
            log_format: LogFormat::Pretty,
            filter: "libris=notalevel".to_string(),
        };
        assert!(init(&settings).is_err());
    }
}
