use std::sync::Once;

use bq_gcs_config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt,
    util::TryInitError,
};

/// Default filter directive in production environments.
const PRODUCTION_LOG_LEVEL: &str = "info";

/// Default filter directive everywhere else.
const DEVELOPMENT_LOG_LEVEL: &str = "debug";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global tracing subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the global tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Flushes buffered log lines when dropped.
///
/// Keep it alive for the whole lifetime of the process, otherwise log lines written by the
/// background worker can be lost.
#[must_use]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Returns the default filter directive for `environment`.
pub fn default_log_level(environment: &Environment) -> &'static str {
    if environment.is_production() {
        PRODUCTION_LOG_LEVEL
    } else {
        DEVELOPMENT_LOG_LEVEL
    }
}

/// Installs the global tracing subscriber for `app_name`.
///
/// Production environments log JSON lines at `info`, every other environment logs human
/// readable lines at `debug`. `RUST_LOG` overrides the default level. Lines are written to
/// stdout through a non-blocking writer.
pub fn init_tracing(app_name: &str, environment: &Environment) -> Result<LogFlusher, TracingError> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(environment)));

    let output = if environment.is_production() {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_writer(writer).boxed()
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()?;

    tracing::debug!(app_name, environment = %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber writing through the test harness capture.
///
/// Safe to call from every test; only the first call installs the subscriber.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEVELOPMENT_LOG_LEVEL));

        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_environments_log_at_info() {
        let env = Environment::try_from("prod-eu".to_string()).unwrap();
        assert_eq!(default_log_level(&env), "info");

        let env = Environment::try_from("staging".to_string()).unwrap();
        assert_eq!(default_log_level(&env), "debug");
    }
}
