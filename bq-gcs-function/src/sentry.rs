use std::backtrace::BacktraceStatus;
use std::sync::Arc;

use bq_gcs::error::BqGcsError;
use bq_gcs_config::shared::FunctionConfig;
use secrecy::{ExposeSecret, SecretString};
use sentry::protocol::{Event, Exception};
use sentry::types::Uuid;
use tracing::info;

use crate::error::{FunctionError, FunctionResult};

/// Value of the `service` tag set on every event.
const SERVICE_TAG: &str = "bq-gcs";

/// Initializes Sentry error tracking for the function.
///
/// Sets up panic integration to capture panics and tags every event with the service,
/// entity and release. Returns [`None`] when no DSN is available, allowing the function to
/// run without error tracking.
pub fn init(
    config: &FunctionConfig,
    release: &str,
    dsn: Option<SecretString>,
) -> FunctionResult<Option<sentry::ClientInitGuard>> {
    let Some(dsn) = dsn else {
        info!("sentry not configured for the function, skipping initialization");
        return Ok(None);
    };

    info!("initializing sentry with supplied dsn");

    let dsn = dsn
        .expose_secret()
        .parse()
        .map_err(FunctionError::config)?;

    let guard = sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: Some(release.to_string().into()),
        environment: Some(config.environment.clone().into()),
        traces_sampler: Some(Arc::new(|ctx: &sentry::TransactionContext| {
            sample_trace_rate(ctx)
        })),
        integrations: vec![Arc::new(
            sentry::integrations::panic::PanicIntegration::new(),
        )],
        attach_stacktrace: true,
        ..Default::default()
    });

    sentry::configure_scope(|scope| {
        scope.set_tag("service", SERVICE_TAG);
        scope.set_tag("entity", &config.entity);
    });

    Ok(Some(guard))
}

/// Computes the trace sampling rate based on endpoint path.
fn sample_trace_rate(ctx: &sentry::TransactionContext) -> f32 {
    let transaction_name = ctx.name();
    let endpoint = transaction_name
        .split_once(' ')
        .map(|(_, path)| path)
        .unwrap_or(transaction_name);

    match endpoint {
        "/metrics" | "/health_check" => 0.001,
        _ => 0.1,
    }
}

/// Captures a failed invocation to Sentry and returns the event ID.
///
/// The message id of the failed push, when known, is attached as a tag.
pub fn capture_error(err: &BqGcsError, message_id: Option<&str>) -> Uuid {
    let event = event_from_error(err);
    let tags = error_tags(err, message_id);

    sentry::with_scope(
        |scope| {
            for (key, value) in &tags {
                scope.set_tag(key, value);
            }
        },
        || sentry::capture_event(event),
    )
}

/// Returns the scope tags of a failed invocation.
///
/// `input_error` separates messages that fail the same way on every redelivery from upstream
/// failures.
fn error_tags(err: &BqGcsError, message_id: Option<&str>) -> Vec<(&'static str, String)> {
    let mut tags = vec![
        ("error_kind", format!("{:?}", err.kind())),
        ("input_error", err.kind().is_input_error().to_string()),
    ];
    if let Some(message_id) = message_id {
        tags.push(("message_id", message_id.to_string()));
    }

    tags
}

/// Converts a [`BqGcsError`] into a Sentry [`Event`].
///
/// The error itself is reported with its [`bq_gcs::error::ErrorKind`] as the exception type,
/// preceded by its source chain (root cause first). The captured backtrace is attached to the
/// exception of the error itself.
pub fn event_from_error(err: &BqGcsError) -> Event<'static> {
    let mut exceptions = Vec::new();

    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        exceptions.push(Exception {
            ty: type_name_from_debug(e),
            value: Some(e.to_string()),
            ..Default::default()
        });
        source = e.source();
    }
    exceptions.reverse();

    let value = match err.detail() {
        Some(detail) => format!("{}: {detail}", err.description()),
        None => err.description().to_string(),
    };

    let backtrace = err.backtrace();
    let stacktrace = if backtrace.status() == BacktraceStatus::Captured {
        sentry::integrations::backtrace::parse_stacktrace(&backtrace.to_string())
    } else {
        None
    };

    exceptions.push(Exception {
        ty: format!("{:?}", err.kind()),
        value: Some(value),
        stacktrace,
        ..Default::default()
    });

    Event {
        exception: exceptions.into(),
        level: sentry::Level::Error,
        ..Default::default()
    }
}

/// Extracts the type name from an error's Debug representation.
///
/// Falls back to `"Error"` if parsing fails.
fn type_name_from_debug(err: &dyn std::error::Error) -> String {
    let debug = format!("{err:?}");
    debug
        .split(|c| c == '{' || c == '(' || c == ' ')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string()
}
