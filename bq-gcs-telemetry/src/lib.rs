//! Tracing and metrics initialization shared by the bq-gcs binaries and tests.

pub mod metrics;
pub mod tracing;
