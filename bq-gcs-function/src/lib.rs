//! HTTP surface of the bq-gcs function: Pub/Sub push endpoint, health and metrics routes,
//! startup wiring and error reporting.

pub mod config;
pub mod error;
pub mod routes;
pub mod sentry;
pub mod startup;
