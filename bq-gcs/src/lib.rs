//! Core of the bq-gcs function: turns a queue message naming a BigQuery table into a CSV
//! extract on Cloud Storage, followed by a completion notification.

pub mod auth;
pub mod clock;
pub mod error;
pub mod extract;
pub mod gcp;
pub mod handler;
mod macros;
pub mod metrics;
pub mod payload;
pub mod publish;
pub mod secrets;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
