//! REST adapters for the Google APIs the function depends on.

mod bigquery;
pub(crate) mod http;
mod pubsub;
mod secret_manager;

pub use bigquery::BigQueryJobClient;
pub use http::GoogleApiClient;
pub use pubsub::PubSubSink;
pub use secret_manager::SecretManagerStore;
