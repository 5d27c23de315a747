//! Shared configuration types for the bq-gcs function.

mod base;
mod endpoints;
mod extract;
mod function;
mod publisher;
mod secrets;

pub use base::ValidationError;
pub use endpoints::EndpointsConfig;
pub use extract::ExtractConfig;
pub use function::FunctionConfig;
pub use publisher::PublisherConfig;
pub use secrets::SecretsConfig;
