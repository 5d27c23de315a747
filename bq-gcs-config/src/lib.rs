//! Configuration loading and shared configuration types for the bq-gcs function.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, ConfigSources, LoadConfigError, load_config, load_config_from};
