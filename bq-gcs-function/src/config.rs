use bq_gcs_config::load_config;
use bq_gcs_config::shared::FunctionConfig;

use crate::error::{FunctionError, FunctionResult};

/// Loads and validates the function configuration.
///
/// Uses the standard configuration loading mechanism from [`bq_gcs_config`] and validates the
/// resulting [`FunctionConfig`] before returning it.
pub fn load_function_config() -> FunctionResult<FunctionConfig> {
    let config = load_config::<FunctionConfig>().map_err(FunctionError::config)?;
    config.validate().map_err(FunctionError::config)?;

    Ok(config)
}
