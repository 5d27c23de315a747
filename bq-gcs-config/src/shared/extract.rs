use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Polling behavior while waiting for an extract job to finish.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtractConfig {
    /// First delay between two job status checks, in milliseconds.
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,
    /// Cap for the exponentially growing delay, in milliseconds.
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,
}

impl ExtractConfig {
    pub const DEFAULT_POLL_INITIAL_MS: u64 = 500;

    pub const DEFAULT_POLL_MAX_MS: u64 = 10_000;

    /// Ensures the polling delays are usable.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.poll_initial_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "extract.poll_initial_ms",
                constraint: "must be greater than 0",
            });
        }

        if self.poll_max_ms < self.poll_initial_ms {
            return Err(ValidationError::InvalidFieldValue {
                field: "extract.poll_max_ms",
                constraint: "must be greater than or equal to `extract.poll_initial_ms`",
            });
        }

        Ok(())
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
        }
    }
}

fn default_poll_initial_ms() -> u64 {
    ExtractConfig::DEFAULT_POLL_INITIAL_MS
}

fn default_poll_max_ms() -> u64 {
    ExtractConfig::DEFAULT_POLL_MAX_MS
}
