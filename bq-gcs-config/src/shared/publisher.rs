use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Completion notification publishing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PublisherConfig {
    /// Maximum number of notifications awaiting acknowledgment at the same time.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Upper bound, in milliseconds, on the acknowledgment wait. Unbounded when unset.
    #[serde(default)]
    pub ack_timeout_ms: Option<u64>,
}

impl PublisherConfig {
    /// Default maximum number of in-flight notifications.
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 100;

    /// Ensures at least one notification can be in flight.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_in_flight == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "publisher.max_in_flight",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            ack_timeout_ms: None,
        }
    }
}

fn default_max_in_flight() -> usize {
    PublisherConfig::DEFAULT_MAX_IN_FLIGHT
}
