use serde::{Deserialize, Serialize};

pub mod health_check;
pub mod metrics;
pub mod push;

/// JSON body of error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}
