use serde::{Deserialize, Serialize};

/// Secret Manager cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SecretsConfig {
    /// Seconds a fetched secret is served from memory before it is fetched again.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl SecretsConfig {
    /// Default secret ttl in seconds.
    pub const DEFAULT_TTL_SECS: u64 = 300;
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    SecretsConfig::DEFAULT_TTL_SECS
}
