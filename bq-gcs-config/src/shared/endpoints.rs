use serde::{Deserialize, Serialize};

/// Base URLs of the Google APIs the function talks to.
///
/// Production deployments keep the defaults. Tests point them at local fakes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EndpointsConfig {
    #[serde(default = "default_bigquery")]
    pub bigquery: String,
    #[serde(default = "default_pubsub")]
    pub pubsub: String,
    #[serde(default = "default_secret_manager")]
    pub secret_manager: String,
    #[serde(default = "default_iam_credentials")]
    pub iam_credentials: String,
    /// Compute metadata server, used for ambient credentials.
    #[serde(default = "default_metadata")]
    pub metadata: String,
}

impl EndpointsConfig {
    pub const DEFAULT_BIGQUERY: &'static str = "https://bigquery.googleapis.com/bigquery/v2";
    pub const DEFAULT_PUBSUB: &'static str = "https://pubsub.googleapis.com/v1";
    pub const DEFAULT_SECRET_MANAGER: &'static str = "https://secretmanager.googleapis.com/v1";
    pub const DEFAULT_IAM_CREDENTIALS: &'static str = "https://iamcredentials.googleapis.com/v1";
    pub const DEFAULT_METADATA: &'static str = "http://metadata.google.internal/computeMetadata/v1";

    /// Points every endpoint at the same base URL.
    pub fn all_at(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/');

        Self {
            bigquery: format!("{base_url}/bigquery/v2"),
            pubsub: format!("{base_url}/pubsub/v1"),
            secret_manager: format!("{base_url}/secretmanager/v1"),
            iam_credentials: format!("{base_url}/iamcredentials/v1"),
            metadata: format!("{base_url}/computeMetadata/v1"),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            bigquery: default_bigquery(),
            pubsub: default_pubsub(),
            secret_manager: default_secret_manager(),
            iam_credentials: default_iam_credentials(),
            metadata: default_metadata(),
        }
    }
}

fn default_bigquery() -> String {
    EndpointsConfig::DEFAULT_BIGQUERY.to_string()
}

fn default_pubsub() -> String {
    EndpointsConfig::DEFAULT_PUBSUB.to_string()
}

fn default_secret_manager() -> String {
    EndpointsConfig::DEFAULT_SECRET_MANAGER.to_string()
}

fn default_iam_credentials() -> String {
    EndpointsConfig::DEFAULT_IAM_CREDENTIALS.to_string()
}

fn default_metadata() -> String {
    EndpointsConfig::DEFAULT_METADATA.to_string()
}
