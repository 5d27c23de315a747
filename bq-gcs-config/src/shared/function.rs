use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::Config;
use crate::shared::{
    EndpointsConfig, ExtractConfig, PublisherConfig, SecretsConfig, ValidationError,
};

/// Complete configuration of the extract function.
///
/// Every field maps to an unprefixed environment variable (`BUCKET`, `OUTPUT_TOPIC`,
/// `PUBLISHER__MAX_IN_FLIGHT`, ...) and may also come from a configuration file.
///
/// This intentionally does not implement [`serde::Serialize`] to avoid accidentally leaking
/// the Sentry DSN.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfig {
    /// Bucket receiving the extracted CSV objects.
    pub bucket: String,
    /// Logical owner of the data, forwarded in completion notifications.
    pub entity: String,
    /// Deployment environment name.
    pub environment: String,
    /// Project which runs the extract jobs and owns the secrets.
    pub project: String,
    /// Topic receiving completion notifications. Publishing is skipped when unset or empty.
    #[serde(default)]
    pub output_topic: Option<String>,
    /// Sentry DSN. Takes precedence over [`FunctionConfig::sentry_dsn_secret`].
    #[serde(default)]
    pub sentry_dsn: Option<SecretString>,
    /// Name of the Secret Manager secret holding the Sentry DSN.
    #[serde(default)]
    pub sentry_dsn_secret: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Account name, inside [`FunctionConfig::project`], impersonated by user and
    /// service-account credentials.
    #[serde(default = "default_impersonation_account")]
    pub impersonation_account: String,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

impl FunctionConfig {
    pub const DEFAULT_HOST: &'static str = "0.0.0.0";

    pub const DEFAULT_PORT: u16 = 8080;

    pub const DEFAULT_IMPERSONATION_ACCOUNT: &'static str = "terraform";

    /// Validates the complete function configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("bucket", &self.bucket),
            ("entity", &self.entity),
            ("environment", &self.environment),
            ("project", &self.project),
            ("impersonation_account", &self.impersonation_account),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyField(field));
            }
        }

        self.publisher.validate()?;
        self.extract.validate()
    }

    /// Returns the output topic when one is configured.
    pub fn output_topic(&self) -> Option<&str> {
        self.output_topic
            .as_deref()
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
    }

    /// Returns the Sentry DSN when a non-blank one is configured.
    pub fn configured_sentry_dsn(&self) -> Option<&SecretString> {
        self.sentry_dsn
            .as_ref()
            .filter(|dsn| !dsn.expose_secret().trim().is_empty())
    }

    /// Returns the name of the secret holding the Sentry DSN when one is configured.
    pub fn sentry_dsn_secret(&self) -> Option<&str> {
        self.sentry_dsn_secret
            .as_deref()
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
    }

    /// Returns the email of the service account impersonated by non-ambient credentials.
    pub fn impersonation_target(&self) -> String {
        format!(
            "{}@{}.iam.gserviceaccount.com",
            self.impersonation_account, self.project
        )
    }

    /// Returns the address the HTTP server binds to.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Config for FunctionConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_host() -> String {
    FunctionConfig::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    FunctionConfig::DEFAULT_PORT
}

fn default_impersonation_account() -> String {
    FunctionConfig::DEFAULT_IMPERSONATION_ACCOUNT.to_string()
}
