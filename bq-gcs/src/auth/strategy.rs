use std::path::PathBuf;

use secrecy::SecretString;

/// Environment variable holding a user access token (typically set by `gcloud`).
pub const GOOGLE_OAUTH_ACCESS_TOKEN_ENV_NAME: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Environment variable holding the path of a service account key file.
pub const GOOGLE_APPLICATION_CREDENTIALS_ENV_NAME: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// How the function authenticates against Google APIs.
///
/// Precedence: user token, then service account key file, then ambient credentials. Blank
/// variables count as unset.
#[derive(Debug, Clone)]
pub enum CredentialStrategy {
    /// A developer's user credentials, used to impersonate the target account.
    User {
        /// Value of `GOOGLE_OAUTH_ACCESS_TOKEN`, used when the gcloud CLI is not available.
        access_token: SecretString,
    },
    /// A service account key file, used to impersonate the target account.
    ServiceAccount { key_path: PathBuf },
    /// Credentials of the platform the function runs on, used directly.
    Default,
}

impl CredentialStrategy {
    /// Selects the strategy from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Selects the strategy through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(access_token) = present(GOOGLE_OAUTH_ACCESS_TOKEN_ENV_NAME) {
            return CredentialStrategy::User {
                access_token: SecretString::new(access_token),
            };
        }

        if let Some(key_path) = present(GOOGLE_APPLICATION_CREDENTIALS_ENV_NAME) {
            return CredentialStrategy::ServiceAccount {
                key_path: PathBuf::from(key_path),
            };
        }

        CredentialStrategy::Default
    }

    /// Returns a short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            CredentialStrategy::User { .. } => "user",
            CredentialStrategy::ServiceAccount { .. } => "service_account",
            CredentialStrategy::Default => "default",
        }
    }
}
