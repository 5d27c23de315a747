use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bq_gcs_config::shared::EndpointsConfig;
use chrono::{DateTime, Utc};
use gcp_bigquery_client::yup_oauth2::{
    ServiceAccountAuthenticator, ServiceAccountKey, parse_service_account_key,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::auth::{CLOUD_PLATFORM_SCOPE, CredentialStrategy, IMPERSONATED_TOKEN_LIFETIME_SECS};
use crate::error::{BqGcsResult, ErrorKind};
use crate::gcp::http::read_json;
use crate::{bail, bq_gcs_error};

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

/// Program used to mint user access tokens.
const GCLOUD_PROGRAM: &str = "gcloud";

/// Token sources used while minting tokens.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    pub iam_credentials: String,
    pub metadata: String,
    /// Program printing user access tokens, `gcloud` from the `PATH` by default.
    pub gcloud_program: PathBuf,
}

impl From<&EndpointsConfig> for AuthEndpoints {
    fn from(config: &EndpointsConfig) -> Self {
        Self {
            iam_credentials: config.iam_credentials.clone(),
            metadata: config.metadata.clone(),
            gcloud_program: PathBuf::from(GCLOUD_PROGRAM),
        }
    }
}

/// Where access tokens come from.
pub enum CredentialSource {
    /// Tokens of `target_principal`, obtained by impersonating it with the source identity.
    Impersonated {
        source: ImpersonationSource,
        target_principal: String,
    },
    /// Tokens of the platform's attached service account, from the metadata server.
    AmbientDefault,
}

/// Identity used to impersonate the target principal.
pub enum ImpersonationSource {
    User { fallback_token: SecretString },
    ServiceAccount { key: ServiceAccountKey },
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Impersonated {
                source,
                target_principal,
            } => f
                .debug_struct("Impersonated")
                .field("source", source)
                .field("target_principal", target_principal)
                .finish(),
            CredentialSource::AmbientDefault => f.write_str("AmbientDefault"),
        }
    }
}

impl fmt::Debug for ImpersonationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpersonationSource::User { .. } => f.write_str("User"),
            ImpersonationSource::ServiceAccount { key } => f
                .debug_struct("ServiceAccount")
                .field("client_email", &key.client_email)
                .finish(),
        }
    }
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

struct MintedToken {
    token: SecretString,
    expires_in: Duration,
}

#[derive(Serialize)]
struct GenerateAccessTokenRequest<'a> {
    scope: [&'a str; 1],
    lifetime: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    expire_time: String,
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Credential able to mint access tokens for the Google APIs.
///
/// Immutable after [`Credential::resolve`] apart from the token cache, and shared through an
/// `Arc` by every REST client.
pub struct Credential {
    source: CredentialSource,
    endpoints: AuthEndpoints,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl Credential {
    /// Builds the credential for `strategy` and mints a first token.
    ///
    /// An unreadable key file or a denied impersonation fails here, so that a misconfigured
    /// deployment never starts serving.
    pub async fn resolve(
        strategy: CredentialStrategy,
        target_principal: String,
        endpoints: AuthEndpoints,
        http: reqwest::Client,
    ) -> BqGcsResult<Credential> {
        let strategy_name = strategy.name();

        let source = match strategy {
            CredentialStrategy::User { access_token } => CredentialSource::Impersonated {
                source: ImpersonationSource::User {
                    fallback_token: access_token,
                },
                target_principal,
            },
            CredentialStrategy::ServiceAccount { key_path } => CredentialSource::Impersonated {
                source: ImpersonationSource::ServiceAccount {
                    key: load_service_account_key(&key_path).await?,
                },
                target_principal,
            },
            CredentialStrategy::Default => CredentialSource::AmbientDefault,
        };

        let credential = Credential {
            source,
            endpoints,
            http,
            cached: Mutex::new(None),
        };

        credential.access_token().await?;

        info!(
            strategy = strategy_name,
            source = ?credential.source,
            "google credentials resolved"
        );

        Ok(credential)
    }

    /// Returns where this credential gets its tokens from.
    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Returns a valid access token, minting a new one when the cached token is about to
    /// expire.
    pub async fn access_token(&self) -> BqGcsResult<SecretString> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.token.clone());
        }

        let minted = self.mint().await?;
        let refresh_at = Instant::now() + minted.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(
            expires_in_secs = minted.expires_in.as_secs(),
            "minted google access token"
        );

        let token = minted.token.clone();
        *cached = Some(CachedToken {
            token: minted.token,
            refresh_at,
        });

        Ok(token)
    }

    async fn mint(&self) -> BqGcsResult<MintedToken> {
        match &self.source {
            CredentialSource::Impersonated {
                source,
                target_principal,
            } => {
                let source_token = match source {
                    ImpersonationSource::User { fallback_token } => {
                        user_access_token(&self.endpoints.gcloud_program, fallback_token).await?
                    }
                    ImpersonationSource::ServiceAccount { key } => {
                        service_account_token(key).await?
                    }
                };

                impersonate(
                    &self.http,
                    &self.endpoints.iam_credentials,
                    &source_token,
                    target_principal,
                )
                .await
            }
            CredentialSource::AmbientDefault => {
                metadata_token(&self.http, &self.endpoints.metadata).await
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

async fn load_service_account_key(key_path: &Path) -> BqGcsResult<ServiceAccountKey> {
    let contents = tokio::fs::read_to_string(key_path).await.map_err(|err| {
        bq_gcs_error!(
            ErrorKind::ConfigError,
            "Service account key file could not be read",
            key_path.display(),
            source: err
        )
    })?;

    parse_service_account_key(contents).map_err(|err| {
        bq_gcs_error!(
            ErrorKind::ConfigError,
            "Service account key file is invalid",
            key_path.display(),
            source: err
        )
    })
}

/// Mints a user token with the gcloud CLI, or falls back to the token from the environment
/// when the CLI is not installed.
async fn user_access_token(
    gcloud_program: &Path,
    fallback_token: &SecretString,
) -> BqGcsResult<SecretString> {
    let output = match Command::new(gcloud_program)
        .args(["auth", "print-access-token"])
        .output()
        .await
    {
        Ok(output) => output,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("gcloud cli not found, using the user access token from the environment");
            return Ok(fallback_token.clone());
        }
        Err(err) => {
            bail!(
                ErrorKind::AuthenticationError,
                "Running the gcloud cli failed",
                source: err
            );
        }
    };

    if !output.status.success() {
        bail!(
            ErrorKind::AuthenticationError,
            "The gcloud cli could not print an access token",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();
    if token.is_empty() {
        bail!(
            ErrorKind::AuthenticationError,
            "The gcloud cli printed an empty access token"
        );
    }

    Ok(SecretString::new(token))
}

async fn service_account_token(key: &ServiceAccountKey) -> BqGcsResult<SecretString> {
    let authenticator = ServiceAccountAuthenticator::builder(key.clone())
        .build()
        .await
        .map_err(|err| {
            bq_gcs_error!(
                ErrorKind::AuthenticationError,
                "Service account authenticator could not be built",
                source: err
            )
        })?;

    let token = authenticator
        .token(&[CLOUD_PLATFORM_SCOPE])
        .await
        .map_err(|err| {
            bq_gcs_error!(
                ErrorKind::AuthenticationError,
                "Service account token request failed",
                key.client_email.clone(),
                source: err
            )
        })?;

    let Some(token) = token.token() else {
        bail!(
            ErrorKind::AuthenticationError,
            "Service account token response has no access token",
            key.client_email.clone()
        );
    };

    Ok(SecretString::new(token.to_string()))
}

/// Exchanges `source_token` for a short-lived token of `target_principal`.
async fn impersonate(
    http: &reqwest::Client,
    iam_credentials_url: &str,
    source_token: &SecretString,
    target_principal: &str,
) -> BqGcsResult<MintedToken> {
    let url = format!(
        "{iam_credentials_url}/projects/-/serviceAccounts/{target_principal}:generateAccessToken"
    );
    let request = GenerateAccessTokenRequest {
        scope: [CLOUD_PLATFORM_SCOPE],
        lifetime: format!("{IMPERSONATED_TOKEN_LIFETIME_SECS}s"),
    };

    let response = http
        .post(url)
        .bearer_auth(source_token.expose_secret())
        .json(&request)
        .send()
        .await?;

    let response: GenerateAccessTokenResponse = read_json(response, "generateAccessToken")
        .await
        .map_err(|err| {
            bq_gcs_error!(
                ErrorKind::AuthenticationError,
                "Service account impersonation failed",
                target_principal,
                source: err
            )
        })?;

    let expire_time = DateTime::parse_from_rfc3339(&response.expire_time)?.with_timezone(&Utc);
    let expires_in = (expire_time - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);

    Ok(MintedToken {
        token: SecretString::new(response.access_token),
        expires_in,
    })
}

/// Fetches a token of the attached service account from the metadata server.
async fn metadata_token(http: &reqwest::Client, metadata_url: &str) -> BqGcsResult<MintedToken> {
    let url = format!("{metadata_url}/instance/service-accounts/default/token");

    let response = http
        .get(url)
        .query(&[("scopes", CLOUD_PLATFORM_SCOPE)])
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|err| {
            bq_gcs_error!(
                ErrorKind::AuthenticationError,
                "Metadata server is unreachable",
                source: err
            )
        })?;

    let response: MetadataTokenResponse = read_json(response, "metadata token")
        .await
        .map_err(|err| {
            bq_gcs_error!(
                ErrorKind::AuthenticationError,
                "Metadata server refused to mint a token",
                source: err
            )
        })?;

    Ok(MintedToken {
        token: SecretString::new(response.access_token),
        expires_in: Duration::from_secs(response.expires_in),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_file_is_a_config_error() {
        let err = load_service_account_key(Path::new("/definitely/not/here/sa.json"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn invalid_key_file_is_a_config_error() {
        let path = std::env::temp_dir().join(format!("bq-gcs-invalid-key-{}.json", std::process::id()));
        tokio::fs::write(&path, "not a key").await.unwrap();

        let err = load_service_account_key(&path).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_gcloud_falls_back_to_the_environment_token() {
        let fallback = SecretString::new("ya29.from-env".to_string());

        let token = user_access_token(Path::new("/definitely/not/here/gcloud"), &fallback)
            .await
            .unwrap();

        assert_eq!(token.expose_secret(), "ya29.from-env");
    }

    #[tokio::test]
    async fn failing_gcloud_is_an_authentication_error() {
        let fallback = SecretString::new("ya29.from-env".to_string());

        let err = user_access_token(Path::new("false"), &fallback)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthenticationError);
    }

    #[tokio::test]
    async fn gcloud_output_is_the_user_token() {
        let fallback = SecretString::new("ya29.from-env".to_string());

        // `echo` prints its arguments, standing in for a logged-in gcloud.
        let token = user_access_token(Path::new("echo"), &fallback)
            .await
            .unwrap();

        assert_eq!(token.expose_secret(), "auth print-access-token");
    }

    #[test]
    fn debug_output_hides_tokens() {
        let source = CredentialSource::Impersonated {
            source: ImpersonationSource::User {
                fallback_token: SecretString::new("ya29.secret".to_string()),
            },
            target_principal: "terraform@p.iam.gserviceaccount.com".to_string(),
        };

        let rendered = format!("{source:?}");
        assert!(rendered.contains("terraform@p.iam.gserviceaccount.com"));
        assert!(!rendered.contains("ya29.secret"));
    }
}
