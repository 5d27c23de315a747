use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use reqwest::Method;
use secrecy::SecretString;
use serde::Deserialize;

use crate::bq_gcs_error;
use crate::error::{BqGcsResult, ErrorKind};
use crate::gcp::GoogleApiClient;
use crate::secrets::SecretStore;

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

/// [`SecretStore`] backed by the Secret Manager v1 REST API.
#[derive(Debug, Clone)]
pub struct SecretManagerStore {
    api: GoogleApiClient,
    base_url: String,
}

impl SecretManagerStore {
    pub fn new(api: GoogleApiClient, base_url: String) -> Self {
        Self {
            api,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn access(&self, name: &str, project: &str, version: &str) -> BqGcsResult<SecretString> {
        let url = format!(
            "{}/projects/{project}/secrets/{name}/versions/{version}:access",
            self.base_url
        );

        let request = self.api.request(Method::GET, url).await?;
        let response: AccessSecretVersionResponse =
            self.api.send_json(request, "secrets.versions.access").await?;

        let data = BASE64_STANDARD.decode(response.payload.data)?;
        let value = String::from_utf8(data)?;

        Ok(SecretString::new(value.trim_end().to_string()))
    }
}

impl SecretStore for SecretManagerStore {
    async fn access_secret(
        &self,
        name: &str,
        project: &str,
        version: &str,
    ) -> BqGcsResult<SecretString> {
        self.access(name, project, version).await.map_err(|err| {
            bq_gcs_error!(
                ErrorKind::SecretAccessFailed,
                "Secret could not be accessed",
                format!("projects/{project}/secrets/{name}/versions/{version}"),
                source: err
            )
        })
    }
}
