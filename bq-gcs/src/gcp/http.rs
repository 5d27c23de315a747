use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::auth::Credential;
use crate::bail;
use crate::error::{BqGcsResult, ErrorKind};

/// Error document returned by Google APIs.
#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

/// HTTP client authenticating every request with the shared [`Credential`].
#[derive(Debug, Clone)]
pub struct GoogleApiClient {
    http: reqwest::Client,
    credential: Arc<Credential>,
}

impl GoogleApiClient {
    pub fn new(http: reqwest::Client, credential: Arc<Credential>) -> Self {
        Self { http, credential }
    }

    /// Starts a request carrying a bearer token.
    pub(crate) async fn request(&self, method: Method, url: String) -> BqGcsResult<RequestBuilder> {
        let token = self.credential.access_token().await?;

        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token.expose_secret()))
    }

    /// Sends `request` and decodes the JSON answer of `operation`.
    pub(crate) async fn send_json<T>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> BqGcsResult<T>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        read_json(response, operation).await
    }
}

/// Decodes a JSON response, turning non-success statuses into [`ErrorKind::ApiRequestFailed`].
pub(crate) async fn read_json<T>(response: Response, operation: &'static str) -> BqGcsResult<T>
where
    T: DeserializeOwned,
{
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<GoogleErrorResponse>(&body) {
            Ok(google_error) => format!(
                "{}: {}",
                google_error.error.status, google_error.error.message
            ),
            Err(_) => body,
        };

        bail!(
            ErrorKind::ApiRequestFailed,
            "Google API returned an error",
            format!("{operation} answered {status}: {message}")
        );
    }

    let body = response.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
