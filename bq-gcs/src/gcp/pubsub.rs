use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use crate::error::{BqGcsResult, ErrorKind};
use crate::gcp::GoogleApiClient;
use crate::publish::MessageSink;
use crate::{bail, bq_gcs_error};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// [`MessageSink`] backed by the Pub/Sub v1 REST API.
#[derive(Debug, Clone)]
pub struct PubSubSink {
    api: GoogleApiClient,
    base_url: String,
}

impl PubSubSink {
    pub fn new(api: GoogleApiClient, base_url: String) -> Self {
        Self {
            api,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl MessageSink for PubSubSink {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> BqGcsResult<String> {
        let url = format!("{}/{topic}:publish", self.base_url);
        let body = json!({
            "messages": [{ "data": BASE64_STANDARD.encode(data) }]
        });

        let request = self.api.request(Method::POST, url).await?.json(&body);
        let response: PublishResponse = self
            .api
            .send_json(request, "topics.publish")
            .await
            .map_err(|err| {
                bq_gcs_error!(
                    ErrorKind::PublishFailed,
                    "Notification could not be published",
                    topic,
                    source: err
                )
            })?;

        match response.message_ids.into_iter().next() {
            Some(message_id) => Ok(message_id),
            None => bail!(
                ErrorKind::PublishFailed,
                "Publish was not acknowledged with a message id",
                topic
            ),
        }
    }
}
