//! Decoding of queue messages into typed extract requests.

use std::collections::HashMap;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BqGcsResult, ErrorKind};
use crate::extract::{DEFAULT_LOCATION, ExtractRequest};
use crate::{bail, bq_gcs_error};

/// Key of the wrapper object holding the request fields.
const WRAPPER_KEY: &str = "bq";

/// Push delivery of a Pub/Sub message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Message received from the input topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    /// Base64 encoded JSON payload.
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub publish_time: Option<String>,
}

impl PubSubMessage {
    /// Creates a message carrying `payload`, base64 encoded.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self {
            data: BASE64_STANDARD.encode(payload),
            ..Default::default()
        }
    }
}

/// View named by a message. Views cannot be extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest {
    pub project: String,
    pub dataset: String,
    pub view: String,
    pub location: String,
}

/// What a message asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractPayload {
    Table(ExtractRequest),
    View(ViewRequest),
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    project: Option<String>,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    table: Option<String>,
    #[serde(default)]
    view: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

/// Decodes the message data (base64, then UTF-8, then JSON) and validates its shape.
///
/// The fields are read from the `bq` wrapper object when present, otherwise from the top
/// level object. Exactly one of `table` and `view` must be set, along with non-empty
/// `project` and `dataset`. `location` defaults to `EU`.
pub fn decode_payload(message: &PubSubMessage) -> BqGcsResult<ExtractPayload> {
    let bytes = BASE64_STANDARD.decode(message.data.trim()).map_err(|err| {
        bq_gcs_error!(
            ErrorKind::PayloadDecodeFailed,
            "Message data is not valid base64",
            source: err
        )
    })?;

    let text = String::from_utf8(bytes).map_err(|err| {
        bq_gcs_error!(
            ErrorKind::PayloadDecodeFailed,
            "Message data is not valid UTF-8",
            source: err
        )
    })?;

    let value: Value = serde_json::from_str(&text).map_err(|err| {
        bq_gcs_error!(
            ErrorKind::PayloadDecodeFailed,
            "Message data is not valid JSON",
            text.clone(),
            source: err
        )
    })?;

    parse_payload(value, &text)
}

fn parse_payload(value: Value, text: &str) -> BqGcsResult<ExtractPayload> {
    let fields = match value {
        Value::Object(mut object) => match object.remove(WRAPPER_KEY) {
            Some(wrapper @ Value::Object(_)) => wrapper,
            _ => Value::Object(object),
        },
        _ => bail!(
            ErrorKind::InvalidPayloadShape,
            "Invalid payload: expected a JSON object",
            text
        ),
    };

    let raw: RawPayload = serde_json::from_value(fields).map_err(|err| {
        bq_gcs_error!(
            ErrorKind::InvalidPayloadShape,
            "Invalid payload: fields have unexpected types",
            text,
            source: err
        )
    })?;

    let project = required(raw.project, "project", text)?;
    let dataset = required(raw.dataset, "dataset", text)?;
    let location = raw
        .location
        .filter(|location| !location.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOCATION.to_string());

    let table = raw.table.filter(|table| !table.trim().is_empty());
    let view = raw.view.filter(|view| !view.trim().is_empty());

    match (table, view) {
        (Some(table), None) => Ok(ExtractPayload::Table(ExtractRequest {
            project,
            dataset,
            table,
            location,
        })),
        (None, Some(view)) => Ok(ExtractPayload::View(ViewRequest {
            project,
            dataset,
            view,
            location,
        })),
        (None, None) => bail!(
            ErrorKind::InvalidPayloadShape,
            "Invalid payload: no 'view' or 'table' field in payload",
            text
        ),
        (Some(_), Some(_)) => bail!(
            ErrorKind::InvalidPayloadShape,
            "Invalid payload: both 'view' and 'table' fields in payload",
            text
        ),
    }
}

fn required(value: Option<String>, field: &'static str, text: &str) -> BqGcsResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(bq_gcs_error!(
            ErrorKind::InvalidPayloadShape,
            "Invalid payload: missing required field",
            format!("'{field}' is missing or empty in {text}")
        )),
    }
}
