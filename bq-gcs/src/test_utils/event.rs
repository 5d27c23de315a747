use serde_json::{Value, json};

use crate::payload::PubSubMessage;

/// Builds a message whose data is `payload` serialized as JSON.
pub fn json_message(payload: &Value) -> PubSubMessage {
    let mut message = PubSubMessage::from_payload(payload.to_string().as_bytes());
    message.message_id = Some("test-message".to_string());
    message
        .attributes
        .insert("origin".to_string(), "test".to_string());

    message
}

/// Builds a message asking for the extract of `project.dataset.table`.
pub fn table_message(project: &str, dataset: &str, table: &str) -> PubSubMessage {
    json_message(&json!({
        "bq": { "project": project, "dataset": dataset, "table": table }
    }))
}

/// Builds a message naming the view `project.dataset.view`.
pub fn view_message(project: &str, dataset: &str, view: &str) -> PubSubMessage {
    json_message(&json!({
        "bq": { "project": project, "dataset": dataset, "view": view }
    }))
}
