use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::bail;
use crate::error::{BqGcsResult, ErrorKind};
use crate::publish::MessageSink;

/// Message recorded by [`MemorySink`].
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub data: Vec<u8>,
    pub message_id: String,
}

impl PublishedMessage {
    /// Parses the message data as JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.data).unwrap()
    }
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<PublishedMessage>,
    fail: bool,
}

/// [`MessageSink`] recording every acknowledged message.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent publishes fail with [`ErrorKind::PublishFailed`].
    pub fn fail_publishes(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.inner.lock().unwrap().messages.clone()
    }
}

impl MessageSink for MemorySink {
    async fn publish(&self, topic: &str, data: Vec<u8>) -> BqGcsResult<String> {
        let mut inner = self.inner.lock().unwrap();

        if inner.fail {
            bail!(
                ErrorKind::PublishFailed,
                "Notification could not be published",
                topic
            );
        }

        let message_id = (inner.messages.len() + 1).to_string();
        inner.messages.push(PublishedMessage {
            topic: topic.to_string(),
            data,
            message_id: message_id.clone(),
        });

        Ok(message_id)
    }
}
