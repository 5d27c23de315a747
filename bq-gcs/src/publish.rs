//! Completion notifications: bounded in-flight publishing and the notification event.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bq_gcs_config::shared::PublisherConfig;
use metrics::counter;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bq_gcs_error;
use crate::error::{BqGcsResult, ErrorKind};
use crate::extract::{ExtractRequest, ExtractResult};
use crate::metrics::{BQ_GCS_NOTIFICATIONS_PUBLISHED_TOTAL, BQ_GCS_PUBLISH_FAILURES_TOTAL};

/// Event name of a completion notification.
pub const EXTRACT_COMPLETE_EVENT: &str = "bq.extract.complete";

/// Destination of published messages.
pub trait MessageSink: Send + Sync + 'static {
    /// Publishes `data` to `topic` and resolves to the server-assigned message id once the
    /// message is acknowledged.
    fn publish(
        &self,
        topic: &str,
        data: Vec<u8>,
    ) -> impl Future<Output = BqGcsResult<String>> + Send;
}

/// Publishes messages in background tasks, with a bounded number in flight.
#[derive(Debug)]
pub struct Publisher<S> {
    sink: Arc<S>,
    permits: Arc<Semaphore>,
    max_in_flight: usize,
    ack_timeout: Option<Duration>,
}

impl<S> Publisher<S>
where
    S: MessageSink,
{
    pub fn new(sink: S, config: &PublisherConfig) -> Self {
        let max_in_flight = config.max_in_flight.max(1);

        Self {
            sink: Arc::new(sink),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
            ack_timeout: config.ack_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Returns the number of messages awaiting acknowledgment.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Starts publishing `data` to `topic`.
    ///
    /// Waits for an in-flight slot, then returns a handle to the background publish. The slot
    /// is released when the publish task ends.
    pub async fn publish(&self, topic: String, data: Vec<u8>) -> BqGcsResult<PublishHandle> {
        let permit = self.permits.clone().acquire_owned().await.map_err(|err| {
            bq_gcs_error!(
                ErrorKind::InvalidState,
                "Publisher no longer accepts messages",
                source: err
            )
        })?;

        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            let _permit = permit;
            sink.publish(&topic, data).await
        });

        Ok(PublishHandle {
            task,
            ack_timeout: self.ack_timeout,
        })
    }
}

/// Pending acknowledgment of one published message.
#[derive(Debug)]
pub struct PublishHandle {
    task: JoinHandle<BqGcsResult<String>>,
    ack_timeout: Option<Duration>,
}

impl PublishHandle {
    /// Waits for the acknowledgment and returns the message id.
    ///
    /// Fails with [`ErrorKind::PublishFailed`] when the publish task fails or the
    /// acknowledgment does not arrive within the ack timeout.
    pub async fn wait(mut self) -> BqGcsResult<String> {
        let joined = match self.ack_timeout {
            Some(ack_timeout) => match tokio::time::timeout(ack_timeout, &mut self.task).await {
                Ok(joined) => joined,
                Err(err) => {
                    self.task.abort();

                    return Err(bq_gcs_error!(
                        ErrorKind::PublishFailed,
                        "Publish acknowledgment timed out",
                        format!("no acknowledgment within {} ms", ack_timeout.as_millis()),
                        source: err
                    ));
                }
            },
            None => (&mut self.task).await,
        };

        joined.map_err(|err| {
            bq_gcs_error!(
                ErrorKind::PublishFailed,
                "Publish task did not complete",
                source: err
            )
        })?
    }
}

/// Notification published after a successful extract.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub entity: String,
    pub environment: String,
    pub event: &'static str,
    pub info: String,
    pub result: ExtractResult,
}

impl NotificationEvent {
    pub fn new(
        entity: String,
        environment: String,
        request: &ExtractRequest,
        result: ExtractResult,
    ) -> Self {
        Self {
            entity,
            environment,
            event: EXTRACT_COMPLETE_EVENT,
            info: summary_line(request, &result),
            result,
        }
    }
}

/// Describes an extract: source table, destination objects and slot cost.
pub fn summary_line(request: &ExtractRequest, result: &ExtractResult) -> String {
    let source = result
        .source_table()
        .map(|table| table.to_string())
        .unwrap_or_else(|| request.qualified_table());
    let slot_ms = result
        .total_slot_ms()
        .map(|slot_ms| slot_ms.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "Extracted {source} to {} ({slot_ms} slot ms)",
        result.destination_uris().join(",")
    )
}

/// Qualifies a bare topic name with `project`. Qualified names are returned unchanged.
pub fn qualify_topic(topic: &str, project: &str) -> String {
    if topic.starts_with("projects/") {
        topic.to_string()
    } else {
        format!("projects/{project}/topics/{topic}")
    }
}

/// What happened to the completion notification of an extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No output topic is configured.
    Skipped,
    Published { message_id: String },
}

/// Publishes one completion notification per successful extract.
#[derive(Debug)]
pub struct CompletionPublisher<S> {
    publisher: Publisher<S>,
    topic: Option<String>,
    entity: String,
    environment: String,
    published: AtomicU64,
}

impl<S> CompletionPublisher<S>
where
    S: MessageSink,
{
    /// Creates a publisher sending to `topic`, qualified with `project` when bare.
    ///
    /// A missing or blank topic disables notifications.
    pub fn new(
        publisher: Publisher<S>,
        topic: Option<&str>,
        project: &str,
        entity: String,
        environment: String,
    ) -> Self {
        let topic = topic
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(|topic| qualify_topic(topic, project));

        Self {
            publisher,
            topic,
            entity,
            environment,
            published: AtomicU64::new(0),
        }
    }

    pub fn publisher(&self) -> &Publisher<S> {
        &self.publisher
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Returns the number of acknowledged notifications.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Publishes the completion notification of `request` and waits for its acknowledgment.
    pub async fn publish_completion(
        &self,
        request: &ExtractRequest,
        result: &ExtractResult,
    ) -> BqGcsResult<PublishOutcome> {
        let Some(topic) = &self.topic else {
            info!(
                source_table = %request.qualified_table(),
                "no output topic configured, skipping completion notification"
            );

            return Ok(PublishOutcome::Skipped);
        };

        let event = NotificationEvent::new(
            self.entity.clone(),
            self.environment.clone(),
            request,
            result.clone(),
        );
        let data = serde_json::to_vec(&event)?;

        info!(topic = %topic, info = %event.info, "publishing completion notification");

        let published = match self.publisher.publish(topic.clone(), data).await {
            Ok(handle) => handle.wait().await,
            Err(err) => Err(err),
        };

        match published {
            Ok(message_id) => {
                let count = self.published.fetch_add(1, Ordering::Relaxed) + 1;
                counter!(BQ_GCS_NOTIFICATIONS_PUBLISHED_TOTAL).increment(1);
                info!(
                    topic = %topic,
                    message_id = %message_id,
                    published = count,
                    "completion notification published"
                );

                Ok(PublishOutcome::Published { message_id })
            }
            Err(err) => {
                counter!(BQ_GCS_PUBLISH_FAILURES_TOTAL).increment(1);
                error!(topic = %topic, error = %err, "completion notification failed");

                Err(err)
            }
        }
    }
}
