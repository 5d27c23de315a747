//! Per-invocation entry point: decode, extract, notify.

use metrics::counter;
use tracing::{debug, error, info};

use crate::bail;
use crate::error::{BqGcsResult, ErrorKind};
use crate::extract::{ExtractDispatcher, ExtractJobClient};
use crate::metrics::{
    BQ_GCS_INVOCATIONS_TOTAL, ERROR_KIND_LABEL, OUTCOME_FAILURE, OUTCOME_LABEL, OUTCOME_SUCCESS,
};
use crate::payload::{ExtractPayload, PubSubMessage, decode_payload};
use crate::publish::{CompletionPublisher, MessageSink};

/// Answer of a successful invocation.
pub const OK: &str = "ok";

/// Handles queue messages asking for table extracts.
#[derive(Debug)]
pub struct Handler<C, S> {
    dispatcher: ExtractDispatcher<C>,
    publisher: CompletionPublisher<S>,
    release: String,
}

impl<C, S> Handler<C, S>
where
    C: ExtractJobClient,
    S: MessageSink,
{
    pub fn new(
        dispatcher: ExtractDispatcher<C>,
        publisher: CompletionPublisher<S>,
        release: String,
    ) -> Self {
        Self {
            dispatcher,
            publisher,
            release,
        }
    }

    pub fn dispatcher(&self) -> &ExtractDispatcher<C> {
        &self.dispatcher
    }

    pub fn publisher(&self) -> &CompletionPublisher<S> {
        &self.publisher
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    /// Handles one message and returns [`OK`] once the table is extracted and the completion
    /// notification is acknowledged.
    ///
    /// Every failure is logged with the message context and returned unchanged, so the caller
    /// can signal it upstream.
    pub async fn handle(&self, message: &PubSubMessage) -> BqGcsResult<&'static str> {
        debug!(release = %self.release, "HOT START");

        match self.process(message).await {
            Ok(answer) => {
                counter!(BQ_GCS_INVOCATIONS_TOTAL, OUTCOME_LABEL => OUTCOME_SUCCESS).increment(1);

                Ok(answer)
            }
            Err(err) => {
                counter!(
                    BQ_GCS_INVOCATIONS_TOTAL,
                    OUTCOME_LABEL => OUTCOME_FAILURE,
                    ERROR_KIND_LABEL => format!("{:?}", err.kind())
                )
                .increment(1);

                error!(
                    error_kind = ?err.kind(),
                    input_error = err.kind().is_input_error(),
                    message_id = message.message_id.as_deref().unwrap_or_default(),
                    attributes = ?message.attributes,
                    error = %err,
                    "invocation failed"
                );
                debug!(
                    message_id = message.message_id.as_deref().unwrap_or_default(),
                    publish_time = message.publish_time.as_deref().unwrap_or_default(),
                    data = %message.data,
                    "failed invocation payload"
                );

                Err(err)
            }
        }
    }

    async fn process(&self, message: &PubSubMessage) -> BqGcsResult<&'static str> {
        match decode_payload(message)? {
            ExtractPayload::Table(request) => {
                let result = self.dispatcher.extract_table(&request).await?;
                let outcome = self.publisher.publish_completion(&request, &result).await?;

                info!(
                    source_table = %request.qualified_table(),
                    job_id = result.job_id().unwrap_or_default(),
                    outcome = ?outcome,
                    "table extracted"
                );

                Ok(OK)
            }
            ExtractPayload::View(view) => bail!(
                ErrorKind::UnsupportedOperation,
                "Extracting views is not supported",
                format!("{}.{}.{}", view.project, view.dataset, view.view)
            ),
        }
    }
}
