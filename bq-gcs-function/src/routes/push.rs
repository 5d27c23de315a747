use std::fmt;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, ResponseError, web};
use bq_gcs::error::BqGcsError;
use bq_gcs::extract::ExtractJobClient;
use bq_gcs::handler::Handler;
use bq_gcs::payload::PushEnvelope;
use bq_gcs::publish::MessageSink;

use crate::routes::ErrorMessage;

/// Failed invocation, answered with `500` so that the subscription redelivers the message.
#[derive(Debug)]
pub struct PushError(BqGcsError);

impl PushError {
    fn message(&self) -> String {
        match self.0.detail() {
            Some(detail) => format!("{}: {detail}", self.0.description()),
            None => self.0.description().to_string(),
        }
    }
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.0.kind(), self.message())
    }
}

impl ResponseError for PushError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorMessage {
            error: self.to_string(),
        })
    }
}

/// Receives a Pub/Sub push delivery and runs one invocation of the handler.
pub async fn receive_push<C, S>(
    handler: web::Data<Handler<C, S>>,
    envelope: web::Json<PushEnvelope>,
) -> Result<impl Responder, PushError>
where
    C: ExtractJobClient + 'static,
    S: MessageSink,
{
    let message = &envelope.message;

    match handler.handle(message).await {
        Ok(answer) => Ok(HttpResponse::Ok().body(answer)),
        Err(err) => {
            crate::sentry::capture_error(&err, message.message_id.as_deref());
            Err(PushError(err))
        }
    }
}
