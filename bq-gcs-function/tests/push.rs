use bq_gcs::payload::PubSubMessage;
use bq_gcs::test_utils::{table_message, view_message};
use bq_gcs_function::routes::ErrorMessage;
use bq_gcs_telemetry::tracing::init_test_tracing;

use crate::support::test_app::spawn_test_app;

mod support {
    pub(crate) mod test_app;
}

#[tokio::test(flavor = "multi_thread")]
async fn table_push_is_extracted_and_acknowledged() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app(Some("done")).await;

    // Act
    let response = app.push(table_message("p", "d", "t")).await;

    // Assert
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");

    let jobs = app.extract_client.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].destination_uris, vec!["gs://BUCKET/d/t.csv".to_string()]);

    let messages = app.sink.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "projects/runner/topics/done");
    assert_eq!(messages[0].json()["event"], "bq.extract.complete");
}

#[tokio::test(flavor = "multi_thread")]
async fn push_without_output_topic_is_acknowledged() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app(None).await;

    // Act
    let response = app.push(table_message("p", "d", "t")).await;

    // Assert
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(app.extract_client.jobs().len(), 1);
    assert!(app.sink.messages().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn view_push_fails_with_server_error() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app(Some("done")).await;

    // Act
    let response = app.push(view_message("p", "d", "v")).await;

    // Assert
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    let body: ErrorMessage = response.json().await.expect("failed to deserialize response");
    assert!(body.error.starts_with("[UnsupportedOperation]"));
    assert!(body.error.contains("p.d.v"));
    assert!(app.extract_client.jobs().is_empty());
    assert!(app.sink.messages().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_push_fails_with_server_error() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app(Some("done")).await;
    let message = PubSubMessage {
        data: "!!not base64!!".to_string(),
        ..Default::default()
    };

    // Act
    let response = app.push(message).await;

    // Assert
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    let body: ErrorMessage = response.json().await.expect("failed to deserialize response");
    assert!(body.error.starts_with("[PayloadDecodeFailed]"));
    assert!(app.extract_client.jobs().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_publish_fails_the_push() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app(Some("done")).await;
    app.sink.fail_publishes(true);

    // Act
    let response = app.push(table_message("p", "d", "t")).await;

    // Assert
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.extract_client.jobs().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_envelope_is_rejected() {
    init_test_tracing();
    // Arrange
    let app = spawn_test_app(Some("done")).await;

    // Act
    let response = app
        .api_client
        .post(format!("{}/", app.address))
        .header("content-type", "application/json")
        .body("{\"not\": \"an envelope\"}")
        .send()
        .await
        .expect("Failed to execute request.");

    // Assert
    assert!(response.status().is_client_error());
    assert!(app.extract_client.jobs().is_empty());
}
