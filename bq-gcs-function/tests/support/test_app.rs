#![allow(dead_code)]

use std::net::TcpListener;

use bq_gcs::extract::ExtractDispatcher;
use bq_gcs::handler::Handler;
use bq_gcs::payload::{PubSubMessage, PushEnvelope};
use bq_gcs::publish::{CompletionPublisher, Publisher};
use bq_gcs::test_utils::{MemoryExtractClient, MemorySink};
use bq_gcs_config::shared::{ExtractConfig, PublisherConfig};
use bq_gcs_function::startup::run;

pub struct TestApp {
    pub address: String,
    pub api_client: reqwest::Client,
    pub extract_client: MemoryExtractClient,
    pub sink: MemorySink,
}

impl TestApp {
    /// Delivers `message` the way a Pub/Sub push subscription does.
    pub async fn push(&self, message: PubSubMessage) -> reqwest::Response {
        let envelope = PushEnvelope {
            message,
            subscription: Some("projects/runner/subscriptions/bq-gcs".to_string()),
        };

        self.api_client
            .post(format!("{}/", self.address))
            .json(&envelope)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn health_check(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/health_check", self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn metrics(&self) -> reqwest::Response {
        self.api_client
            .get(format!("{}/metrics", self.address))
            .send()
            .await
            .expect("Failed to execute request.")
    }
}

/// Starts the function server on a random port, backed by in-memory Google API fakes.
pub async fn spawn_test_app(output_topic: Option<&str>) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let extract_client = MemoryExtractClient::new();
    let sink = MemorySink::new();

    let dispatcher = ExtractDispatcher::new(
        extract_client.clone(),
        "BUCKET".to_string(),
        "runner".to_string(),
        ExtractConfig {
            poll_initial_ms: 1,
            poll_max_ms: 4,
        },
    );
    let publisher = CompletionPublisher::new(
        Publisher::new(sink.clone(), &PublisherConfig::default()),
        output_topic,
        "runner",
        "acme".to_string(),
        "test".to_string(),
    );
    let handler = Handler::new(dispatcher, publisher, "bq-gcs@test".to_string());

    let server = run(listener, handler).expect("failed to start the server");
    tokio::spawn(server);

    TestApp {
        address: format!("http://127.0.0.1:{port}"),
        api_client: reqwest::Client::new(),
        extract_client,
        sink,
    }
}
