use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, HttpServer, dev::Server, web};
use bq_gcs::auth::{AuthEndpoints, Credential, CredentialStrategy};
use bq_gcs::extract::{ExtractDispatcher, ExtractJobClient};
use bq_gcs::gcp::{BigQueryJobClient, GoogleApiClient, PubSubSink, SecretManagerStore};
use bq_gcs::handler::Handler;
use bq_gcs::metrics::register_metrics;
use bq_gcs::publish::{CompletionPublisher, MessageSink, Publisher};
use bq_gcs::secrets::{SecretCache, SecretStore};
use bq_gcs_config::shared::FunctionConfig;
use bq_gcs_telemetry::metrics::init_metrics_handle;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::error::{FunctionError, FunctionResult};
use crate::routes::health_check::health_check;
use crate::routes::metrics::metrics;
use crate::routes::push::receive_push;

/// Handler wired to the Google APIs.
pub type GoogleHandler = Handler<BigQueryJobClient, PubSubSink>;

/// Returns the release string reported in logs and Sentry events.
pub fn release() -> String {
    format!("bq-gcs@{}", env!("CARGO_PKG_VERSION"))
}

/// Function server wrapper.
pub struct Application {
    port: u16,
    server: Server,
    _sentry_guard: Option<sentry::ClientInitGuard>,
}

impl Application {
    /// Resolves credentials, builds the Google API clients and binds the server.
    ///
    /// Credential and Sentry DSN failures are fatal: the function never starts serving with a
    /// broken setup.
    pub async fn build(config: FunctionConfig) -> FunctionResult<Self> {
        let release = release();
        info!(release = %release, "COLD");

        let http = reqwest::Client::new();
        let strategy = CredentialStrategy::from_env();
        info!(strategy = strategy.name(), "resolving google credentials");

        let credential = Credential::resolve(
            strategy,
            config.impersonation_target(),
            AuthEndpoints::from(&config.endpoints),
            http.clone(),
        )
        .await?;
        let api = GoogleApiClient::new(http, Arc::new(credential));

        let secrets = SecretCache::new(
            SecretManagerStore::new(api.clone(), config.endpoints.secret_manager.clone()),
            config.project.clone(),
            Duration::from_secs(config.secrets.ttl_secs),
        );
        let sentry_dsn = sentry_dsn(&config, &secrets).await?;
        let sentry_guard = crate::sentry::init(&config, &release, sentry_dsn)?;

        let handler = build_handler(&config, api, release);

        let listener = TcpListener::bind(config.listen_address())?;
        let port = listener.local_addr()?.port();
        info!(address = %config.listen_address(), port, "starting http server");

        let server = run(listener, handler)?;

        Ok(Self {
            port,
            server,
            _sentry_guard: sentry_guard,
        })
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

/// Returns the Sentry DSN from the configuration, or from Secret Manager when only the
/// secret name is configured.
pub async fn sentry_dsn<S>(
    config: &FunctionConfig,
    secrets: &SecretCache<S>,
) -> FunctionResult<Option<SecretString>>
where
    S: SecretStore,
{
    if let Some(dsn) = config.configured_sentry_dsn() {
        return Ok(Some(dsn.clone()));
    }

    let Some(secret) = config.sentry_dsn_secret() else {
        return Ok(None);
    };

    info!(secret, "reading sentry dsn from secret manager");
    let dsn = secrets.cached_secret(secret).await?;
    if dsn.expose_secret().trim().is_empty() {
        return Ok(None);
    }

    Ok(Some(dsn))
}

/// Wires the handler to the BigQuery and Pub/Sub REST clients.
pub fn build_handler(config: &FunctionConfig, api: GoogleApiClient, release: String) -> GoogleHandler {
    let dispatcher = ExtractDispatcher::new(
        BigQueryJobClient::new(api.clone(), config.endpoints.bigquery.clone()),
        config.bucket.clone(),
        config.project.clone(),
        config.extract.clone(),
    );

    let publisher = CompletionPublisher::new(
        Publisher::new(
            PubSubSink::new(api, config.endpoints.pubsub.clone()),
            &config.publisher,
        ),
        config.output_topic(),
        &config.project,
        config.entity.clone(),
        config.environment.clone(),
    );

    Handler::new(dispatcher, publisher, release)
}

/// Starts the HTTP server serving `handler` on `listener`.
pub fn run<C, S>(listener: TcpListener, handler: Handler<C, S>) -> FunctionResult<Server>
where
    C: ExtractJobClient + 'static,
    S: MessageSink,
{
    register_metrics();
    let prometheus_handle = web::ThinData(init_metrics_handle().map_err(FunctionError::config)?);
    let handler = web::Data::new(handler);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(
                sentry::integrations::actix::Sentry::builder()
                    .capture_server_errors(true)
                    .start_transaction(true)
                    .finish(),
            )
            .service(health_check)
            .service(metrics)
            .route("/", web::post().to(receive_push::<C, S>))
            .app_data(prometheus_handle.clone())
            .app_data(handler.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use bq_gcs::test_utils::MemorySecretStore;
    use bq_gcs_config::{ConfigSources, load_config_from};

    use super::*;

    const DSN: &str = "https://key@sentry.example/1";

    fn config(variables: &[(&str, &str)]) -> FunctionConfig {
        let required = [
            ("BUCKET", "exports"),
            ("ENTITY", "acme"),
            ("ENVIRONMENT", "test"),
            ("PROJECT", "runner"),
        ];

        let variables = required
            .iter()
            .chain(variables)
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        load_config_from(ConfigSources::from_variables(variables)).unwrap()
    }

    fn secrets(store: MemorySecretStore) -> SecretCache<MemorySecretStore> {
        SecretCache::new(store, "runner".to_string(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn blank_sentry_dsn_disables_sentry() {
        let config = config(&[("SENTRY_DSN", "")]);
        let store = MemorySecretStore::new();

        let dsn = sentry_dsn(&config, &secrets(store.clone())).await.unwrap();
        let guard = crate::sentry::init(&config, "bq-gcs@test", dsn).unwrap();

        assert!(guard.is_none());
        assert_eq!(store.access_count(), 0);
    }

    #[tokio::test]
    async fn blank_sentry_dsn_falls_back_to_the_secret() {
        let config = config(&[("SENTRY_DSN", " "), ("SENTRY_DSN_SECRET", "sentry-dsn")]);
        let store = MemorySecretStore::new().with_secret("runner", "sentry-dsn", DSN);

        let dsn = sentry_dsn(&config, &secrets(store.clone())).await.unwrap();

        assert_eq!(dsn.unwrap().expose_secret(), DSN);
        assert_eq!(store.access_count(), 1);
    }

    #[tokio::test]
    async fn configured_sentry_dsn_skips_secret_manager() {
        let config = config(&[("SENTRY_DSN", DSN), ("SENTRY_DSN_SECRET", "sentry-dsn")]);
        let store = MemorySecretStore::new();

        let dsn = sentry_dsn(&config, &secrets(store.clone())).await.unwrap();

        assert_eq!(dsn.unwrap().expose_secret(), DSN);
        assert_eq!(store.access_count(), 0);
    }
}
