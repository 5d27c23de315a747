//! bq-gcs function service binary.
//!
//! Loads configuration, initializes tracing and serves Pub/Sub push deliveries until stopped.

use std::sync::Once;

use bq_gcs_config::Environment;
use bq_gcs_config::shared::FunctionConfig;
use bq_gcs_function::config::load_function_config;
use bq_gcs_function::error::{FunctionError, FunctionResult};
use bq_gcs_function::startup::Application;
use bq_gcs_telemetry::tracing::init_tracing;
use tracing::error;

/// Ensures crypto provider is only initialized once.
static INIT_CRYPTO: Once = Once::new();

/// Installs the default cryptographic provider for rustls.
///
/// Cargo's feature unification enables both the ring and aws-lc-rs backends, so the provider
/// must be chosen explicitly before any TLS operation.
fn install_crypto_provider() {
    INIT_CRYPTO.call_once(|| {
        if rustls::crypto::aws_lc_rs::default_provider()
            .install_default()
            .is_err()
        {
            eprintln!("a rustls crypto provider was already installed");
        }
    });
}

fn main() {
    if let Err(err) = try_main() {
        eprint!("{}", err.render_report());
        std::process::exit(1);
    }
}

fn try_main() -> FunctionResult<()> {
    install_crypto_provider();

    let config = load_function_config()?;
    let environment =
        Environment::try_from(config.environment.clone()).map_err(FunctionError::config)?;

    // Initialize tracing from the binary name
    let _log_flusher =
        init_tracing(env!("CARGO_BIN_NAME"), &environment).map_err(FunctionError::config)?;

    // We start the runtime.
    actix_web::rt::System::new().block_on(async_main(config))
}

async fn async_main(config: FunctionConfig) -> FunctionResult<()> {
    let application = match Application::build(config).await {
        Ok(application) => application,
        Err(err) => {
            error!("{err}");
            return Err(err);
        }
    };

    application.run_until_stopped().await?;

    Ok(())
}
