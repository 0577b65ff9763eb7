use clap::Parser;
use http::header::HeaderValue;
use intake::api::{self, AppState};
use intake::audience::AudienceProvider;
use intake::config::Config;
use intake::dispatch::Dispatcher;
use intake::mailer::Notifier;
use intake::secrets::{HttpParameterStore, SecretProvider};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(about = "Backend request-handling service for the marketing site")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] intake::config::ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not install metrics recorder: {0}")]
    Metrics(String),
    #[error("allowed_origin is not a valid header value")]
    InvalidOrigin,
    #[error(transparent)]
    Api(#[from] api::ApiError),
}

fn main() -> Result<(), StartupError> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Guard must stay alive for the lifetime of the process.
    let _sentry_guard = config.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    if let Some(metrics_config) = &config.metrics {
        let recorder = metrics_exporter_statsd::StatsdBuilder::from(
            &metrics_config.statsd_host,
            metrics_config.statsd_port,
        )
        .build(Some("intake"))
        .map_err(|err| StartupError::Metrics(err.to_string()))?;
        metrics::set_global_recorder(recorder)
            .map_err(|err| StartupError::Metrics(err.to_string()))?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), StartupError> {
    let store = Arc::new(HttpParameterStore::new(config.parameter_store.url.clone()));
    let secrets = Arc::new(SecretProvider::new(store));

    let notifier = Arc::new(Notifier::new(
        secrets.clone(),
        &config.mailer,
        &config.notifications,
    ));
    let audience = Arc::new(AudienceProvider::new(
        secrets,
        config.audience.api_base.clone(),
    ));

    let origin = HeaderValue::from_str(&config.allowed_origin)
        .map_err(|_| StartupError::InvalidOrigin)?;
    let dispatcher = Arc::new(Dispatcher::new(
        config.shared_token.clone(),
        origin,
        notifier.clone(),
    ));

    let state = AppState {
        dispatcher,
        audience,
        notifier,
    };

    api::serve(&config.listener, state).await?;
    Ok(())
}
