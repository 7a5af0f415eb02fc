//! Label watcher CLI entrypoint: performs one watch run and exits.

use std::io;
use std::process::ExitCode;

use chrono::Utc;
use label_watcher::telemetry::StderrJsonlTelemetrySink;
use label_watcher::{
    FileStateStore, LabelWatcher, LogNotifier, Notifier, OutboxNotifier, ReqwestGraphQlGateway,
    StateStore, WatchError, WatchService, WatcherConfig,
};
use ortho_config::OrthoConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "watch run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("label_watcher=info"));
    let _ignored = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

async fn run() -> Result<(), WatchError> {
    let config = load_config()?;
    let repositories = config.watched_repositories()?;
    config.print_configuration(&repositories);

    let token = config.resolve_token()?;
    let gateway =
        ReqwestGraphQlGateway::for_token(&token, &config.api_url, config.request_timeout())?;
    let notifier: Box<dyn Notifier> = match &config.outbox_dir {
        Some(directory) => Box::new(OutboxNotifier::new(directory.as_str())),
        None => Box::new(LogNotifier),
    };
    let telemetry = StderrJsonlTelemetrySink;
    let service = WatchService::new(
        LabelWatcher::new(&gateway, repositories, config.watch_settings()),
        notifier.as_ref(),
        &telemetry,
        config.reconcile_policy(),
    );

    let store = FileStateStore::new(config.state_path.as_str());
    let mut state = store.load()?;
    let summary = service
        .find_and_notify(&mut state, config.run_mode(), Utc::now())
        .await?;
    if summary.produced_results {
        store.save(&state)?;
    }
    tracing::info!(
        mode = %summary.mode,
        fetched = summary.fetched_items,
        new = summary.new_items,
        complete = summary.complete,
        notified = summary.notified,
        "watch run finished"
    );
    Ok(())
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`WatchError::Configuration`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<WatcherConfig, WatchError> {
    WatcherConfig::load().map_err(|error| WatchError::Configuration {
        message: error.to_string(),
    })
}
