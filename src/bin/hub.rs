use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use fleet_monitoring::{
    actors::{
        broadcast::{Broadcaster, spawn_heartbeat},
        collector::{CollectorHandle, CollectorSettings},
    },
    alerts::AlertManager,
    config::{Config, read_config_file},
    monitors::{session::SessionExecutor, ssh::SshConnector},
    storage::{StorageBackend, open_backend},
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: String,

    /// Log level for the hub (trace, debug, info, warn, error)
    #[arg(long, default_value = "trace")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("fleet_monitoring", level),
        ("fleet_hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let store = open_backend(&config.storage)
        .await
        .context("failed to open storage backend")?;

    register_targets(store.as_ref(), &config).await?;

    let executor = SessionExecutor::from_config(Arc::new(SshConnector::new()), &config.collection);
    let notifier = config
        .notify
        .clone()
        .map(AlertManager::new)
        .transpose()
        .context("failed to build the notification client")?;
    let broadcaster = Broadcaster::default();

    let collector = CollectorHandle::spawn(
        CollectorSettings::from_config(&config),
        store.clone(),
        executor,
        notifier,
        broadcaster.clone(),
    );

    let heartbeat = spawn_heartbeat(
        broadcaster.clone(),
        Duration::from_secs(config.heartbeat_secs),
    );

    #[cfg(feature = "api")]
    {
        use fleet_monitoring::api::{ApiConfig, ApiState, spawn_api_server};

        if let Some(settings) = &config.api {
            let state = ApiState::new(
                store.clone(),
                broadcaster.clone(),
                collector.clone(),
                config.stats_window(),
            );
            let addr = spawn_api_server(ApiConfig::from(settings), state).await?;
            info!("viewer API available at http://{addr}/api/v1");
        }
    }

    info!(
        "monitoring {} targets every {}s",
        config.targets.len(),
        config.collection.interval_secs
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");

    if let Err(e) = collector.shutdown().await {
        warn!("collector did not shut down cleanly: {e}");
    }
    heartbeat.abort();

    if let Err(e) = store.close().await {
        error!("failed to close storage: {e}");
    }

    Ok(())
}

/// Upsert every configured target.
///
/// Targets registered through the API are not in the file and stay.
async fn register_targets(store: &dyn StorageBackend, config: &Config) -> anyhow::Result<()> {
    let mut configured = HashSet::new();

    for target_config in &config.targets {
        let target = store
            .register_target(target_config)
            .await
            .with_context(|| format!("failed to register target {}", target_config.name))?;
        debug!("registered {}", target.display());
        configured.insert(target.id);
    }

    for target in store.list_targets().await? {
        if !configured.contains(&target.id) {
            info!("keeping {} (registered at runtime)", target.display());
        }
    }

    Ok(())
}
