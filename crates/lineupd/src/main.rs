use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod service;

use config::{BusKind, Config};
use dbus_interface::{LineupInterface, BUS_NAME, OBJECT_PATH};
use service::IdentifyService;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("lineupd starting");

    let config = Config::from_env();
    tracing::info!(
        gallery = %config.gallery_dir.display(),
        db = %config.db_path.display(),
        uploads = %config.upload_dir.display(),
        threshold = config.distance_threshold,
        metric = ?config.metric,
        concurrency = config.compare_concurrency,
        "configuration loaded"
    );

    let service = IdentifyService::from_config(&config).context("failed to initialize service")?;
    tracing::info!(policy = ?service.policy(), "identification service ready");

    let builder = match config.bus {
        BusKind::System => zbus::connection::Builder::system()?,
        BusKind::Session => zbus::connection::Builder::session()?,
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, LineupInterface::new(service.clone()))?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "lineupd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("lineupd shutting down");
    service.shutdown();

    Ok(())
}
