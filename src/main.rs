use std::sync::Arc;

use tracing::info;

use slotbook::clock::SystemClock;
use slotbook::config::Config;
use slotbook::directory::StaticDirectory;
use slotbook::engine::Engine;
use slotbook::sweeper;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    slotbook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let directory = StaticDirectory::load(&config.directory_path)?;
    info!(
        "directory: {} doctors, {} clinics",
        directory.doctor_count(),
        directory.clinic_count()
    );

    let engine = Arc::new(Engine::new(
        config.wal_path(),
        Arc::new(directory),
        Arc::new(SystemClock),
        config.engine,
    )?);

    info!("slotbook started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  utc_offset: {}", config.engine.utc_offset);
    info!("  sweep_interval: {:?}", config.sweep_interval);
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let sweeper = tokio::spawn(sweeper::run_sweeper(engine.clone(), config.sweep_interval));
    let compactor = tokio::spawn(sweeper::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.sweep_interval,
    ));

    shutdown_signal().await?;
    info!("shutdown signal received, stopping background tasks");
    sweeper.abort();
    compactor.abort();

    // Leave the log and the statuses current for the next start.
    let report = engine.sweep_statuses(engine.clock().now()).await?;
    info!(
        "final sweep: {} started, {} completed",
        report.started, report.completed
    );
    engine.compact_wal().await?;

    info!("slotbook stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
