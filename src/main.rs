use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use hotelplan::autosave;
use hotelplan::config::PlannerConfig;
use hotelplan::planner::Planner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    hotelplan::observability::init_tracing();

    let config = PlannerConfig::from_env();
    hotelplan::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let planner = Arc::new(Planner::open(&config).await?);
    let resources = planner.resources().await.len();
    let events = planner.list_events().await.len();

    info!("hotelplan ready");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  catalog: {} ({resources} resources)", config.catalog_path().display());
    info!("  events: {} ({events} events)", config.events_path().display());
    info!(
        "  autosave: {}",
        config
            .autosave_interval
            .map_or("disabled".to_string(), |d| format!("every {}s", d.as_secs()))
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let autosaver = config
        .autosave_interval
        .map(|every| autosave::spawn(planner.clone(), every));

    shutdown_signal().await?;
    info!("shutdown signal received");

    if let Some(handle) = autosaver {
        handle.abort();
    }

    // Final save, bounded so a stuck disk does not hang shutdown
    if planner.is_dirty().await {
        match tokio::time::timeout(Duration::from_secs(10), planner.save_snapshot()).await {
            Ok(Ok(n)) => info!("saved {n} events"),
            Ok(Err(e)) => tracing::error!("final save failed: {e}"),
            Err(_) => tracing::warn!("final save timed out"),
        }
    }

    info!("hotelplan stopped");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = ctrl_c => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}
