use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use courtside::config::Config;
use courtside::dispatch::LogDispatcher;
use courtside::engine::Engine;
use courtside::sweeper::{Sweeper, run_compactor, run_sweeper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    courtside::observability::init(config.metrics_port);

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let engine = Arc::new(Engine::open(config.wal_path())?);
    for number in 1..=config.courts {
        if engine.registry().get(number).is_err() {
            engine
                .provision_court(number, format!("Court {number}"), None)
                .await?;
        }
    }

    let sweeper = Arc::new(Sweeper::new(
        engine.clone(),
        Arc::new(LogDispatcher),
        config.reminder_window,
    ));
    let (stop, shutdown) = watch::channel(false);
    let sweep_task = tokio::spawn(run_sweeper(sweeper, config.sweep_interval, shutdown.clone()));
    let compact_task = tokio::spawn(run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.sweep_interval,
        shutdown,
    ));

    info!("courtside running");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  courts: {}", engine.registry().len());
    info!("  sweep every {}s, reminders {} min ahead", config.sweep_interval.as_secs(), config.reminder_window.as_secs() / 60);
    info!("  max booking: {} min", config.max_booking.as_secs() / 60);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Run until SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }

    // Let an in-flight sweep finish before exiting
    info!("shutdown signal received");
    let _ = stop.send(true);
    let _ = tokio::join!(sweep_task, compact_task);
    info!("courtside stopped");
    Ok(())
}
