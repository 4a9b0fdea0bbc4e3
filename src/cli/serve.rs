//! CLI `serve` command: run the engine in the foreground.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use nudge::config::NudgeConfig;
use nudge::notify::channel::LogChannel;
use nudge::Engine;

/// Open the database, start the engine, and run until Ctrl-C or SIGTERM.
pub async fn serve(config: NudgeConfig) -> Result<()> {
    let conn = super::open(&config)?;
    let db = nudge::db::shared(conn);

    let mut builder = Engine::builder(db, config.clone());
    for kind in &config.notifications.channels {
        builder = builder.channel(Arc::new(LogChannel::new(*kind)));
    }
    let engine = builder.build();

    let timers = engine.start().await.context("failed to start engine")?;
    info!(
        timers,
        sweep_secs = config.scheduler.sweep_interval_secs,
        "nudge engine running"
    );

    wait_for_signal().await;
    engine.shutdown().await;
    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                let _ = ctrl_c.await;
                info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received Ctrl-C, shutting down");
    }
}
