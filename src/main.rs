use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

mod alert;
mod analytics;
mod api;
mod camera;
mod config;
mod display;
mod monitor;
mod zone;

use alert::{AlertDispatcher, AlertHistory, AlertSink, CommandSink, LogSink};
use api::AppState;
use config::Config;
use display::{Display, FrameStore, JpegDisplay};
use monitor::{Monitor, MonitorStats};
use zone::{ZoneEditor, ZoneRect};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("speedzone=debug".parse()?))
        .init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            return Err(e.into());
        }
    };
    tracing::info!(url = %config.source.url, "loaded config");

    let zone = ZoneEditor::shared(ZoneRect::from(config.zone));
    let frames = FrameStore::new();
    let history = AlertHistory::new(config.alert.history);
    let stats = Arc::new(MonitorStats::default());

    let mut sinks: Vec<Box<dyn AlertSink>> = vec![Box::new(LogSink), Box::new(history.clone())];
    if let Some(command) = &config.alert.command {
        match CommandSink::new(command) {
            Some(sink) => sinks.push(Box::new(sink)),
            None => tracing::warn!("alert.command is empty, ignoring"),
        }
    }

    let display: Option<Box<dyn Display>> = if config.display.enabled {
        Some(Box::new(JpegDisplay::new(
            frames.clone(),
            Duration::from_millis(config.display.min_interval_ms),
            config.display.jpeg_quality,
        )))
    } else {
        None
    };

    let monitor = Monitor::new(
        &config,
        Arc::clone(&zone),
        AlertDispatcher::new(sinks),
        display,
        Arc::clone(&stats),
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut monitor_handle =
        monitor::spawn_monitor(monitor, config.source.clone(), Arc::clone(&shutdown));

    let server_handle = if config.http.enabled {
        let state = AppState::new(Arc::clone(&zone), frames, history, stats);
        let port = config.http.port;
        Some(tokio::spawn(async move {
            if let Err(e) = api::start_server(state, port).await {
                tracing::error!(error = %e, "HTTP server failed");
            }
        }))
    } else {
        None
    };

    let finished = tokio::select! {
        result = &mut monitor_handle => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    let result = match finished {
        Some(result) => result,
        None => {
            tracing::info!("shutdown signal received");
            shutdown.store(true, Ordering::Relaxed);
            monitor_handle.await
        }
    };

    if let Some(handle) = server_handle {
        handle.abort();
    }

    match result {
        Ok(Ok(summary)) => {
            tracing::info!(
                frames = summary.frames,
                alerts = summary.alerts,
                reason = ?summary.reason,
                "shutdown complete"
            );
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "monitor failed");
            Err(e.into())
        }
        Err(e) => {
            tracing::error!(error = %e, "monitor task failed");
            Err(e.into())
        }
    }
}
