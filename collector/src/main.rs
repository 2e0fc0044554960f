//! LIIKE Collector - records one activity session from a motion sensor
//!
//! ## Usage
//!
//! ```bash
//! # Record 10s of simulated data and print it
//! cargo run
//!
//! # Record 30s of "sitting" from a broker, POST it to a webhook
//! LIIKE_BROKER_URL=mqtt://broker.local LIIKE_ACTIVITY=sitting LIIKE_RECORD_SECS=30 \
//!   LIIKE_SAVE_URL=https://api.example.com/recordings cargo run
//! ```
//!
//! ## Environment Variables
//!
//! - `LIIKE_BROKER_URL`: broker address; unset streams simulated data
//! - `LIIKE_TOPIC`: subscription topic (default: "esp32/sensor_data")
//! - `LIIKE_ACTIVITY`: activity label to record (default: "walking")
//! - `LIIKE_RECORD_SECS`: recording length (default: 10)
//! - `LIIKE_SAVE_URL`: webhook for the finished recording (default: stdout)
//! - `LIIKE_METRICS_ADDR`: Prometheus endpoint address (default: disabled)
//! - `LIIKE_LOG_LEVEL`: log level (default: "info")
//! - `LIIKE_LOG_FORMAT`: "pretty" or "json" (default: "pretty")

use liike_collector::config::{Config, LogFormat};
use liike_collector::metrics::Metrics;
use liike_collector::metrics_server::MetricsServer;
use liike_collector::recorder::RecordingController;
use liike_collector::store::{SampleStore, StdoutStore, WebhookStore};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);

    info!(
        broker = config
            .broker
            .as_ref()
            .map(|b| b.broker_url.as_str())
            .unwrap_or("none (simulated)"),
        activity = %config.activity,
        record_secs = config.record_duration.as_secs(),
        window_capacity = config.window_capacity,
        "Starting LIIKE collector"
    );

    let store: Arc<dyn SampleStore> = match &config.save_url {
        Some(url) => Arc::new(WebhookStore::new(url)?),
        None => Arc::new(StdoutStore::new()),
    };
    if store.health().await {
        info!(store = store.name(), "Recordings will be saved");
    } else {
        warn!(store = store.name(), "Store is not reachable, saving may fail");
    }

    let controller = Arc::new(RecordingController::from_config(&config, store));

    let metrics_handle = match config.metrics_addr {
        Some(addr) => {
            Metrics::init()?;
            Some(MetricsServer::start(addr, Arc::clone(&controller)))
        }
        None => None,
    };

    controller.start(&config.activity).await?;

    let status = controller.connection();
    if status.simulated() {
        warn!(source = ?status.source, "Streaming simulated data");
    }

    let mut collected = controller.watch_collected();
    let deadline = tokio::time::sleep(config.record_duration);
    let shutdown = shutdown_signal();
    tokio::pin!(deadline, shutdown);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Recording time elapsed");
                break;
            }
            _ = &mut shutdown => break,
            changed = collected.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(latest) = controller.latest().await {
                    let a = latest.acceleration();
                    let g = latest.gyroscope();
                    info!(
                        total = *collected.borrow(),
                        acc = %format!("({:.2}, {:.2}, {:.2})", a.x, a.y, a.z),
                        gyro = %format!("({:.2}, {:.2}, {:.2})", g.x, g.y, g.z),
                        "Sample"
                    );
                }
            }
        }
    }

    controller.stop().await?;
    match controller.save().await {
        Ok(recording) => info!(
            recording = %recording.id,
            samples = recording.len(),
            "Recording saved"
        ),
        Err(e) => warn!(error = %e, "Nothing saved"),
    }
    controller.shutdown().await?;

    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    info!("LIIKE collector shutdown complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
