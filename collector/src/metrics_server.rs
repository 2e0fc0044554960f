//! HTTP server for metrics scraping and collector status
//!
//! - `/metrics`: Prometheus text format
//! - `/health`: JSON status of the recording controller, its client and its
//!   store. Answers 503 when the client has failed or the store is unhealthy.
//!
//! # Example
//!
//! ```ignore
//! use liike_collector::metrics_server::MetricsServer;
//!
//! let controller = Arc::new(RecordingController::from_config(&config, store));
//! let metrics_handle = MetricsServer::start("0.0.0.0:9090".parse()?, Arc::clone(&controller));
//!
//! // Later, to shutdown
//! metrics_handle.abort();
//! ```

use crate::client::ConnectionState;
use crate::recorder::RecordingController;
use axum::extract::State;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Metrics HTTP server
pub struct MetricsServer;

impl MetricsServer {
    /// Start the server on `addr`, reporting on `controller`
    ///
    /// Returns a JoinHandle that can be used to abort the server.
    pub fn start(addr: SocketAddr, controller: Arc<RecordingController>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(%addr, "Metrics server starting");

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    error!(error = %e, %addr, "Failed to bind metrics server");
                    return;
                }
            };

            if let Err(e) = axum::serve(listener, router(controller)).await {
                error!(error = %e, "Metrics server error");
            }
        })
    }
}

/// Body of `/health`
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub recording: String,
    pub activity: Option<String>,
    pub connection: ConnectionState,
    pub simulated: bool,
    pub collected: usize,
    pub total_collected: u64,
    pub store: &'static str,
    pub store_healthy: bool,
}

impl HealthReport {
    /// Snapshot the controller and probe its store
    pub async fn collect(controller: &RecordingController) -> Self {
        let status = controller.connection();
        let store_healthy = controller.store().health().await;
        Self {
            healthy: store_healthy && status.state != ConnectionState::Failed,
            recording: controller.state().await.to_string(),
            activity: controller.activity().await,
            connection: status.state,
            simulated: status.simulated(),
            collected: controller.collected().await,
            total_collected: controller.total_collected().await,
            store: controller.store().name(),
            store_healthy,
        }
    }
}

fn router(controller: Arc<RecordingController>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(controller)
}

async fn metrics_handler() -> impl IntoResponse {
    let body = crate::metrics::gather();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

async fn health_handler(State(controller): State<Arc<RecordingController>>) -> impl IntoResponse {
    let report = HealthReport::collect(&controller).await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
