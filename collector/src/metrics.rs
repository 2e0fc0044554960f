//! Prometheus metrics for LIIKE

use crate::client::ConnectionState;
use crate::error::{LiikeError, Result};
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, TextEncoder, register_counter, register_counter_vec,
    register_gauge,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All LIIKE metrics
pub struct Metrics {
    /// Raw messages received (by source: live, simulated)
    pub samples_received: CounterVec,

    /// Messages dropped by the decoder
    pub decode_failures: Counter,

    /// Samples pushed out of the live window
    pub window_evictions: Counter,

    /// Samples in the current recording log
    pub samples_collected: Gauge,

    /// Save attempts (by store, outcome)
    pub recordings_saved: CounterVec,

    /// Client connection state, as `ConnectionState::ordinal`
    pub connection_state: Gauge,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            samples_received: register_counter_vec!(
                "liike_samples_received_total",
                "Total raw sensor messages received",
                &["source"]
            )
            .map_err(|e| LiikeError::Metrics(format!("samples_received: {e}")))?,

            decode_failures: register_counter!(
                "liike_decode_failures_total",
                "Total messages dropped by the decoder"
            )
            .map_err(|e| LiikeError::Metrics(format!("decode_failures: {e}")))?,

            window_evictions: register_counter!(
                "liike_window_evictions_total",
                "Total samples evicted from the live window"
            )
            .map_err(|e| LiikeError::Metrics(format!("window_evictions: {e}")))?,

            samples_collected: register_gauge!(
                "liike_samples_collected",
                "Samples in the current recording log"
            )
            .map_err(|e| LiikeError::Metrics(format!("samples_collected: {e}")))?,

            recordings_saved: register_counter_vec!(
                "liike_recordings_saved_total",
                "Recording save attempts",
                &["store", "outcome"]
            )
            .map_err(|e| LiikeError::Metrics(format!("recordings_saved: {e}")))?,

            connection_state: register_gauge!(
                "liike_connection_state",
                "Client connection state (0 = disconnected … 6 = failed)"
            )
            .map_err(|e| LiikeError::Metrics(format!("connection_state: {e}")))?,
        };

        // Only the first caller wins
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| LiikeError::Metrics("Failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    pub fn record_received(&self, source: &str) {
        self.samples_received.with_label_values(&[source]).inc();
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.inc();
    }

    pub fn record_evictions(&self, count: u64) {
        self.window_evictions.inc_by(count as f64);
    }

    pub fn set_samples_collected(&self, count: usize) {
        self.samples_collected.set(count as f64);
    }

    /// Record a save attempt
    pub fn record_saved(&self, store: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.recordings_saved
            .with_label_values(&[store, outcome])
            .inc();
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.connection_state.set(f64::from(state.ordinal()));
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Helpers that record only if metrics were initialized
pub fn try_record_received(source: &str) {
    if let Some(m) = Metrics::get() {
        m.record_received(source);
    }
}

pub fn try_record_decode_failure() {
    if let Some(m) = Metrics::get() {
        m.record_decode_failure();
    }
}

pub fn try_record_evictions(count: u64) {
    if let Some(m) = Metrics::get() {
        m.record_evictions(count);
    }
}

pub fn try_set_samples_collected(count: usize) {
    if let Some(m) = Metrics::get() {
        m.set_samples_collected(count);
    }
}

pub fn try_record_saved(store: &str, ok: bool) {
    if let Some(m) = Metrics::get() {
        m.record_saved(store, ok);
    }
}

pub fn try_set_connection_state(state: ConnectionState) {
    if let Some(m) = Metrics::get() {
        m.set_connection_state(state);
    }
}
