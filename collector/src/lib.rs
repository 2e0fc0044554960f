//! LIIKE - Motion-Sensor Telemetry Collector
//!
//! Ingests accelerometer and gyroscope samples from a device over MQTT,
//! keeps a live window of the most recent readings and drives an
//! operator-controlled record/stop/save workflow. When no broker is
//! configured or reachable the collector streams simulated samples instead.
//!
//! # Architecture
//!
//! ```text
//! Transport (MQTT | simulated) ──► TelemetryClient (decode) ──► RecordingController
//!                                                                 │        │
//!                                                          live window   log ──► SampleStore
//! ```
//!
//! Transports and stores are pluggable via traits.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod metrics_server;
pub mod recorder;
pub mod sample;
pub mod simulate;
pub mod store;
pub mod transport;
pub mod window;

pub use client::{
    ClientOptions, ClientStats, ClientStatus, ConnectionState, DataSource, SampleStream,
    SimulationReason, TelemetryClient,
};
pub use config::{BrokerConfig, Config};
pub use error::{DecodeError, LiikeError, Result};
pub use recorder::{RecordingController, RecordingState};
pub use sample::{SensorSample, Vector3};
pub use store::{MemoryStore, Recording, SampleStore, StdoutStore, WebhookStore};
pub use transport::{MqttTransport, SimulatedTransport, Transport, TransportFactory};
pub use window::SampleWindow;
