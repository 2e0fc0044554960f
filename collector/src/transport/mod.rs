//! Transport system for LIIKE
//!
//! A transport owns one publish/subscribe connection and hands inbound raw
//! payloads to the client over a single-consumer channel, in arrival order.
//!
//! Two variants exist:
//! - [`MqttTransport`]: a real broker connection
//! - [`SimulatedTransport`]: synthetic device data, used when no broker is
//!   configured or reachable
//!
//! # Lifecycle
//!
//! ```text
//! open ──► subscribe ──► (payloads flow) ──► disconnect
//!   │          │
//!   ▼          ▼
//! Connect   Subscribe      errors; the caller tears down with disconnect
//! ```

pub mod mqtt;
pub mod simulated;

use crate::config::BrokerConfig;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

pub use mqtt::{MqttFactory, MqttTransport};
pub use simulated::SimulatedTransport;

/// Capacity of the raw inbound channel between a transport and the client
pub const INBOUND_CAPACITY: usize = 1024;

/// Receiving side of a transport's inbound payload channel
pub type Inbound = mpsc::Receiver<Bytes>;

/// Transport trait - one publish/subscribe connection
///
/// # Example
///
/// ```ignore
/// struct SerialTransport {
///     port: SerialPort,
/// }
///
/// #[async_trait]
/// impl Transport for SerialTransport {
///     fn name(&self) -> &'static str { "serial" }
///
///     async fn open(&mut self) -> Result<()> {
///         self.port.open().await.map_err(|e| LiikeError::Connect { reason: e.to_string() })
///     }
///
///     async fn subscribe(&mut self) -> Result<Inbound> {
///         Ok(self.port.lines())
///     }
///
///     async fn publish(&self, _topic: &str, payload: Bytes) -> Result<()> {
///         self.port.write(&payload).await.map_err(|e| LiikeError::Publish { reason: e.to_string() })
///     }
///
///     async fn disconnect(&mut self) -> Result<()> {
///         self.port.close().await;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for identification and logging
    fn name(&self) -> &'static str;

    /// Open the underlying connection
    ///
    /// Resolves once the remote end acknowledges the connection.
    /// Fails with `LiikeError::Connect`.
    async fn open(&mut self) -> Result<()>;

    /// Subscribe to the configured topic and start delivery
    ///
    /// Returns the inbound channel. Each call replaces the previous channel;
    /// payloads are never duplicated across channels. Fails with
    /// `LiikeError::Subscribe`, leaving the connection open but unusable.
    async fn subscribe(&mut self) -> Result<Inbound>;

    /// Open and subscribe in one step
    async fn connect(&mut self) -> Result<Inbound> {
        self.open().await?;
        self.subscribe().await
    }

    /// Publish a payload, best-effort
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Close the connection
    ///
    /// Idempotent. After it returns no further payloads are delivered.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Builds live transports from broker settings
///
/// The client calls this once per connect attempt so no connection state
/// survives between sessions.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &BrokerConfig) -> Result<Box<dyn Transport>>;
}

impl<F> TransportFactory for F
where
    F: Fn(&BrokerConfig) -> Result<Box<dyn Transport>> + Send + Sync,
{
    fn create(&self, config: &BrokerConfig) -> Result<Box<dyn Transport>> {
        self(config)
    }
}
