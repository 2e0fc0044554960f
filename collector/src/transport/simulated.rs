//! Simulated transport
//!
//! Behaves like a device publishing on a local broker: the generator's
//! samples arrive as wire-format payloads on the inbound channel, and
//! publishes to the subscribed topic are echoed back in order.

use crate::error::{LiikeError, Result};
use crate::simulate::{SimulationConfig, SimulationGenerator};
use crate::transport::{INBOUND_CAPACITY, Inbound, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Transport backed by the simulation generator
pub struct SimulatedTransport {
    topic: String,
    generator: SimulationGenerator,
    /// Sender side of the current inbound channel, shared with the generator
    inbound: Mutex<Option<mpsc::Sender<Bytes>>>,
}

impl SimulatedTransport {
    /// Create a simulated transport publishing on `topic`
    pub fn new(topic: impl Into<String>, config: SimulationConfig) -> Result<Self> {
        Ok(Self {
            topic: topic.into(),
            generator: SimulationGenerator::new(config)?,
            inbound: Mutex::new(None),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_running(&self) -> bool {
        self.generator.is_running()
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn open(&mut self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<Inbound> {
        // Replacing the channel stops delivery to the old one
        self.generator.stop().await;

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        *self.inbound.lock() = Some(tx.clone());

        self.generator.start(move |sample| match tx.try_send(sample.to_json()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Simulated inbound channel full, sample dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        })?;

        debug!(topic = %self.topic, "Simulated subscription active");
        Ok(rx)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        if topic != self.topic {
            debug!(topic = %topic, bytes = payload.len(), "Simulated publish discarded");
            return Ok(());
        }

        let tx = self.inbound.lock().clone();
        match tx {
            Some(tx) => tx.send(payload).await.map_err(|_| LiikeError::Publish {
                reason: "simulated subscription closed".to_string(),
            }),
            None => Err(LiikeError::Publish {
                reason: "not subscribed".to_string(),
            }),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.generator.stop().await;
        self.inbound.lock().take();
        Ok(())
    }
}
