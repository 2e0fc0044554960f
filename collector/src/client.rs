//! Telemetry client
//!
//! Owns one transport session at a time and turns its raw payloads into a
//! stream of decoded [`SensorSample`]s.
//!
//! # State machine
//!
//! ```text
//!                  ┌──────────── no broker / unreachable ────────────┐
//!                  │                                                 ▼
//! Disconnected ─► Connecting ─► Connected ─► Subscribing ─────► Streaming
//!      ▲               │                          │                  │
//!      │               └────────► Failed ◄────────┘◄── stream lost ──┤
//!      │                            │                                │
//!      └─────────── Disconnecting ◄─┴──────────── disconnect ────────┘
//! ```
//!
//! Transitions are serialized by the session lock: a second `connect` while
//! one is in flight fails with `Busy`.

use crate::config::{BrokerConfig, Config, DEFAULT_TOPIC};
use crate::decode::{JsonDecoder, SampleDecoder};
use crate::error::{LiikeError, Result};
use crate::metrics;
use crate::sample::SensorSample;
use crate::simulate::SimulationConfig;
use crate::transport::{Inbound, MqttFactory, SimulatedTransport, Transport, TransportFactory};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

/// Connection lifecycle of a [`TelemetryClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Streaming,
    Disconnecting,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Failed => "failed",
        }
    }

    /// Numeric value exported on the connection state gauge
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the client is streaming synthetic data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationReason {
    /// `connect` was called without a broker config
    NotConfigured,
    /// The broker could not be reached
    Unreachable { reason: String },
}

/// Where streamed samples come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Live,
    Simulated(SimulationReason),
}

impl DataSource {
    pub fn is_simulated(&self) -> bool {
        matches!(self, DataSource::Simulated(_))
    }

    fn label(&self) -> &'static str {
        match self {
            DataSource::Live => "live",
            DataSource::Simulated(_) => "simulated",
        }
    }
}

/// Snapshot published on every state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub state: ConnectionState,
    /// Set while a session exists
    pub source: Option<DataSource>,
}

impl ClientStatus {
    /// True when the active session streams synthetic data
    pub fn simulated(&self) -> bool {
        self.source.as_ref().is_some_and(DataSource::is_simulated)
    }
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            source: None,
        }
    }
}

/// Counters over the client's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Raw messages received from any transport
    pub received: u64,
    /// Samples handed to a stream
    pub delivered: u64,
    /// Messages dropped by the decoder
    pub decode_failures: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    delivered: AtomicU64,
    decode_failures: AtomicU64,
}

/// Client tuning
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub simulation: SimulationConfig,
    /// Stream simulated data when the broker is unreachable
    pub fallback_to_simulation: bool,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            fallback_to_simulation: true,
            connect_timeout: Duration::from_secs(5),
            disconnect_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&Config> for ClientOptions {
    fn from(config: &Config) -> Self {
        Self {
            simulation: config.simulation.clone(),
            fallback_to_simulation: config.fallback_to_simulation,
            connect_timeout: config.connect_timeout,
            disconnect_timeout: config.disconnect_timeout,
        }
    }
}

/// One connected transport plus the task pumping its payloads
struct Session {
    transport: Box<dyn Transport>,
    pump: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl Drop for Session {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.pump.abort();
    }
}

/// Decoded samples of one session
///
/// Ends when the session is disconnected, even if samples are still queued.
pub struct SampleStream {
    inner: UnboundedReceiverStream<SensorSample>,
    closed: Arc<AtomicBool>,
}

impl SampleStream {
    /// Next sample, or `None` once the session is over
    pub async fn next_sample(&mut self) -> Option<SensorSample> {
        self.next().await
    }
}

impl Stream for SampleStream {
    type Item = SensorSample;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed.load(Ordering::Acquire) {
            return Poll::Ready(None);
        }
        Pin::new(&mut this.inner).poll_next(cx)
    }
}

/// Telemetry ingestion client
///
/// Each instance is independent; nothing is shared between clients.
///
/// # Example
///
/// ```ignore
/// let client = TelemetryClient::new(ClientOptions::default());
/// let mut samples = client
///     .connect(Some(BrokerConfig::new("mqtt://broker.local", "esp32/sensor_data")))
///     .await?;
/// println!("simulated: {}", client.status().simulated());
/// while let Some(sample) = samples.next_sample().await {
///     println!("{:?}", sample.acceleration());
/// }
/// client.disconnect().await;
/// ```
pub struct TelemetryClient {
    options: ClientOptions,
    factory: Arc<dyn TransportFactory>,
    decoder: Arc<dyn SampleDecoder>,
    session: tokio::sync::Mutex<Option<Session>>,
    /// Cancels the connect attempt in flight
    cancel: Mutex<Option<watch::Sender<bool>>>,
    status: Arc<watch::Sender<ClientStatus>>,
    counters: Arc<Counters>,
}

impl TelemetryClient {
    /// Create a client that connects to real brokers over MQTT
    pub fn new(options: ClientOptions) -> Self {
        let factory = MqttFactory {
            connect_timeout: options.connect_timeout,
            disconnect_timeout: options.disconnect_timeout,
        };
        Self::with_factory(options, Arc::new(factory))
    }

    /// Create a client with a custom live transport factory
    pub fn with_factory(options: ClientOptions, factory: Arc<dyn TransportFactory>) -> Self {
        let (status, _) = watch::channel(ClientStatus::default());
        Self {
            options,
            factory,
            decoder: Arc::new(JsonDecoder),
            session: tokio::sync::Mutex::new(None),
            cancel: Mutex::new(None),
            status: Arc::new(status),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Decode payloads with `decoder` instead of the JSON wire format
    ///
    /// Applies to sessions started after the call.
    pub fn with_decoder(mut self, decoder: Arc<dyn SampleDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Current status snapshot
    pub fn status(&self) -> ClientStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    /// Watch status changes
    ///
    /// Intermediate states may be coalesced if the receiver falls behind.
    pub fn subscribe_status(&self) -> watch::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            received: self.counters.received.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
        }
    }

    /// Start a session and return its sample stream
    ///
    /// `None` streams simulated data. An unreachable broker also streams
    /// simulated data when fallback is enabled; any other failure resolves to
    /// `Disconnected` before the error is returned. A session that has
    /// `Failed` is torn down and replaced.
    pub async fn connect(&self, config: Option<BrokerConfig>) -> Result<SampleStream> {
        let mut session = self.session.try_lock().map_err(|_| LiikeError::Busy)?;
        if session.is_some() {
            if self.state() != ConnectionState::Failed {
                return Err(LiikeError::AlreadyConnected);
            }
            if let Some(stale) = session.take() {
                info!("Replacing failed session");
                self.close(stale).await;
            }
        }

        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        *self.cancel.lock() = Some(cancel_tx);
        self.transition(ConnectionState::Connecting, None);

        let outcome = tokio::select! {
            biased;
            _ = cancel_rx.changed() => Err(LiikeError::Cancelled),
            result = self.establish(config) => result,
        };
        self.cancel.lock().take();

        let (transport, inbound, source) = match outcome {
            Ok(established) => established,
            Err(e) => {
                match &e {
                    LiikeError::Config(_) | LiikeError::Cancelled => {
                        info!(error = %e, "Connect aborted");
                    }
                    _ => {
                        warn!(error = %e, "Connect failed");
                        self.transition(ConnectionState::Failed, None);
                    }
                }
                self.transition(ConnectionState::Disconnected, None);
                return Err(e);
            }
        };

        let closed = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump(
            inbound,
            tx,
            Arc::clone(&self.decoder),
            source.label(),
            Arc::clone(&closed),
            Arc::clone(&self.counters),
            Arc::clone(&self.status),
        ));

        info!(transport = transport.name(), source = source.label(), "Streaming");
        *session = Some(Session {
            transport,
            pump,
            closed: Arc::clone(&closed),
        });
        self.transition(ConnectionState::Streaming, Some(source));

        Ok(SampleStream {
            inner: UnboundedReceiverStream::new(rx),
            closed,
        })
    }

    async fn establish(
        &self,
        config: Option<BrokerConfig>,
    ) -> Result<(Box<dyn Transport>, Inbound, DataSource)> {
        let Some(config) = config else {
            info!("No broker configured, streaming simulated data");
            let mut transport = self.simulated(DEFAULT_TOPIC)?;
            let inbound = transport.connect().await?;
            return Ok((
                transport,
                inbound,
                DataSource::Simulated(SimulationReason::NotConfigured),
            ));
        };

        config.validate()?;
        let mut live = self.factory.create(&config)?;

        let opened = tokio::time::timeout(self.options.connect_timeout, live.open())
            .await
            .unwrap_or_else(|_| {
                Err(LiikeError::Connect {
                    reason: format!("timed out after {:?}", self.options.connect_timeout),
                })
            });

        if let Err(e) = opened {
            self.teardown(live.as_mut()).await;
            if self.options.fallback_to_simulation && matches!(e, LiikeError::Connect { .. }) {
                warn!(
                    broker = %config.broker_url,
                    error = %e,
                    "Broker unreachable, falling back to simulated data"
                );
                let mut transport = self.simulated(&config.topic)?;
                let inbound = transport.connect().await?;
                let reason = SimulationReason::Unreachable {
                    reason: e.to_string(),
                };
                return Ok((transport, inbound, DataSource::Simulated(reason)));
            }
            return Err(e);
        }

        self.transition(ConnectionState::Connected, Some(DataSource::Live));
        self.transition(ConnectionState::Subscribing, Some(DataSource::Live));

        match live.subscribe().await {
            Ok(inbound) => Ok((live, inbound, DataSource::Live)),
            Err(e) => {
                self.teardown(live.as_mut()).await;
                Err(e)
            }
        }
    }

    fn simulated(&self, topic: &str) -> Result<Box<dyn Transport>> {
        Ok(Box::new(SimulatedTransport::new(
            topic,
            self.options.simulation.clone(),
        )?))
    }

    /// Best-effort transport disconnect under the teardown bound
    async fn teardown(&self, transport: &mut dyn Transport) {
        let result =
            tokio::time::timeout(self.options.disconnect_timeout, transport.disconnect()).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(transport = transport.name(), error = %e, "Teardown failed"),
            Err(_) => warn!(
                transport = transport.name(),
                timeout_ms = self.options.disconnect_timeout.as_millis() as u64,
                "Teardown timed out"
            ),
        }
    }

    /// End the session
    ///
    /// Cancels a pending connect, stops the data source and waits for
    /// teardown within the configured bound. Always ends `Disconnected`;
    /// calling it again is a no-op.
    pub async fn disconnect(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            let _ = cancel.send(true);
        }

        let mut session = self.session.lock().await;
        if let Some(active) = session.take() {
            self.close(active).await;
        }
    }

    /// Stop the pump and the transport, ending `Disconnected`
    async fn close(&self, mut active: Session) {
        let source = self.status.borrow().source.clone();
        self.transition(ConnectionState::Disconnecting, source);

        active.closed.store(true, Ordering::Release);
        active.pump.abort();
        let _ = (&mut active.pump).await;

        self.teardown(active.transport.as_mut()).await;
        drop(active);

        self.transition(ConnectionState::Disconnected, None);
        info!("Disconnected");
    }

    /// Publish through the active transport
    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let session = self.session.lock().await;
        match session.as_ref() {
            Some(active) => active.transport.publish(topic, payload).await,
            None => Err(LiikeError::Publish {
                reason: "not connected".to_string(),
            }),
        }
    }

    fn transition(&self, state: ConnectionState, source: Option<DataSource>) {
        set_status(&self.status, state, source);
    }
}

fn set_status(
    status: &watch::Sender<ClientStatus>,
    state: ConnectionState,
    source: Option<DataSource>,
) {
    debug!(state = %state, "Connection state changed");
    status.send_modify(|s| {
        s.state = state;
        s.source = source;
    });
    metrics::try_set_connection_state(state);
}

/// Decode inbound payloads in arrival order and forward them to the stream
async fn pump(
    mut inbound: Inbound,
    samples: mpsc::UnboundedSender<SensorSample>,
    decoder: Arc<dyn SampleDecoder>,
    source: &'static str,
    closed: Arc<AtomicBool>,
    counters: Arc<Counters>,
    status: Arc<watch::Sender<ClientStatus>>,
) {
    while let Some(raw) = inbound.recv().await {
        counters.received.fetch_add(1, Ordering::Relaxed);
        metrics::try_record_received(source);

        match decoder.decode(&raw) {
            Ok(sample) => {
                if closed.load(Ordering::Acquire) {
                    return;
                }
                if samples.send(sample).is_ok() {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                metrics::try_record_decode_failure();
                warn!(
                    decoder = decoder.name(),
                    error = %e,
                    bytes = raw.len(),
                    "Dropping undecodable message"
                );
            }
        }
    }

    if !closed.load(Ordering::Acquire) {
        warn!(source, "Inbound stream ended unexpectedly");
        let current = status.borrow().source.clone();
        set_status(&status, ConnectionState::Failed, current);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::error::DecodeError;
    use crate::sample::Vector3;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Scriptable live transport
    #[derive(Clone, Default)]
    struct Script {
        fail_open: bool,
        hang_open: bool,
        fail_subscribe: bool,
        /// Sender feeding the current inbound channel
        feed: Arc<Mutex<Option<mpsc::Sender<Bytes>>>>,
        disconnects: Arc<AtomicUsize>,
    }

    struct FakeTransport(Script);

    #[async_trait]
    impl Transport for FakeTransport {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn open(&mut self) -> Result<()> {
            if self.0.hang_open {
                std::future::pending::<()>().await;
            }
            if self.0.fail_open {
                return Err(LiikeError::Connect {
                    reason: "connection refused".into(),
                });
            }
            Ok(())
        }

        async fn subscribe(&mut self) -> Result<Inbound> {
            if self.0.fail_subscribe {
                return Err(LiikeError::Subscribe {
                    topic: "t".into(),
                    reason: "not authorized".into(),
                });
            }
            let (tx, rx) = mpsc::channel(16);
            *self.0.feed.lock() = Some(tx);
            Ok(rx)
        }

        async fn publish(&self, _topic: &str, payload: Bytes) -> Result<()> {
            let tx = self.0.feed.lock().clone().unwrap();
            tx.send(payload).await.unwrap();
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<()> {
            self.0.disconnects.fetch_add(1, Ordering::SeqCst);
            self.0.feed.lock().take();
            Ok(())
        }
    }

    fn client(script: &Script, fallback: bool) -> TelemetryClient {
        let script = script.clone();
        let factory = move |_: &BrokerConfig| -> Result<Box<dyn Transport>> {
            Ok(Box::new(FakeTransport(script.clone())))
        };
        let options = ClientOptions {
            simulation: SimulationConfig::with_interval(Duration::from_millis(100)),
            fallback_to_simulation: fallback,
            connect_timeout: Duration::from_secs(60),
            ..ClientOptions::default()
        };
        TelemetryClient::with_factory(options, Arc::new(factory))
    }

    fn broker() -> BrokerConfig {
        BrokerConfig::new("mqtt://fake", "esp32/sensor_data")
    }

    fn payload(x: f64, ts: i64) -> Bytes {
        let v = Vector3::new(x, 0.0, 0.0);
        SensorSample::new(v, v, ts).unwrap().to_json()
    }

    async fn feed(script: &Script, raw: Bytes) {
        let tx = script.feed.lock().clone().unwrap();
        tx.send(raw).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_config_streams_simulated() {
        let client = client(&Script::default(), true);
        let mut samples = client.connect(None).await.unwrap();

        let status = client.status();
        assert_eq!(status.state, ConnectionState::Streaming);
        assert_eq!(
            status.source,
            Some(DataSource::Simulated(SimulationReason::NotConfigured))
        );
        assert!(status.simulated());

        let sample = samples.next_sample().await.unwrap();
        assert!((-10.0..=10.0).contains(&sample.gyroscope().z));

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_live_stream_in_order_and_skips_bad_messages() {
        let script = Script::default();
        let client = client(&script, true);
        let mut samples = client.connect(Some(broker())).await.unwrap();
        assert_eq!(client.status().source, Some(DataSource::Live));
        assert!(!client.status().simulated());

        feed(&script, payload(1.0, 1)).await;
        feed(&script, Bytes::from_static(b"{\"acceleration\":{}}")).await;
        feed(&script, Bytes::from_static(b"garbage")).await;
        feed(&script, payload(2.0, 2)).await;

        assert_eq!(samples.next_sample().await.unwrap().timestamp(), 1);
        assert_eq!(samples.next_sample().await.unwrap().timestamp(), 2);

        let stats = client.stats();
        assert_eq!(stats.received, 4);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.decode_failures, 2);

        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_falls_back_with_reason() {
        let script = Script {
            fail_open: true,
            ..Script::default()
        };
        let client = client(&script, true);
        let mut samples = client.connect(Some(broker())).await.unwrap();

        match client.status().source {
            Some(DataSource::Simulated(SimulationReason::Unreachable { reason })) => {
                assert!(reason.contains("connection refused"));
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert!(samples.next_sample().await.is_some());
        assert_eq!(script.disconnects.load(Ordering::SeqCst), 1);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_unreachable_without_fallback_fails() {
        let script = Script {
            fail_open: true,
            ..Script::default()
        };
        let client = client(&script, false);
        let err = client.connect(Some(broker())).await.err().unwrap();

        assert!(matches!(err, LiikeError::Connect { .. }));
        assert_eq!(client.status(), ClientStatus::default());
    }

    #[tokio::test]
    async fn test_subscribe_failure_tears_down_and_never_falls_back() {
        let script = Script {
            fail_subscribe: true,
            ..Script::default()
        };
        let client = client(&script, true);
        let err = client.connect(Some(broker())).await.err().unwrap();

        assert!(matches!(err, LiikeError::Subscribe { .. }));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(script.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_config_error() {
        let client = client(&Script::default(), true);
        let err = client
            .connect(Some(BrokerConfig::new("mqtt://fake", "")))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LiikeError::Config(_)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_concurrent_connect_is_busy_and_disconnect_cancels() {
        let script = Script {
            hang_open: true,
            ..Script::default()
        };
        let client = Arc::new(client(&script, true));
        let mut status = client.subscribe_status();

        let pending = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.connect(Some(broker())).await.map(|_| ()) })
        };
        status
            .wait_for(|s| s.state == ConnectionState::Connecting)
            .await
            .unwrap();

        let err = client.connect(None).await.err().unwrap();
        assert!(matches!(err, LiikeError::Busy));

        client.disconnect().await;
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(LiikeError::Cancelled)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_twice_is_already_connected() {
        let client = client(&Script::default(), true);
        let _samples = client.connect(None).await.unwrap();
        let err = client.connect(None).await.err().unwrap();
        assert!(matches!(err, LiikeError::AlreadyConnected));
        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent_and_ends_stream() {
        let client = client(&Script::default(), true);
        let mut samples = client.connect(None).await.unwrap();
        assert!(samples.next_sample().await.is_some());

        client.disconnect().await;
        assert_eq!(client.status(), ClientStatus::default());
        assert!(samples.next_sample().await.is_none());

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_runs_fresh_session() {
        let script = Script::default();
        let client = client(&script, true);

        let first = client.connect(None).await.unwrap();
        client.disconnect().await;
        drop(first);

        let mut second = client.connect(Some(broker())).await.unwrap();
        assert_eq!(client.status().source, Some(DataSource::Live));
        feed(&script, payload(3.0, 30)).await;
        assert_eq!(second.next_sample().await.unwrap().timestamp(), 30);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_lost_inbound_moves_to_failed() {
        let script = Script::default();
        let client = client(&script, true);
        let mut samples = client.connect(Some(broker())).await.unwrap();
        let mut status = client.subscribe_status();

        // Broker goes away without a disconnect
        script.feed.lock().take();
        assert!(samples.next_sample().await.is_none());
        status
            .wait_for(|s| s.state == ConnectionState::Failed)
            .await
            .unwrap();

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_replaces_failed_session() {
        let script = Script::default();
        let client = client(&script, true);
        let mut stale = client.connect(Some(broker())).await.unwrap();
        let mut status = client.subscribe_status();

        script.feed.lock().take();
        status
            .wait_for(|s| s.state == ConnectionState::Failed)
            .await
            .unwrap();

        let mut samples = client.connect(Some(broker())).await.unwrap();
        assert_eq!(client.state(), ConnectionState::Streaming);
        assert_eq!(script.disconnects.load(Ordering::SeqCst), 1);
        assert!(stale.next_sample().await.is_none());

        feed(&script, payload(7.0, 7)).await;
        assert_eq!(samples.next_sample().await.unwrap().timestamp(), 7);
        client.disconnect().await;
    }

    /// Reads `x,timestamp` lines
    struct CsvDecoder;

    impl SampleDecoder for CsvDecoder {
        fn name(&self) -> &'static str {
            "csv"
        }

        fn decode(&self, raw: &[u8]) -> std::result::Result<SensorSample, DecodeError> {
            let text = std::str::from_utf8(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
            let (x, ts) = text
                .split_once(',')
                .ok_or_else(|| DecodeError::Malformed("expected x,timestamp".into()))?;
            let x: f64 = x.parse().map_err(|_| DecodeError::NotNumeric("x"))?;
            let ts: i64 = ts.parse().map_err(|_| DecodeError::InvalidTimestamp(ts.into()))?;
            let v = Vector3::new(x, 0.0, 0.0);
            SensorSample::new(v, v, ts)
        }
    }

    #[tokio::test]
    async fn test_custom_decoder_replaces_json() {
        let script = Script::default();
        let client = client(&script, true).with_decoder(Arc::new(CsvDecoder));
        let mut samples = client.connect(Some(broker())).await.unwrap();

        feed(&script, payload(1.0, 1)).await;
        feed(&script, Bytes::from_static(b"2.5,2")).await;
        let sample = samples.next_sample().await.unwrap();
        assert_eq!(sample.timestamp(), 2);
        assert_eq!(sample.acceleration().x, 2.5);
        assert_eq!(client.stats().decode_failures, 1);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn test_publish_requires_session() {
        let script = Script::default();
        let client = client(&script, true);
        assert!(matches!(
            client.publish("t", Bytes::new()).await,
            Err(LiikeError::Publish { .. })
        ));

        let mut samples = client.connect(Some(broker())).await.unwrap();
        client.publish("t", payload(4.0, 4)).await.unwrap();
        assert_eq!(samples.next_sample().await.unwrap().timestamp(), 4);
        client.disconnect().await;
    }
}
