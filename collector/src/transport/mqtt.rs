//! MQTT transport for LIIKE
//!
//! Connects to a broker with rumqttc, subscribes to the configured topic and
//! forwards PUBLISH payloads to the inbound channel from a single event-loop
//! task, so delivery order matches arrival order on the wire.
//!
//! # Supported broker URLs
//!
//! | URL | Transport | Default port |
//! |-----|-----------|--------------|
//! | `mqtt://host[:port]`, `tcp://…`, `host[:port]` | TCP | 1883 |
//! | `mqtts://…`, `ssl://…`, `tls://…` | TLS | 8883 |
//! | `ws://host[:port]/path` | WebSocket | 80 |
//! | `wss://host[:port]/path` | WebSocket over TLS | 443 |

use crate::config::BrokerConfig;
use crate::error::{LiikeError, Result};
use crate::transport::{INBOUND_CAPACITY, Inbound, Transport, TransportFactory};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default bound on the CONNACK / SUBACK handshakes
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default bound on teardown
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacity of the rumqttc request queue
const REQUEST_CAPACITY: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Network flavour selected by the URL scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wire {
    Tcp,
    Tls,
    Ws,
    Wss,
}

/// Parsed broker address
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    /// Hostname for TCP/TLS, full URL for WebSocket
    host: String,
    port: u16,
    wire: Wire,
}

fn parse_endpoint(url: &str) -> Result<Endpoint> {
    let url = url.trim();
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme.to_lowercase(), rest),
        None => ("mqtt".to_string(), url),
    };

    let (wire, default_port) = match scheme.as_str() {
        "mqtt" | "tcp" => (Wire::Tcp, 1883),
        "mqtts" | "ssl" | "tls" => (Wire::Tls, 8883),
        "ws" => (Wire::Ws, 80),
        "wss" => (Wire::Wss, 443),
        other => {
            return Err(LiikeError::Config(format!(
                "unsupported broker URL scheme '{other}'"
            )));
        }
    };

    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = split_host_port(authority, default_port)?;
    if host.is_empty() {
        return Err(LiikeError::Config(format!("broker URL '{url}' has no host")));
    }

    let host = match wire {
        // rumqttc takes the whole URL for websockets
        Wire::Ws | Wire::Wss => format!("{scheme}://{rest}"),
        Wire::Tcp | Wire::Tls => host,
    };

    Ok(Endpoint { host, port, wire })
}

fn split_host_port(authority: &str, default_port: u16) -> Result<(String, u16)> {
    // [::1]:1883
    if let Some(stripped) = authority.strip_prefix('[') {
        let (host, tail) = stripped
            .split_once(']')
            .ok_or_else(|| LiikeError::Config(format!("invalid broker host '{authority}'")))?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(port)?,
            None => default_port,
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port)?)),
        None => Ok((authority.to_string(), default_port)),
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.parse()
        .map_err(|e| LiikeError::Config(format!("invalid broker port '{raw}': {e}")))
}

fn build_options(config: &BrokerConfig, endpoint: &Endpoint) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &endpoint.host, endpoint.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);

    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.clone().unwrap_or_default());
    }

    match endpoint.wire {
        Wire::Tcp => {}
        Wire::Tls => {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }
        Wire::Ws => {
            options.set_transport(rumqttc::Transport::Ws);
        }
        Wire::Wss => {
            options.set_transport(rumqttc::Transport::wss_with_default_config());
        }
    }

    options
}

type SharedInbound = Arc<Mutex<Option<mpsc::Sender<Bytes>>>>;

/// MQTT broker transport
///
/// # Example
///
/// ```ignore
/// let mut transport = MqttTransport::new();
/// transport.configure(BrokerConfig::new("mqtt://broker.local", "esp32/sensor_data"))?;
/// let mut inbound = transport.connect().await?;
/// while let Some(payload) = inbound.recv().await {
///     println!("{} bytes", payload.len());
/// }
/// ```
pub struct MqttTransport {
    config: Option<BrokerConfig>,
    endpoint: Option<Endpoint>,
    connect_timeout: Duration,
    disconnect_timeout: Duration,
    client: Option<AsyncClient>,
    /// Held between `open` and `subscribe`, then moved into the event-loop task
    eventloop: Mutex<Option<EventLoop>>,
    event_task: Option<JoinHandle<()>>,
    inbound: SharedInbound,
}

impl MqttTransport {
    /// Create an unconfigured transport with default timeouts
    pub fn new() -> Self {
        Self {
            config: None,
            endpoint: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            client: None,
            eventloop: Mutex::new(None),
            event_task: None,
            inbound: Arc::new(Mutex::new(None)),
        }
    }

    /// Set the handshake bound
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the teardown bound
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Store broker settings for the next `open`
    ///
    /// Fails with `LiikeError::Config` on an empty URL or topic, or a URL
    /// that cannot be parsed.
    pub fn configure(&mut self, config: BrokerConfig) -> Result<()> {
        config.validate()?;
        let endpoint = parse_endpoint(&config.broker_url)?;
        debug!(
            broker = %config.broker_url,
            topic = %config.topic,
            client_id = %config.client_id,
            "MQTT transport configured"
        );
        self.config = Some(config);
        self.endpoint = Some(endpoint);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    fn topic(&self) -> String {
        self.config
            .as_ref()
            .map(|c| c.topic.clone())
            .unwrap_or_default()
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn open(&mut self) -> Result<()> {
        let (Some(config), Some(endpoint)) = (&self.config, &self.endpoint) else {
            return Err(LiikeError::Config("MQTT transport not configured".to_string()));
        };
        if self.client.is_some() {
            return Err(LiikeError::AlreadyConnected);
        }

        let (client, mut eventloop) =
            AsyncClient::new(build_options(config, endpoint), REQUEST_CAPACITY);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        return if ack.code == ConnectReturnCode::Success {
                            Ok(())
                        } else {
                            Err(format!("broker refused connection: {:?}", ack.code))
                        };
                    }
                    Ok(_) => {}
                    Err(e) => return Err(e.to_string()),
                }
            }
        };

        match tokio::time::timeout(self.connect_timeout, handshake).await {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(LiikeError::Connect { reason }),
            Err(_) => {
                return Err(LiikeError::Connect {
                    reason: format!("no CONNACK within {:?}", self.connect_timeout),
                });
            }
        }

        info!(broker = %config.broker_url, client_id = %config.client_id, "Connected to broker");
        self.client = Some(client);
        *self.eventloop.get_mut() = Some(eventloop);
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<Inbound> {
        let topic = self.topic();
        let subscribe_err = |reason: String| LiikeError::Subscribe {
            topic: topic.clone(),
            reason,
        };

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| subscribe_err("not connected".to_string()))?;

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);

        // Already streaming: swap the delivery channel only
        if self.event_task.is_some() {
            *self.inbound.lock() = Some(tx);
            return Ok(rx);
        }

        let mut eventloop = self
            .eventloop
            .get_mut()
            .take()
            .ok_or_else(|| subscribe_err("event loop unavailable".to_string()))?;

        client
            .subscribe(topic.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| subscribe_err(e.to_string()))?;

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        let rejected = ack
                            .return_codes
                            .iter()
                            .any(|code| matches!(code, SubscribeReasonCode::Failure));
                        return if rejected {
                            Err("rejected by broker".to_string())
                        } else {
                            Ok(())
                        };
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if tx.try_send(publish.payload).is_err() {
                            warn!("Inbound channel full during subscribe, payload dropped");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => return Err(e.to_string()),
                }
            }
        };

        let outcome = tokio::time::timeout(self.connect_timeout, handshake).await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => Some(reason),
            Err(_) => Some(format!("no SUBACK within {:?}", self.connect_timeout)),
        };
        if let Some(reason) = failure {
            // Connection stays open but unusable until disconnect
            *self.eventloop.get_mut() = Some(eventloop);
            return Err(subscribe_err(reason));
        }

        *self.inbound.lock() = Some(tx);
        self.event_task = Some(tokio::spawn(run_event_loop(
            eventloop,
            Arc::clone(&self.inbound),
        )));

        info!(topic = %topic, "Subscribed");
        Ok(rx)
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let client = self.client.as_ref().ok_or_else(|| LiikeError::Publish {
            reason: "not connected".to_string(),
        })?;

        client
            .publish_bytes(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| LiikeError::Publish {
                reason: e.to_string(),
            })
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };

        // Stop deliveries before anything else
        self.inbound.lock().take();

        let requested = client.try_disconnect();

        if let Some(mut task) = self.event_task.take() {
            if tokio::time::timeout(self.disconnect_timeout, &mut task)
                .await
                .is_err()
            {
                warn!("MQTT event loop did not stop in time, aborting");
                task.abort();
                let _ = task.await;
            }
        } else if let Some(mut eventloop) = self.eventloop.get_mut().take() {
            // Handshake finished but nothing polls the loop: flush DISCONNECT here
            let flush = async {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            };
            let _ = tokio::time::timeout(self.disconnect_timeout, flush).await;
        }

        info!(topic = %self.topic(), "Disconnected from broker");

        requested.map_err(|e| LiikeError::Disconnect {
            reason: e.to_string(),
        })
    }
}

/// Forward PUBLISH payloads until DISCONNECT is written or the connection ends
///
/// Payloads arriving after delivery stopped are discarded so the queued
/// DISCONNECT still reaches the broker.
async fn run_event_loop(mut eventloop: EventLoop, inbound: SharedInbound) {
    let mut discarded = 0u64;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let tx = inbound.lock().clone();
                let delivered = match tx {
                    Some(tx) => tx.send(publish.payload).await.is_ok(),
                    None => false,
                };
                if !delivered {
                    discarded += 1;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!(discarded, "DISCONNECT sent");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "MQTT connection lost");
                break;
            }
        }
    }

    // Closing the channel tells the client the stream ended
    inbound.lock().take();
}

/// Builds [`MqttTransport`]s for the telemetry client
#[derive(Debug, Clone)]
pub struct MqttFactory {
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
}

impl Default for MqttFactory {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
        }
    }
}

impl TransportFactory for MqttFactory {
    fn create(&self, config: &BrokerConfig) -> Result<Box<dyn Transport>> {
        let mut transport = MqttTransport::new()
            .connect_timeout(self.connect_timeout)
            .disconnect_timeout(self.disconnect_timeout);
        transport.configure(config.clone())?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn endpoint(url: &str) -> Endpoint {
        parse_endpoint(url).unwrap()
    }

    #[test]
    fn test_transport_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MqttTransport>();
        let _boxed: Box<dyn Transport> = Box::new(MqttTransport::new());
    }

    #[test]
    fn test_parse_tcp_endpoints() {
        assert_eq!(
            endpoint("mqtt://broker.local:1884"),
            Endpoint {
                host: "broker.local".into(),
                port: 1884,
                wire: Wire::Tcp
            }
        );
        assert_eq!(endpoint("tcp://10.0.0.5").port, 1883);
        assert_eq!(endpoint("broker.local").host, "broker.local");
        assert_eq!(endpoint("[::1]:1999").host, "::1");
        assert_eq!(endpoint("[::1]:1999").port, 1999);
    }

    #[test]
    fn test_parse_tls_and_websocket_endpoints() {
        let tls = endpoint("mqtts://broker.example.com");
        assert_eq!((tls.wire, tls.port), (Wire::Tls, 8883));

        let ws = endpoint("ws://broker.hivemq.com:8000/mqtt");
        assert_eq!(ws.wire, Wire::Ws);
        assert_eq!(ws.port, 8000);
        assert_eq!(ws.host, "ws://broker.hivemq.com:8000/mqtt");

        assert_eq!(endpoint("wss://broker.example.com/mqtt").port, 443);
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        assert!(matches!(
            parse_endpoint("http://broker"),
            Err(LiikeError::Config(_))
        ));
        assert!(parse_endpoint("mqtt://:1883").is_err());
        assert!(parse_endpoint("mqtt://host:port").is_err());
        assert!(parse_endpoint("mqtt://host:70000").is_err());
    }

    #[test]
    fn test_configure_validates() {
        let mut transport = MqttTransport::new();
        assert!(matches!(
            transport.configure(BrokerConfig::new("", "t")),
            Err(LiikeError::Config(_))
        ));
        assert!(matches!(
            transport.configure(BrokerConfig::new("mqtt://h", "")),
            Err(LiikeError::Config(_))
        ));
        assert!(transport.configure(BrokerConfig::new("mqtt://h", "t")).is_ok());
    }

    #[tokio::test]
    async fn test_open_unconfigured_fails() {
        let mut transport = MqttTransport::new();
        assert!(matches!(transport.open().await, Err(LiikeError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_connect_error() {
        // Grab a free port, then close it so the connection is refused
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = MqttTransport::new().connect_timeout(Duration::from_secs(2));
        transport
            .configure(BrokerConfig::new(format!("mqtt://127.0.0.1:{port}"), "t"))
            .unwrap();

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, LiikeError::Connect { .. }), "got {err:?}");
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_silent_broker_times_out() {
        // Accepts TCP but never answers CONNECT
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let mut transport = MqttTransport::new().connect_timeout(Duration::from_millis(200));
        transport
            .configure(BrokerConfig::new(format!("mqtt://{addr}"), "t"))
            .unwrap();

        let start = std::time::Instant::now();
        let err = transport.open().await.unwrap_err();
        assert!(matches!(err, LiikeError::Connect { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_noop() {
        let mut transport = MqttTransport::new();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_when_disconnected_fails() {
        let transport = MqttTransport::new();
        let err = transport.publish("t", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, LiikeError::Publish { .. }));
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let factory = MqttFactory::default();
        assert!(factory.create(&BrokerConfig::new("mqtt://h", "")).is_err());
        assert_eq!(
            factory
                .create(&BrokerConfig::new("mqtt://h", "t"))
                .unwrap()
                .name(),
            "mqtt"
        );
    }
}
