//! End-to-end recording workflow without a reachable broker
//!
//! Runs on paused time so the one-second simulation cadence is exact.

use liike_collector::client::{ClientOptions, ConnectionState, DataSource, SimulationReason};
use liike_collector::config::{BrokerConfig, Config};
use liike_collector::error::LiikeError;
use liike_collector::recorder::{RecordingController, RecordingState};
use liike_collector::sample::SensorSample;
use liike_collector::store::{MemoryStore, SampleStore};
use liike_collector::transport::Transport;
use liike_collector::{Result, TelemetryClient};
use std::sync::Arc;
use std::time::Duration;

fn in_range(sample: &SensorSample) -> bool {
    let (a, g) = (sample.acceleration(), sample.gyroscope());
    [a.x, a.y, a.z, g.x, g.y, g.z]
        .iter()
        .all(|v| (-10.0..=10.0).contains(v))
}

/// A client whose broker can never be reached
fn unreachable_client() -> Arc<TelemetryClient> {
    let factory = |_: &BrokerConfig| -> Result<Box<dyn Transport>> {
        Ok(Box::new(UnreachableTransport))
    };
    Arc::new(TelemetryClient::with_factory(
        ClientOptions::default(),
        Arc::new(factory),
    ))
}

/// Fails every open like a refused TCP connection
struct UnreachableTransport;

#[async_trait::async_trait]
impl Transport for UnreachableTransport {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    async fn open(&mut self) -> Result<()> {
        Err(LiikeError::Connect {
            reason: "connection refused".to_string(),
        })
    }

    async fn subscribe(&mut self) -> Result<liike_collector::transport::Inbound> {
        unreachable!("open never succeeds")
    }

    async fn publish(&self, _topic: &str, _payload: bytes::Bytes) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_walking_session_with_unreachable_broker() {
    let store = Arc::new(MemoryStore::new());
    let controller = RecordingController::new(
        unreachable_client(),
        Some(BrokerConfig::new("mqtt://broker.invalid", "esp32/sensor_data")),
        Arc::clone(&store) as Arc<dyn SampleStore>,
    );

    let started = tokio::time::Instant::now();
    controller.start("walking").await.unwrap();

    let status = controller.connection();
    assert_eq!(status.state, ConnectionState::Streaming);
    assert!(status.simulated());
    assert!(matches!(
        status.source,
        Some(DataSource::Simulated(SimulationReason::Unreachable { .. }))
    ));

    // One synthetic sample per second
    let mut collected = controller.watch_collected();
    for n in 1..=5u64 {
        collected.wait_for(|count| *count >= n).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(n), "sample {n} early: {elapsed:?}");
        assert!(elapsed < Duration::from_secs(n) + Duration::from_millis(100));
    }

    controller.stop().await.unwrap();
    assert_eq!(controller.state().await, RecordingState::Idle);
    assert_eq!(controller.connection().state, ConnectionState::Disconnected);

    let window = controller.window().await;
    assert_eq!(window.len(), 5);
    assert_eq!(controller.collected().await, 5);
    assert!(window.iter().all(in_range));

    let recording = controller.save().await.unwrap();
    assert_eq!(recording.activity, "walking");
    assert_eq!(recording.samples, window);
    assert_eq!(store.recordings(), vec![recording]);
}

#[tokio::test(start_paused = true)]
async fn test_session_without_broker_config() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let controller =
        RecordingController::from_config(&config, Arc::clone(&store) as Arc<dyn SampleStore>);

    controller.start("standing").await.unwrap();
    assert_eq!(
        controller.connection().source,
        Some(DataSource::Simulated(SimulationReason::NotConfigured))
    );

    controller
        .watch_collected()
        .wait_for(|count| *count >= 3)
        .await
        .unwrap();
    controller.shutdown().await.unwrap();

    let recording = controller.save().await.unwrap();
    assert_eq!(recording.len(), 3);
    assert!(recording.samples.iter().all(in_range));
    assert!(recording.duration().is_some());
}

#[tokio::test]
async fn test_independent_controllers_share_nothing() {
    let first = RecordingController::from_config(&Config::default(), Arc::new(MemoryStore::new()));
    let second =
        RecordingController::from_config(&Config::default(), Arc::new(MemoryStore::new()));

    first.add_activity("running").await.unwrap();
    assert!(second.add_activity("running").await.is_ok());
    assert_eq!(second.state().await, RecordingState::Idle);
    assert!(!Arc::ptr_eq(first.client(), second.client()));
}

#[tokio::test]
async fn test_disconnect_twice_is_idempotent() {
    let client = TelemetryClient::new(ClientOptions {
        simulation: liike_collector::simulate::SimulationConfig::with_interval(
            Duration::from_millis(10),
        ),
        ..ClientOptions::default()
    });
    let mut samples = client.connect(None).await.unwrap();
    assert!(samples.next_sample().await.is_some());

    client.disconnect().await;
    client.disconnect().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.status().simulated());
}
