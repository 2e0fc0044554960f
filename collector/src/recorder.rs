//! Recording controller
//!
//! Operator-driven start/stop/save workflow on top of a [`TelemetryClient`].
//!
//! ```text
//!            start(label)                 stop()
//!   Idle ──────────────────► Recording ───────────► Idle ──save()──► store
//!    ▲   connects, then clears    │  each sample:          log kept until
//!    │                            │  log.push, window.push save or next start
//!    └──── connect error ◄────────┘
//! ```
//!
//! All state sits behind one async mutex, so operator calls and sample
//! arrival never interleave.

use crate::client::{ClientOptions, ClientStatus, SampleStream, TelemetryClient};
use crate::config::{BrokerConfig, Config, DEFAULT_ACTIVITIES};
use crate::error::{LiikeError, Result};
use crate::metrics;
use crate::sample::SensorSample;
use crate::store::{Recording, SampleStore};
use crate::window::{DEFAULT_WINDOW_CAPACITY, SampleWindow};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingState::Idle => f.write_str("idle"),
            RecordingState::Recording => f.write_str("recording"),
        }
    }
}

struct Inner {
    state: RecordingState,
    window: SampleWindow,
    /// Unbounded accumulation log for `save`
    log: Vec<SensorSample>,
    activities: Vec<String>,
    selected: Option<String>,
    /// Label, id and bounds of the current or last session
    label: Option<String>,
    recording_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    stopped_at: Option<DateTime<Utc>>,
    total_collected: u64,
    consumer: Option<JoinHandle<()>>,
}

/// Start/stop/save workflow over one telemetry client
///
/// # Example
///
/// ```ignore
/// let controller = RecordingController::from_config(&config, Arc::new(StdoutStore::new()));
/// controller.start("walking").await?;
/// tokio::time::sleep(Duration::from_secs(5)).await;
/// controller.stop().await?;
/// let recording = controller.save().await?;
/// println!("{} samples of {}", recording.len(), recording.activity);
/// ```
pub struct RecordingController {
    client: Arc<TelemetryClient>,
    broker: Option<BrokerConfig>,
    store: Arc<dyn SampleStore>,
    inner: Arc<Mutex<Inner>>,
    collected: Arc<watch::Sender<u64>>,
}

impl RecordingController {
    /// Create a controller with the default window size and activities
    pub fn new(
        client: Arc<TelemetryClient>,
        broker: Option<BrokerConfig>,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        let (collected, _) = watch::channel(0);
        let mut inner = Inner {
            state: RecordingState::Idle,
            window: SampleWindow::new(DEFAULT_WINDOW_CAPACITY),
            log: Vec::new(),
            activities: Vec::new(),
            selected: None,
            label: None,
            recording_id: None,
            started_at: None,
            stopped_at: None,
            total_collected: 0,
            consumer: None,
        };
        seed_activities(&mut inner.activities, &DEFAULT_ACTIVITIES);

        Self {
            client,
            broker,
            store,
            inner: Arc::new(Mutex::new(inner)),
            collected: Arc::new(collected),
        }
    }

    /// Build the client and controller from loaded configuration
    pub fn from_config(config: &Config, store: Arc<dyn SampleStore>) -> Self {
        let client = Arc::new(TelemetryClient::new(ClientOptions::from(config)));
        Self::new(client, config.broker.clone(), store)
            .window_capacity(config.window_capacity)
            .with_activities(&config.activities)
    }

    /// Set the live window size
    pub fn window_capacity(self, capacity: usize) -> Self {
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.window = SampleWindow::new(capacity);
        }
        self
    }

    /// Replace the seeded activity list
    pub fn with_activities<S: AsRef<str>>(self, activities: &[S]) -> Self {
        if let Ok(mut inner) = self.inner.try_lock() {
            inner.activities.clear();
            seed_activities(&mut inner.activities, activities);
        }
        self
    }

    /// The underlying client
    pub fn client(&self) -> &Arc<TelemetryClient> {
        &self.client
    }

    /// Where `save` hands recordings
    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.store
    }

    /// Begin a recording session labelled `activity`
    ///
    /// Connects, then clears the window and the log. A connect failure is
    /// returned as-is and leaves the previous session's data untouched.
    pub async fn start(&self, activity: &str) -> Result<()> {
        let label = activity.trim();
        if label.is_empty() {
            return Err(LiikeError::Validation(
                "an activity label is required".to_string(),
            ));
        }

        let mut inner = self.inner.lock().await;
        if inner.state == RecordingState::Recording {
            return Err(LiikeError::Validation("already recording".to_string()));
        }

        let stream = self.client.connect(self.broker.clone()).await?;

        inner.window.clear();
        inner.log.clear();
        metrics::try_set_samples_collected(0);

        let id = ulid::Ulid::new().to_string();
        info!(
            activity = %label,
            recording = %id,
            simulated = self.client.status().simulated(),
            "Recording started"
        );

        inner.state = RecordingState::Recording;
        inner.label = Some(label.to_string());
        inner.recording_id = Some(id);
        inner.started_at = Some(Utc::now());
        inner.stopped_at = None;
        inner.consumer = Some(tokio::spawn(consume(
            stream,
            Arc::clone(&self.inner),
            Arc::clone(&self.collected),
        )));

        Ok(())
    }

    /// Start recording the selected activity
    pub async fn start_selected(&self) -> Result<()> {
        let selected = self.inner.lock().await.selected.clone();
        match selected {
            Some(activity) => self.start(&activity).await,
            None => Err(LiikeError::Validation(
                "no activity selected".to_string(),
            )),
        }
    }

    /// End the session
    ///
    /// Disconnects the client and freezes the window. The log is kept until
    /// `save` or the next `start`. A no-op when idle.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == RecordingState::Idle {
            return Ok(());
        }

        inner.state = RecordingState::Idle;
        inner.window.freeze();
        inner.stopped_at = Some(Utc::now());
        let consumer = inner.consumer.take();
        let label = inner.label.clone().unwrap_or_default();
        let evicted = inner.window.total_evicted();
        drop(inner);

        // The consumer drops anything that arrives once the state is Idle
        self.client.disconnect().await;

        if let Some(consumer) = consumer {
            let _ = consumer.await;
        }
        let samples = self.inner.lock().await.log.len();
        info!(
            activity = %label,
            samples,
            evicted,
            "Recording stopped"
        );
        Ok(())
    }

    /// Hand the accumulated log to the store
    ///
    /// Fails with `NoData` on an empty log and `Validation` while recording.
    /// The log is cleared only when the store accepts it.
    pub async fn save(&self) -> Result<Recording> {
        let mut inner = self.inner.lock().await;
        if inner.state == RecordingState::Recording {
            return Err(LiikeError::Validation(
                "stop recording before saving".to_string(),
            ));
        }
        if inner.log.is_empty() {
            return Err(LiikeError::NoData);
        }

        let recording = Recording {
            id: inner
                .recording_id
                .clone()
                .unwrap_or_else(|| ulid::Ulid::new().to_string()),
            activity: inner.label.clone().unwrap_or_default(),
            samples: inner.log.clone(),
            started_at: inner.started_at.unwrap_or_else(Utc::now),
            stopped_at: inner.stopped_at,
        };

        match self.store.save(&recording).await {
            Ok(()) => {
                metrics::try_record_saved(self.store.name(), true);
                metrics::try_set_samples_collected(0);
                inner.log.clear();
                info!(
                    store = self.store.name(),
                    recording = %recording.id,
                    activity = %recording.activity,
                    samples = recording.len(),
                    "Recording saved"
                );
                Ok(recording)
            }
            Err(e) => {
                metrics::try_record_saved(self.store.name(), false);
                warn!(store = self.store.name(), error = %e, "Save failed, log kept for retry");
                Err(e)
            }
        }
    }

    /// Add an activity and select it
    ///
    /// Names are compared trimmed and case-insensitively.
    pub async fn add_activity(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LiikeError::Validation(
                "activity name is required".to_string(),
            ));
        }

        let mut inner = self.inner.lock().await;
        if find_activity(&inner.activities, name).is_some() {
            return Err(LiikeError::DuplicateActivity {
                name: name.to_string(),
            });
        }

        inner.activities.push(name.to_string());
        inner.selected = Some(name.to_string());
        debug!(activity = %name, "Activity added");
        Ok(())
    }

    /// Select a known activity
    pub async fn select_activity(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match find_activity(&inner.activities, name.trim()) {
            Some(known) => {
                inner.selected = Some(known.to_string());
                Ok(())
            }
            None => Err(LiikeError::Validation(format!(
                "unknown activity '{}'",
                name.trim()
            ))),
        }
    }

    pub async fn activities(&self) -> Vec<String> {
        self.inner.lock().await.activities.clone()
    }

    pub async fn selected_activity(&self) -> Option<String> {
        self.inner.lock().await.selected.clone()
    }

    /// Label of the current or last session
    pub async fn activity(&self) -> Option<String> {
        self.inner.lock().await.label.clone()
    }

    /// Most recent samples, oldest first
    pub async fn window(&self) -> Vec<SensorSample> {
        self.inner.lock().await.window.snapshot()
    }

    /// Most recent sample in the window
    pub async fn latest(&self) -> Option<SensorSample> {
        self.inner.lock().await.window.latest().cloned()
    }

    pub async fn is_window_frozen(&self) -> bool {
        self.inner.lock().await.window.is_frozen()
    }

    /// Samples in the accumulation log
    pub async fn collected(&self) -> usize {
        self.inner.lock().await.log.len()
    }

    /// Samples collected over the controller's lifetime
    pub async fn total_collected(&self) -> u64 {
        self.inner.lock().await.total_collected
    }

    /// Watch the lifetime collected count; changes on every recorded sample
    pub fn watch_collected(&self) -> watch::Receiver<u64> {
        self.collected.subscribe()
    }

    pub async fn state(&self) -> RecordingState {
        self.inner.lock().await.state
    }

    /// Status of the underlying client
    pub fn connection(&self) -> ClientStatus {
        self.client.status()
    }

    /// Stop if recording, then discard the window, the log and the label
    pub async fn reset(&self) -> Result<()> {
        self.stop().await?;
        let mut inner = self.inner.lock().await;
        inner.window.clear();
        inner.log.clear();
        inner.label = None;
        inner.recording_id = None;
        inner.started_at = None;
        inner.stopped_at = None;
        metrics::try_set_samples_collected(0);
        Ok(())
    }

    /// Stop recording and release the connection
    pub async fn shutdown(&self) -> Result<()> {
        self.stop().await?;
        self.client.disconnect().await;
        Ok(())
    }
}

fn seed_activities<S: AsRef<str>>(activities: &mut Vec<String>, seed: &[S]) {
    for name in seed {
        let name = name.as_ref().trim();
        if !name.is_empty() && find_activity(activities, name).is_none() {
            activities.push(name.to_string());
        }
    }
}

fn find_activity<'a>(activities: &'a [String], name: &str) -> Option<&'a str> {
    activities
        .iter()
        .find(|known| known.to_lowercase() == name.to_lowercase())
        .map(String::as_str)
}

/// Append every sample to the log and the window while recording
async fn consume(
    mut stream: SampleStream,
    inner: Arc<Mutex<Inner>>,
    collected: Arc<watch::Sender<u64>>,
) {
    while let Some(sample) = stream.next_sample().await {
        let mut inner = inner.lock().await;
        if inner.state != RecordingState::Recording {
            break;
        }

        inner.log.push(sample.clone());
        if inner.window.push(sample).is_some() {
            metrics::try_record_evictions(1);
        }
        inner.total_collected += 1;
        metrics::try_set_samples_collected(inner.log.len());
        collected.send_replace(inner.total_collected);
    }
    debug!("Sample consumer finished");
}
