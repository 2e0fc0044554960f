//! Persistence collaborators for LIIKE
//!
//! A store receives a finished [`Recording`] when the operator saves it.
//! What happens next (HTTP hand-off, printing, keeping it in memory) is up to
//! the store; the recorder only cares whether `save` succeeded.

pub mod memory;
pub mod stdout;
pub mod webhook;

use crate::error::Result;
use crate::sample::SensorSample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use stdout::StdoutStore;
pub use webhook::WebhookStore;

/// One saved recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// ULID assigned when the recording started
    pub id: String,
    pub activity: String,
    /// Every sample collected, in arrival order
    pub samples: Vec<SensorSample>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl Recording {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Wall-clock span between start and stop
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.stopped_at.map(|stopped| stopped - self.started_at)
    }
}

/// SampleStore trait - hands recordings to a destination
///
/// # Example
///
/// ```ignore
/// struct S3Store {
///     bucket: Bucket,
/// }
///
/// #[async_trait]
/// impl SampleStore for S3Store {
///     fn name(&self) -> &'static str { "s3" }
///
///     async fn save(&self, recording: &Recording) -> Result<()> {
///         let body = serde_json::to_vec(recording).map_err(|e| LiikeError::Persist {
///             store: "s3".into(),
///             reason: e.to_string(),
///         })?;
///         self.bucket.put(&recording.id, body).await
///     }
/// }
/// ```
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Store name for identification and logging
    fn name(&self) -> &'static str;

    /// Persist one recording
    ///
    /// Fails with `LiikeError::Persist`; the caller keeps its data for retry.
    async fn save(&self, recording: &Recording) -> Result<()>;

    /// True if the destination is currently accepting recordings
    async fn health(&self) -> bool {
        true
    }
}
