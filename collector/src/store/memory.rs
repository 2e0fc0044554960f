//! In-memory store
//!
//! Keeps every saved recording. Can be switched into a failing mode to
//! exercise the retry path.

use crate::error::{LiikeError, Result};
use crate::store::{Recording, SampleStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemoryStore {
    recordings: Mutex<Vec<Recording>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Copies of every saved recording, oldest first
    pub fn recordings(&self) -> Vec<Recording> {
        self.recordings.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.recordings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.lock().is_empty()
    }
}

#[async_trait]
impl SampleStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, recording: &Recording) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(LiikeError::Persist {
                store: self.name().to_string(),
                reason: "store unavailable".to_string(),
            });
        }
        self.recordings.lock().push(recording.clone());
        Ok(())
    }

    async fn health(&self) -> bool {
        !self.failing.load(Ordering::Relaxed)
    }
}
