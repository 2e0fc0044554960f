//! Stdout store for debugging
//!
//! Prints a summary of each recording in a human-readable format.

use crate::error::Result;
use crate::store::{Recording, SampleStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stdout store - prints recordings instead of persisting them
pub struct StdoutStore {
    /// Also print every sample
    verbose: bool,
    saved_count: AtomicU64,
}

impl StdoutStore {
    pub fn new() -> Self {
        Self {
            verbose: false,
            saved_count: AtomicU64::new(0),
        }
    }

    /// Print every sample, not only the summary
    pub fn verbose() -> Self {
        Self {
            verbose: true,
            saved_count: AtomicU64::new(0),
        }
    }

    /// Recordings printed so far
    pub fn saved_count(&self) -> u64 {
        self.saved_count.load(Ordering::Relaxed)
    }
}

impl Default for StdoutStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleStore for StdoutStore {
    fn name(&self) -> &'static str {
        "stdout"
    }

    async fn save(&self, recording: &Recording) -> Result<()> {
        use std::io::Write;

        let mut stdout = std::io::stdout().lock();

        writeln!(
            stdout,
            "┌─ Recording ─────────────────────────────────────────",
        )
        .ok();
        writeln!(stdout, "│ ID:        {}", recording.id).ok();
        writeln!(stdout, "│ Activity:  {}", recording.activity).ok();
        writeln!(stdout, "│ Started:   {}", recording.started_at.to_rfc3339()).ok();
        if let Some(stopped) = recording.stopped_at {
            writeln!(stdout, "│ Stopped:   {}", stopped.to_rfc3339()).ok();
        }
        writeln!(stdout, "│ Samples:   {}", recording.len()).ok();
        if self.verbose {
            for sample in &recording.samples {
                let a = sample.acceleration();
                let g = sample.gyroscope();
                writeln!(
                    stdout,
                    "│   {} acc=({:.3}, {:.3}, {:.3}) gyro=({:.3}, {:.3}, {:.3})",
                    sample.timestamp(),
                    a.x,
                    a.y,
                    a.z,
                    g.x,
                    g.y,
                    g.z
                )
                .ok();
            }
        }
        writeln!(
            stdout,
            "└─────────────────────────────────────────────────────",
        )
        .ok();

        self.saved_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
