//! Synthetic sample generation
//!
//! Stands in for the device when no broker is configured or reachable.
//! Each axis is drawn independently and uniformly from a configurable range.

use crate::error::{LiikeError, Result};
use crate::sample::{SensorSample, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Default emission period
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Simulation settings
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Period between samples
    pub interval: Duration,
    /// Lower bound for every axis (inclusive)
    pub min: f64,
    /// Upper bound for every axis (inclusive)
    pub max: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            min: -10.0,
            max: 10.0,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Config with a custom period and the default range
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Check the range and period are usable
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(LiikeError::Config(
                "simulation interval must be positive".to_string(),
            ));
        }
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(LiikeError::Config(
                "simulation range must be finite".to_string(),
            ));
        }
        if self.min > self.max {
            return Err(LiikeError::Config(format!(
                "simulation range is empty: {} > {}",
                self.min, self.max
            )));
        }
        if !(self.max - self.min).is_finite() {
            return Err(LiikeError::Config(format!(
                "simulation range is too wide: [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Draw one sample with every axis uniform in `[min, max]`
pub fn synthesize(rng: &mut impl Rng, min: f64, max: f64) -> Result<SensorSample> {
    let mut axis = || rng.gen_range(min..=max);
    let acceleration = Vector3::new(axis(), axis(), axis());
    let gyroscope = Vector3::new(axis(), axis(), axis());
    let timestamp = chrono::Utc::now().timestamp_millis();

    Ok(SensorSample::new(acceleration, gyroscope, timestamp)?)
}

/// Periodic generator of synthetic samples
///
/// At most one emission task runs at a time. [`stop`](Self::stop) waits for
/// the task to finish, so nothing is emitted after it returns.
pub struct SimulationGenerator {
    config: SimulationConfig,
    task: Option<JoinHandle<()>>,
}

impl SimulationGenerator {
    /// Create a stopped generator
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, task: None })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Start emitting one sample per interval
    ///
    /// The first sample arrives one interval after start. `emit` returns
    /// `false` to end generation early (e.g. when its receiver is gone).
    pub fn start<F>(&mut self, mut emit: F) -> Result<()>
    where
        F: FnMut(SensorSample) -> bool + Send + 'static,
    {
        if self.is_running() {
            return Err(LiikeError::Busy);
        }

        let period = self.config.interval;
        let (min, max) = (self.config.min, self.config.max);
        let mut rng = self.config.rng();

        debug!(interval_ms = period.as_millis() as u64, min, max, "Simulation started");

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match synthesize(&mut rng, min, max) {
                    Ok(sample) => {
                        if !emit(sample) {
                            debug!("Simulation consumer gone, stopping");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Discarding synthetic sample"),
                }
            }
        }));

        Ok(())
    }

    /// Halt generation; idempotent
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            // Wait so no emission can race past this point
            let _ = task.await;
            debug!("Simulation stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SimulationGenerator {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
