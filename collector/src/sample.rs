//! Sensor sample types for LIIKE
//!
//! A [`SensorSample`] is one accelerometer + gyroscope reading as published
//! by the device:
//!
//! ```text
//! {
//!   "acceleration": { "x": 0.12, "y": -9.81, "z": 0.40 },
//!   "gyroscope":    { "x": 0.01, "y":  0.00, "z": -0.02 },
//!   "timestamp":    1718035200123
//! }
//! ```
//!
//! Timestamps are epoch milliseconds taken from the device clock. Consumers
//! must tolerate out-of-order and repeated timestamps.

use crate::error::DecodeError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Three-axis reading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One decoded reading
///
/// Immutable once constructed; every axis value is finite.
///
/// # Example
///
/// ```
/// use liike_collector::sample::{SensorSample, Vector3};
///
/// let sample = SensorSample::new(
///     Vector3::new(0.0, -9.81, 0.0),
///     Vector3::new(0.1, 0.0, 0.0),
///     1_718_035_200_123,
/// )
/// .unwrap();
/// assert_eq!(sample.timestamp(), 1_718_035_200_123);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    acceleration: Vector3,
    gyroscope: Vector3,
    timestamp: i64,
}

impl SensorSample {
    /// Build a sample, rejecting NaN or infinite axis values
    pub fn new(
        acceleration: Vector3,
        gyroscope: Vector3,
        timestamp: i64,
    ) -> Result<Self, DecodeError> {
        if !acceleration.is_finite() {
            return Err(DecodeError::NonFinite("acceleration"));
        }
        if !gyroscope.is_finite() {
            return Err(DecodeError::NonFinite("gyroscope"));
        }
        Ok(Self {
            acceleration,
            gyroscope,
            timestamp,
        })
    }

    pub fn acceleration(&self) -> Vector3 {
        self.acceleration
    }

    pub fn gyroscope(&self) -> Vector3 {
        self.gyroscope
    }

    /// Device timestamp in epoch milliseconds
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Encode in the broker wire format
    pub fn to_json(&self) -> Bytes {
        // Serializing plain f64/i64 fields cannot fail
        Bytes::from(serde_json::to_vec(self).unwrap_or_default())
    }
}
