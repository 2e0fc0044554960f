//! Sample decoding for LIIKE
//!
//! Decoders turn raw broker payloads into [`SensorSample`]s. A payload that
//! fails to decode is reported to the caller and dropped; it never stops the
//! stream it arrived on.

use crate::error::DecodeError;
use crate::sample::{SensorSample, Vector3};
use serde_json::{Map, Value};

/// Decoder trait - parses raw payload bytes into a sample
///
/// # Example
///
/// ```ignore
/// struct CsvDecoder;
///
/// impl SampleDecoder for CsvDecoder {
///     fn name(&self) -> &'static str { "csv" }
///
///     fn decode(&self, raw: &[u8]) -> Result<SensorSample, DecodeError> {
///         parse_csv_line(raw)
///     }
/// }
/// ```
pub trait SampleDecoder: Send + Sync {
    /// Decoder name for identification and logging
    fn name(&self) -> &'static str;

    /// Decode one raw message
    fn decode(&self, raw: &[u8]) -> Result<SensorSample, DecodeError>;
}

/// Decoder for the JSON wire format published by the device
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl SampleDecoder for JsonDecoder {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, raw: &[u8]) -> Result<SensorSample, DecodeError> {
        decode(raw)
    }
}

/// Decode a JSON payload of the form
/// `{acceleration:{x,y,z}, gyroscope:{x,y,z}, timestamp}`
///
/// Unknown extra fields are ignored.
pub fn decode(raw: &[u8]) -> Result<SensorSample, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError::Malformed("empty payload".to_string()));
    }

    let value: Value =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let root = value
        .as_object()
        .ok_or_else(|| DecodeError::Malformed("payload is not a JSON object".to_string()))?;

    let acceleration = vector(
        root,
        "acceleration",
        ["acceleration.x", "acceleration.y", "acceleration.z"],
    )?;
    let gyroscope = vector(
        root,
        "gyroscope",
        ["gyroscope.x", "gyroscope.y", "gyroscope.z"],
    )?;
    let timestamp = timestamp(root)?;

    SensorSample::new(acceleration, gyroscope, timestamp)
}

fn vector(
    root: &Map<String, Value>,
    field: &'static str,
    axes: [&'static str; 3],
) -> Result<Vector3, DecodeError> {
    let obj = root
        .get(field)
        .ok_or(DecodeError::MissingField(field))?
        .as_object()
        .ok_or(DecodeError::NotNumeric(field))?;

    let [x, y, z] = axes;
    Ok(Vector3::new(
        axis(obj, "x", x)?,
        axis(obj, "y", y)?,
        axis(obj, "z", z)?,
    ))
}

fn axis(obj: &Map<String, Value>, key: &str, path: &'static str) -> Result<f64, DecodeError> {
    let value = obj.get(key).ok_or(DecodeError::MissingField(path))?;
    let n = value.as_f64().ok_or(DecodeError::NotNumeric(path))?;
    if !n.is_finite() {
        return Err(DecodeError::NonFinite(path));
    }
    Ok(n)
}

fn timestamp(root: &Map<String, Value>) -> Result<i64, DecodeError> {
    let value = root
        .get("timestamp")
        .ok_or(DecodeError::MissingField("timestamp"))?;

    if let Some(ts) = value.as_i64() {
        return Ok(ts);
    }
    if value.is_u64() {
        return Err(DecodeError::InvalidTimestamp(format!(
            "{value} exceeds the i64 range"
        )));
    }

    let ts = value.as_f64().ok_or(DecodeError::NotNumeric("timestamp"))?;
    // Some firmware serializes millis as a float, e.g. 1.718e12
    if ts.fract() != 0.0 || ts < i64::MIN as f64 || ts >= i64::MAX as f64 {
        return Err(DecodeError::InvalidTimestamp(format!(
            "{value} is not an integral epoch-millis value"
        )));
    }
    Ok(ts as i64)
}
