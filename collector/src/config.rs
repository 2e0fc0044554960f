//! Configuration for LIIKE

use crate::error::{LiikeError, Result};
use crate::simulate::SimulationConfig;
use crate::window::DEFAULT_WINDOW_CAPACITY;
use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Topic the device publishes readings on
pub const DEFAULT_TOPIC: &str = "esp32/sensor_data";

/// Activities known before the operator adds any
pub const DEFAULT_ACTIVITIES: [&str; 3] = ["standing", "sitting", "walking"];

/// Broker connection settings for one session
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Broker address, e.g. `mqtt://broker.local:1883`
    pub broker_url: String,
    /// MQTT client identifier
    pub client_id: String,
    /// Topic carrying sensor samples
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl BrokerConfig {
    /// Create a config with a generated client id and no credentials
    pub fn new(broker_url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            client_id: generate_client_id(),
            topic: topic.into(),
            username: None,
            password: None,
        }
    }

    /// Set the client identifier
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set username/password credentials
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Reject configs a transport cannot use
    pub fn validate(&self) -> Result<()> {
        if self.broker_url.trim().is_empty() {
            return Err(LiikeError::Config("broker URL is empty".to_string()));
        }
        if self.topic.trim().is_empty() {
            return Err(LiikeError::Config("topic is empty".to_string()));
        }
        if self.client_id.trim().is_empty() {
            return Err(LiikeError::Config("client id is empty".to_string()));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(LiikeError::Config(
                "password given without username".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("broker_url", &self.broker_url)
            .field("client_id", &self.client_id)
            .field("topic", &self.topic)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn generate_client_id() -> String {
    format!("liike-{}", ulid::Ulid::new().to_string().to_lowercase())
}

/// Main configuration for LIIKE
#[derive(Debug, Clone)]
pub struct Config {
    /// Broker settings; `None` streams simulated data
    pub broker: Option<BrokerConfig>,

    /// Bound on the connect + subscribe handshake
    pub connect_timeout: Duration,

    /// Bound on transport teardown
    pub disconnect_timeout: Duration,

    /// Stream simulated data when the broker is unreachable
    pub fallback_to_simulation: bool,

    /// Simulation cadence and range
    pub simulation: SimulationConfig,

    /// Live window size
    pub window_capacity: usize,

    /// Seeded activity labels
    pub activities: Vec<String>,

    /// Activity the binary records
    pub activity: String,

    /// How long the binary records before saving
    pub record_duration: Duration,

    /// Webhook endpoint recordings are POSTed to
    pub save_url: Option<String>,

    /// Prometheus endpoint address; disabled when unset
    pub metrics_addr: Option<SocketAddr>,

    /// Log level
    pub log_level: String,

    /// Log format (json or pretty)
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: None,
            connect_timeout: Duration::from_millis(5000),
            disconnect_timeout: Duration::from_millis(2000),
            fallback_to_simulation: true,
            simulation: SimulationConfig::default(),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            activities: DEFAULT_ACTIVITIES.iter().map(|a| a.to_string()).collect(),
            activity: "walking".to_string(),
            record_duration: Duration::from_secs(10),
            save_url: None,
            metrics_addr: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        // Empty values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("LIIKE_BROKER_URL") {
            let mut broker = BrokerConfig::new(
                url.trim(),
                get("LIIKE_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            );
            if let Some(id) = get("LIIKE_CLIENT_ID") {
                broker.client_id = id;
            }
            broker.username = get("LIIKE_USERNAME");
            broker.password = get("LIIKE_PASSWORD");
            broker.validate()?;
            config.broker = Some(broker);
        }

        if let Some(ms) = get("LIIKE_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Duration::from_millis(parse("LIIKE_CONNECT_TIMEOUT_MS", &ms)?);
        }

        if let Some(ms) = get("LIIKE_DISCONNECT_TIMEOUT_MS") {
            config.disconnect_timeout =
                Duration::from_millis(parse("LIIKE_DISCONNECT_TIMEOUT_MS", &ms)?);
        }

        if let Some(flag) = get("LIIKE_SIM_FALLBACK") {
            config.fallback_to_simulation = parse_bool("LIIKE_SIM_FALLBACK", &flag)?;
        }

        if let Some(ms) = get("LIIKE_SIM_INTERVAL_MS") {
            config.simulation.interval = Duration::from_millis(parse("LIIKE_SIM_INTERVAL_MS", &ms)?);
        }

        if let Some(min) = get("LIIKE_SIM_MIN") {
            config.simulation.min = parse("LIIKE_SIM_MIN", &min)?;
        }

        if let Some(max) = get("LIIKE_SIM_MAX") {
            config.simulation.max = parse("LIIKE_SIM_MAX", &max)?;
        }

        config.simulation.validate()?;

        if let Some(cap) = get("LIIKE_WINDOW_CAPACITY") {
            config.window_capacity = parse("LIIKE_WINDOW_CAPACITY", &cap)?;
            if config.window_capacity == 0 {
                return Err(LiikeError::Config(
                    "invalid LIIKE_WINDOW_CAPACITY: must be at least 1".to_string(),
                ));
            }
        }

        if let Some(list) = get("LIIKE_ACTIVITIES") {
            config.activities = list
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(activity) = get("LIIKE_ACTIVITY") {
            config.activity = activity.trim().to_string();
        }

        if let Some(secs) = get("LIIKE_RECORD_SECS") {
            config.record_duration = Duration::from_secs(parse("LIIKE_RECORD_SECS", &secs)?);
        }

        config.save_url = get("LIIKE_SAVE_URL");

        if let Some(addr) = get("LIIKE_METRICS_ADDR") {
            config.metrics_addr = Some(parse("LIIKE_METRICS_ADDR", &addr)?);
        }

        if let Some(level) = get("LIIKE_LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = get("LIIKE_LOG_FORMAT") {
            config.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(LiikeError::Config(format!(
                        "invalid LIIKE_LOG_FORMAT: {other} (expected 'json' or 'pretty')"
                    )));
                }
            };
        }

        Ok(config)
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| LiikeError::Config(format!("invalid {key}: {e}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(LiikeError::Config(format!(
            "invalid {key}: {other} (expected true or false)"
        ))),
    }
}
