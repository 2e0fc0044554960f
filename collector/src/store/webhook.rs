//! HTTP webhook store for LIIKE
//!
//! POSTs each recording as JSON to an HTTP endpoint.
//!
//! # Example
//!
//! ```ignore
//! let store = WebhookStore::new("https://api.example.com/recordings")?
//!     .header("Authorization", "Bearer token123");
//! let controller = RecordingController::from_config(&config, Arc::new(store));
//! ```

use crate::error::{LiikeError, Result};
use crate::store::{Recording, SampleStore};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP webhook store - POSTs recordings as JSON
pub struct WebhookStore {
    client: Client,
    url: String,
    headers: HashMap<String, String>,
}

impl WebhookStore {
    /// Create a store posting to `url`
    ///
    /// Uses default timeouts: 30s request timeout, 10s connection timeout
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeouts(
            url,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Create a store with explicit request and connection timeouts
    pub fn with_timeouts(
        url: impl Into<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(LiikeError::Config("webhook URL is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LiikeError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            headers: HashMap::new(),
        })
    }

    /// Add a custom header to all requests
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn persist_err(&self, reason: String) -> LiikeError {
        LiikeError::Persist {
            store: self.name().to_string(),
            reason,
        }
    }
}

#[async_trait]
impl SampleStore for WebhookStore {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn save(&self, recording: &Recording) -> Result<()> {
        let mut request = self.client.post(&self.url).json(recording);

        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(
                    url = %self.url,
                    recording = %recording.id,
                    samples = recording.len(),
                    status = %response.status(),
                    "Recording delivered"
                );
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(
                    url = %self.url,
                    status = %status,
                    body = %body,
                    "Webhook rejected recording"
                );
                Err(self.persist_err(format!("webhook returned {status}: {body}")))
            }
            Err(e) => {
                error!(url = %self.url, error = %e, "Webhook request failed");
                Err(self.persist_err(format!("failed to reach {}: {e}", self.url)))
            }
        }
    }

    /// HEAD the save URL
    async fn health(&self) -> bool {
        let url = &self.url;

        // Any answer short of a server error means the endpoint is up
        match self.client.head(url).send().await {
            Ok(response) => {
                let status = response.status();
                let healthy = !status.is_server_error();
                if !healthy {
                    debug!(url = %url, status = %status, "Health check returned server error");
                }
                healthy
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Health check failed");
                false
            }
        }
    }
}
