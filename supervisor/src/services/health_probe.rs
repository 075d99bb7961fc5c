//! Real health probe implementation

use async_trait::async_trait;
use std::time::Duration;

use crate::error::{SupervisorError, SupervisorResult};
use crate::health::PollPolicy;
use crate::traits::HealthProbe;

/// `GET <relay>/v1/health`, healthy on any 2xx
pub struct RealHealthProbe {
    client: reqwest::Client,
    health_url: String,
    timeout: Duration,
}

impl RealHealthProbe {
    /// Create probe for a full health URL
    pub fn new(health_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            health_url: health_url.into(),
            timeout: PollPolicy::DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Configure the per-request timeout (fluent API)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }
}

#[async_trait]
impl HealthProbe for RealHealthProbe {
    async fn probe(&self) -> SupervisorResult<()> {
        let response = self
            .client
            .get(&self.health_url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SupervisorError::ProbeTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    SupervisorError::probe(e.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SupervisorError::probe(format!("HTTP {}", response.status())))
        }
    }
}
