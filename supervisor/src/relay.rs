//! Relay lifecycle state machine
//!
//! `Absent -> create and start`, `Stopped -> start`, `Running -> nothing`,
//! then a bounded health wait. Intended for one caller at a time: two racing
//! calls may both try to create the container, and the loser's command fails.

use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use shared::{component_error, component_info, BridgeConfig, Component};

use crate::health::{wait_for_health, HealthOutcome, PollPolicy};
use crate::services::parse_port;
use crate::traits::{ContainerRuntime, HealthProbe, RelayProcessState};

/// Everything needed to create the relay container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySpec {
    /// Container name
    pub name: String,
    /// Image reference including tag
    pub image: String,
    /// Host port mapped to the relay's port 8080
    pub host_port: u16,
    /// Host directory holding the relay's account state
    pub data_dir: PathBuf,
    /// Relay operating mode (`json-rpc` gives a websocket receive feed)
    pub mode: String,
}

impl RelaySpec {
    /// Port the relay listens on inside the container
    pub const CONTAINER_PORT: u16 = 8080;
    pub const DEFAULT_MODE: &'static str = "json-rpc";

    /// Derive the container spec from the bridge configuration
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            name: config.container_name.clone(),
            image: config.image.clone(),
            host_port: parse_port(&config.api_url),
            data_dir: absolute(&config.relay_data_dir()),
            mode: Self::DEFAULT_MODE.to_string(),
        }
    }
}

/// Container bind mounts must be absolute
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Ensures the relay container is up and serving
pub struct RelaySupervisor<R, P>
where
    R: ContainerRuntime,
    P: HealthProbe,
{
    runtime: R,
    probe: P,
    spec: RelaySpec,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl<R, P> RelaySupervisor<R, P>
where
    R: ContainerRuntime,
    P: HealthProbe,
{
    /// Create supervisor with injected runtime and probe
    pub fn new(runtime: R, probe: P, spec: RelaySpec) -> Self {
        Self {
            runtime,
            probe,
            spec,
            policy: PollPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Override poll timing (fluent API)
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abort the health wait when `cancel` fires (fluent API)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn spec(&self) -> &RelaySpec {
        &self.spec
    }

    /// Bring the relay to a serving state
    ///
    /// Returns `false` when the container could not be created or started, or
    /// when it did not become healthy before the deadline. Callers should treat
    /// `false` as "relay unavailable" and skip whatever depends on it.
    pub async fn ensure_relay_ready(&self) -> bool {
        let deadline = Instant::now() + self.policy.deadline;

        match self.runtime.inspect(&self.spec.name).await {
            RelayProcessState::Absent => {
                component_info!(Component::Supervisor, container = %self.spec.name, "Relay container not found, creating...");
                if let Err(e) = self.runtime.create_and_start(&self.spec).await {
                    component_error!(Component::Supervisor, error = %e, "Failed to create relay container");
                    return false;
                }
                component_info!(Component::Supervisor, "Relay container created");
            }
            RelayProcessState::Stopped => {
                component_info!(Component::Supervisor, container = %self.spec.name, "Relay container stopped, starting...");
                if let Err(e) = self.runtime.start(&self.spec.name).await {
                    component_error!(Component::Supervisor, error = %e, "Failed to start relay container");
                    return false;
                }
                component_info!(Component::Supervisor, "Relay container started");
            }
            RelayProcessState::Running => {
                component_info!(Component::Supervisor, "Relay container already running");
            }
        }

        component_info!(Component::Supervisor, "Waiting for relay to become healthy...");
        let outcome = wait_for_health(&self.probe, &self.policy, deadline, &self.cancel).await;

        match outcome {
            HealthOutcome::Healthy { attempts } => {
                component_info!(Component::Supervisor, attempts, "✅ Relay is healthy");
                true
            }
            HealthOutcome::TimedOut { attempts } => {
                component_error!(
                    Component::Supervisor,
                    attempts,
                    "Relay did not become healthy within {}s",
                    self.policy.deadline.as_secs()
                );
                false
            }
            HealthOutcome::Cancelled { attempts } => {
                component_info!(Component::Supervisor, attempts, "Relay health wait cancelled");
                false
            }
        }
    }
}
