//! Bounded health polling
//!
//! `wait_for_health` is a pure function of the probe, the poll policy and the
//! deadline: it has no knowledge of how the relay was started, which keeps the
//! retry behavior testable on its own with paused time.

use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use shared::{component_debug, Component};

use crate::traits::HealthProbe;

/// Timing of the health wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between two probes
    pub interval: Duration,
    /// Total budget measured from supervisor entry
    pub deadline: Duration,
    /// Budget for a single probe
    pub probe_timeout: Duration,
}

impl PollPolicy {
    /// Cold starts of the relay can take minutes
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(180);
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            deadline: Self::DEFAULT_DEADLINE,
            probe_timeout: Self::DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Result of a bounded health wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOutcome {
    /// A probe succeeded
    Healthy { attempts: u32 },
    /// The deadline passed without a successful probe
    TimedOut { attempts: u32 },
    /// The wait was cancelled before either of the above
    Cancelled { attempts: u32 },
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            HealthOutcome::Healthy { attempts }
            | HealthOutcome::TimedOut { attempts }
            | HealthOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

/// Probe until success, the deadline, or cancellation
///
/// A probe is only started while `now < deadline`; a probe that started in
/// time and succeeds counts even if it returns after the deadline. Errors and
/// per-probe timeouts only mean "not ready yet".
pub async fn wait_for_health<P>(
    probe: &P,
    policy: &PollPolicy,
    deadline: Instant,
    cancel: &CancellationToken,
) -> HealthOutcome
where
    P: HealthProbe + ?Sized,
{
    let mut attempts = 0;

    while Instant::now() < deadline {
        if cancel.is_cancelled() {
            return HealthOutcome::Cancelled { attempts };
        }

        attempts += 1;
        match timeout(policy.probe_timeout, probe.probe()).await {
            Ok(Ok(())) => return HealthOutcome::Healthy { attempts },
            Ok(Err(e)) => {
                component_debug!(Component::Supervisor, attempt = attempts, "Relay not ready yet: {}", e);
            }
            Err(_) => {
                component_debug!(
                    Component::Supervisor,
                    attempt = attempts,
                    "Relay health probe timed out after {:?}",
                    policy.probe_timeout
                );
            }
        }

        tokio::select! {
            _ = sleep(policy.interval) => {}
            _ = cancel.cancelled() => return HealthOutcome::Cancelled { attempts },
        }
    }

    HealthOutcome::TimedOut { attempts }
}
