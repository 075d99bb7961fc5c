//! Trait definitions with mockall annotations for testing
//!
//! The supervisor only talks to the outside world through these two seams:
//! the container runtime hosting the relay and the relay's health endpoint.

use async_trait::async_trait;

use crate::error::SupervisorResult;
use crate::relay::RelaySpec;

/// Relay process state as reported by the container runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayProcessState {
    /// No container with the configured name exists
    Absent,
    /// Container exists but is not running
    Stopped,
    /// Container is running (not necessarily serving yet)
    Running,
}

/// Container runtime abstraction for dependency injection
#[mockall::automock]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Inspect the named container; any inspection failure means `Absent`
    async fn inspect(&self, name: &str) -> RelayProcessState;

    /// Create and start the relay container described by `spec`
    async fn create_and_start(&self, spec: &RelaySpec) -> SupervisorResult<()>;

    /// Start an existing, stopped container
    async fn start(&self, name: &str) -> SupervisorResult<()>;
}

/// Single liveness probe against the relay
#[mockall::automock]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok` when the relay answered with a success status
    async fn probe(&self) -> SupervisorResult<()>;
}
