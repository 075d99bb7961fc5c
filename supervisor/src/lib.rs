//! Relay supervisor
//!
//! Makes sure the local Signal relay container exists, is running and answers
//! health checks before anything that depends on it starts. The lifecycle
//! decision (create, start or leave alone) is separated from the bounded
//! health wait so that each can be tested with mocked collaborators.

pub mod error;
pub mod health;
pub mod relay;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use error::{SupervisorError, SupervisorResult};
pub use health::{wait_for_health, HealthOutcome, PollPolicy};
pub use relay::{RelaySpec, RelaySupervisor};
pub use traits::{ContainerRuntime, HealthProbe, RelayProcessState};
