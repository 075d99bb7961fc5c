//! Real container runtime implementation
//!
//! Drives the relay container through the docker CLI. Every command runs to
//! completion; a non-zero exit status is reported with the command's stderr.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use shared::{component_debug, Component};

use crate::error::{SupervisorError, SupervisorResult};
use crate::relay::RelaySpec;
use crate::traits::{ContainerRuntime, RelayProcessState};

/// Real container runtime backed by the docker CLI
pub struct RealContainerRuntime {
    /// Executable to invoke (`docker`, `podman`, an absolute path...)
    binary: String,
}

impl RealContainerRuntime {
    /// Create runtime using `docker` from `PATH`
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Configure the CLI executable (fluent API)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Arguments of `inspect`
    pub fn inspect_args(name: &str) -> Vec<String> {
        vec![
            "inspect".to_string(),
            "--format={{.State.Running}}".to_string(),
            name.to_string(),
        ]
    }

    /// Arguments of `run` for a detached, self-restarting relay with a health check
    pub fn run_args(spec: &RelaySpec) -> Vec<String> {
        let port = RelaySpec::CONTAINER_PORT;
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--restart".to_string(),
            "unless-stopped".to_string(),
            "-p".to_string(),
            format!("{}:{port}", spec.host_port),
            "-v".to_string(),
            format!("{}:/home/.local/share/signal-cli", spec.data_dir.display()),
            "-e".to_string(),
            format!("MODE={}", spec.mode),
            "--health-cmd".to_string(),
            format!("curl -sf http://localhost:{port}/v1/health || exit 1"),
            "--health-interval".to_string(),
            "30s".to_string(),
            "--health-timeout".to_string(),
            "10s".to_string(),
            "--health-retries".to_string(),
            "3".to_string(),
            "--health-start-period".to_string(),
            "40s".to_string(),
            spec.image.clone(),
        ]
    }

    /// Run the CLI and return trimmed stdout, failing on a non-zero exit
    async fn run(&self, args: &[String]) -> SupervisorResult<String> {
        let rendered = format!("{} {}", self.binary, args.join(" "));
        component_debug!(Component::Supervisor, command = %rendered, "Running container command");

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SupervisorError::command(&rendered, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SupervisorError::command(rendered, format!("{}: {}", output.status, stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for RealContainerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for RealContainerRuntime {
    async fn inspect(&self, name: &str) -> RelayProcessState {
        match self.run(&Self::inspect_args(name)).await {
            Ok(stdout) if stdout == "true" => RelayProcessState::Running,
            Ok(_) => RelayProcessState::Stopped,
            Err(e) => {
                component_debug!(Component::Supervisor, error = %e, "Container inspect failed, treating as absent");
                RelayProcessState::Absent
            }
        }
    }

    async fn create_and_start(&self, spec: &RelaySpec) -> SupervisorResult<()> {
        self.run(&Self::run_args(spec)).await.map(|_| ())
    }

    async fn start(&self, name: &str) -> SupervisorResult<()> {
        self.run(&["start".to_string(), name.to_string()]).await.map(|_| ())
    }
}
