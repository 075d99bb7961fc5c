//! Tests for RealContainerRuntime
//!
//! Command execution is exercised with standard unix tools standing in for
//! the docker CLI.

use std::path::PathBuf;

use crate::relay::RelaySpec;
use crate::services::container_runtime::RealContainerRuntime;
use crate::traits::{ContainerRuntime, RelayProcessState};

fn spec() -> RelaySpec {
    RelaySpec {
        name: "signal-api".to_string(),
        image: "bbernhard/signal-cli-rest-api:latest".to_string(),
        host_port: 9922,
        data_dir: PathBuf::from("/srv/bridge/data/signal-cli"),
        mode: "json-rpc".to_string(),
    }
}

#[test]
fn test_run_args_carry_mount_port_and_mode() {
    let args = RealContainerRuntime::run_args(&spec());
    let joined = args.join(" ");

    assert_eq!(args[0], "run");
    assert!(joined.contains("--name signal-api"));
    assert!(joined.contains("--restart unless-stopped"));
    assert!(joined.contains("-p 9922:8080"));
    assert!(joined.contains("-v /srv/bridge/data/signal-cli:/home/.local/share/signal-cli"));
    assert!(joined.contains("-e MODE=json-rpc"));
    assert_eq!(args.last().unwrap(), "bbernhard/signal-cli-rest-api:latest");

    let health_cmd = args.iter().position(|a| a == "--health-cmd").unwrap();
    assert_eq!(args[health_cmd + 1], "curl -sf http://localhost:8080/v1/health || exit 1");
}

#[test]
fn test_inspect_args() {
    assert_eq!(
        RealContainerRuntime::inspect_args("signal-api"),
        vec!["inspect", "--format={{.State.Running}}", "signal-api"]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_inspect_failure_means_absent() {
    let runtime = RealContainerRuntime::new().with_binary("false");
    assert_eq!(runtime.inspect("signal-api").await, RelayProcessState::Absent);

    let missing = RealContainerRuntime::new().with_binary("/nonexistent/docker");
    assert_eq!(missing.inspect("signal-api").await, RelayProcessState::Absent);
}

#[cfg(unix)]
#[tokio::test]
async fn test_inspect_output_other_than_true_means_stopped() {
    // echo prints its arguments, which is not "true"
    let runtime = RealContainerRuntime::new().with_binary("echo");
    assert_eq!(runtime.inspect("signal-api").await, RelayProcessState::Stopped);
}

#[cfg(unix)]
#[tokio::test]
async fn test_inspect_running() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-docker");
    std::fs::write(&script, "#!/bin/sh\necho true\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let runtime = RealContainerRuntime::new().with_binary(script.to_string_lossy());
    assert_eq!(runtime.inspect("signal-api").await, RelayProcessState::Running);
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_failure_is_reported() {
    let runtime = RealContainerRuntime::new().with_binary("false");

    let err = runtime.start("signal-api").await.unwrap_err();
    assert!(err.to_string().contains("false start signal-api"));

    assert!(runtime.create_and_start(&spec()).await.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_success() {
    let runtime = RealContainerRuntime::new().with_binary("true");

    assert!(runtime.start("signal-api").await.is_ok());
    assert!(runtime.create_and_start(&spec()).await.is_ok());
}
