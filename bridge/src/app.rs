//! Composition of the supervisor, ingestion loop and background tasks

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ingest::services::{ChannelQueue, JsonRegistry, JsonlStorage, SignalClient, WebSocketConnector};
use ingest::{
    GatePolicy, IngestError, IngestionHandle, IngestionLoop, IngestionReport, MessagingClient, Outbound, Watermark,
};
use shared::{component_info, component_warn, logging, BridgeConfig, ChatJid, Component};
use supervisor::services::{RealContainerRuntime, RealHealthProbe};
use supervisor::{RelaySpec, RelaySupervisor};

use crate::cli::{normalize_code, validate_number};

type SharedOutbound = Arc<Outbound<Arc<SignalClient>, Arc<JsonlStorage>>>;
type BridgeLoop = IngestionLoop<WebSocketConnector, JsonRegistry, Arc<JsonlStorage>, ChannelQueue>;

fn relay_supervisor(
    config: &BridgeConfig,
    cancel: &CancellationToken,
) -> RelaySupervisor<RealContainerRuntime, RealHealthProbe> {
    RelaySupervisor::new(
        RealContainerRuntime::new(),
        RealHealthProbe::new(config.health_url()),
        RelaySpec::from_config(config),
    )
    .with_cancellation(cancel.clone())
}

/// Cancel `cancel` on Ctrl+C
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                logging::log_shutdown(Component::Bridge, "Received Ctrl+C signal");
                cancel.cancel();
            }
            Err(err) => {
                logging::log_error(Component::Bridge, "Signal handling", &err);
            }
        }
    });
}

/// Supervise the relay, then ingest until Ctrl+C
pub async fn run(config: BridgeConfig) -> Result<()> {
    // Messages the relay queues while it cold-boots are newer than this
    let started = Watermark::starting_now();

    if !config.enabled {
        component_info!(Component::Bridge, "Signal integration disabled (SIGNAL_ENABLED is not set)");
        return Ok(());
    }
    let number = config.require_number()?.to_string();

    logging::log_startup(Component::Bridge, &format!("Signal bridge for {number}"));

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    if !relay_supervisor(&config, &cancel).ensure_relay_ready().await {
        if cancel.is_cancelled() {
            return Ok(());
        }
        bail!("Signal relay at {} did not become ready", config.api_url);
    }

    let client = Arc::new(SignalClient::new(&config.api_url, &number)?);
    let storage = Arc::new(JsonlStorage::in_data_dir(&config.data_dir));
    let outbound: SharedOutbound = Arc::new(Outbound::new(client, storage.clone()));

    let (queue, checks) = ChannelQueue::channel();
    let drain = spawn_check_drain(checks, cancel.clone());
    let sync = spawn_group_sync(outbound, config.group_sync_interval, cancel.clone());

    let handle = ingestion_loop(&config, &number, started, storage, queue).spawn(cancel.clone());

    component_info!(Component::Bridge, "Signal message loop started");

    let report = supervise_loop(handle, &cancel).await;

    for (context, task) in [("Group sync task", sync), ("Check drain task", drain)] {
        if let Err(e) = task.await {
            logging::log_error(Component::Bridge, context, &e);
        }
    }

    let report = report?;
    component_info!(
        Component::Bridge,
        connect_attempts = report.connect_attempts,
        frames = report.frames,
        duplicates = report.duplicates,
        dispatched = report.dispatched,
        "Ingestion loop finished"
    );

    logging::log_success(Component::Bridge, "Signal bridge stopped gracefully");
    Ok(())
}

/// Ingestion loop on the relay feed with file-backed registry and storage
fn ingestion_loop(
    config: &BridgeConfig,
    number: &str,
    started: Watermark,
    storage: Arc<JsonlStorage>,
    queue: ChannelQueue,
) -> BridgeLoop {
    IngestionLoop::new(
        WebSocketConnector::new(config.feed_url(number)),
        JsonRegistry::in_data_dir(&config.data_dir),
        storage,
        queue,
        GatePolicy::from_config(config),
    )
    .with_watermark(started)
}

/// Wait for shutdown, or for the loop task to die on its own
///
/// The loop only returns once cancelled, so an early exit is a crash: the
/// token is cancelled to bring the other tasks down with it.
async fn supervise_loop(mut handle: IngestionHandle, cancel: &CancellationToken) -> Result<IngestionReport> {
    let early_exit = tokio::select! {
        result = handle.wait() => Some(result),
        _ = cancel.cancelled() => None,
    };

    let result = match early_exit {
        Some(result) => {
            cancel.cancel();
            result
        }
        None => handle.wait().await,
    };

    result.map_err(|e| {
        logging::log_error(Component::Bridge, "Ingestion loop", &e);
        e.into()
    })
}

/// Stand-in consumer for the work queue: logs every check request
fn spawn_check_drain(mut checks: mpsc::UnboundedReceiver<ChatJid>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let chat = tokio::select! {
                chat = checks.recv() => chat,
                _ = cancel.cancelled() => break,
            };
            match chat {
                Some(chat) => component_info!(Component::Bridge, chat = %chat, "Check requested"),
                None => break,
            }
        }
    })
}

/// Refresh group names now and then every `period`
fn spawn_group_sync(
    outbound: SharedOutbound,
    period: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    outbound.sync_group_metadata().await;
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}

/// Make sure the relay answers before talking to it, starting it if needed
async fn ensure_relay(config: &BridgeConfig, client: &SignalClient) -> Result<()> {
    if client.health().await.unwrap_or(false) {
        return Ok(());
    }

    component_warn!(Component::Bridge, "Signal relay not running, starting it");
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    if !relay_supervisor(config, &cancel).ensure_relay_ready().await {
        bail!("Failed to start the Signal relay at {}", config.api_url);
    }
    Ok(())
}

/// Request a verification SMS, unless the number is already registered
pub async fn register(config: BridgeConfig, number: &str, captcha: Option<&str>) -> Result<()> {
    let number = validate_number(number)?;
    let client = SignalClient::new(&config.api_url, number)?;
    ensure_relay(&config, &client).await?;

    if let Ok(account) = client.account_info().await {
        println!("{number} is already registered with Signal:");
        println!("{}", serde_json::to_string_pretty(&account)?);
        print_env_hint(number);
        return Ok(());
    }

    match client.register(captcha).await {
        Ok(()) => {
            println!("Registration requested. Complete it with:");
            println!("  bridge verify --number {number} --code <code from SMS>");
            Ok(())
        }
        Err(IngestError::CaptchaRequired) => {
            bail!(
                "Signal requires a captcha. Solve one at https://signalcaptchas.org/registration/generate.html \
                 and re-run: bridge register --number {number} --captcha <token>"
            )
        }
        Err(e) => Err(e).context("Registration failed"),
    }
}

/// Complete registration with the SMS code
pub async fn verify(config: BridgeConfig, number: &str, code: &str) -> Result<()> {
    let number = validate_number(number)?;
    let code = normalize_code(code)?;
    let client = SignalClient::new(&config.api_url, number)?;
    ensure_relay(&config, &client).await?;

    client.verify(&code).await.context("Verification failed")?;

    println!("{number} is verified.");
    print_env_hint(number);
    Ok(())
}

/// Print the relay's view of an account
pub async fn account(config: BridgeConfig, number: &str) -> Result<()> {
    let number = validate_number(number)?;
    let client = SignalClient::new(&config.api_url, number)?;
    ensure_relay(&config, &client).await?;

    let info = client.account_info().await.context("Failed to read account")?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn print_env_hint(number: &str) {
    println!();
    println!("Add to your .env to enable the bridge:");
    println!("  SIGNAL_ENABLED=true");
    println!("  SIGNAL_NUMBER={number}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest::traits::{MockFeedConnector, MockRegistry, MockStorage, MockWorkQueue};
    use ingest::{Disposition, FeedStream, IngestResult};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> BridgeConfig {
        let data_dir = dir.path().to_string_lossy().to_string();
        BridgeConfig::from_lookup(|key| match key {
            "SIGNAL_ENABLED" => Some("true".to_string()),
            "SIGNAL_NUMBER" => Some("+15550001".to_string()),
            "DATA_DIR" => Some(data_dir.clone()),
            _ => None,
        })
        .unwrap()
    }

    type MockedLoop = IngestionLoop<MockFeedConnector, MockRegistry, MockStorage, MockWorkQueue>;

    fn mocked_loop(connector: MockFeedConnector) -> MockedLoop {
        IngestionLoop::new(
            connector,
            MockRegistry::new(),
            MockStorage::new(),
            MockWorkQueue::new(),
            GatePolicy::new(shared::config::trigger_for("Andy").unwrap(), "main"),
        )
    }

    #[tokio::test]
    async fn test_messages_queued_during_startup_are_ingested() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::write(
            dir.path().join(JsonRegistry::FILE_NAME),
            r#"{ "signal:main-group": { "name": "Main", "folder": "main" } }"#,
        )
        .unwrap();

        let started = Watermark::starting_now();
        // Relay cold boot
        tokio::time::sleep(Duration::from_millis(50)).await;

        let storage = Arc::new(JsonlStorage::in_data_dir(&config.data_dir));
        let (queue, mut checks) = ChannelQueue::channel();
        let mut ingestion = ingestion_loop(&config, "+15550001", started, storage.clone(), queue);
        assert_eq!(ingestion.watermark(), started);

        let frame = serde_json::json!({
            "envelope": {
                "sourceNumber": "+15550002",
                "timestamp": started.value() + 20,
                "dataMessage": { "message": "sent while booting", "groupInfo": { "groupId": "main-group" } }
            }
        })
        .to_string();

        assert_eq!(ingestion.handle_frame(&frame).await, Disposition::Dispatched);
        assert_eq!(checks.try_recv().unwrap(), ChatJid::group("main-group"));
        assert_eq!(storage.read_messages().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_crashed_loop_ends_supervision() {
        let mut connector = MockFeedConnector::new();
        connector
            .expect_connect()
            .returning(|| -> IngestResult<FeedStream> { panic!("feed task crashed") });

        let cancel = CancellationToken::new();
        let handle = mocked_loop(connector).spawn(cancel.clone());

        assert!(supervise_loop(handle, &cancel).await.is_err());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancellation_returns_loop_report() {
        let mut connector = MockFeedConnector::new();
        connector
            .expect_connect()
            .returning(|| Err(IngestError::transport("connection refused")));

        let cancel = CancellationToken::new();
        let handle = mocked_loop(connector).spawn(cancel.clone());
        cancel.cancel();

        let report = supervise_loop(handle, &cancel).await.unwrap();
        assert!(report.connect_attempts <= 1);
    }
}
