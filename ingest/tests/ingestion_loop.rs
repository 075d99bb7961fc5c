//! Ingestion loop behavior against scripted feeds
//!
//! Runs on paused time so reconnect delays are exact and instant.

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures_util::stream;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ingest::error::IngestError;
use ingest::services::ChannelQueue;
use ingest::traits::MockRegistry;
use ingest::{
    ConnectionState, Disposition, FeedConnector, FeedStream, GatePolicy, IngestResult, IngestionLoop, Registry,
    Storage, Watermark,
};
use shared::{ChatJid, RegisteredGroup};

const GROUP: &str = "g1";
const MAIN: &str = "main-group";
const ALICE: &str = "+15550001";

/// Hands out one pre-scripted session per connect call
#[derive(Clone)]
struct ScriptedFeed {
    sessions: Arc<Mutex<VecDeque<IngestResult<mpsc::UnboundedReceiver<String>>>>>,
    attempts: mpsc::UnboundedSender<Instant>,
}

impl ScriptedFeed {
    fn new() -> (Self, mpsc::UnboundedReceiver<Instant>) {
        let (attempts, attempt_rx) = mpsc::unbounded_channel();
        let feed = Self {
            sessions: Arc::new(Mutex::new(VecDeque::new())),
            attempts,
        };
        (feed, attempt_rx)
    }

    /// Queue a session; frames sent on the returned sender arrive on it and dropping it closes it
    fn session(&self) -> mpsc::UnboundedSender<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.lock().unwrap().push_back(Ok(rx));
        tx
    }

    /// Queue a session that has already delivered `frames` and closed
    fn closed_session(&self, frames: &[String]) {
        let tx = self.session();
        for frame in frames {
            tx.send(frame.clone()).unwrap();
        }
    }

    fn refused(&self) {
        self.sessions
            .lock()
            .unwrap()
            .push_back(Err(IngestError::transport("connection refused")));
    }
}

#[async_trait]
impl FeedConnector for ScriptedFeed {
    async fn connect(&self) -> IngestResult<FeedStream> {
        let _ = self.attempts.send(Instant::now());
        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(Ok(rx)) => {
                let frames = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|frame| (Ok(frame), rx)) });
                Ok(Box::pin(frames))
            }
            Some(Err(e)) => Err(e),
            None => Err(IngestError::transport("no more sessions")),
        }
    }
}

struct StaticRegistry(HashMap<ChatJid, RegisteredGroup>);

#[async_trait]
impl Registry for StaticRegistry {
    async fn registered_groups(&self) -> IngestResult<HashMap<ChatJid, RegisteredGroup>> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
struct MemoryStorage {
    messages: Mutex<Vec<(ChatJid, String, i64)>>,
    activity: Mutex<Vec<(ChatJid, String)>>,
}

impl MemoryStorage {
    fn messages(&self) -> Vec<(ChatJid, String, i64)> {
        self.messages.lock().unwrap().clone()
    }

    fn activity(&self) -> Vec<(ChatJid, String)> {
        self.activity.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store_message(
        &self,
        chat: &ChatJid,
        _sender: &ChatJid,
        _sender_name: &str,
        text: &str,
        timestamp_millis: i64,
    ) -> IngestResult<()> {
        self.messages
            .lock()
            .unwrap()
            .push((chat.clone(), text.to_string(), timestamp_millis));
        Ok(())
    }

    async fn store_chat_metadata(&self, chat: &ChatJid, last_activity: &str) -> IngestResult<()> {
        self.activity
            .lock()
            .unwrap()
            .push((chat.clone(), last_activity.to_string()));
        Ok(())
    }

    async fn update_chat_name(&self, _chat: &ChatJid, _name: &str) -> IngestResult<()> {
        Ok(())
    }
}

fn group_frame(group_id: &str, text: &str, timestamp: i64) -> String {
    json!({
        "envelope": {
            "source": ALICE,
            "sourceNumber": ALICE,
            "sourceName": "Alice",
            "sourceUuid": "7f1c1a4e-0000-4000-8000-000000000001",
            "timestamp": timestamp,
            "dataMessage": {
                "timestamp": timestamp,
                "message": text,
                "groupInfo": { "groupId": group_id, "type": "DELIVER" }
            }
        },
        "account": "+15559999"
    })
    .to_string()
}

fn direct_frame(sender: &str, text: &str, timestamp: i64) -> String {
    json!({
        "envelope": {
            "sourceNumber": sender,
            "timestamp": timestamp,
            "dataMessage": { "timestamp": timestamp, "message": text }
        },
        "account": "+15559999"
    })
    .to_string()
}

fn receipt_frame(timestamp: i64) -> String {
    json!({
        "envelope": {
            "sourceNumber": ALICE,
            "timestamp": timestamp,
            "receiptMessage": { "when": timestamp, "isDelivery": true, "timestamps": [timestamp - 1] }
        },
        "account": "+15559999"
    })
    .to_string()
}

fn policy() -> GatePolicy {
    GatePolicy::new(shared::config::trigger_for("Andy").unwrap(), "main")
}

/// `g1` requires the trigger; `main-group` is the main chat
fn registry() -> StaticRegistry {
    let mut groups = HashMap::new();
    groups.insert(ChatJid::group(GROUP), RegisteredGroup::new("family"));
    groups.insert(ChatJid::group(MAIN), RegisteredGroup::new("main"));
    StaticRegistry(groups)
}

type TestLoop = IngestionLoop<ScriptedFeed, StaticRegistry, Arc<MemoryStorage>, ChannelQueue>;

fn ingestion(
    feed: ScriptedFeed,
) -> (TestLoop, Arc<MemoryStorage>, mpsc::UnboundedReceiver<ChatJid>) {
    let storage = Arc::new(MemoryStorage::default());
    let (queue, checks) = ChannelQueue::channel();
    let ingestion = IngestionLoop::new(feed, registry(), storage.clone(), queue, policy()).with_watermark(Watermark::at(0));
    (ingestion, storage, checks)
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_message_dispatches_once() {
    let (feed, _attempts) = ScriptedFeed::new();
    let session = feed.session();
    let (ingestion, storage, mut checks) = ingestion(feed);
    let handle = ingestion.spawn(CancellationToken::new());

    session.send(group_frame(GROUP, "@Andy hello", 1000)).unwrap();
    session.send(group_frame(GROUP, "@Andy hello", 1000)).unwrap();
    session.send(group_frame(GROUP, "@Andy again", 2000)).unwrap();

    assert_eq!(checks.recv().await.unwrap(), ChatJid::group(GROUP));
    assert_eq!(checks.recv().await.unwrap(), ChatJid::group(GROUP));

    let report = handle.stop().await.unwrap();
    assert_eq!(report.frames, 3);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.watermark, 2000);
    assert_eq!(storage.messages().len(), 2);
    assert!(checks.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_flat_delay() {
    let (feed, mut attempts) = ScriptedFeed::new();
    feed.closed_session(&[]);
    feed.refused();
    let (ingestion, _storage, _checks) = ingestion(feed);
    let handle = ingestion.spawn(CancellationToken::new());

    let first = attempts.recv().await.unwrap();
    let second = attempts.recv().await.unwrap();
    let third = attempts.recv().await.unwrap();

    // A refused connect waits exactly like a closed session
    assert_eq!(second - first, Duration::from_secs(5));
    assert_eq!(third - second, Duration::from_secs(5));

    let report = handle.stop().await.unwrap();
    assert_eq!(report.connect_attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_reconnect_wait_prevents_next_attempt() {
    let (feed, mut attempts) = ScriptedFeed::new();
    feed.closed_session(&[]);
    let (ingestion, _storage, _checks) = ingestion(feed);
    let handle = ingestion.spawn(CancellationToken::new());
    let started = Instant::now();

    attempts.recv().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);

    let report = handle.stop().await.unwrap();

    assert_eq!(report.connect_attempts, 1);
    assert!(started.elapsed() < Duration::from_secs(5));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(attempts.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_stop_closes_live_session() {
    let (feed, _attempts) = ScriptedFeed::new();
    let session = feed.session();
    let (ingestion, _storage, mut checks) = ingestion(feed);
    let mut state = ingestion.subscribe_state();
    let handle = ingestion.spawn(CancellationToken::new());

    session.send(group_frame(MAIN, "status?", 1000)).unwrap();
    checks.recv().await.unwrap();
    state.wait_for(|s| *s == ConnectionState::Connected).await.unwrap();

    let report = handle.stop().await.unwrap();

    assert_eq!(report.connect_attempts, 1);
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    // The loop dropped its end of the feed
    assert!(session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_watermark_holds_across_reconnects() {
    let (feed, _attempts) = ScriptedFeed::new();
    feed.closed_session(&[group_frame(MAIN, "first", 2000)]);
    feed.closed_session(&[
        group_frame(MAIN, "first", 2000),
        group_frame(MAIN, "older", 1500),
        group_frame(MAIN, "newer", 3000),
    ]);
    let (ingestion, storage, mut checks) = ingestion(feed);
    let handle = ingestion.spawn(CancellationToken::new());

    checks.recv().await.unwrap();
    checks.recv().await.unwrap();

    let report = handle.stop().await.unwrap();
    assert_eq!(report.duplicates, 2);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.watermark, 3000);

    let stored: Vec<i64> = storage.messages().iter().map(|(_, _, ts)| *ts).collect();
    assert_eq!(stored, vec![2000, 3000]);
}

#[tokio::test(start_paused = true)]
async fn test_non_message_frames_are_skipped() {
    let (feed, _attempts) = ScriptedFeed::new();
    let session = feed.session();
    let (ingestion, storage, mut checks) = ingestion(feed);
    let handle = ingestion.spawn(CancellationToken::new());

    session.send("not json at all".to_string()).unwrap();
    session.send(receipt_frame(5000)).unwrap();
    session.send(json!({ "account": "+15559999" }).to_string()).unwrap();
    session.send(group_frame(MAIN, "still alive", 1000)).unwrap();

    assert_eq!(checks.recv().await.unwrap(), ChatJid::group(MAIN));

    let report = handle.stop().await.unwrap();
    assert_eq!(report.frames, 4);
    // Text-less frames never move the watermark
    assert_eq!(report.watermark, 1000);
    assert_eq!(storage.messages().len(), 1);
}

#[tokio::test]
async fn test_main_chat_needs_no_trigger() {
    let (feed, _attempts) = ScriptedFeed::new();
    let (mut ingestion, _storage, mut checks) = ingestion(feed);

    let disposition = ingestion.handle_frame(&group_frame(MAIN, "what's on today", 1000)).await;

    assert_eq!(disposition, Disposition::Dispatched);
    assert_eq!(checks.try_recv().unwrap(), ChatJid::group(MAIN));
}

#[tokio::test]
async fn test_trigger_gated_chat_stores_everything() {
    let (feed, _attempts) = ScriptedFeed::new();
    let (mut ingestion, storage, mut checks) = ingestion(feed);

    assert_eq!(
        ingestion.handle_frame(&group_frame(GROUP, "dinner at 7", 1000)).await,
        Disposition::TriggerMissing
    );
    assert!(checks.try_recv().is_err());

    assert_eq!(
        ingestion.handle_frame(&group_frame(GROUP, "@andy can you remind us?", 2000)).await,
        Disposition::Dispatched
    );
    assert_eq!(checks.try_recv().unwrap(), ChatJid::group(GROUP));

    let texts: Vec<String> = storage.messages().into_iter().map(|(_, text, _)| text).collect();
    assert_eq!(texts, vec!["dinner at 7", "@andy can you remind us?"]);
}

#[tokio::test]
async fn test_unregistered_chat_is_recorded_not_dispatched() {
    let (feed, _attempts) = ScriptedFeed::new();
    let (mut ingestion, storage, mut checks) = ingestion(feed);

    let disposition = ingestion.handle_frame(&direct_frame("+15550002", "hi there", 1_700_000_000_123)).await;

    assert_eq!(disposition, Disposition::Unregistered);
    assert!(checks.try_recv().is_err());

    let chat = ChatJid::direct("+15550002");
    assert_eq!(storage.messages(), vec![(chat.clone(), "hi there".to_string(), 1_700_000_000_123)]);
    assert_eq!(storage.activity(), vec![(chat, "2023-11-14T22:13:20.123Z".to_string())]);
}

#[tokio::test]
async fn test_stale_message_never_reaches_registry() {
    let (feed, _attempts) = ScriptedFeed::new();
    let storage = Arc::new(MemoryStorage::default());
    let (queue, _checks) = ChannelQueue::channel();

    let mut registry = MockRegistry::new();
    registry.expect_registered_groups().never();

    let mut ingestion =
        IngestionLoop::new(feed, registry, storage.clone(), queue, policy()).with_watermark(Watermark::at(5000));

    let disposition = ingestion.handle_frame(&group_frame(MAIN, "old news", 4000)).await;

    assert_eq!(
        disposition,
        Disposition::Duplicate {
            timestamp: 4000,
            watermark: 5000
        }
    );
    assert!(storage.messages().is_empty());
    assert_eq!(ingestion.watermark(), Watermark::at(5000));
}

#[tokio::test]
async fn test_registry_failure_keeps_message() {
    let (feed, _attempts) = ScriptedFeed::new();
    let storage = Arc::new(MemoryStorage::default());
    let (queue, mut checks) = ChannelQueue::channel();

    let mut registry = MockRegistry::new();
    registry
        .expect_registered_groups()
        .times(1)
        .returning(|| Err(IngestError::storage("registry locked")));

    let mut ingestion =
        IngestionLoop::new(feed, registry, storage.clone(), queue, policy()).with_watermark(Watermark::at(0));

    let disposition = ingestion.handle_frame(&group_frame(MAIN, "hello", 1000)).await;

    assert_eq!(disposition, Disposition::RegistryUnavailable);
    assert_eq!(storage.messages().len(), 1);
    assert!(checks.try_recv().is_err());
}

#[tokio::test]
async fn test_closed_queue_drops_check_and_continues() {
    let (feed, _attempts) = ScriptedFeed::new();
    let (mut ingestion, storage, checks) = ingestion(feed);
    drop(checks);

    assert_matches!(
        ingestion.handle_frame(&group_frame(MAIN, "one", 1000)).await,
        Disposition::DispatchFailed
    );
    assert_matches!(
        ingestion.handle_frame(&group_frame(MAIN, "two", 2000)).await,
        Disposition::DispatchFailed
    );
    assert_eq!(storage.messages().len(), 2);
}

#[tokio::test]
async fn test_sender_less_message_is_malformed() {
    let (feed, _attempts) = ScriptedFeed::new();
    let (mut ingestion, storage, _checks) = ingestion(feed);

    let frame = json!({
        "envelope": { "timestamp": 1000, "dataMessage": { "message": "who am I" } }
    })
    .to_string();

    assert_eq!(ingestion.handle_frame(&frame).await, Disposition::Malformed);
    assert!(storage.messages().is_empty());
}
