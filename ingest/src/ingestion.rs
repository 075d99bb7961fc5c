//! Ingestion loop
//!
//! Owns the feed connection and the watermark. The connection cycles through
//! `Disconnected -> Connecting -> Connected -> Disconnected` with a flat delay
//! before every reconnect and no retry ceiling. Cancelling the loop's token is
//! the only way out: it interrupts a pending reconnect wait or closes the live
//! connection, and never leads to another attempt.

use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use shared::{component_debug, component_error, component_info, component_warn, millis_to_iso, Component, SignalMessage};

use crate::core::{Disposition, GatePolicy, Watermark};
use crate::error::IngestResult;
use crate::traits::{FeedConnector, FeedStream, Registry, Storage, WorkQueue};
use crate::types::{ConnectionState, IngestionReport};

/// Why a connected session ended
enum SessionEnd {
    Cancelled,
    Closed,
}

/// Long-lived relay feed consumer
pub struct IngestionLoop<C, R, S, Q>
where
    C: FeedConnector + 'static,
    R: Registry + 'static,
    S: Storage + 'static,
    Q: WorkQueue + 'static,
{
    // Dependencies (injected)
    connector: C,
    registry: R,
    storage: S,
    queue: Q,

    policy: GatePolicy,
    reconnect_delay: Duration,

    // Runtime state, single writer
    watermark: Watermark,
    state: watch::Sender<ConnectionState>,
    report: IngestionReport,
}

impl<C, R, S, Q> IngestionLoop<C, R, S, Q>
where
    C: FeedConnector + 'static,
    R: Registry + 'static,
    S: Storage + 'static,
    Q: WorkQueue + 'static,
{
    /// Flat delay between a disconnect and the next attempt
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

    /// Create loop with injected collaborators; the watermark starts at now
    pub fn new(connector: C, registry: R, storage: S, queue: Q, policy: GatePolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            registry,
            storage,
            queue,
            policy,
            reconnect_delay: Self::RECONNECT_DELAY,
            watermark: Watermark::starting_now(),
            state,
            report: IngestionReport::default(),
        }
    }

    /// Start from a specific watermark (fluent API)
    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = watermark;
        self
    }

    /// Override the reconnect delay (fluent API)
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Observe connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run on a background task until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> IngestionHandle {
        let state = self.subscribe_state();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        IngestionHandle { cancel, state, task }
    }

    /// Connect, consume, reconnect; returns only once `cancel` fires
    pub async fn run(mut self, cancel: CancellationToken) -> IngestionReport {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            self.report.connect_attempts += 1;
            component_info!(Component::Ingest, attempt = self.report.connect_attempts, "Connecting Signal feed");

            let connected = tokio::select! {
                result = self.connector.connect() => result,
                _ = cancel.cancelled() => break,
            };

            match connected {
                Ok(stream) => {
                    self.set_state(ConnectionState::Connected);
                    component_info!(Component::Ingest, "Signal feed connected");
                    if let SessionEnd::Cancelled = self.consume(stream, &cancel).await {
                        break;
                    }
                }
                Err(e) => {
                    component_error!(Component::Ingest, error = %e, "Signal feed connection failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            component_warn!(
                Component::Ingest,
                "Signal feed closed, reconnecting in {}s",
                self.reconnect_delay.as_secs_f32()
            );

            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        self.report.watermark = self.watermark.value();
        component_info!(Component::Ingest, "Stopped Signal message loop");
        self.report
    }

    /// Drain one connection in arrival order; the stream is dropped (closed) on return
    async fn consume(&mut self, mut stream: FeedStream, cancel: &CancellationToken) -> SessionEnd {
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                frame = stream.next() => frame,
            };

            match frame {
                Some(Ok(raw)) => {
                    self.report.frames += 1;
                    self.handle_frame(&raw).await;
                }
                Some(Err(e)) => {
                    component_error!(Component::Ingest, error = %e, "Signal feed error");
                    return SessionEnd::Closed;
                }
                None => return SessionEnd::Closed,
            }
        }
    }

    /// Process one raw feed frame to completion
    pub async fn handle_frame(&mut self, raw: &str) -> Disposition {
        let message = match SignalMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                component_error!(Component::Ingest, error = %e, raw = %preview(raw, 200), "Failed to parse Signal feed frame");
                return Disposition::Malformed;
            }
        };

        if message.text().is_none() {
            return Disposition::NoText;
        }

        let timestamp = message.timestamp();
        let watermark = self.watermark.value();
        if !self.watermark.admit(timestamp) {
            self.report.duplicates += 1;
            component_debug!(
                Component::Ingest,
                message_timestamp = timestamp,
                watermark,
                "Skipping already-seen Signal message"
            );
            return Disposition::Duplicate { timestamp, watermark };
        }

        let Some(incoming) = message.to_incoming() else {
            component_error!(Component::Ingest, message_timestamp = timestamp, "Signal message has no sender, dropping");
            return Disposition::Malformed;
        };
        let chat = &incoming.chat_jid;

        if let Err(e) = self
            .storage
            .store_chat_metadata(chat, &millis_to_iso(incoming.timestamp_millis))
            .await
        {
            component_error!(Component::Ingest, chat = %chat, error = %e, "Failed to store chat metadata");
        }

        if let Err(e) = self
            .storage
            .store_message(
                chat,
                &incoming.sender_jid,
                &incoming.sender_name,
                &incoming.text,
                incoming.timestamp_millis,
            )
            .await
        {
            component_error!(Component::Ingest, chat = %chat, error = %e, "Failed to store Signal message");
        }

        component_info!(
            Component::Ingest,
            chat = %chat,
            sender = %incoming.sender_jid,
            message_length = incoming.text.len(),
            "Signal message received"
        );

        let groups = match self.registry.registered_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                component_error!(Component::Ingest, chat = %chat, error = %e, "Failed to read registered groups");
                return Disposition::RegistryUnavailable;
            }
        };

        let Some(group) = groups.get(chat) else {
            component_info!(Component::Ingest, chat = %chat, "Signal chat not registered, ignoring");
            return Disposition::Unregistered;
        };

        let decision = self.policy.decide(group, &incoming.text);
        if !decision.dispatches() {
            component_debug!(
                Component::Ingest,
                chat = %chat,
                message = %preview(&incoming.text, 50),
                "Message ignored (no trigger)"
            );
            return Disposition::TriggerMissing;
        }

        match self.queue.enqueue_check(chat).await {
            Ok(()) => {
                self.report.dispatched += 1;
                component_info!(Component::Ingest, chat = %chat, ?decision, "Signal message queued for processing");
                Disposition::Dispatched
            }
            Err(e) => {
                component_error!(
                    Component::Ingest,
                    chat = %chat,
                    error = %e,
                    "Failed to queue Signal message, check dropped"
                );
                Disposition::DispatchFailed
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

/// At most `max_chars` characters of `text`
fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Handle to a spawned ingestion loop
pub struct IngestionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<IngestionReport>,
}

impl IngestionHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel any pending reconnect, close the connection and wait for the loop to exit
    pub async fn stop(mut self) -> IngestResult<IngestionReport> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the loop to exit after its token was cancelled elsewhere
    pub async fn join(mut self) -> IngestResult<IngestionReport> {
        self.wait().await
    }

    /// Wait for the loop task without consuming the handle
    ///
    /// Safe to drop before it resolves (e.g. as a `select!` branch); must not
    /// be awaited again once it has returned.
    pub async fn wait(&mut self) -> IngestResult<IngestionReport> {
        Ok((&mut self.task).await?)
    }
}
