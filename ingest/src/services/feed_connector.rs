//! WebSocket receive feed

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use shared::{component_debug, Component};

use crate::error::{IngestError, IngestResult};
use crate::traits::{FeedConnector, FeedStream};

/// Opens `ws://<relay>/v1/receive/<number>` (`wss://` for an https relay) and yields its text frames
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self) -> IngestResult<FeedStream> {
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| IngestError::ConnectFailed {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        component_debug!(Component::Ingest, url = %self.url, "WebSocket handshake complete");

        let frames = socket.filter_map(|message| future::ready(frame_payload(message)));
        Ok(Box::pin(frames))
    }
}

/// Payload of one websocket message; control frames carry none
fn frame_payload(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<IngestResult<String>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => Some(
            String::from_utf8(bytes).map_err(|e| IngestError::transport(format!("non UTF-8 binary frame: {e}"))),
        ),
        Ok(_) => None,
        Err(e) => Some(Err(IngestError::transport(e.to_string()))),
    }
}
