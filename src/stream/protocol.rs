// =============================================================================
// Polygon WebSocket protocol — frames and the live transport
// =============================================================================
//
// Session: connect, send one auth frame, send one subscribe frame per
// channel, then read. Every inbound text frame that parses as JSON is pushed
// into the buffer as-is, in arrival order.
//
//   {"action":"auth","params":"<key>"}
//   {"action":"subscribe","params":"T.O:NVDA250117C00150000"}
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::buffer::MessageBuffer;
use super::manager::StreamTransport;

/// What a live connection subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTarget {
    pub ticker: String,
    /// Channel names, e.g. `T.O:NVDA250117C00150000` and `T.NVDA`.
    pub symbols: Vec<String>,
}

pub fn auth_frame(api_key: &str) -> String {
    json!({ "action": "auth", "params": api_key }).to_string()
}

pub fn subscribe_frame(symbol: &str) -> String {
    json!({ "action": "subscribe", "params": symbol }).to_string()
}

// ---------------------------------------------------------------------------
// Live transport
// ---------------------------------------------------------------------------

pub struct PolygonTransport {
    url: String,
    api_key: Option<String>,
}

impl PolygonTransport {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl StreamTransport for PolygonTransport {
    async fn run(
        &self,
        target: &StreamTarget,
        buffer: Arc<MessageBuffer>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let key = self
            .api_key
            .as_deref()
            .context("POLYGON_API_KEY is not set; live stream unavailable")?;

        info!(url = %self.url, ticker = %target.ticker, "connecting to options WebSocket");
        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .context("failed to connect to options WebSocket")?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(auth_frame(key)))
            .await
            .context("failed to send auth frame")?;
        for symbol in &target.symbols {
            write
                .send(Message::Text(subscribe_frame(symbol)))
                .await
                .with_context(|| format!("failed to subscribe to {symbol}"))?;
            debug!(symbol = %symbol, "subscribed");
        }
        info!(ticker = %target.ticker, channels = target.symbols.len(), "options WebSocket subscribed");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        info!(ticker = %target.ticker, "options WebSocket closed");
                        return Ok(());
                    }
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<serde_json::Value>(&text) {
                            Ok(payload) => buffer.push(payload),
                            Err(e) => warn!(error = %e, "failed to parse stream frame"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!(ticker = %target.ticker, ?frame, "options WebSocket closed by server");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("options WebSocket read error"),
                    None => {
                        warn!(ticker = %target.ticker, "options WebSocket stream ended");
                        return Ok(());
                    }
                },
            }
        }
    }
}
