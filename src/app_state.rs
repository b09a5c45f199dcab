// =============================================================================
// Central Application State — Options Desk
// =============================================================================
//
// Ties the pipeline, the latest rows and the live stream together for the
// refresh loop and the REST API.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for the row table and small status fields.
//   - The pipeline and stream manager manage their own interior mutability.
//   - Stream switches hold `stream_switch` until the mark is written, so the
//     mark always names the connection that is live.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;

use crate::pipeline::{InstrumentRow, Pipeline};
use crate::runtime_config::RuntimeConfig;
use crate::stream::{StreamManager, StreamTarget};

/// Which ticker is streamed, and the buffer's receive counter when its
/// subscription began.
#[derive(Debug, Clone)]
struct StreamMark {
    ticker: String,
    received_at_start: u64,
}

pub struct AppState {
    /// Incremented on every refresh and stream switch.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub pipeline: Arc<Pipeline>,
    pub stream: Arc<StreamManager>,

    rows: RwLock<HashMap<String, InstrumentRow>>,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
    stream_mark: RwLock<Option<StreamMark>>,
    stream_switch: tokio::sync::Mutex<()>,

    pub start_time: std::time::Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state_version: u64,
    pub uptime_secs: u64,
    pub tickers: Vec<String>,
    pub rows: usize,
    pub last_refresh: Option<String>,
    pub stream_ticker: Option<String>,
    pub stream_buffered: usize,
    pub stream_received: u64,
    pub stream_dropped: u64,
}

impl AppState {
    pub fn new(config: RuntimeConfig, pipeline: Arc<Pipeline>, stream: Arc<StreamManager>) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            pipeline,
            stream,
            rows: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
            stream_mark: RwLock::new(None),
            stream_switch: tokio::sync::Mutex::new(()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Rows ────────────────────────────────────────────────────────────

    /// Evaluate every configured ticker and replace the stored rows.
    pub async fn refresh(&self) -> usize {
        let tickers = self.runtime_config.read().tickers.clone();
        let mut rows = self.pipeline.evaluate_all(&tickers).await;

        let mark = self.stream_mark.read().clone();
        if let Some(mark) = mark {
            let received = self.stream.buffer().total_received();
            for row in rows.iter_mut().filter(|r| r.ticker == mark.ticker) {
                row.stream_messages = Some(received.saturating_sub(mark.received_at_start));
            }
        }

        let count = rows.len();
        {
            let mut table = self.rows.write();
            for row in rows {
                table.insert(row.ticker.clone(), row);
            }
        }
        *self.last_refresh.write() = Some(Utc::now());
        self.pipeline.purge_caches();
        self.increment_version();
        count
    }

    /// Rows in configured ticker order; rows for tickers no longer
    /// configured are left out.
    pub fn rows(&self) -> Vec<InstrumentRow> {
        let tickers = self.runtime_config.read().tickers.clone();
        let table = self.rows.read();
        tickers
            .iter()
            .filter_map(|t| table.get(&t.to_uppercase()).cloned())
            .collect()
    }

    pub fn row(&self, ticker: &str) -> Option<InstrumentRow> {
        self.rows.read().get(&ticker.trim().to_uppercase()).cloned()
    }

    // ── Live stream ─────────────────────────────────────────────────────

    /// Point the live stream at `ticker`, replacing any running connection.
    pub async fn subscribe(&self, ticker: &str) -> StreamTarget {
        let target = self.pipeline.stream_target(ticker).await;

        let switch = self.stream_switch.lock().await;
        let received_at_start = self.stream.start(target.clone()).await;
        *self.stream_mark.write() = Some(StreamMark {
            ticker: target.ticker.clone(),
            received_at_start,
        });
        drop(switch);

        self.increment_version();
        info!(ticker = %target.ticker, channels = ?target.symbols, "live stream switched");
        target
    }

    pub async fn unsubscribe(&self) {
        let _switch = self.stream_switch.lock().await;
        self.stream.stop().await;
        *self.stream_mark.write() = None;
        self.increment_version();
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn status(&self) -> StatusSnapshot {
        let buffer = self.stream.buffer();
        StatusSnapshot {
            state_version: self.current_state_version(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            tickers: self.runtime_config.read().tickers.clone(),
            rows: self.rows.read().len(),
            last_refresh: self.last_refresh.read().map(|t| t.to_rfc3339()),
            stream_ticker: self.stream_mark.read().as_ref().map(|m| m.ticker.clone()),
            stream_buffered: buffer.len(),
            stream_received: buffer.total_received(),
            stream_dropped: buffer.total_dropped(),
        }
    }
}
