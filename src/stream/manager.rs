// =============================================================================
// Stream Manager — at most one live connection per process
// =============================================================================
//
// The manager owns the only worker handle. Every transition runs under one
// async lock and is strictly "close old, then open new":
//
//   1. signal the current worker to shut down
//   2. wait for it up to the join timeout; on timeout abort it and move on
//   3. read the buffer's receive counter, then spawn the worker for the new
//      target
//
// The worker reconnects after a delay when its connection drops, until it is
// told to stop.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::buffer::MessageBuffer;
use super::protocol::StreamTarget;

/// One connection session. Returns when the connection ends or `shutdown`
/// flips to `true`.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    async fn run(
        &self,
        target: &StreamTarget,
        buffer: Arc<MessageBuffer>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()>;
}

struct Worker {
    target: StreamTarget,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct StreamManager {
    transport: Arc<dyn StreamTransport>,
    buffer: Arc<MessageBuffer>,
    join_timeout: Duration,
    reconnect_delay: Duration,
    active: Mutex<Option<Worker>>,
}

impl StreamManager {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        buffer: Arc<MessageBuffer>,
        join_timeout: Duration,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            transport,
            buffer,
            join_timeout,
            reconnect_delay,
            active: Mutex::new(None),
        }
    }

    pub fn buffer(&self) -> &Arc<MessageBuffer> {
        &self.buffer
    }

    /// Replace whatever is running with a connection for `target`.
    ///
    /// Returns the buffer's receive counter taken after the old connection
    /// closed and before the new one opened. Messages counted beyond it
    /// belong to `target`.
    pub async fn start(&self, target: StreamTarget) -> u64 {
        let mut active = self.active.lock().await;
        if let Some(worker) = active.take() {
            self.shut_down(worker).await;
        }
        let received_at_start = self.buffer.total_received();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker_loop(
            self.transport.clone(),
            target.clone(),
            self.buffer.clone(),
            rx,
            self.reconnect_delay,
        ));
        info!(ticker = %target.ticker, channels = ?target.symbols, "stream worker started");

        *active = Some(Worker {
            target,
            shutdown: tx,
            handle,
        });
        received_at_start
    }

    /// Stop the current connection, if any.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        if let Some(worker) = active.take() {
            self.shut_down(worker).await;
        }
    }

    pub async fn current_target(&self) -> Option<StreamTarget> {
        self.active.lock().await.as_ref().map(|w| w.target.clone())
    }

    async fn shut_down(&self, mut worker: Worker) {
        let _ = worker.shutdown.send(true);
        match tokio::time::timeout(self.join_timeout, &mut worker.handle).await {
            Ok(_) => info!(ticker = %worker.target.ticker, "stream worker stopped"),
            Err(_) => {
                warn!(
                    ticker = %worker.target.ticker,
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "stream worker did not stop in time; aborting"
                );
                worker.handle.abort();
            }
        }
    }
}

async fn worker_loop(
    transport: Arc<dyn StreamTransport>,
    target: StreamTarget,
    buffer: Arc<MessageBuffer>,
    mut shutdown: watch::Receiver<bool>,
    reconnect_delay: Duration,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        if let Err(e) = transport
            .run(&target, buffer.clone(), shutdown.clone())
            .await
        {
            error!(ticker = %target.ticker, error = %e, "stream error; reconnecting");
        }

        if *shutdown.borrow() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
