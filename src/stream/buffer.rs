// =============================================================================
// Message Buffer — fixed-capacity, drop-oldest
// =============================================================================
//
// The single live connection is the only producer; any number of readers
// drain. A drain empties the buffer, so every message is delivered at most
// once. When full, the oldest message is discarded to make room.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StreamMessage {
    /// Arrival order across the life of the process, starting at 1.
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

pub struct MessageBuffer {
    capacity: usize,
    queue: Mutex<VecDeque<StreamMessage>>,
    seq: AtomicU64,
    dropped: AtomicU64,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            seq: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, payload: serde_json::Value) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let msg = StreamMessage {
            seq,
            received_at: Utc::now(),
            payload,
        };

        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        queue.push_back(msg);
    }

    /// Take every buffered message, oldest first.
    pub fn drain(&self) -> Vec<StreamMessage> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_received(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    pub fn total_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
