// =============================================================================
// Live Stream Module
// =============================================================================
//
// - `buffer`   — bounded drop-oldest message buffer drained by readers
// - `manager`  — owns the single background connection and its lifecycle
// - `protocol` — Polygon auth/subscribe frames and the WebSocket transport

pub mod buffer;
pub mod manager;
pub mod protocol;

pub use buffer::{MessageBuffer, StreamMessage};
pub use manager::{StreamManager, StreamTransport};
pub use protocol::{auth_frame, subscribe_frame, PolygonTransport, StreamTarget};

/// Delay before a dropped connection is re-established.
pub const RECONNECT_DELAY_SECS: u64 = 5;
