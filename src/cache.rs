// =============================================================================
// TTL Cache — per-key memoisation of selector results
// =============================================================================
//
// Each key owns an async slot. `get_or_fetch` locks the slot, returns the
// stored value if it is younger than the TTL, and otherwise runs the fetch
// while still holding the slot. Consequences:
//
//   - at most one fetch per key is in flight; concurrent callers for the same
//     key wait and then read the fresh value
//   - a reader sees either the previous complete value or the new one
//   - an expired entry blocks its readers until the refresh completes
//
// Different keys never contend beyond the short map lookup.
// =============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::runtime_config::RuntimeConfig;

/// The two freshness classes the desk uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Quotes, historicals and chains.
    Market,
    /// Macro sentiment.
    Sentiment,
}

impl TtlClass {
    pub fn ttl(self, config: &RuntimeConfig) -> Duration {
        match self {
            Self::Market => config.market_ttl(),
            Self::Sentiment => config.sentiment_ttl(),
        }
    }
}

/// (operation, instrument, adapter-set identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub op: &'static str,
    pub instrument: String,
    pub sources: String,
}

impl CacheKey {
    pub fn new(op: &'static str, instrument: impl Into<String>, sources: impl Into<String>) -> Self {
        Self {
            op,
            instrument: instrument.into(),
            sources: sources.into(),
        }
    }
}

type Slot<V> = Arc<tokio::sync::Mutex<Option<(Instant, V)>>>;

pub struct TtlCache<V> {
    ttl: Duration,
    slots: Mutex<HashMap<CacheKey, Slot<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_class(class: TtlClass, config: &RuntimeConfig) -> Self {
        Self::new(class.ttl(config))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, or run `fetch` and store its result.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(key.clone()).or_default().clone()
        };

        let mut entry = slot.lock().await;
        if let Some((stored_at, value)) = entry.as_ref() {
            if stored_at.elapsed() < self.ttl {
                debug!(op = key.op, instrument = %key.instrument, "cache hit");
                return value.clone();
            }
        }

        debug!(op = key.op, instrument = %key.instrument, "cache miss");
        let value = fetch().await;
        *entry = Some((Instant::now(), value.clone()));
        value
    }

    /// Drop every entry whose TTL has elapsed. Slots currently being
    /// refreshed are left alone.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.slots.lock().retain(|_, slot| match slot.try_lock() {
            Ok(entry) => entry
                .as_ref()
                .is_some_and(|(stored_at, _)| stored_at.elapsed() < ttl),
            Err(_) => true,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
