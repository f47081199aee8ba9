//! Process-lifetime set of seen item identities.
//!
//! Memory is bounded two ways: `capacity` (FIFO, the oldest identity is forgotten first) and
//! an optional `retention` age. A forgotten identity would be accepted again, so capacity
//! must comfortably exceed the number of distinct items an upstream can re-serve.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub capacity: usize,
    /// Forget identities older than this. `None` = keep until capacity evicts them.
    pub retention_secs: Option<u64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            retention_secs: None,
        }
    }
}

#[derive(Debug, Default)]
struct DedupState {
    ids: HashSet<String>,
    order: VecDeque<(String, Instant)>,
}

#[derive(Debug)]
pub struct Deduplicator {
    capacity: usize,
    retention: Option<Duration>,
    state: Mutex<DedupState>,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl Deduplicator {
    pub fn new(cfg: DedupConfig) -> Self {
        Self {
            capacity: cfg.capacity.max(1),
            retention: cfg.retention_secs.map(Duration::from_secs),
            state: Mutex::new(DedupState::default()),
        }
    }

    /// Whether `id` was admitted before (and not yet forgotten).
    pub fn seen(&self, id: &str) -> bool {
        let mut st = self.state.lock();
        self.expire(&mut st, Instant::now());
        st.ids.contains(id)
    }

    /// Record `id`. Re-admitting a known id is a no-op.
    pub fn admit(&self, id: &str) {
        self.check_and_admit(id);
    }

    /// Atomic test-and-set: `true` if `id` was new and is now recorded.
    pub fn check_and_admit(&self, id: &str) -> bool {
        let mut st = self.state.lock();
        let now = Instant::now();
        self.expire(&mut st, now);
        if st.ids.contains(id) {
            return false;
        }
        while st.order.len() >= self.capacity {
            match st.order.pop_front() {
                Some((old, _)) => {
                    st.ids.remove(&old);
                }
                None => break,
            }
        }
        st.ids.insert(id.to_string());
        st.order.push_back((id.to_string(), now));
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire(&self, st: &mut DedupState, now: Instant) {
        let Some(retention) = self.retention else {
            return;
        };
        while let Some((_, at)) = st.order.front() {
            if now.saturating_duration_since(*at) <= retention {
                break;
            }
            if let Some((old, _)) = st.order.pop_front() {
                st.ids.remove(&old);
            }
        }
    }
}
