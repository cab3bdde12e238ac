//! InMemoryDedupFilter - 受信イベントの重複排除
//!
//! # 実装詳細
//! - HashSet で厳密な所属判定
//! - VecDeque で挿入順を保持し、容量超過時は古い方から一括削除
//! - std::sync::Mutex で排他（ロック中に await しない）

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::ports::DedupFilter;

pub const DEFAULT_DEDUP_CAPACITY: usize = 1000;

#[derive(Default)]
struct Seen {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

/// Bounded set of recently seen event ids.
///
/// When the set grows past `capacity`, the oldest ids are dropped until
/// `capacity / 2` remain. An id evicted this way would be accepted again,
/// which only matters for re-deliveries older than the retained window.
pub struct InMemoryDedupFilter {
    capacity: usize,
    seen: Mutex<Seen>,
}

impl InMemoryDedupFilter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: Mutex::new(Seen::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryDedupFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}

impl DedupFilter for InMemoryDedupFilter {
    fn seen(&self, event_id: &str) -> bool {
        if event_id.is_empty() {
            return false;
        }

        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if seen.ids.contains(event_id) {
            return true;
        }

        seen.ids.insert(event_id.to_owned());
        seen.order.push_back(event_id.to_owned());

        if seen.ids.len() > self.capacity {
            let keep = self.capacity / 2;
            let evict = seen.order.len() - keep;
            let Seen { ids, order } = &mut *seen;
            for old in order.drain(..evict) {
                ids.remove(&old);
            }
            tracing::debug!(evicted = evict, retained = keep, "dedup set trimmed");
        }
        false
    }

    fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .len()
    }
}
