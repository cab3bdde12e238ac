//! IdGenerator port - タスク ID の採番
//!
//! ID は時刻順に並ぶ（同一ミリ秒内でも単調増加）。
//! テストでは FixedClock を渡して時刻部分を固定できます。

use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use ulid::{Generator, Ulid};

use crate::domain::TaskId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// Monotonic ULIDs stamped with the injected clock.
pub struct UlidGenerator<C> {
    clock: C,
    monotonic: Mutex<Generator>,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            monotonic: Mutex::new(Generator::new()),
        }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let now = self.clock.now();
        let stamped = SystemTime::from(now);
        let next = self
            .monotonic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_from_datetime(stamped);

        match next {
            Ok(ulid) => TaskId::from(ulid),
            // random part exhausted within one millisecond
            Err(_) => {
                let ms = now.timestamp_millis().max(0) as u64;
                TaskId::from(Ulid::from_parts(ms, rand::random()))
            }
        }
    }
}
