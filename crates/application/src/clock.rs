use std::sync::Mutex;

use chrono::{Duration, Utc};
use domain::Timestamp;

/// 服务端时钟。所有 `timestamp` / `last_active` / `created_at` 都由它生成，
/// 不使用客户端时间。
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// 可手动拨动的时钟，每次读取后前进 `step`（测试和回放使用）
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Timestamp>,
    step: Duration,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self::stepping(start, Duration::zero())
    }

    pub fn stepping(start: Timestamp, step: Duration) -> Self {
        Self {
            current: Mutex::new(start),
            step,
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    pub fn set(&self, to: Timestamp) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        let now = *current;
        *current += self.step;
        now
    }
}
