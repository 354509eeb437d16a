//! Clock - Injectable wall time
//!
//! Expiry and the payment window are judged against `Clock::now()`, never
//! against `Utc::now()` directly, so a test can stand at `T + 15m1s` without
//! sleeping.
//!
//! | Clock         | Source                          |
//! |---------------|---------------------------------|
//! | `SystemClock` | `chrono::Utc::now()`            |
//! | `ManualClock` | set / advanced by the caller    |

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// Shared, manually driven clock. Clones observe the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self { Self { now: Arc::new(Mutex::new(start)) } }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> { *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) }
}
