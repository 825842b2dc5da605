//! Wall clock abstraction. Batches and the scheduler never read the
//! system time directly; they ask the injected clock.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// Local wall time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to. Used by tests and dry runs.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, to: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    /// Advance by `by`. Returns the new time.
    pub fn advance(&self, by: Duration) -> NaiveDateTime {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
        *now
    }

    pub fn advance_days(&self, days: i64) -> NaiveDateTime {
        self.advance(Duration::days(days))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
