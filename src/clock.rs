use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Source of current wall time.
///
/// The queue service and scheduler never call `Utc::now()` directly; they go
/// through this trait so tests can advance time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Controllable clock for tests. Cloned handles share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut instant = self.instant.lock().expect("clock mutex poisoned");
        *instant += delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut instant = self.instant.lock().expect("clock mutex poisoned");
        *instant = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().expect("clock mutex poisoned")
    }
}
