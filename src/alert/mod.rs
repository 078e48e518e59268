//! AlertThrottle - Unknown-Person Alert Rate Limiting
//!
//! One alert window for the whole unknown-person stream: an alert may
//! fire only when the configured interval has fully elapsed since the
//! last one. The check and the timestamp update happen under a single
//! lock so concurrent callers cannot both claim the same window.

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// AlertThrottle instance
pub struct AlertThrottle {
    min_interval: Duration,
    last_alert: Mutex<Option<Instant>>,
}

impl AlertThrottle {
    /// Create new AlertThrottle
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_alert: Mutex::new(None),
        }
    }

    /// Claim the alert window. True means the caller should dispatch an
    /// alert now; the window timestamp has already been advanced.
    pub fn should_fire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_alert.lock().unwrap();

        match *last {
            Some(at) if now.duration_since(at) <= self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
