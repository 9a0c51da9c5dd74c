//! Time source.
//!
//! Components never read the system clock directly; the staleness check
//! and every event timestamp go through an injected [`Clock`].

use chrono::Utc;

/// Unix-seconds time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}
