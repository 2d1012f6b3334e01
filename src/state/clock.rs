//! Time sources. The resolver works on local wall-clock time, so every lookup goes through
//! a [`Clock`] that tests can pin.

use std::sync::{Arc, Mutex, PoisonError};

use time::OffsetDateTime;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Reads the operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock frozen at a settable instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
    instant: Arc<Mutex<OffsetDateTime>>,
}

impl FixedClock {
    pub fn new(instant: OffsetDateTime) -> Self {
        Self {
            instant: Arc::new(Mutex::new(instant)),
        }
    }

    /// Move the clock to another instant; every clone observes the change.
    pub fn set(&self, instant: OffsetDateTime) {
        *self.instant.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        *self.instant.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn fixed_clock_is_shared_between_clones() {
        let clock = FixedClock::new(datetime!(2026-02-28 19:00 UTC));
        let other = clock.clone();
        other.set(datetime!(2026-02-28 21:00 UTC));
        assert_eq!(clock.now(), datetime!(2026-02-28 21:00 UTC));
    }
}
