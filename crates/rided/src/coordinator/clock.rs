//! Time source for presence and ride timestamps.

use time::OffsetDateTime;

/// Supplies the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current instant in UTC.
    fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-support"))]
mod manual {
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use time::OffsetDateTime;
    use time::macros::datetime;

    use super::Clock;

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        now: Mutex<OffsetDateTime>,
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::starting_at(datetime!(2024-05-01 09:00:00 UTC))
        }
    }

    impl ManualClock {
        /// Builds a clock frozen at `start`.
        pub fn starting_at(start: OffsetDateTime) -> Self {
            Self {
                now: Mutex::new(start),
            }
        }

        /// Moves the clock forward.
        pub fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> OffsetDateTime {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
