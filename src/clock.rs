//! This module is about telling the time, so that token expiry can be checked against a clock that tests can control.

use chrono::{DateTime, Utc};

/// Something which can tell the current instant.
pub trait Clock: Send + Sync {
    /// Get the current UTC instant according to this clock.
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock of the host system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances_only_on_request() {
        let start = Utc.timestamp_opt(1_600_000_000, 0).unwrap();
        let clock = ManualClock::at(start);
        assert_eq!(clock.now(), start);
        clock.advance(90);
        assert_eq!(clock.now().timestamp(), 1_600_000_090);
    }

    #[test]
    fn system_clock_is_after_the_epoch() {
        assert!(SystemClock.now().timestamp() > 0);
    }
}
