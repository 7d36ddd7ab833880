//! Host clock adapter.
//!
//! Provides the [`Clock`] port from `std::time`:
//!
//! - **monotonic seconds** from an [`Instant`] captured at construction.
//! - **minute of day** from the system wall clock (UTC plus a fixed
//!   offset), rejected while the wall clock is obviously unsynchronised.
//!
//! [`ManualClock`] is the fast-forward counterpart for the simulator and
//! tests: time only moves when told to.

use std::cell::Cell;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::app::ports::Clock;

/// Anything before 2020-01-01 means the wall clock was never set.
const EPOCH_2020: u64 = 1_577_836_800;
const SECS_PER_DAY: i64 = 86_400;

pub struct SystemClock {
    start: Instant,
    utc_offset_secs: i32,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SystemClock {
    /// `utc_offset_secs` shifts the wall clock into local time for the
    /// defrost schedule.
    pub fn new(utc_offset_secs: i32) -> Self {
        Self {
            start: Instant::now(),
            utc_offset_secs,
        }
    }
}

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    fn minute_of_day(&self) -> Option<u16> {
        let epoch = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        minute_of_day_at(epoch, self.utc_offset_secs)
    }
}

/// Clock that advances only on request.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
    /// Wall-clock minute of day at `now == 0`, if the wall clock is "synced".
    wall_start_min: Option<u16>,
}

impl ManualClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: Cell::new(now),
            wall_start_min: None,
        }
    }

    /// Attach a wall clock reading `start_min` at monotonic zero.
    #[must_use]
    pub fn with_wall_clock(mut self, start_min: u16) -> Self {
        self.wall_start_min = Some(start_min % 1440);
        self
    }

    pub fn advance(&self, secs: u64) {
        self.now.set(self.now.get() + secs);
    }

    pub fn set(&self, now: u64) {
        self.now.set(now);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.get()
    }

    fn minute_of_day(&self) -> Option<u16> {
        let start = u64::from(self.wall_start_min?);
        u16::try_from((start + self.now.get() / 60) % 1440).ok()
    }
}

fn minute_of_day_at(epoch_secs: u64, utc_offset_secs: i32) -> Option<u16> {
    if epoch_secs < EPOCH_2020 {
        return None;
    }
    let local = i64::try_from(epoch_secs).ok()? + i64::from(utc_offset_secs);
    u16::try_from(local.rem_euclid(SECS_PER_DAY) / 60).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsynced_wall_clock_has_no_minute() {
        assert_eq!(minute_of_day_at(1_000, 0), None);
    }

    #[test]
    fn minute_with_offset_wraps_midnight() {
        // 2024-01-01T00:30:00Z
        let t = 1_704_069_000;
        assert_eq!(minute_of_day_at(t, 0), Some(30));
        assert_eq!(minute_of_day_at(t, -3600), Some(23 * 60 + 30));
        assert_eq!(minute_of_day_at(t, 3 * 3600), Some(3 * 60 + 30));
    }

    #[test]
    fn manual_clock_wall_time_follows_monotonic() {
        let clock = ManualClock::new(0).with_wall_clock(23 * 60 + 59);
        assert_eq!(clock.minute_of_day(), Some(1439));
        clock.advance(60);
        assert_eq!(clock.now_secs(), 60);
        assert_eq!(clock.minute_of_day(), Some(0));
        assert_eq!(ManualClock::new(0).minute_of_day(), None);
    }

    #[test]
    fn monotonic_starts_near_zero() {
        assert!(SystemClock::default().now_secs() < 2);
    }
}
