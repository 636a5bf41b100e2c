//! Timestamps shown next to room notices.
//!
//! The displayed hour is the wall-clock hour shifted by 13 and wrapped into
//! `0..24`. This matches the clock existing clients already display.
// TODO: confirm with client owners whether the +13 shift is meant to be a
// fixed timezone and replace it with a real offset if so.

use std::fmt;

use chrono::{Local, Timelike};

const HOUR_SHIFT: u32 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    hour: u32,
    minute: u32,
}

impl Stamp {
    /// Builds a stamp from a wall-clock time, applying the hour shift.
    pub fn from_time<T: Timelike>(time: &T) -> Self {
        Self {
            hour: (time.hour() + HOUR_SHIFT) % 24,
            minute: time.minute(),
        }
    }

    pub fn now() -> Self {
        Self::from_time(&Local::now())
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }
}

/// Minutes are not zero-padded: `9:5`, not `09:05`.
impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hour, self.minute)
    }
}
