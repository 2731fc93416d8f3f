//! Wall-clock access and tick conversion.
//!
//! Ticks are 100-nanosecond intervals since the Unix epoch. All temporal
//! fields of a write model are stored in ticks, and the filter compiler asks
//! the [`Clock`] for "now" once per query so that derived statuses can be
//! pinned in tests.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;

pub const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_ticks(&self) -> i64 {
        to_ticks(self.now())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        FixedClock {
            now: Mutex::new(now),
        }
    }

    pub fn at_ticks(ticks: i64) -> Self {
        FixedClock::new(from_ticks(ticks))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

pub fn to_ticks(at: DateTime<Utc>) -> i64 {
    let secs = at.timestamp();
    let sub = at.timestamp_subsec_nanos() as i64 / NANOS_PER_TICK;
    secs.saturating_mul(TICKS_PER_SECOND).saturating_add(sub)
}

pub fn from_ticks(ticks: i64) -> DateTime<Utc> {
    let secs = ticks.div_euclid(TICKS_PER_SECOND);
    let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
