//! Exchange clock helpers.
//!
//! Everything here works in exchange-local wall time (`NaiveDateTime` in the
//! configured zone). The continuous sessions are 09:30-11:30 and 13:00-15:00,
//! 240 trading minutes in total.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

pub const TOTAL_TRADING_MINUTES: u32 = 240;

const MORNING_OPEN: (u32, u32) = (9, 30);
const MORNING_CLOSE: (u32, u32) = (11, 30);
const AFTERNOON_OPEN: (u32, u32) = (13, 0);
const AFTERNOON_CLOSE: (u32, u32) = (15, 0);

/// Bucket for samples stamped at or after the afternoon close. They carry the
/// final daily volume and never share a baseline with intraday samples.
pub const END_OF_DAY_BUCKET: &str = "eod";

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Source of exchange-local wall time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in the exchange's time zone.
#[derive(Clone, Copy, Debug)]
pub struct ExchangeClock {
    tz: Tz,
}

impl ExchangeClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Milliseconds since epoch for an exchange-local timestamp.
    pub fn to_epoch_ms(&self, local: NaiveDateTime) -> i64 {
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| local.and_utc().timestamp_millis())
    }
}

impl Clock for ExchangeClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }
}

fn minute_of_day(h: u32, m: u32) -> u32 {
    h * 60 + m
}

/// Trading minutes elapsed at `t`, clamped to `[0, 240]`.
/// The lunch break contributes nothing.
pub fn elapsed_trading_minutes(t: NaiveTime) -> u32 {
    let now = minute_of_day(t.hour(), t.minute());
    let m_open = minute_of_day(MORNING_OPEN.0, MORNING_OPEN.1);
    let m_close = minute_of_day(MORNING_CLOSE.0, MORNING_CLOSE.1);
    let a_open = minute_of_day(AFTERNOON_OPEN.0, AFTERNOON_OPEN.1);
    let a_close = minute_of_day(AFTERNOON_CLOSE.0, AFTERNOON_CLOSE.1);

    let morning = now.clamp(m_open, m_close) - m_open;
    let afternoon = now.clamp(a_open, a_close) - a_open;

    (morning + afternoon).min(TOTAL_TRADING_MINUTES)
}

/// Intraday bucket for a volume sample: time rounded up to the next
/// 10-minute mark as `HHMM`, so the last intraday bucket is `1500`.
/// Samples stamped at or after the close go to [`END_OF_DAY_BUCKET`].
pub fn volume_bucket(t: NaiveTime) -> String {
    let close = minute_of_day(AFTERNOON_CLOSE.0, AFTERNOON_CLOSE.1);
    let mut minutes = minute_of_day(t.hour(), t.minute());
    if minutes >= close {
        return END_OF_DAY_BUCKET.to_string();
    }
    if t.second() > 0 || t.nanosecond() > 0 {
        minutes += 1;
    }

    let rounded = minutes.div_ceil(10) * 10;
    format!("{:02}{:02}", rounded / 60, rounded % 60)
}
