// UATP for Rust
// SPDX-License-Identifier: MPL-2.0

//! A timestamp in 100 nanosecond ticks since 1601-01-01 00:00:00 UTC.

use std::{
    fmt,
    io::{Read, Write},
};

use chrono::{TimeZone, Utc};

use crate::encoding::{
    read_i64, write_i64, DecodingOptions, EncodingResult, SimpleBinaryDecodable,
    SimpleBinaryEncodable, UaNullable,
};

const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// A timestamp. The wire form is a signed 64 bit count of 100 ns intervals
/// since January 1, 1601 UTC. Zero means "no time", the maximum value means
/// "end of time"; values beyond either end clamp rather than wrap.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct DateTime {
    date_time: chrono::DateTime<Utc>,
}

impl fmt::Debug for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date_time.to_rfc3339())
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date_time.to_rfc3339())
    }
}

impl Default for DateTime {
    fn default() -> Self {
        Self::epoch()
    }
}

impl UaNullable for DateTime {
    fn is_ua_null(&self) -> bool {
        self.is_null()
    }
}

impl SimpleBinaryEncodable for DateTime {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_i64(stream, self.checked_ticks())
    }
}

impl SimpleBinaryDecodable for DateTime {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(DateTime::from_ticks(read_i64(stream)?))
    }
}

impl std::ops::Sub for DateTime {
    type Output = chrono::Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        self.date_time - rhs.date_time
    }
}

impl std::ops::Add<chrono::Duration> for DateTime {
    type Output = DateTime;

    fn add(self, rhs: chrono::Duration) -> Self::Output {
        DateTime {
            date_time: self.date_time + rhs,
        }
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(date_time: chrono::DateTime<Utc>) -> Self {
        // Truncate to tick granularity so values round-trip through the wire
        let nanos = date_time.timestamp_subsec_nanos() as i64;
        let truncated = nanos - nanos % NANOS_PER_TICK;
        let date_time = Utc
            .timestamp_opt(date_time.timestamp(), truncated as u32)
            .unwrap();
        DateTime { date_time }
    }
}

impl DateTime {
    /// The current time, truncated to tick precision.
    pub fn now() -> DateTime {
        Utc::now().into()
    }

    /// The UA epoch, 1601-01-01 00:00:00 UTC, which is also the null time.
    pub fn epoch() -> DateTime {
        DateTime {
            date_time: epoch_chrono(),
        }
    }

    /// Construct from a tick count relative to the UA epoch. Out of range
    /// values clamp to the epoch or to the maximum representable time.
    pub fn from_ticks(ticks: i64) -> DateTime {
        let ticks = ticks.max(0).min(Self::MAX_TICKS);
        let secs = ticks / TICKS_PER_SECOND;
        let nanos = (ticks % TICKS_PER_SECOND) * NANOS_PER_TICK;
        DateTime {
            date_time: epoch_chrono() + chrono::Duration::seconds(secs)
                + chrono::Duration::nanoseconds(nanos),
        }
    }

    /// Ticks for 9999-12-31 23:59:59, the "end of time" sentinel.
    pub const MAX_TICKS: i64 = 2_650_467_743_990_000_000;

    /// The tick count of this time relative to the UA epoch.
    pub fn ticks(&self) -> i64 {
        let duration = self.date_time - epoch_chrono();
        duration.num_seconds() * TICKS_PER_SECOND
            + duration.subsec_nanos() as i64 / NANOS_PER_TICK
    }

    /// Tick count clamped into the representable range.
    pub fn checked_ticks(&self) -> i64 {
        self.ticks().max(0).min(Self::MAX_TICKS)
    }

    /// True for the null time.
    pub fn is_null(&self) -> bool {
        self.ticks() == 0
    }

    /// The inner chrono value.
    pub fn as_chrono(&self) -> chrono::DateTime<Utc> {
        self.date_time
    }
}

fn epoch_chrono() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(1601, 1, 1, 0, 0, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::DateTime;

    #[test]
    fn epoch_is_null() {
        assert!(DateTime::epoch().is_null());
        assert_eq!(DateTime::epoch().ticks(), 0);
    }

    #[test]
    fn ticks_round_trip() {
        let now = DateTime::now();
        assert_eq!(DateTime::from_ticks(now.ticks()), now);
    }

    #[test]
    fn out_of_range_clamps() {
        assert_eq!(DateTime::from_ticks(-5), DateTime::epoch());
        assert_eq!(
            DateTime::from_ticks(i64::MAX).ticks(),
            DateTime::MAX_TICKS
        );
    }
}
