// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Patterns recognised in CI log streams and archive names.
//!
//! Each pattern is exposed as a standalone predicate or parser so the
//! segmenter and the timestamp resolver share one definition:
//!
//! - [`starts_record`] / [`is_segment_boundary`]: a newline immediately
//!   followed by an ASCII digit starts a new record
//! - [`parse_clock`]: a leading `HH:mm:ss,SSS` clock string
//! - [`archive_date`]: the `.../20yyMMdd.<anything>` archive naming convention
//! - [`epoch_seconds`]: a dash-prefixed 10-digit epoch-seconds stamp in a
//!   build name

#[allow(clippy::expect_used)]
mod regexes {
    use lazy_static::lazy_static;
    use regex::Regex;

    lazy_static! {
        /// `HH:mm:ss,SSS` at the very start of a line.
        pub(super) static ref CLOCK_REGEX: Regex =
            Regex::new(r"^([0-9]{2}):([0-9]{2}):([0-9]{2}),([0-9]{3})")
                .expect("failed creating regex");

        /// Eight-digit `yyyyMMdd` date directly after a path separator and
        /// directly before a dot, e.g. `logs-ci-e2e/20200629.4.tgz`.
        pub(super) static ref ARCHIVE_DATE_REGEX: Regex =
            Regex::new(r"/(20[0-9]{6})\.").expect("failed creating regex");

        /// Ten digits directly after a dash, e.g. `logs-ci-1593456789.zip`.
        pub(super) static ref EPOCH_REGEX: Regex =
            Regex::new(r"-([0-9]{10})").expect("failed creating regex");
    }
}

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;

/// Returns true if `byte` can open a new top-level log line.
pub fn starts_record(byte: u8) -> bool {
    byte.is_ascii_digit()
}

/// Returns true if the pair `(previous, next)` marks the end of one record
/// and the start of the next.
pub fn is_segment_boundary(previous: u8, next: u8) -> bool {
    previous == b'\n' && starts_record(next)
}

/// A time of day parsed from a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTime {
    millis_of_day: i64,
}

impl ClockTime {
    /// Builds a clock time, rejecting out-of-range fields.
    pub fn new(hours: u32, minutes: u32, seconds: u32, millis: u32) -> Option<Self> {
        if hours > 23 || minutes > 59 || seconds > 59 || millis > 999 {
            return None;
        }
        Some(Self {
            millis_of_day: i64::from(hours) * MILLIS_PER_HOUR
                + i64::from(minutes) * MILLIS_PER_MINUTE
                + i64::from(seconds) * MILLIS_PER_SECOND
                + i64::from(millis),
        })
    }

    /// Offset from the start of the day, in milliseconds.
    pub fn millis_of_day(self) -> i64 {
        self.millis_of_day
    }
}

/// Parses a leading `HH:mm:ss,SSS` clock string from the first line of `text`.
///
/// Returns `None` when the line does not start with the pattern or when a
/// field is out of range (e.g. `25:00:00,000`).
pub fn parse_clock(text: &str) -> Option<ClockTime> {
    let captures = regexes::CLOCK_REGEX.captures(text)?;
    let field = |index: usize| -> Option<u32> { captures.get(index)?.as_str().parse().ok() };
    ClockTime::new(field(1)?, field(2)?, field(3)?, field(4)?)
}

/// Extracts the `yyyyMMdd` date embedded in an archive name following the
/// `.../20yyMMdd.<anything>` convention.
pub fn archive_date(archive_name: &str) -> Option<&str> {
    regexes::ARCHIVE_DATE_REGEX
        .captures(archive_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Extracts the build's epoch-seconds stamp from `build_name`: the last
/// occurrence of ten digits directly after a `-`.
///
/// Longer stamps contribute their first ten digits, so a millisecond stamp
/// such as `-1602054061123` yields `1602054061`.
pub fn epoch_seconds(build_name: &str) -> Option<i64> {
    regexes::EPOCH_REGEX
        .captures_iter(build_name)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
