// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Assigns wall-clock timestamps to log records.
//!
//! Log lines only carry a time of day (`HH:mm:ss,SSS`). The calendar day
//! comes from the archive naming conventions and is derived once per file:
//!
//! 1. **Dated archives** (`logs-ci-e2e/20200629.4.tgz`): midnight of the
//!    embedded `yyyyMMdd` date in the local time zone.
//! 2. **Stamped builds** (`logs-ci-1593456789.zip-...`): the embedded epoch
//!    seconds, minus a fixed time-zone correction, truncated to the start of
//!    its UTC day.
//!
//! A record whose first line has no clock string inherits the timestamp of
//! the record before it. Before any clock string has been seen that is the
//! baseline instant itself.
//!
//! Day rollover is not detected by default: a file whose events cross
//! midnight keeps the baseline day for every record. Enable
//! [`ResolverConfig::detect_day_rollover`] to advance the day whenever the
//! clock moves backwards.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use tracing::{debug, trace};

use crate::error::ResolveError;
use crate::logs::constants::{DEFAULT_TZ_CORRECTION_HOURS, MILLIS_PER_DAY};
use crate::logs::pattern::{archive_date, epoch_seconds, parse_clock, ClockTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Subtracted from epoch timestamps found in build names.
    pub tz_correction: TimeDelta,
    pub detect_day_rollover: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tz_correction: TimeDelta::hours(DEFAULT_TZ_CORRECTION_HOURS),
            detect_day_rollover: false,
        }
    }
}

/// Where the baseline of a file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineSource {
    ArchiveDate,
    BuildEpoch,
}

/// Reference day for one file. Constant while the file is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBaseline {
    /// Start of the reference day.
    pub day_start: DateTime<Utc>,
    /// Instant used for records preceding the first clock string.
    pub origin: DateTime<Utc>,
    pub source: BaselineSource,
}

impl TimeBaseline {
    /// Derives the baseline for a file, interpreting archive dates in the
    /// system's local time zone.
    pub fn derive(
        archive_name: &str,
        build_name: &str,
        config: &ResolverConfig,
    ) -> Result<Self, ResolveError> {
        Self::derive_in(archive_name, build_name, config, &Local)
    }

    /// Derives the baseline for a file, interpreting archive dates in `tz`.
    pub fn derive_in<Tz: TimeZone>(
        archive_name: &str,
        build_name: &str,
        config: &ResolverConfig,
        tz: &Tz,
    ) -> Result<Self, ResolveError> {
        if let Some(date) = archive_date(archive_name) {
            let day = NaiveDate::parse_from_str(date, "%Y%m%d")
                .map_err(|_| ResolveError::InvalidDate(date.to_string()))?;
            let midnight = tz
                .from_local_datetime(&day.and_time(NaiveTime::MIN))
                .earliest()
                .ok_or_else(|| ResolveError::InvalidDate(date.to_string()))?
                .with_timezone(&Utc);
            return Ok(TimeBaseline {
                day_start: midnight,
                origin: midnight,
                source: BaselineSource::ArchiveDate,
            });
        }

        let Some(seconds) = epoch_seconds(build_name) else {
            return Err(ResolveError::NoBaseline {
                archive: archive_name.to_string(),
                build: build_name.to_string(),
            });
        };
        let origin = DateTime::<Utc>::from_timestamp(seconds, 0)
            .and_then(|instant| instant.checked_sub_signed(config.tz_correction))
            .ok_or(ResolveError::InvalidEpoch(seconds))?;
        let day_start = origin.date_naive().and_time(NaiveTime::MIN).and_utc();
        Ok(TimeBaseline {
            day_start,
            origin,
            source: BaselineSource::BuildEpoch,
        })
    }
}

/// Counters kept while resolving one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Records whose timestamp came from their own clock string.
    pub resolved: u64,
    /// Records that inherited the previous timestamp.
    pub carried_forward: u64,
    /// Times the day was advanced because the clock went backwards.
    pub rollovers: u64,
}

/// Stateful per-file resolver; feed it records in file order.
#[derive(Debug, Clone)]
pub struct TimestampResolver {
    baseline: TimeBaseline,
    detect_day_rollover: bool,
    day_offset_millis: i64,
    last_clock: Option<ClockTime>,
    last_resolved: i64,
    stats: ResolveStats,
}

impl TimestampResolver {
    #[must_use]
    pub fn new(baseline: TimeBaseline, config: &ResolverConfig) -> Self {
        debug!(
            "RESOLVER | Baseline {:?}: day starts at {}, origin {}",
            baseline.source, baseline.day_start, baseline.origin
        );
        TimestampResolver {
            baseline,
            detect_day_rollover: config.detect_day_rollover,
            day_offset_millis: 0,
            last_clock: None,
            last_resolved: baseline.origin.timestamp_millis(),
            stats: ResolveStats::default(),
        }
    }

    /// Builds a resolver for the file identified by `archive_name` and
    /// `build_name`.
    pub fn for_entry(
        archive_name: &str,
        build_name: &str,
        config: &ResolverConfig,
    ) -> Result<Self, ResolveError> {
        let baseline = TimeBaseline::derive(archive_name, build_name, config)?;
        Ok(Self::new(baseline, config))
    }

    /// Returns the epoch-millisecond timestamp of the next record.
    pub fn resolve(&mut self, text: &str) -> i64 {
        let Some(clock) = parse_clock(text) else {
            trace!("RESOLVER | No clock string, carrying forward {}", self.last_resolved);
            self.stats.carried_forward += 1;
            return self.last_resolved;
        };

        if self.detect_day_rollover {
            if let Some(previous) = self.last_clock {
                if clock < previous {
                    self.day_offset_millis += MILLIS_PER_DAY;
                    self.stats.rollovers += 1;
                    debug!("RESOLVER | Clock went backwards, advancing to the next day");
                }
            }
        }

        self.last_clock = Some(clock);
        self.last_resolved =
            self.baseline.day_start.timestamp_millis() + self.day_offset_millis + clock.millis_of_day();
        self.stats.resolved += 1;
        self.last_resolved
    }

    pub fn baseline(&self) -> &TimeBaseline {
        &self.baseline
    }

    pub fn stats(&self) -> ResolveStats {
        self.stats
    }
}
