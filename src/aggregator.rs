//! Interval aggregation
//!
//! Groups sessions into hour/day/week/month buckets within a half-open time
//! range and sums their screen time. Buckets are keyed by the session's lock
//! instant and returned in ascending key order; empty windows are omitted.

use crate::error::SonifyError;
use crate::types::{Bucket, Interval, Session};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

impl FromStr for Interval {
    type Err = SonifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            _ => Err(SonifyError::InvalidInterval(s.to_string())),
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = SonifyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Interval {
    /// Start of the interval containing `timestamp`
    pub fn key(&self, timestamp: DateTime<Utc>) -> NaiveDateTime {
        let naive = timestamp.naive_utc();
        let date = naive.date();

        match self {
            Interval::Hour => {
                let into_hour = Duration::seconds(i64::from(naive.minute() * 60 + naive.second()))
                    + Duration::nanoseconds(i64::from(naive.nanosecond()));
                naive - into_hour
            }
            Interval::Day => date.and_time(NaiveTime::MIN),
            Interval::Week => {
                let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
                monday.and_time(NaiveTime::MIN)
            }
            Interval::Month => {
                let first = date - Duration::days(i64::from(date.day0()));
                first.and_time(NaiveTime::MIN)
            }
        }
    }

    /// Column header used for this interval in exported tables
    pub fn column_name(&self) -> &'static str {
        match self {
            Interval::Hour => "Hour",
            Interval::Day => "Day",
            Interval::Week => "Week",
            Interval::Month => "Month",
        }
    }

    /// Render an interval key the way exported tables show it
    pub fn format_key(&self, key: &NaiveDateTime) -> String {
        match self {
            Interval::Hour => key.format("%Y-%m-%d %H:%M:%S").to_string(),
            Interval::Day | Interval::Week | Interval::Month => key.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Sum session minutes per interval for sessions locked within `[start, end)`
pub fn intervalize(
    sessions: &[Session],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    interval: Interval,
) -> Vec<Bucket> {
    let mut totals: BTreeMap<NaiveDateTime, f64> = BTreeMap::new();

    for session in sessions
        .iter()
        .filter(|s| s.locked_at >= start && s.locked_at < end)
    {
        *totals.entry(interval.key(session.locked_at)).or_insert(0.0) += session.duration_minutes;
    }

    let buckets: Vec<Bucket> = totals
        .into_iter()
        .map(|(interval_start, total_minutes)| Bucket {
            interval_start,
            total_minutes,
        })
        .collect();

    debug!(
        interval = interval.as_str(),
        buckets = buckets.len(),
        "aggregated sessions into buckets"
    );
    buckets
}
