//! Screen event normalization
//!
//! Parses the raw screen export into canonical [`RawEvent`]s. The export carries
//! two housekeeping columns (`_id` and a `device_id`) that are dropped, and
//! repeats the `device_id` header for the status column, so the status column
//! is located by position when no better-named column exists.

use crate::error::SonifyError;
use crate::types::{RawEvent, ScreenStatus};
use chrono::{DateTime, Utc};
use csv::StringRecord;
use std::io::Read;
use tracing::debug;

/// Column holding epoch-millisecond timestamps
const TIMESTAMP_COLUMN: &str = "timestamp";

/// Preferred status column names, in lookup order
const STATUS_COLUMNS: [&str; 2] = ["screen_status", "device_id.1"];

/// Header that the raw export repeats for the status column
const DUPLICATED_DEVICE_COLUMN: &str = "device_id";

/// Normalizer for raw screen event tables
pub struct EventNormalizer;

impl EventNormalizer {
    /// Parse CSV text into events, preserving row order
    pub fn parse_str(csv_text: &str) -> Result<Vec<RawEvent>, SonifyError> {
        Self::parse_reader(csv_text.as_bytes())
    }

    /// Parse a CSV reader into events, preserving row order
    pub fn parse_reader<R: Read>(reader: R) -> Result<Vec<RawEvent>, SonifyError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let (timestamp_idx, status_idx) = locate_columns(&headers)?;

        let mut events = Vec::new();
        for (row, record) in csv_reader.records().enumerate() {
            let record = record?;
            // Header is line 1
            let line = row + 2;
            let timestamp = parse_timestamp(field(&record, timestamp_idx, line)?, line)?;
            let status = parse_status(field(&record, status_idx, line)?, line)?;
            events.push(RawEvent { timestamp, status });
        }

        debug!(rows = events.len(), "normalized screen events");
        Ok(events)
    }
}

/// Find the timestamp and status column indices
fn locate_columns(headers: &StringRecord) -> Result<(usize, usize), SonifyError> {
    let timestamp_idx = headers
        .iter()
        .position(|h| h == TIMESTAMP_COLUMN)
        .ok_or_else(|| SonifyError::malformed("missing required column 'timestamp'"))?;

    let named_status = STATUS_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h == *name));

    let status_idx = match named_status {
        Some(idx) => idx,
        None => headers
            .iter()
            .enumerate()
            .filter(|(_, h)| *h == DUPLICATED_DEVICE_COLUMN)
            .map(|(idx, _)| idx)
            .nth(1)
            .ok_or_else(|| SonifyError::malformed("missing required screen status column"))?,
    };

    Ok((timestamp_idx, status_idx))
}

fn field(record: &StringRecord, idx: usize, line: usize) -> Result<&str, SonifyError> {
    record
        .get(idx)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| SonifyError::malformed(format!("line {}: missing field {}", line, idx + 1)))
}

/// Parse an epoch-millisecond timestamp (integer or float text)
fn parse_timestamp(value: &str, line: usize) -> Result<DateTime<Utc>, SonifyError> {
    let millis = match value.parse::<i64>() {
        Ok(ms) => ms,
        Err(_) => value
            .parse::<f64>()
            .ok()
            .filter(|ms| ms.is_finite())
            .map(|ms| ms as i64)
            .ok_or_else(|| {
                SonifyError::malformed(format!("line {}: invalid timestamp '{}'", line, value))
            })?,
    };

    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        SonifyError::malformed(format!("line {}: timestamp {} out of range", line, millis))
    })
}

fn parse_status(value: &str, line: usize) -> Result<ScreenStatus, SonifyError> {
    let code = match value.parse::<i64>() {
        Ok(code) => code,
        Err(_) => value
            .parse::<f64>()
            .ok()
            .filter(|code| code.fract() == 0.0)
            .map(|code| code as i64)
            .ok_or_else(|| {
                SonifyError::malformed(format!("line {}: invalid screen status '{}'", line, value))
            })?,
    };
    Ok(ScreenStatus::from_code(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_raw_export_with_duplicate_device_header() {
        let csv = "_id,timestamp,device_id,device_id\n\
                   1,0,abc,3\n\
                   2,60000,abc,2\n\
                   3,120000,abc,1\n";

        let events = EventNormalizer::parse_str(csv).unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].timestamp, Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(events[0].status, ScreenStatus::Unlock);
        assert_eq!(events[1].timestamp, Utc.timestamp_opt(60, 0).unwrap());
        assert_eq!(events[1].status, ScreenStatus::Lock);
        assert_eq!(events[2].status, ScreenStatus::Other(1));
    }

    #[test]
    fn test_parse_cleaned_table() {
        let csv = "timestamp,screen_status\n1643932800000,3\n1643932860500,2\n";

        let events = EventNormalizer::parse_str(csv).unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].timestamp,
            Utc.with_ymd_and_hms(2022, 2, 4, 0, 1, 0).unwrap() + chrono::Duration::milliseconds(500)
        );
    }

    #[test]
    fn test_float_fields_are_accepted() {
        let csv = "timestamp,device_id.1\n60000.0,2.0\n";

        let events = EventNormalizer::parse_str(csv).unwrap();

        assert_eq!(events[0].status, ScreenStatus::Lock);
        assert_eq!(events[0].timestamp, Utc.timestamp_opt(60, 0).unwrap());
    }

    #[test]
    fn test_missing_timestamp_column() {
        let csv = "time,screen_status\n0,3\n";

        let err = EventNormalizer::parse_str(csv).unwrap_err();
        assert!(matches!(err, SonifyError::MalformedInput(_)));
    }

    #[test]
    fn test_missing_status_column() {
        let csv = "_id,timestamp,device_id\n1,0,abc\n";

        let err = EventNormalizer::parse_str(csv).unwrap_err();
        assert!(matches!(err, SonifyError::MalformedInput(_)));
    }

    #[test]
    fn test_unparsable_timestamp() {
        let csv = "timestamp,screen_status\nyesterday,3\n";

        let err = EventNormalizer::parse_str(csv).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_table() {
        let events = EventNormalizer::parse_str("timestamp,screen_status\n").unwrap();
        assert!(events.is_empty());
    }
}
