//! Tabular exports
//!
//! Each pipeline stage can be written out as CSV for inspection. Column names
//! follow the screen data tables the tool has always produced.

use crate::error::SonifyError;
use crate::types::{Bucket, ChordEvent, Interval, RawEvent, Session};
use csv::Writer;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Timestamp format for exported instants
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const SCREEN_TIME_COLUMN: &str = "Screen Time (Mins)";

#[derive(Serialize)]
struct CleanedEventRow {
    timestamp: String,
    screen_status: i64,
}

#[derive(Serialize)]
struct SessionRow {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Screen Time (Mins)")]
    screen_time: f64,
}

/// Write the cleaned event table (`timestamp,screen_status`)
pub fn write_events<W: Write>(writer: W, events: &[RawEvent]) -> Result<(), SonifyError> {
    let mut csv_writer = Writer::from_writer(writer);
    for event in events {
        csv_writer.serialize(CleanedEventRow {
            timestamp: event.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            screen_status: event.status.code(),
        })?;
    }
    if events.is_empty() {
        csv_writer.write_record(["timestamp", "screen_status"])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write the session table (`Timestamp,Screen Time (Mins)`), keyed by lock time
pub fn write_sessions<W: Write>(writer: W, sessions: &[Session]) -> Result<(), SonifyError> {
    let mut csv_writer = Writer::from_writer(writer);
    for session in sessions {
        csv_writer.serialize(SessionRow {
            timestamp: session.locked_at.format(TIMESTAMP_FORMAT).to_string(),
            screen_time: session.duration_minutes,
        })?;
    }
    if sessions.is_empty() {
        csv_writer.write_record(["Timestamp", SCREEN_TIME_COLUMN])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write the bucket table (`<Interval>,Screen Time (Mins)`)
pub fn write_buckets<W: Write>(
    writer: W,
    buckets: &[Bucket],
    interval: Interval,
) -> Result<(), SonifyError> {
    let mut csv_writer = Writer::from_writer(writer);
    csv_writer.write_record([interval.column_name(), SCREEN_TIME_COLUMN])?;
    for bucket in buckets {
        csv_writer.serialize((
            interval.format_key(&bucket.interval_start),
            bucket.total_minutes,
        ))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write the final table: buckets plus `Chord` and `Octave`
pub fn write_chords<W: Write>(
    writer: W,
    chords: &[ChordEvent],
    interval: Interval,
) -> Result<(), SonifyError> {
    let mut csv_writer = Writer::from_writer(writer);
    csv_writer.write_record([interval.column_name(), SCREEN_TIME_COLUMN, "Chord", "Octave"])?;
    for chord in chords {
        csv_writer.serialize((
            interval.format_key(&chord.interval_start),
            chord.total_minutes,
            chord.display_label(),
            chord.octave,
        ))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Create `path` and hand it to one of the writers above
pub fn to_file<F>(path: &Path, write: F) -> Result<(), SonifyError>
where
    F: FnOnce(std::fs::File) -> Result<(), SonifyError>,
{
    let file = std::fs::File::create(path)?;
    write(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChordQuality, ScreenStatus};
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn output<F>(write: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), SonifyError>,
    {
        let mut buffer = Vec::new();
        write(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_write_events() {
        let events = vec![RawEvent {
            timestamp: Utc.timestamp_opt(60, 0).unwrap(),
            status: ScreenStatus::Lock,
        }];

        let csv = output(|w| write_events(w, &events));

        assert_eq!(csv, "timestamp,screen_status\n1970-01-01 00:01:00.000,2\n");
    }

    #[test]
    fn test_write_sessions() {
        let locked_at = Utc.with_ymd_and_hms(2022, 2, 4, 9, 5, 0).unwrap();
        let sessions = vec![Session {
            day: locked_at.date_naive(),
            unlocked_at: Utc.with_ymd_and_hms(2022, 2, 4, 9, 0, 0).unwrap(),
            locked_at,
            duration_minutes: 5.0,
        }];

        let csv = output(|w| write_sessions(w, &sessions));

        assert_eq!(
            csv,
            "Timestamp,Screen Time (Mins)\n2022-02-04 09:05:00.000,5.0\n"
        );
    }

    #[test]
    fn test_write_empty_sessions_keeps_header() {
        let csv = output(|w| write_sessions(w, &[]));
        assert_eq!(csv, "Timestamp,Screen Time (Mins)\n");
    }

    #[test]
    fn test_write_buckets_and_chords() {
        let start = NaiveDate::from_ymd_opt(2022, 2, 4)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap();
        let buckets = vec![Bucket {
            interval_start: start,
            total_minutes: 12.5,
        }];

        let csv = output(|w| write_buckets(w, &buckets, Interval::Hour));
        assert_eq!(
            csv,
            "Hour,Screen Time (Mins)\n2022-02-04 13:00:00,12.5\n"
        );

        let chords = vec![ChordEvent {
            interval_start: start,
            total_minutes: 12.5,
            base_note: 74,
            quality: ChordQuality::Major,
            notes: [74, 78, 81],
            note_names: ["D".to_string(), "F#".to_string(), "A".to_string()],
            label: "D".to_string(),
            octave: 5,
        }];

        let csv = output(|w| write_chords(w, &chords, Interval::Hour));
        assert_eq!(
            csv,
            "Hour,Screen Time (Mins),Chord,Octave\n2022-02-04 13:00:00,12.5,\"D (D, F#, A)\",5\n"
        );
    }

    #[test]
    fn test_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buckets.csv");

        to_file(&path, |f| write_buckets(f, &[], Interval::Day)).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Day,Screen Time (Mins)\n");
    }
}
