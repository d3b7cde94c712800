//! Core data types
//!
//! This module defines the values that flow between pipeline stages:
//! raw screen events, reconstructed sessions, interval buckets, chords and
//! the scheduled MIDI messages that make up the output track.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Screen status code for an unlock event in the raw export
pub const STATUS_UNLOCK: i64 = 3;

/// Screen status code for a lock event in the raw export
pub const STATUS_LOCK: i64 = 2;

/// Screen status carried by a raw event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenStatus {
    Unlock,
    Lock,
    /// Any other status code (screen on/off without keyguard, etc.)
    Other(i64),
}

impl ScreenStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            STATUS_UNLOCK => ScreenStatus::Unlock,
            STATUS_LOCK => ScreenStatus::Lock,
            other => ScreenStatus::Other(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ScreenStatus::Unlock => STATUS_UNLOCK,
            ScreenStatus::Lock => STATUS_LOCK,
            ScreenStatus::Other(code) => *code,
        }
    }
}

/// A single screen event as read from the input log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event instant (UTC)
    pub timestamp: DateTime<Utc>,
    /// Screen status
    pub status: ScreenStatus,
}

/// One continuous screen-on period, derived from a matched unlock/lock pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Calendar day the pair was matched on
    pub day: NaiveDate,
    pub unlocked_at: DateTime<Utc>,
    pub locked_at: DateTime<Utc>,
    /// Elapsed whole seconds between unlock and lock, in minutes
    pub duration_minutes: f64,
}

/// Aggregation granularity for buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Interval {
    Hour,
    Day,
    Week,
    Month,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Hour => "hour",
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
        }
    }
}

/// Summed screen time for one interval window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Start of the interval (hour floor, midnight, Monday, or 1st of month)
    pub interval_start: NaiveDateTime,
    /// Total screen time in minutes
    pub total_minutes: f64,
}

/// Chord quality chosen from the screen time threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    Major,
    Minor,
}

impl ChordQuality {
    /// Semitone offsets of the triad above its root
    pub fn intervals(&self) -> [i32; 3] {
        match self {
            ChordQuality::Major => [0, 4, 7],
            ChordQuality::Minor => [0, 3, 7],
        }
    }
}

/// The musical rendering of one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordEvent {
    pub interval_start: NaiveDateTime,
    pub total_minutes: f64,
    /// MIDI pitch of the chord root
    pub base_note: i32,
    pub quality: ChordQuality,
    /// Absolute MIDI pitches, root first
    pub notes: [i32; 3],
    /// Pitch-class names matching `notes`
    pub note_names: [String; 3],
    /// Chord label, or "Unknown" when the namer found no match
    pub label: String,
    /// Octave of the root (60 = C4)
    pub octave: i32,
}

impl ChordEvent {
    /// Label with its constituent notes, e.g. `Cm (C, D#, G)`
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.label, self.note_names.join(", "))
    }
}

/// A message on the output track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduledMessage {
    NoteOn { key: i32, velocity: u8 },
    NoteOff { key: i32, velocity: u8 },
    Control { controller: u8, value: u8 },
}

/// A track message with its delta time from the previous message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub delta_ticks: u32,
    pub message: ScheduledMessage,
}

impl ScheduledEvent {
    pub fn new(delta_ticks: u32, message: ScheduledMessage) -> Self {
        Self {
            delta_ticks,
            message,
        }
    }
}
