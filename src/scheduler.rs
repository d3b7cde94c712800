//! Note event scheduling
//!
//! Turns a chord sequence into delta-timed MIDI messages. Chord `i` starts at
//! `i * step` ticks and releases at `i * step + full`, where `full` is the note
//! duration in ticks and `step = full * (1 - overlap)`. Releases are queued
//! with their due tick and flushed as later chords start, so overlapping
//! chords ring into each other without gaps.

use crate::error::SonifyError;
use crate::types::{ChordEvent, ScheduledEvent, ScheduledMessage};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Sustain pedal controller
pub const CC_SUSTAIN: u8 = 64;

/// Reverb send controller
pub const CC_REVERB: u8 = 91;

/// Expression controller
pub const CC_EXPRESSION: u8 = 11;

/// Controller value for a pressed pedal
pub const PEDAL_DOWN: u8 = 127;

/// Controller value for a released pedal
pub const PEDAL_UP: u8 = 0;

/// Largest tick resolution a metrical SMF header can carry
const MAX_TICKS_PER_BEAT: u16 = 0x7FFF;

/// Largest microseconds-per-beat a tempo meta event can carry
pub const MAX_TEMPO_MICROS: u32 = 0xFF_FFFF;

/// Timing and articulation settings for the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Tick resolution (ticks per quarter note)
    pub ticks_per_beat: u16,
    /// Tempo in beats per minute
    pub tempo_bpm: f64,
    /// Nominal length of each chord in seconds
    pub note_duration_sec: f64,
    /// Fraction of a chord's length the next chord starts early (0 <= r < 1)
    pub overlap_ratio: f64,
    /// Velocity for note-on and note-off messages
    pub velocity: u8,
    /// Re-press the sustain pedal every this many chords (0 disables)
    pub sustain_retrigger_every: usize,
    /// Delay between the last release and the final pedal release
    pub release_tail_ticks: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: 480,
            tempo_bpm: 120.0,
            note_duration_sec: 2.0,
            overlap_ratio: 0.0,
            velocity: 64,
            sustain_retrigger_every: 4,
            release_tail_ticks: 120,
        }
    }
}

impl ScheduleConfig {
    /// Check that every setting is usable
    pub fn validate(&self) -> Result<(), SonifyError> {
        if self.ticks_per_beat == 0 || self.ticks_per_beat > MAX_TICKS_PER_BEAT {
            return Err(SonifyError::InvalidConfig(format!(
                "ticks_per_beat must be in 1..={}, got {}",
                MAX_TICKS_PER_BEAT, self.ticks_per_beat
            )));
        }
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(SonifyError::InvalidConfig(format!(
                "tempo_bpm must be positive, got {}",
                self.tempo_bpm
            )));
        }
        let micros = (60_000_000.0 / self.tempo_bpm).round();
        if micros < 1.0 || micros > f64::from(MAX_TEMPO_MICROS) {
            return Err(SonifyError::InvalidConfig(format!(
                "tempo_bpm {} needs {} us per beat, outside 1..={}",
                self.tempo_bpm, micros, MAX_TEMPO_MICROS
            )));
        }
        if !self.note_duration_sec.is_finite() || self.note_duration_sec <= 0.0 {
            return Err(SonifyError::InvalidConfig(format!(
                "note_duration_sec must be positive, got {}",
                self.note_duration_sec
            )));
        }
        if !(0.0..1.0).contains(&self.overlap_ratio) {
            return Err(SonifyError::InvalidConfig(format!(
                "overlap_ratio must be in [0, 1), got {}",
                self.overlap_ratio
            )));
        }
        if self.velocity > 127 {
            return Err(SonifyError::InvalidConfig(format!(
                "velocity must be at most 127, got {}",
                self.velocity
            )));
        }
        if self.full_duration_ticks() == 0 {
            return Err(SonifyError::InvalidConfig(
                "note duration is shorter than one tick".to_string(),
            ));
        }
        Ok(())
    }

    /// Microseconds per quarter note
    pub fn tempo_micros(&self) -> u32 {
        (60_000_000.0 / self.tempo_bpm).round() as u32
    }

    /// Convert seconds to ticks at this tempo and resolution
    pub fn seconds_to_ticks(&self, seconds: f64) -> u32 {
        let ticks = seconds * 1_000_000.0 * f64::from(self.ticks_per_beat)
            / f64::from(self.tempo_micros());
        ticks.round() as u32
    }

    /// Convert ticks to seconds at this tempo and resolution
    pub fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 * f64::from(self.tempo_micros())
            / (1_000_000.0 * f64::from(self.ticks_per_beat))
    }

    /// Length of one chord in ticks
    pub fn full_duration_ticks(&self) -> u32 {
        self.seconds_to_ticks(self.note_duration_sec)
    }

    /// Ticks between consecutive chord onsets
    pub fn interval_ticks(&self) -> u32 {
        (f64::from(self.full_duration_ticks()) * (1.0 - self.overlap_ratio)).round() as u32
    }

    /// Ticks from the first onset to the last release for `chords` chords
    pub fn span_ticks(&self, chords: usize) -> u64 {
        match chords {
            0 => 0,
            n => {
                u64::from(self.full_duration_ticks())
                    + (n as u64 - 1) * u64::from(self.interval_ticks())
            }
        }
    }
}

/// A release waiting to be written
#[derive(Debug, Clone, Copy)]
struct PendingRelease {
    due_tick: u64,
    key: i32,
}

/// Streaming scheduler: push chords in order, then finish
pub struct NoteScheduler {
    config: ScheduleConfig,
    full_ticks: u64,
    step_ticks: u64,
    events: Vec<ScheduledEvent>,
    pending: VecDeque<PendingRelease>,
    last_tick: u64,
    chord_count: usize,
}

impl NoteScheduler {
    pub fn new(config: ScheduleConfig) -> Result<Self, SonifyError> {
        config.validate()?;
        Ok(Self {
            full_ticks: u64::from(config.full_duration_ticks()),
            step_ticks: u64::from(config.interval_ticks()),
            config,
            events: Vec::new(),
            pending: VecDeque::new(),
            last_tick: 0,
            chord_count: 0,
        })
    }

    /// Schedule a whole chord sequence
    pub fn schedule(
        config: &ScheduleConfig,
        chords: &[ChordEvent],
    ) -> Result<Vec<ScheduledEvent>, SonifyError> {
        let mut scheduler = Self::new(config.clone())?;
        for chord in chords {
            scheduler.push_chord(&chord.notes);
        }
        Ok(scheduler.finish())
    }

    /// Add the next chord
    pub fn push_chord(&mut self, notes: &[i32]) {
        let index = self.chord_count;
        let onset = index as u64 * self.step_ticks;

        self.flush_due(onset);

        // A key struck again must be released first or the new note is cut short
        let (restruck, waiting): (Vec<PendingRelease>, Vec<PendingRelease>) = self
            .pending
            .drain(..)
            .partition(|release| notes.contains(&release.key));
        self.pending = waiting.into();
        for release in restruck {
            self.emit_note_off(onset, release.key);
        }

        let period = self.config.sustain_retrigger_every;
        if index > 0 && period > 0 && index % period == 0 {
            self.emit_at(onset, control(CC_SUSTAIN, PEDAL_UP));
            self.emit_at(onset, control(CC_SUSTAIN, PEDAL_DOWN));
        }

        let velocity = self.config.velocity;
        for &key in notes {
            self.emit_at(onset, ScheduledMessage::NoteOn { key, velocity });
        }
        for &key in notes {
            self.pending.push_back(PendingRelease {
                due_tick: onset + self.full_ticks,
                key,
            });
        }

        self.chord_count += 1;
    }

    /// Release everything still sounding and lift the pedal
    pub fn finish(mut self) -> Vec<ScheduledEvent> {
        if self.chord_count == 0 {
            return self.events;
        }

        self.flush_due(u64::MAX);
        let tail = self.last_tick + u64::from(self.config.release_tail_ticks);
        self.emit_at(tail, control(CC_SUSTAIN, PEDAL_UP));

        debug!(
            chords = self.chord_count,
            events = self.events.len(),
            span_ticks = self.config.span_ticks(self.chord_count),
            "scheduled note events"
        );
        self.events
    }

    /// Write queued releases due at or before `tick`
    fn flush_due(&mut self, tick: u64) {
        while let Some(release) = self.pending.front().copied() {
            if release.due_tick > tick {
                break;
            }
            self.pending.pop_front();
            self.emit_note_off(release.due_tick, release.key);
        }
    }

    fn emit_note_off(&mut self, tick: u64, key: i32) {
        let velocity = self.config.velocity;
        self.emit_at(tick, ScheduledMessage::NoteOff { key, velocity });
    }

    fn emit_at(&mut self, tick: u64, message: ScheduledMessage) {
        let tick = tick.max(self.last_tick);
        let delta = (tick - self.last_tick) as u32;
        self.events.push(ScheduledEvent::new(delta, message));
        self.last_tick = tick;
    }
}

fn control(controller: u8, value: u8) -> ScheduledMessage {
    ScheduledMessage::Control { controller, value }
}
