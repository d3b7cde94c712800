//! Pipeline orchestration
//!
//! This module provides the public API for screentime sonification.
//! It orchestrates the full pipeline from the raw screen export to a MIDI file
//! and, optionally, a rendered waveform.

use crate::aggregator::intervalize;
use crate::config::SonifyConfig;
use crate::encoder::MidiEncoder;
use crate::error::SonifyError;
use crate::export;
use crate::mapper::{ChordMapper, ChordNamer, TriadNamer};
use crate::normalizer::EventNormalizer;
use crate::render::{FluidSynthRenderer, WaveformRenderer};
use crate::scheduler::NoteScheduler;
use crate::sessions::SessionExtractor;
use crate::types::{Bucket, ChordEvent, Interval, RawEvent, ScheduledEvent, Session};
use crate::PRODUCER_NAME;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Default MIDI output path
pub const DEFAULT_MIDI_OUTPUT: &str = "screentime.mid";

/// Default waveform output path
pub const DEFAULT_WAV_OUTPUT: &str = "screentime.wav";

/// Everything derived from one batch of events, before any file is written
#[derive(Debug, Clone)]
pub struct Composition {
    pub sessions: Vec<Session>,
    pub buckets: Vec<Bucket>,
    pub chords: Vec<ChordEvent>,
    pub events: Vec<ScheduledEvent>,
}

/// Optional per-stage CSV exports
#[derive(Debug, Clone, Default)]
pub struct ExportPaths {
    pub events: Option<PathBuf>,
    pub sessions: Option<PathBuf>,
    pub buckets: Option<PathBuf>,
    pub chords: Option<PathBuf>,
}

/// Inputs and outputs of one run
#[derive(Debug, Clone)]
pub struct SonifyRequest {
    /// Raw screen export (CSV)
    pub source: PathBuf,
    /// Inclusive start of the analysed range
    pub start: DateTime<Utc>,
    /// Exclusive end of the analysed range
    pub end: DateTime<Utc>,
    pub midi_output: PathBuf,
    /// Waveform output; `None` skips rendering
    pub wav_output: Option<PathBuf>,
    pub exports: ExportPaths,
}

impl SonifyRequest {
    pub fn new(source: impl Into<PathBuf>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            start,
            end,
            midi_output: PathBuf::from(DEFAULT_MIDI_OUTPUT),
            wav_output: Some(PathBuf::from(DEFAULT_WAV_OUTPUT)),
            exports: ExportPaths::default(),
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct SonificationReport {
    pub run_id: Uuid,
    pub interval: Interval,
    pub raw_events: usize,
    pub sessions: usize,
    pub chords: Vec<ChordEvent>,
    pub note_events: usize,
    /// Audible length from the first onset to the last release
    pub duration_sec: f64,
    pub midi_path: PathBuf,
    pub wav_path: Option<PathBuf>,
}

/// Runs the pipeline with swappable chord naming and rendering
pub struct Sonifier {
    config: SonifyConfig,
    namer: Box<dyn ChordNamer>,
    renderer: Option<Box<dyn WaveformRenderer>>,
}

impl Sonifier {
    /// Create a sonifier with the built-in triad namer and FluidSynth renderer
    pub fn new(config: SonifyConfig) -> Self {
        let renderer = FluidSynthRenderer::new(config.renderer.clone());
        Self {
            config,
            namer: Box::new(TriadNamer),
            renderer: Some(Box::new(renderer)),
        }
    }

    pub fn with_namer(mut self, namer: Box<dyn ChordNamer>) -> Self {
        self.namer = namer;
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn WaveformRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Never render, even when a waveform path is requested
    pub fn without_renderer(mut self) -> Self {
        self.renderer = None;
        self
    }

    pub fn config(&self) -> &SonifyConfig {
        &self.config
    }

    /// Run the in-memory stages over parsed events
    pub fn compose(
        &self,
        events: &[RawEvent],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Composition, SonifyError> {
        self.config.validate()?;

        // Stage 1: Pair unlock/lock events into sessions
        let sessions = SessionExtractor::extract(events);

        // Stage 2: Aggregate sessions into interval buckets
        let buckets = intervalize(&sessions, start, end, self.config.interval);

        // Stage 3: Map buckets to chords
        let mapper = ChordMapper::new(
            self.config.interval,
            self.config.threshold_minutes,
            self.namer.as_ref(),
        );
        let chords = mapper.map_buckets(&buckets);

        // Stage 4: Schedule note events
        let scheduled = NoteScheduler::schedule(&self.config.schedule, &chords)?;

        Ok(Composition {
            sessions,
            buckets,
            chords,
            events: scheduled,
        })
    }

    /// Run the full pipeline, writing the MIDI file, exports and waveform
    pub fn run(&self, request: &SonifyRequest) -> Result<SonificationReport, SonifyError> {
        let run_id = Uuid::new_v4();
        let schedule = &self.config.schedule;
        info!(
            %run_id,
            source = %request.source.display(),
            start = %request.start,
            end = %request.end,
            interval = self.config.interval.as_str(),
            threshold_minutes = self.config.threshold_minutes,
            tempo_bpm = schedule.tempo_bpm,
            note_duration_sec = schedule.note_duration_sec,
            overlap_ratio = schedule.overlap_ratio,
            "sonifying screentime"
        );

        let reader = BufReader::new(File::open(&request.source)?);
        let raw_events = EventNormalizer::parse_reader(reader)?;
        let composition = self.compose(&raw_events, request.start, request.end)?;

        self.write_exports(&request.exports, &raw_events, &composition)?;

        let encoder = MidiEncoder::new(self.config.encoder.clone())
            .with_track_name(format!("{} {}", PRODUCER_NAME, run_id));
        encoder.write_file(&request.midi_output, schedule, &composition.events)?;

        let wav_path = match (&request.wav_output, &self.renderer) {
            (Some(wav), Some(renderer)) => {
                renderer.render(&request.midi_output, wav)?;
                Some(wav.clone())
            }
            _ => None,
        };

        let report = SonificationReport {
            run_id,
            interval: self.config.interval,
            raw_events: raw_events.len(),
            sessions: composition.sessions.len(),
            note_events: composition.events.len(),
            duration_sec: schedule.ticks_to_seconds(schedule.span_ticks(composition.chords.len())),
            chords: composition.chords,
            midi_path: request.midi_output.clone(),
            wav_path,
        };

        info!(
            %run_id,
            chords = report.chords.len(),
            duration_sec = report.duration_sec,
            midi = %report.midi_path.display(),
            "sonification complete"
        );
        Ok(report)
    }

    fn write_exports(
        &self,
        paths: &ExportPaths,
        raw_events: &[RawEvent],
        composition: &Composition,
    ) -> Result<(), SonifyError> {
        let interval = self.config.interval;
        if let Some(path) = &paths.events {
            export::to_file(path, |f| export::write_events(f, raw_events))?;
        }
        if let Some(path) = &paths.sessions {
            export::to_file(path, |f| export::write_sessions(f, &composition.sessions))?;
        }
        if let Some(path) = &paths.buckets {
            export::to_file(path, |f| {
                export::write_buckets(f, &composition.buckets, interval)
            })?;
        }
        if let Some(path) = &paths.chords {
            export::to_file(path, |f| export::write_chords(f, &composition.chords, interval))?;
        }
        Ok(())
    }
}

/// Run the whole pipeline with default collaborators.
///
/// # Example
/// ```ignore
/// let report = sonify_screentime_file(
///     "data/screen.csv",
///     parse_instant("2022-06-26 00:00:00")?,
///     parse_instant("2022-06-27 00:00:00")?,
///     SonifyConfig::default(),
/// )?;
/// ```
pub fn sonify_screentime_file(
    source: impl AsRef<Path>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: SonifyConfig,
) -> Result<SonificationReport, SonifyError> {
    let request = SonifyRequest::new(source.as_ref(), start, end);
    Sonifier::new(config).run(&request)
}

/// Parse a range bound: `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, RFC 3339,
/// or a bare date (midnight). Naive values are taken as UTC.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, SonifyError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    Err(SonifyError::InvalidConfig(format!(
        "cannot parse '{}' as a date or date-time",
        value
    )))
}
