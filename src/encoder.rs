//! Standard MIDI File encoding
//!
//! Writes the scheduled track as a format-0 SMF: a tempo meta event, the
//! initial pedal/reverb/expression controllers, the scheduled messages and an
//! end-of-track marker.

use crate::error::SonifyError;
use crate::scheduler::{ScheduleConfig, CC_EXPRESSION, CC_REVERB, CC_SUSTAIN, PEDAL_DOWN};
use crate::types::{ScheduledEvent, ScheduledMessage};
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Largest delta a track event can carry
const MAX_DELTA_TICKS: u32 = 0x0FFF_FFFF;

/// Settings for the written track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Reverb send written at track start
    pub reverb: u8,
    /// Expression written at track start
    pub expression: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            reverb: 70,
            expression: 100,
        }
    }
}

/// Encoder producing SMF bytes from scheduled events
pub struct MidiEncoder {
    config: EncoderConfig,
    track_name: Option<String>,
}

impl Default for MidiEncoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

impl MidiEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            track_name: None,
        }
    }

    /// Name written as the track's name meta event
    pub fn with_track_name(mut self, name: impl Into<String>) -> Self {
        self.track_name = Some(name.into());
        self
    }

    /// Encode the track into SMF bytes.
    ///
    /// An empty event list yields a tempo-only track.
    pub fn encode(
        &self,
        schedule: &ScheduleConfig,
        events: &[ScheduledEvent],
    ) -> Result<Vec<u8>, SonifyError> {
        if self.config.channel > 15 {
            return Err(SonifyError::InvalidConfig(format!(
                "MIDI channel must be 0-15, got {}",
                self.config.channel
            )));
        }
        schedule.validate()?;

        let header = Header::new(
            Format::SingleTrack,
            Timing::Metrical(u15::new(schedule.ticks_per_beat)),
        );

        let mut track: Vec<TrackEvent> = Vec::with_capacity(events.len() + 6);
        if let Some(name) = &self.track_name {
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
            });
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(schedule.tempo_micros()))),
        });

        if !events.is_empty() {
            for (controller, value) in [
                (CC_SUSTAIN, PEDAL_DOWN),
                (CC_REVERB, self.config.reverb),
                (CC_EXPRESSION, self.config.expression),
            ] {
                track.push(TrackEvent {
                    delta: u28::new(0),
                    kind: self.midi(MidiMessage::Controller {
                        controller: data_byte(controller)?,
                        value: data_byte(value)?,
                    }),
                });
            }
        }

        for event in events {
            track.push(self.track_event(event)?);
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header,
            tracks: vec![track],
        };
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes)?;
        Ok(bytes)
    }

    /// Encode and write the track to `path`
    pub fn write_file(
        &self,
        path: &Path,
        schedule: &ScheduleConfig,
        events: &[ScheduledEvent],
    ) -> Result<(), SonifyError> {
        let bytes = self.encode(schedule, events)?;
        fs::write(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "wrote MIDI file");
        Ok(())
    }

    fn track_event<'a>(&self, event: &ScheduledEvent) -> Result<TrackEvent<'a>, SonifyError> {
        if event.delta_ticks > MAX_DELTA_TICKS {
            return Err(SonifyError::InvalidConfig(format!(
                "delta of {} ticks exceeds the MIDI limit",
                event.delta_ticks
            )));
        }

        let message = match event.message {
            ScheduledMessage::NoteOn { key, velocity } => MidiMessage::NoteOn {
                key: note_key(key)?,
                vel: data_byte(velocity)?,
            },
            ScheduledMessage::NoteOff { key, velocity } => MidiMessage::NoteOff {
                key: note_key(key)?,
                vel: data_byte(velocity)?,
            },
            ScheduledMessage::Control { controller, value } => MidiMessage::Controller {
                controller: data_byte(controller)?,
                value: data_byte(value)?,
            },
        };

        Ok(TrackEvent {
            delta: u28::new(event.delta_ticks),
            kind: self.midi(message),
        })
    }

    fn midi<'a>(&self, message: MidiMessage) -> TrackEventKind<'a> {
        TrackEventKind::Midi {
            channel: u4::new(self.config.channel),
            message,
        }
    }
}

fn note_key(key: i32) -> Result<u7, SonifyError> {
    u8::try_from(key)
        .ok()
        .filter(|k| *k <= 127)
        .map(u7::new)
        .ok_or(SonifyError::NoteOutOfRange(key))
}

fn data_byte(value: u8) -> Result<u7, SonifyError> {
    if value > 127 {
        return Err(SonifyError::InvalidConfig(format!(
            "controller data {} is outside 0-127",
            value
        )));
    }
    Ok(u7::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::NoteScheduler;

    fn schedule_config() -> ScheduleConfig {
        ScheduleConfig {
            tempo_bpm: 60.0,
            overlap_ratio: 0.6,
            ..ScheduleConfig::default()
        }
    }

    fn two_chords() -> Vec<ScheduledEvent> {
        let mut scheduler = NoteScheduler::new(schedule_config()).unwrap();
        scheduler.push_chord(&[60, 64, 67]);
        scheduler.push_chord(&[55, 59, 62]);
        scheduler.finish()
    }

    #[test]
    fn test_encoded_file_round_trips_through_parser() {
        let events = two_chords();
        let bytes = MidiEncoder::default()
            .with_track_name("screentime")
            .encode(&schedule_config(), &events)
            .unwrap();

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));
        assert_eq!(smf.tracks.len(), 1);

        let track = &smf.tracks[0];
        assert_eq!(
            track[0].kind,
            TrackEventKind::Meta(MetaMessage::TrackName(b"screentime"))
        );
        assert_eq!(
            track[1].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(1_000_000)))
        );

        let controllers: Vec<(u8, u8)> = track[2..5]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::Controller { controller, value },
                    ..
                } => Some((controller.as_int(), value.as_int())),
                _ => None,
            })
            .collect();
        assert_eq!(controllers, vec![(64, 127), (91, 70), (11, 100)]);

        let note_ons = track
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(note_ons, 6);
        // name + tempo + 3 controllers + scheduled + end of track
        assert_eq!(track.len(), 5 + events.len() + 1);
        assert_eq!(
            track.last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        );
    }

    #[test]
    fn test_second_onset_delta_survives_encoding() {
        let bytes = MidiEncoder::default()
            .encode(&schedule_config(), &two_chords())
            .unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let fourth_on = smf.tracks[0]
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .nth(3)
            .unwrap();
        assert_eq!(fourth_on.delta.as_int(), 384);
    }

    #[test]
    fn test_empty_schedule_is_tempo_only() {
        let bytes = MidiEncoder::default()
            .encode(&schedule_config(), &[])
            .unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let track = &smf.tracks[0];
        assert_eq!(track.len(), 2);
        assert!(matches!(
            track[0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(_))
        ));
    }

    #[test]
    fn test_note_out_of_range() {
        let events = vec![ScheduledEvent::new(
            0,
            ScheduledMessage::NoteOn {
                key: -12,
                velocity: 64,
            },
        )];

        let err = MidiEncoder::default()
            .encode(&schedule_config(), &events)
            .unwrap_err();
        assert!(matches!(err, SonifyError::NoteOutOfRange(-12)));
    }

    #[test]
    fn test_tempo_beyond_meta_event_range_is_rejected() {
        let slow = ScheduleConfig {
            tempo_bpm: 3.0,
            ..schedule_config()
        };

        let err = MidiEncoder::default().encode(&slow, &[]).unwrap_err();
        assert!(matches!(err, SonifyError::InvalidConfig(_)));
    }

    #[test]
    fn test_write_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mid");

        MidiEncoder::default()
            .write_file(&path, &schedule_config(), &two_chords())
            .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
    }
}
