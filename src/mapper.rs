//! Screen time to chord mapping
//!
//! Each bucket's total becomes a triad: the root pitch falls linearly from C6
//! (84) at zero screen time to C2 (36) at the run's scale, and the quality is
//! major below the target threshold and minor at or above it.

use crate::types::{Bucket, ChordEvent, ChordQuality, Interval};
use tracing::debug;

/// Highest root pitch (C6), used for zero screen time
pub const MAX_PITCH: i32 = 84;

/// Lowest root pitch (C2), reached at the run's scale
pub const MIN_PITCH: i32 = 36;

/// Pitch-class names indexed by `pitch mod 12`
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Label used when the namer cannot identify a chord
pub const UNKNOWN_CHORD: &str = "Unknown";

/// Reference duration (minutes) below which the scale does not shrink
pub fn benchmark_minutes(interval: Interval) -> f64 {
    match interval {
        Interval::Day => 300.0,
        Interval::Week => 2100.0,
        Interval::Month => 9000.0,
        Interval::Hour => 60.0,
    }
}

/// Map a duration to a root pitch.
///
/// Durations outside `[0, scale]` extrapolate along the same line and are not
/// clamped.
pub fn map_pitch(minutes: f64, max_minutes: f64, interval: Interval) -> i32 {
    let scale = max_minutes.max(benchmark_minutes(interval));
    let fraction = minutes / scale;
    let pitch = f64::from(MAX_PITCH) + fraction * f64::from(MIN_PITCH - MAX_PITCH);
    pitch.round() as i32
}

/// Major below the threshold, minor at or above it
pub fn chord_quality(minutes: f64, threshold_minutes: f64) -> ChordQuality {
    if minutes < threshold_minutes {
        ChordQuality::Major
    } else {
        ChordQuality::Minor
    }
}

/// Pitch-class name and octave of a MIDI pitch (60 = C4)
pub fn note_name(pitch: i32) -> (&'static str, i32) {
    let name = NOTE_NAMES[pitch.rem_euclid(12) as usize];
    let octave = pitch.div_euclid(12) - 1;
    (name, octave)
}

/// Names a set of pitch classes as a chord
pub trait ChordNamer {
    /// Candidate labels, best match first; empty when nothing matches
    fn find_chords(&self, note_names: &[&str]) -> Vec<String>;
}

/// Recognizes major, minor, diminished and augmented triads and their
/// inversions (written as slash chords).
#[derive(Debug, Clone, Copy, Default)]
pub struct TriadNamer;

/// Triad shapes as semitone offsets above the root, with their label suffix
const TRIAD_SHAPES: [([i32; 2], &str); 4] = [
    ([4, 7], ""),
    ([3, 7], "m"),
    ([3, 6], "dim"),
    ([4, 8], "aug"),
];

impl ChordNamer for TriadNamer {
    fn find_chords(&self, note_names: &[&str]) -> Vec<String> {
        let classes: Option<Vec<i32>> = note_names.iter().map(|n| pitch_class(n)).collect();
        let classes = match classes {
            Some(classes) if classes.len() == 3 => classes,
            _ => return Vec::new(),
        };
        let bass = note_names[0];

        let mut matches = Vec::new();
        // Try the written bass as root first, then the other notes as roots
        for (root_idx, &root) in classes.iter().enumerate() {
            let mut above: Vec<i32> = classes
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != root_idx)
                .map(|(_, &pc)| (pc - root).rem_euclid(12))
                .collect();
            above.sort_unstable();

            for (shape, suffix) in TRIAD_SHAPES {
                if above == shape {
                    let root_name = note_names[root_idx];
                    if root_idx == 0 {
                        matches.push(format!("{}{}", root_name, suffix));
                    } else {
                        matches.push(format!("{}{}/{}", root_name, suffix, bass));
                    }
                }
            }
        }
        matches
    }
}

fn pitch_class(name: &str) -> Option<i32> {
    NOTE_NAMES
        .iter()
        .position(|n| *n == name)
        .map(|idx| idx as i32)
}

/// Maps buckets to chords for one run
pub struct ChordMapper<'a> {
    interval: Interval,
    threshold_minutes: f64,
    namer: &'a dyn ChordNamer,
}

impl<'a> ChordMapper<'a> {
    pub fn new(interval: Interval, threshold_minutes: f64, namer: &'a dyn ChordNamer) -> Self {
        Self {
            interval,
            threshold_minutes,
            namer,
        }
    }

    /// Map every bucket, scaling against the largest bucket in the run
    pub fn map_buckets(&self, buckets: &[Bucket]) -> Vec<ChordEvent> {
        let max_minutes = buckets
            .iter()
            .map(|b| b.total_minutes)
            .fold(0.0_f64, f64::max);

        let chords: Vec<ChordEvent> = buckets
            .iter()
            .map(|bucket| self.map_bucket(bucket, max_minutes))
            .collect();

        debug!(
            chords = chords.len(),
            max_minutes,
            scale = max_minutes.max(benchmark_minutes(self.interval)),
            "mapped buckets to chords"
        );
        chords
    }

    /// Map one bucket given the run maximum
    pub fn map_bucket(&self, bucket: &Bucket, max_minutes: f64) -> ChordEvent {
        let base_note = map_pitch(bucket.total_minutes, max_minutes, self.interval);
        let quality = chord_quality(bucket.total_minutes, self.threshold_minutes);
        let notes = quality.intervals().map(|offset| base_note + offset);

        let names = notes.map(|note| note_name(note).0);
        let (_, octave) = note_name(base_note);

        let label = self
            .namer
            .find_chords(&names)
            .into_iter()
            .next()
            .unwrap_or_else(|| UNKNOWN_CHORD.to_string());

        ChordEvent {
            interval_start: bucket.interval_start,
            total_minutes: bucket.total_minutes,
            base_note,
            quality,
            notes,
            note_names: names.map(str::to_string),
            label,
            octave,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    struct NoMatches;

    impl ChordNamer for NoMatches {
        fn find_chords(&self, _note_names: &[&str]) -> Vec<String> {
            Vec::new()
        }
    }

    struct Fixed(Vec<&'static str>);

    impl ChordNamer for Fixed {
        fn find_chords(&self, _note_names: &[&str]) -> Vec<String> {
            self.0.iter().map(|s| s.to_string()).collect()
        }
    }

    fn bucket(minutes: f64) -> Bucket {
        Bucket {
            interval_start: NaiveDate::from_ymd_opt(2022, 2, 4)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            total_minutes: minutes,
        }
    }

    #[test]
    fn test_benchmarks() {
        assert_eq!(benchmark_minutes(Interval::Hour), 60.0);
        assert_eq!(benchmark_minutes(Interval::Day), 300.0);
        assert_eq!(benchmark_minutes(Interval::Week), 2100.0);
        assert_eq!(benchmark_minutes(Interval::Month), 9000.0);
    }

    #[test]
    fn test_pitch_endpoints() {
        assert_eq!(map_pitch(0.0, 120.0, Interval::Hour), 84);
        assert_eq!(map_pitch(120.0, 120.0, Interval::Hour), 36);
        assert_eq!(map_pitch(300.0, 10.0, Interval::Day), 36);
    }

    #[test]
    fn test_one_minute_in_hour_interval() {
        // scale = max(1, 60) = 60 -> 84 - 48/60 = 83.2
        assert_eq!(map_pitch(1.0, 1.0, Interval::Hour), 83);
    }

    #[test]
    fn test_pitch_is_monotonically_non_increasing() {
        let mut previous = i32::MAX;
        for step in 0..=600 {
            let pitch = map_pitch(step as f64 * 0.5, 300.0, Interval::Day);
            assert!(pitch <= previous);
            previous = pitch;
        }
    }

    #[test]
    fn test_pitch_extrapolates_without_clamping() {
        // Beyond the scale the line keeps falling: 84 - 48 * 2 = -12
        assert_eq!(map_pitch(120.0, 60.0, Interval::Hour), -12);
        assert_eq!(map_pitch(450.0, 0.0, Interval::Day), 12);
        assert_eq!(map_pitch(-60.0, 60.0, Interval::Hour), 132);
    }

    #[test]
    fn test_quality_threshold_boundary() {
        assert_eq!(chord_quality(20.0, 20.0), ChordQuality::Minor);
        assert_eq!(chord_quality(20.0 - 1e-9, 20.0), ChordQuality::Major);
    }

    #[test]
    fn test_note_names_and_octaves() {
        assert_eq!(note_name(60), ("C", 4));
        assert_eq!(note_name(61), ("C#", 4));
        assert_eq!(note_name(36), ("C", 2));
        assert_eq!(note_name(83), ("B", 5));
        assert_eq!(note_name(-1), ("B", -2));
    }

    #[test]
    fn test_triad_namer() {
        let namer = TriadNamer;
        assert_eq!(namer.find_chords(&["C", "E", "G"]), vec!["C".to_string()]);
        assert_eq!(namer.find_chords(&["A", "C", "E"]), vec!["Am".to_string()]);
        assert_eq!(namer.find_chords(&["B", "D", "F"]), vec!["Bdim".to_string()]);
        assert_eq!(namer.find_chords(&["E", "G", "C"]), vec!["C/E".to_string()]);
        assert!(namer.find_chords(&["C", "C#", "D"]).is_empty());
        assert!(namer.find_chords(&["H", "E", "G"]).is_empty());
    }

    #[test]
    fn test_augmented_triad_matches_every_root() {
        let chords = TriadNamer.find_chords(&["C", "E", "G#"]);
        assert_eq!(chords[0], "Caug");
        assert_eq!(chords.len(), 3);
    }

    #[test]
    fn test_map_bucket_major_chord() {
        let namer = TriadNamer;
        let mapper = ChordMapper::new(Interval::Hour, 20.0, &namer);

        let chord = mapper.map_bucket(&bucket(1.0), 1.0);

        assert_eq!(chord.base_note, 83);
        assert_eq!(chord.quality, ChordQuality::Major);
        assert_eq!(chord.notes, [83, 87, 90]);
        assert_eq!(
            chord.note_names,
            ["B".to_string(), "D#".to_string(), "F#".to_string()]
        );
        assert_eq!(chord.label, "B");
        assert_eq!(chord.octave, 5);
        assert_eq!(chord.display_label(), "B (B, D#, F#)");
    }

    #[test]
    fn test_map_bucket_minor_chord() {
        let namer = TriadNamer;
        let mapper = ChordMapper::new(Interval::Day, 180.0, &namer);

        let chord = mapper.map_bucket(&bucket(300.0), 300.0);

        assert_eq!(chord.base_note, 36);
        assert_eq!(chord.quality, ChordQuality::Minor);
        assert_eq!(chord.notes, [36, 39, 43]);
        assert_eq!(chord.label, "Cm");
        assert_eq!(chord.octave, 2);
    }

    #[test]
    fn test_unknown_and_first_label() {
        let mapper = ChordMapper::new(Interval::Hour, 20.0, &NoMatches);
        assert_eq!(mapper.map_bucket(&bucket(5.0), 5.0).label, UNKNOWN_CHORD);

        let namer = Fixed(vec!["First", "Second"]);
        let mapper = ChordMapper::new(Interval::Hour, 20.0, &namer);
        assert_eq!(mapper.map_bucket(&bucket(5.0), 5.0).label, "First");
    }

    #[test]
    fn test_map_buckets_uses_run_maximum() {
        let namer = TriadNamer;
        let mapper = ChordMapper::new(Interval::Hour, 20.0, &namer);

        let chords = mapper.map_buckets(&[bucket(30.0), bucket(120.0)]);

        // scale = max(120, 60) = 120
        assert_eq!(chords[0].base_note, 72);
        assert_eq!(chords[1].base_note, 36);
        assert!(mapper.map_buckets(&[]).is_empty());
    }
}
