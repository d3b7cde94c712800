//! Sonify CLI - command-line interface for screentime sonification
//!
//! Commands:
//! - render: Run the full pipeline (events → chords → MIDI → WAV)
//! - sessions: Extract screen sessions from a raw export
//! - intervals: Aggregate screen time per interval
//! - doctor: Check the renderer and soundfont setup

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use screentime_sonify::aggregator::intervalize;
use screentime_sonify::export;
use screentime_sonify::normalizer::EventNormalizer;
use screentime_sonify::pipeline::{ExportPaths, SonificationReport};
use screentime_sonify::sessions::SessionExtractor;
use screentime_sonify::types::{Interval, RawEvent};
use screentime_sonify::{
    parse_instant, Sonifier, SonifyConfig, SonifyError, SonifyRequest, PRODUCER_NAME,
    SONIFY_VERSION,
};
use tracing_subscriber::EnvFilter;

/// Sonify - turn screen lock/unlock logs into chord progressions
#[derive(Parser)]
#[command(name = "sonify")]
#[command(version = SONIFY_VERSION)]
#[command(about = "Turn screentime logs into music", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and write MIDI (and WAV) output
    Render {
        /// Raw screen export (CSV)
        #[arg(short, long)]
        input: PathBuf,

        /// Start of the range, inclusive (e.g. "2022-06-26 00:00:00")
        #[arg(long)]
        start: String,

        /// End of the range, exclusive
        #[arg(long)]
        end: String,

        /// JSON config file; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bucket granularity (hour, day, week, month)
        #[arg(long)]
        interval: Option<String>,

        /// Minutes at or above which a chord turns minor
        #[arg(long)]
        threshold: Option<f64>,

        /// Tempo in beats per minute
        #[arg(long)]
        bpm: Option<f64>,

        /// Length of each chord in seconds
        #[arg(long)]
        note_duration: Option<f64>,

        /// Fraction of each chord overlapped by the next (0 <= r < 1)
        #[arg(long)]
        overlap: Option<f64>,

        /// SoundFont used for rendering
        #[arg(long)]
        soundfont: Option<PathBuf>,

        /// MIDI output path
        #[arg(long, default_value = "screentime.mid")]
        midi: PathBuf,

        /// WAV output path
        #[arg(long, default_value = "screentime.wav")]
        wav: PathBuf,

        /// Write MIDI only
        #[arg(long)]
        no_render: bool,

        /// Export the cleaned event table
        #[arg(long)]
        export_events: Option<PathBuf>,

        /// Export the session table
        #[arg(long)]
        export_sessions: Option<PathBuf>,

        /// Export the bucket table
        #[arg(long)]
        export_buckets: Option<PathBuf>,

        /// Export the final chord table
        #[arg(long)]
        export_chords: Option<PathBuf>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Extract screen sessions as CSV
    Sessions {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,
    },

    /// Aggregate screen time per interval as CSV
    Intervals {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Start of the range, inclusive
        #[arg(long)]
        start: String,

        /// End of the range, exclusive
        #[arg(long)]
        end: String,

        /// Bucket granularity (hour, day, week, month)
        #[arg(long, default_value = "day")]
        interval: String,
    },

    /// Check that rendering can work
    Doctor {
        /// SoundFont to check
        #[arg(long, default_value = "Grand_Piano.sf2")]
        soundfont: PathBuf,

        /// Synthesizer executable to check
        #[arg(long, default_value = "fluidsynth")]
        program: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SonifyCliError> {
    match cli.command {
        Commands::Render {
            input,
            start,
            end,
            config,
            interval,
            threshold,
            bpm,
            note_duration,
            overlap,
            soundfont,
            midi,
            wav,
            no_render,
            export_events,
            export_sessions,
            export_buckets,
            export_chords,
            json,
        } => {
            let mut config = match config {
                Some(path) => SonifyConfig::load(&path)?,
                None => SonifyConfig::default(),
            };
            if let Some(interval) = interval {
                config.interval = interval.parse()?;
            }
            if let Some(threshold) = threshold {
                config.threshold_minutes = threshold;
            }
            if let Some(bpm) = bpm {
                config.schedule.tempo_bpm = bpm;
            }
            if let Some(note_duration) = note_duration {
                config.schedule.note_duration_sec = note_duration;
            }
            if let Some(overlap) = overlap {
                config.schedule.overlap_ratio = overlap;
            }
            if let Some(soundfont) = soundfont {
                config.renderer.soundfont = soundfont;
            }

            let mut request = SonifyRequest::new(input, parse_instant(&start)?, parse_instant(&end)?);
            request.midi_output = midi;
            request.wav_output = if no_render { None } else { Some(wav) };
            request.exports = ExportPaths {
                events: export_events,
                sessions: export_sessions,
                buckets: export_buckets,
                chords: export_chords,
            };

            let report = Sonifier::new(config).run(&request)?;
            cmd_print_report(&report, json)
        }

        Commands::Sessions { input, output } => {
            let events = read_events(&input)?;
            let sessions = SessionExtractor::extract(&events);
            let mut buffer = Vec::new();
            export::write_sessions(&mut buffer, &sessions)?;
            write_output(&output, &buffer)
        }

        Commands::Intervals {
            input,
            output,
            start,
            end,
            interval,
        } => {
            let interval: Interval = interval.parse()?;
            let events = read_events(&input)?;
            let sessions = SessionExtractor::extract(&events);
            let buckets = intervalize(
                &sessions,
                parse_instant(&start)?,
                parse_instant(&end)?,
                interval,
            );
            let mut buffer = Vec::new();
            export::write_buckets(&mut buffer, &buckets, interval)?;
            write_output(&output, &buffer)
        }

        Commands::Doctor {
            soundfont,
            program,
            json,
        } => cmd_doctor(&soundfont, &program, json),
    }
}

fn read_events(input: &Path) -> Result<Vec<RawEvent>, SonifyCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(EventNormalizer::parse_str(&buffer)?)
    } else {
        Ok(EventNormalizer::parse_reader(fs::File::open(input)?)?)
    }
}

fn write_output(output: &Path, data: &[u8]) -> Result<(), SonifyCliError> {
    if output.to_string_lossy() == "-" {
        io::stdout().write_all(data)?;
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn cmd_print_report(report: &SonificationReport, json: bool) -> Result<(), SonifyCliError> {
    if json || !atty::is(atty::Stream::Stdout) {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Sonification Report");
    println!("===================");
    println!("Run:       {}", report.run_id);
    println!("Interval:  {}", report.interval.as_str());
    println!("Events:    {}", report.raw_events);
    println!("Sessions:  {}", report.sessions);
    println!("Duration:  {:.1}s", report.duration_sec);
    println!("MIDI:      {}", report.midi_path.display());
    if let Some(wav) = &report.wav_path {
        println!("WAV:       {}", wav.display());
    }
    println!("\nChords:");
    for chord in &report.chords {
        println!(
            "  {}  {:>8.1} min  {} (octave {})",
            report.interval.format_key(&chord.interval_start),
            chord.total_minutes,
            chord.display_label(),
            chord.octave
        );
    }
    Ok(())
}

fn cmd_doctor(soundfont: &Path, program: &str, json: bool) -> Result<(), SonifyCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "sonify_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("{} version {}", PRODUCER_NAME, SONIFY_VERSION),
    });

    // Check the synthesizer runs
    let renderer_check = match Command::new(program).arg("--version").output() {
        Ok(output) if output.status.success() => DoctorCheck {
            name: "renderer".to_string(),
            status: CheckStatus::Ok,
            message: String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .unwrap_or(program)
                .to_string(),
        },
        Ok(output) => DoctorCheck {
            name: "renderer".to_string(),
            status: CheckStatus::Error,
            message: format!("{} --version exited with {}", program, output.status),
        },
        Err(e) => DoctorCheck {
            name: "renderer".to_string(),
            status: CheckStatus::Error,
            message: format!("Cannot run {}: {}", program, e),
        },
    };
    checks.push(renderer_check);

    // Check the soundfont file
    let soundfont_check = match fs::metadata(soundfont) {
        Ok(meta) if meta.is_file() => DoctorCheck {
            name: "soundfont".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} ({} bytes)", soundfont.display(), meta.len()),
        },
        Ok(_) => DoctorCheck {
            name: "soundfont".to_string(),
            status: CheckStatus::Error,
            message: format!("{} is not a file", soundfont.display()),
        },
        Err(_) => DoctorCheck {
            name: "soundfont".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} does not exist (use --no-render for MIDI only)", soundfont.display()),
        },
    };
    checks.push(soundfont_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: SONIFY_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Sonify Doctor Report");
        println!("====================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(SonifyCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

#[derive(Debug)]
enum SonifyCliError {
    Io(io::Error),
    Sonify(SonifyError),
    Json(serde_json::Error),
    DoctorFailed,
}

impl From<io::Error> for SonifyCliError {
    fn from(e: io::Error) -> Self {
        SonifyCliError::Io(e)
    }
}

impl From<SonifyError> for SonifyCliError {
    fn from(e: SonifyError) -> Self {
        SonifyCliError::Sonify(e)
    }
}

impl From<serde_json::Error> for SonifyCliError {
    fn from(e: serde_json::Error) -> Self {
        SonifyCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<SonifyCliError> for CliError {
    fn from(e: SonifyCliError) -> Self {
        match e {
            SonifyCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            SonifyCliError::Sonify(e) => {
                let (code, hint) = match &e {
                    SonifyError::MalformedInput(_) | SonifyError::Csv(_) => (
                        "MALFORMED_INPUT",
                        "Input needs a timestamp column and a screen status column",
                    ),
                    SonifyError::InvalidInterval(_) => {
                        ("INVALID_INTERVAL", "Use one of: hour, day, week, month")
                    }
                    SonifyError::InvalidConfig(_) | SonifyError::Json(_) => {
                        ("INVALID_CONFIG", "Check the config file and flags")
                    }
                    SonifyError::NoteOutOfRange(_) => {
                        ("NOTE_OUT_OF_RANGE", "Check the threshold and interval settings")
                    }
                    SonifyError::RenderFailed { .. } => {
                        ("RENDER_FAILED", "Run 'sonify doctor' or retry with --no-render")
                    }
                    SonifyError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            SonifyCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            SonifyCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
