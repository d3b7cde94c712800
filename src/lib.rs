//! Screentime Sonify - turn screen lock/unlock logs into music
//!
//! Screen events are reconstructed into sessions and summed per interval, and
//! each interval becomes a chord through a deterministic pipeline:
//! normalization → session extraction → interval aggregation → chord mapping
//! → note scheduling → MIDI encoding → (optional) waveform rendering.
//!
//! More screen time means a lower root; intervals at or above the target
//! threshold are minor, the rest major.

pub mod aggregator;
pub mod config;
pub mod encoder;
pub mod error;
pub mod export;
pub mod mapper;
pub mod normalizer;
pub mod pipeline;
pub mod render;
pub mod scheduler;
pub mod sessions;
pub mod types;

pub use config::SonifyConfig;
pub use error::SonifyError;
pub use mapper::{ChordNamer, TriadNamer};
pub use pipeline::{parse_instant, sonify_screentime_file, Sonifier, SonifyRequest};
pub use render::{FluidSynthRenderer, WaveformRenderer};
pub use types::{Bucket, ChordEvent, Interval, RawEvent, ScheduledEvent, Session};

/// Crate version embedded in generated files
pub const SONIFY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name written into MIDI track names
pub const PRODUCER_NAME: &str = "screentime-sonify";
