//! Error types for screentime sonification

use thiserror::Error;

/// Errors that can occur anywhere in the sonification pipeline
#[derive(Debug, Error)]
pub enum SonifyError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid interval '{0}' (expected hour, day, week or month)")]
    InvalidInterval(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Note {0} is outside the MIDI range 0-127")]
    NoteOutOfRange(i32),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Renderer exited with {status}: {stderr}")]
    RenderFailed { status: String, stderr: String },
}

impl SonifyError {
    pub fn malformed<T: Into<String>>(message: T) -> Self {
        Self::MalformedInput(message.into())
    }
}
