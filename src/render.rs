//! Waveform rendering
//!
//! Rendering is delegated to an external synthesizer. [`FluidSynthRenderer`]
//! shells out to the `fluidsynth` binary; anything else implementing
//! [`WaveformRenderer`] can be substituted.

use crate::error::SonifyError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

/// Renders a MIDI file to an audio file
pub trait WaveformRenderer {
    fn render(&self, midi_path: &Path, output_path: &Path) -> Result<(), SonifyError>;
}

/// Settings for the FluidSynth renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FluidSynthConfig {
    /// Synthesizer executable
    pub program: String,
    /// SoundFont used as the instrument
    pub soundfont: PathBuf,
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Master gain (`-g`)
    pub gain: Option<f32>,
    /// Enable or disable the reverb unit (`-R`)
    pub reverb: Option<bool>,
    /// Enable or disable the chorus unit (`-C`)
    pub chorus: Option<bool>,
}

impl Default for FluidSynthConfig {
    fn default() -> Self {
        Self {
            program: "fluidsynth".to_string(),
            soundfont: PathBuf::from("Grand_Piano.sf2"),
            sample_rate: 44_100,
            gain: None,
            reverb: None,
            chorus: None,
        }
    }
}

/// Renderer backed by the `fluidsynth` command line tool
#[derive(Debug, Clone, Default)]
pub struct FluidSynthRenderer {
    config: FluidSynthConfig,
}

impl FluidSynthRenderer {
    pub fn new(config: FluidSynthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FluidSynthConfig {
        &self.config
    }

    /// Arguments passed to the synthesizer, in order
    pub fn arguments(&self, midi_path: &Path, output_path: &Path) -> Vec<String> {
        let mut args = vec!["-ni".to_string()];
        if let Some(gain) = self.config.gain {
            args.push("-g".to_string());
            args.push(gain.to_string());
        }
        if let Some(reverb) = self.config.reverb {
            args.push("-R".to_string());
            args.push(on_off(reverb).to_string());
        }
        if let Some(chorus) = self.config.chorus {
            args.push("-C".to_string());
            args.push(on_off(chorus).to_string());
        }
        args.push(self.config.soundfont.display().to_string());
        args.push(midi_path.display().to_string());
        args.push("-F".to_string());
        args.push(output_path.display().to_string());
        args.push("-r".to_string());
        args.push(self.config.sample_rate.to_string());
        args
    }
}

impl WaveformRenderer for FluidSynthRenderer {
    fn render(&self, midi_path: &Path, output_path: &Path) -> Result<(), SonifyError> {
        let args = self.arguments(midi_path, output_path);
        debug!(program = %self.config.program, ?args, "invoking renderer");

        let output = Command::new(&self.config.program).args(&args).output()?;

        if !output.status.success() {
            return Err(SonifyError::RenderFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(
            midi = %midi_path.display(),
            output = %output_path.display(),
            "rendered waveform"
        );
        Ok(())
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "1"
    } else {
        "0"
    }
}
