//! Run configuration
//!
//! Everything that shapes a sonification apart from the input and output
//! paths. Configs can be stored as JSON; omitted fields take their defaults.

use crate::encoder::EncoderConfig;
use crate::error::SonifyError;
use crate::render::FluidSynthConfig;
use crate::scheduler::ScheduleConfig;
use crate::types::Interval;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default major/minor threshold in minutes
pub const DEFAULT_THRESHOLD_MINUTES: f64 = 180.0;

/// Full configuration for one sonification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonifyConfig {
    /// Bucket granularity
    pub interval: Interval,
    /// Buckets at or above this many minutes become minor chords
    pub threshold_minutes: f64,
    pub schedule: ScheduleConfig,
    pub encoder: EncoderConfig,
    pub renderer: FluidSynthConfig,
}

impl Default for SonifyConfig {
    fn default() -> Self {
        Self {
            interval: Interval::Day,
            threshold_minutes: DEFAULT_THRESHOLD_MINUTES,
            schedule: ScheduleConfig::default(),
            encoder: EncoderConfig::default(),
            renderer: FluidSynthConfig::default(),
        }
    }
}

impl SonifyConfig {
    /// Load a config from JSON
    pub fn from_json(json: &str) -> Result<Self, SonifyError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        // Surface a bad granularity as such rather than as a JSON shape error
        if let Some(interval) = value.get("interval").and_then(|v| v.as_str()) {
            interval.parse::<Interval>()?;
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the config to pretty JSON
    pub fn to_json(&self) -> Result<String, SonifyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a config from a JSON file
    pub fn load(path: &Path) -> Result<Self, SonifyError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), SonifyError> {
        if !self.threshold_minutes.is_finite() {
            return Err(SonifyError::InvalidConfig(format!(
                "threshold_minutes must be finite, got {}",
                self.threshold_minutes
            )));
        }
        if self.renderer.sample_rate == 0 {
            return Err(SonifyError::InvalidConfig(
                "sample_rate must be positive".to_string(),
            ));
        }
        self.schedule.validate()
    }
}
