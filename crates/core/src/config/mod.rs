use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::mapping::MappingConfig;
use crate::{Result, ThereminError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub mapping: MappingConfig,
    pub sampler: SamplerConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.mapping.validate()?;
        self.audio.validate()?;
        self.sampler.validate()
    }
}

/// Configuration specific to the synthesis graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Gain reached at the end of the start ramp.
    pub level: f32,
    pub ramp_up_seconds: f32,
    pub ramp_down_seconds: f32,
    /// Low-pass cutoff as a multiple of the played frequency.
    pub cutoff_ratio: f32,
    /// One generator per entry, detuned by the given cents.
    pub detune_cents: Vec<f32>,
    pub reverb_seconds: f32,
    pub reverb_decay: f32,
    /// Wet share of the output, `0.0` disables the reverb.
    pub reverb_mix: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            level: 0.3,
            ramp_up_seconds: 0.05,
            ramp_down_seconds: 0.1,
            cutoff_ratio: 4.0,
            detune_cents: vec![0.0, -7.0, 7.0],
            reverb_seconds: 1.5,
            reverb_decay: 2.0,
            reverb_mix: 0.25,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ThereminError::msg("audio.sample_rate must be positive"));
        }
        if self.detune_cents.is_empty() {
            return Err(ThereminError::msg("audio.detune_cents needs at least one generator"));
        }
        if !(0.0..=1.0).contains(&self.reverb_mix) {
            return Err(ThereminError::msg("audio.reverb_mix must lie in [0, 1]"));
        }
        if self.ramp_up_seconds <= 0.0 || self.ramp_down_seconds <= 0.0 {
            return Err(ThereminError::msg("audio ramps must be longer than zero"));
        }
        Ok(())
    }
}

/// Timing of the detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Detector invocations per second.
    pub target_rate: f64,
    /// Display refreshes per second.
    pub refresh_rate: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            target_rate: 24.0,
            refresh_rate: 60.0,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.target_rate > 0.0 && self.refresh_rate > 0.0) {
            return Err(ThereminError::msg("sampler rates must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Curve;

    #[test]
    fn defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{ "mapping": { "curve": { "kind": "logarithmic", "k": 50.0 } } }"#,
        )
        .unwrap();
        assert_eq!(config.mapping.curve, Curve::Logarithmic { k: 50.0 });
        assert_eq!(config.mapping.input_min, 0.04);
        assert_eq!(config.audio, AudioConfig::default());
        assert_eq!(config.sampler.target_rate, 24.0);
    }

    #[test]
    fn rejects_degenerate_mapping() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "mapping": { "input_min": 0.1, "input_max": 0.1 } }"#)
                .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ThereminError::InvalidMapping(_))
        ));
    }

    #[test]
    fn rejects_silent_graphs() {
        let config = AppConfig {
            audio: AudioConfig {
                detune_cents: Vec::new(),
                ..AudioConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
