use serde::{Deserialize, Serialize};

use crate::notes::{MAX_FREQUENCY, MIN_FREQUENCY};
use crate::{Result, ThereminError};

/// Linearly re-maps `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// No clamping is applied; values outside the input range extrapolate. The
/// caller guarantees `in_min != in_max`.
pub fn map_range(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    ((value - in_min) * (out_max - out_min)) / (in_max - in_min) + out_min
}

pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// `ln(x·k + 1) / ln(k + 1)`: fixes 0 and 1, steep near 0, flat near 1.
pub fn log_warp(x: f64, k: f64) -> f64 {
    (x * k + 1.0).ln() / (k + 1.0).ln()
}

pub const DEFAULT_WARP: f64 = 100.0;

/// Shape applied between the input and output ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Curve {
    Linear,
    Logarithmic {
        #[serde(default = "default_warp")]
        k: f64,
    },
}

fn default_warp() -> f64 {
    DEFAULT_WARP
}

impl Default for Curve {
    fn default() -> Self {
        Self::Linear
    }
}

/// Relative face area to frequency transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub input_min: f64,
    pub input_max: f64,
    pub output_min: f64,
    pub output_max: f64,
    pub curve: Curve,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            input_min: 0.04,
            input_max: 0.38,
            output_min: MIN_FREQUENCY,
            output_max: MAX_FREQUENCY,
            curve: Curve::Linear,
        }
    }
}

impl MappingConfig {
    pub fn with_curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }

    /// Rejects ranges that would turn every sample into NaN or infinity.
    pub fn validate(&self) -> Result<()> {
        let bounds = [self.input_min, self.input_max, self.output_min, self.output_max];
        if bounds.iter().any(|bound| !bound.is_finite()) {
            return Err(ThereminError::InvalidMapping("range bounds must be finite"));
        }
        if self.input_min == self.input_max {
            return Err(ThereminError::InvalidMapping(
                "input_min and input_max must differ",
            ));
        }
        if self.output_min > self.output_max {
            return Err(ThereminError::InvalidMapping(
                "output_min must not exceed output_max",
            ));
        }
        if let Curve::Logarithmic { k } = self.curve {
            if !(k.is_finite() && k > 0.0) {
                return Err(ThereminError::InvalidMapping(
                    "logarithmic warp constant must be positive",
                ));
            }
        }
        Ok(())
    }

    /// Maps a relative face area to a frequency inside `[output_min, output_max]`.
    pub fn frequency_for(&self, relative_area: f64) -> f64 {
        let mapped = match self.curve {
            Curve::Linear => map_range(
                relative_area,
                self.input_min,
                self.input_max,
                self.output_min,
                self.output_max,
            ),
            Curve::Logarithmic { k } => {
                let normalised = clamp(
                    map_range(relative_area, self.input_min, self.input_max, 0.0, 1.0),
                    0.0,
                    1.0,
                );
                map_range(log_warp(normalised, k), 0.0, 1.0, self.output_min, self.output_max)
            }
        };

        clamp(mapped, self.output_min, self.output_max)
    }
}
