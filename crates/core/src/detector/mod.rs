//! Face detector capability and a trace-replaying implementation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::CameraFrame;
use crate::{Result, ThereminError};

/// Axis-aligned face rectangle in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Box area as a fraction of the frame area, clamped into `[0, 1]`.
    pub fn relative_area(&self, frame: &CameraFrame) -> f64 {
        let total = frame.area();
        if total <= 0.0 {
            return 0.0;
        }
        (self.area() / total).clamp(0.0, 1.0)
    }
}

/// Pre-trained single-face detector treated as a black box.
pub trait FaceDetector {
    /// Loads model assets. Must succeed before the first `detect`.
    fn load(&mut self) -> Result<()>;

    fn is_loaded(&self) -> bool;

    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<BoundingBox>>;
}

/// One recorded detector answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp_ms: f64,
    #[serde(rename = "box")]
    pub bounding_box: Option<BoundingBox>,
}

/// A recorded session: frame size plus detector answers over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionTrace {
    pub frame_width: u32,
    pub frame_height: u32,
    pub entries: Vec<TraceEntry>,
}

impl DetectionTrace {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let mut trace: Self = serde_json::from_str(content)?;
        trace
            .entries
            .sort_by(|a, b| a.timestamp_ms.total_cmp(&b.timestamp_ms));
        Ok(trace)
    }

    /// Timestamp of the last recorded answer.
    pub fn duration_ms(&self) -> f64 {
        self.entries
            .last()
            .map(|entry| entry.timestamp_ms)
            .unwrap_or(0.0)
    }

    /// Latest entry at or before `timestamp_ms`.
    pub fn entry_at(&self, timestamp_ms: f64) -> Option<&TraceEntry> {
        let index = self
            .entries
            .partition_point(|entry| entry.timestamp_ms <= timestamp_ms);
        index.checked_sub(1).map(|index| &self.entries[index])
    }
}

/// Detector that answers from a [`DetectionTrace`].
#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    trace: DetectionTrace,
    loaded: bool,
    fail_load: bool,
    calls: usize,
}

impl ScriptedDetector {
    pub fn new(trace: DetectionTrace) -> Self {
        Self {
            trace,
            loaded: false,
            fail_load: false,
            calls: 0,
        }
    }

    /// Makes `load` fail, as if the model assets were missing.
    pub fn with_missing_assets(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Number of `detect` invocations so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl FaceDetector for ScriptedDetector {
    fn load(&mut self) -> Result<()> {
        if self.fail_load {
            return Err(ThereminError::DetectorLoad(
                "model assets not found".to_string(),
            ));
        }
        self.loaded = true;
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn detect(&mut self, frame: &CameraFrame) -> Result<Option<BoundingBox>> {
        if !self.loaded {
            return Err(ThereminError::Detection("detector not loaded".to_string()));
        }
        self.calls += 1;
        Ok(self
            .trace
            .entry_at(frame.timestamp_ms)
            .and_then(|entry| entry.bounding_box))
    }
}
