//! Core library for the face theremin.
//!
//! A detected face's share of the camera frame is sampled at a fixed rate,
//! mapped onto a frequency range and fed into a small synthesis graph. The
//! camera, the detector, the display clock and the audio device sit behind
//! traits so a [`Session`] can run against real hardware or recorded
//! traces alike.

pub mod audio;
pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod mapping;
pub mod melody;
pub mod notes;
pub mod sampler;
pub mod session;
pub mod timeline;

pub use audio::{AudioOutput, BufferOutput, SynthGraph, ToneEngine};
pub use camera::{CameraFrame, CameraSource, PermissionMonitor, PermissionState, ScriptedCamera};
pub use config::{AppConfig, AudioConfig, SamplerConfig};
pub use detector::{BoundingBox, DetectionTrace, FaceDetector, ScriptedDetector};
pub use error::{Result, ThereminError};
pub use mapping::{Curve, MappingConfig};
pub use melody::{MelodySequence, MelodySequencer, MelodyStep, StepOutcome};
pub use notes::{nearest_note, solfege_of, NoteEntry, Solfege, MAX_FREQUENCY, MIN_FREQUENCY};
pub use sampler::{DetectionSample, DetectionSampler, SampleTicket};
pub use session::{Readout, Session};
pub use timeline::{FrameHandle, FrameScheduler, RefreshClock};
