//! Exclusive owner of the camera, detector and tone engine for one run.

use std::fmt;

use serde::Serialize;

use crate::audio::ToneEngine;
use crate::camera::{CameraFrame, CameraSource, PermissionMonitor, PermissionState};
use crate::config::SamplerConfig;
use crate::detector::{BoundingBox, FaceDetector};
use crate::mapping::MappingConfig;
use crate::melody::{MelodySequence, MelodySequencer, StepOutcome};
use crate::notes::{nearest_note, solfege_of};
use crate::sampler::{DetectionSample, DetectionSampler, SampleTicket};
use crate::timeline::{FrameHandle, FrameScheduler};
use crate::{Result, ThereminError};

/// Read-only display state derived from the current frequency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Readout {
    pub frequency_hz: f64,
    pub note: &'static str,
    pub solfege: String,
    /// Name tokens with no syllable, shown instead of silently dropped.
    pub unmapped: Vec<String>,
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frequency: {:.2} Hz  Note: {} ({})",
            self.frequency_hz, self.note, self.solfege
        )?;
        if !self.unmapped.is_empty() {
            write!(f, " [no syllable: {}]", self.unmapped.join(", "))?;
        }
        Ok(())
    }
}

pub struct Session<T, C, D> {
    engine: T,
    camera: C,
    detector: D,
    mapping: MappingConfig,
    sampler: DetectionSampler,
    permission: PermissionMonitor,
    melody: Option<MelodySequencer>,
    ready: bool,
    last_sample: Option<DetectionSample>,
}

impl<T, C, D> Session<T, C, D>
where
    T: ToneEngine,
    C: CameraSource,
    D: FaceDetector,
{
    /// Rejects a malformed mapping, or one whose output range differs from
    /// the engine's clamp range, before anything is acquired.
    pub fn new(
        engine: T,
        camera: C,
        detector: D,
        mapping: MappingConfig,
        sampler: &SamplerConfig,
    ) -> Result<Self> {
        mapping.validate()?;
        sampler.validate()?;
        if engine.frequency_range() != (mapping.output_min, mapping.output_max) {
            return Err(ThereminError::InvalidMapping(
                "mapping output range must match the tone engine range",
            ));
        }
        Ok(Self {
            engine,
            camera,
            detector,
            mapping,
            sampler: DetectionSampler::new(sampler.target_rate),
            permission: PermissionMonitor::new(),
            melody: None,
            ready: false,
            last_sample: None,
        })
    }

    pub fn with_melody(mut self, melody: MelodySequence) -> Self {
        self.melody = Some(MelodySequencer::new(melody));
        self
    }

    /// Acquires the camera, starts audio and loads the detector, in that
    /// order. The first failure aborts the chain and leaves the session
    /// inert.
    pub fn setup(&mut self) -> Result<()> {
        self.ready = false;

        let query = self.camera.query_permission();
        self.permission.observe_query(query);

        if let Err(err) = self.camera.request_access() {
            if matches!(err, ThereminError::PermissionDenied) {
                self.permission.update(PermissionState::Denied);
            }
            tracing::warn!(error = %err, "camera access failed");
            return Err(err);
        }
        self.permission.update(PermissionState::Granted);
        tracing::info!("camera stream acquired");

        self.engine.start()?;
        tracing::info!("audio started");

        if let Err(err) = self.detector.load() {
            tracing::warn!(error = %err, "detector load failed, aborting setup");
            self.engine.stop();
            return Err(err);
        }
        tracing::info!("face detector loaded");

        self.ready = true;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn permission(&self) -> PermissionState {
        self.permission.state()
    }

    /// Notice to show for the current permission state.
    pub fn permission_notice(&self) -> Option<&'static str> {
        self.permission.notice()
    }

    /// Applies a permission change reported by the host after setup.
    pub fn on_permission_change(&mut self, state: PermissionState) -> Option<&'static str> {
        self.permission.update(state);
        self.permission.notice()
    }

    pub fn is_detecting(&self) -> bool {
        self.sampler.is_running()
    }

    pub fn start_detection(&mut self, scheduler: &mut dyn FrameScheduler) -> Result<bool> {
        if !self.ready {
            return Err(ThereminError::msg("session is not set up"));
        }
        if self.melody_in_progress() {
            return Err(ThereminError::SourceBusy("melody"));
        }
        Ok(self.sampler.start(scheduler))
    }

    pub fn stop_detection(&mut self, scheduler: &mut dyn FrameScheduler) -> bool {
        self.sampler.stop(scheduler)
    }

    pub fn play(&mut self) -> Result<()> {
        self.engine.play()
    }

    pub fn stop_audio(&mut self) {
        self.engine.stop();
    }

    /// Renders audio up to the host clock.
    pub fn advance_audio(&mut self, seconds: f64) -> Result<()> {
        self.engine.advance(seconds)
    }

    /// Plays the next melody step. Rejected while detection drives the
    /// tone engine.
    pub fn next_step(&mut self) -> Result<StepOutcome> {
        if self.sampler.is_running() {
            return Err(ThereminError::SourceBusy("detection"));
        }
        let sequencer = self
            .melody
            .as_mut()
            .ok_or_else(|| ThereminError::msg("no melody loaded"))?;
        Ok(sequencer.next(&mut self.engine))
    }

    pub fn reset_melody(&mut self) {
        if let Some(sequencer) = self.melody.as_mut() {
            sequencer.reset();
        }
    }

    pub fn melody(&self) -> Option<&MelodySequencer> {
        self.melody.as_ref()
    }

    fn melody_in_progress(&self) -> bool {
        self.melody
            .as_ref()
            .is_some_and(|sequencer| sequencer.cursor() > 0 && sequencer.has_next())
    }

    /// Runs one refresh tick. Returns the frequency applied to the tone
    /// engine when the tick produced a detection.
    pub fn on_frame(
        &mut self,
        handle: FrameHandle,
        timestamp_ms: f64,
        scheduler: &mut dyn FrameScheduler,
    ) -> Option<f64> {
        let ticket = self.sampler.on_frame(handle, timestamp_ms, scheduler)?;
        let frame = self.camera.frame_at(timestamp_ms)?;
        match self.detector.detect(&frame) {
            Ok(detection) => self.complete_detection(&ticket, &frame, detection),
            Err(err) => {
                tracing::warn!(error = %err, timestamp_ms, "detection failed, skipping frame");
                None
            }
        }
    }

    /// Applies a finished detection, unless detection was stopped or
    /// restarted since the ticket was issued.
    pub fn complete_detection(
        &mut self,
        ticket: &SampleTicket,
        frame: &CameraFrame,
        detection: Option<BoundingBox>,
    ) -> Option<f64> {
        let sample = self.sampler.complete(ticket, frame, detection)?;
        let frequency = self.mapping.frequency_for(sample.relative_area);
        self.last_sample = Some(sample);
        Some(self.engine.retune(frequency))
    }

    pub fn last_sample(&self) -> Option<DetectionSample> {
        self.last_sample
    }

    pub fn readout(&self) -> Readout {
        let frequency_hz = self.engine.frequency();
        let note = nearest_note(frequency_hz).name;
        let solfege = solfege_of(note);
        Readout {
            frequency_hz,
            note,
            solfege: solfege.to_string(),
            unmapped: solfege.unmapped().map(str::to_string).collect(),
        }
    }

    pub fn mapping(&self) -> &MappingConfig {
        &self.mapping
    }

    pub fn sampler(&self) -> &DetectionSampler {
        &self.sampler
    }

    pub fn engine(&self) -> &T {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut T {
        &mut self.engine
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Stops detection and fades the audio out, handing the engine back so
    /// the caller can render the remaining tail.
    pub fn teardown(mut self, scheduler: &mut dyn FrameScheduler) -> T {
        self.sampler.stop(scheduler);
        self.engine.stop();
        tracing::info!("session torn down");
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BufferOutput, SynthGraph};
    use crate::camera::ScriptedCamera;
    use crate::config::AudioConfig;
    use crate::detector::{DetectionTrace, ScriptedDetector};
    use crate::notes::{MAX_FREQUENCY, MIN_FREQUENCY};
    use crate::timeline::RefreshClock;

    type TestSession<D = ScriptedDetector> = Session<SynthGraph<BufferOutput>, ScriptedCamera, D>;

    fn engine() -> SynthGraph<BufferOutput> {
        let config = AudioConfig {
            sample_rate: 8_000,
            reverb_mix: 0.0,
            ..AudioConfig::default()
        };
        SynthGraph::new(config, (MIN_FREQUENCY, MAX_FREQUENCY), BufferOutput::new())
    }

    fn face_trace() -> DetectionTrace {
        DetectionTrace::from_json(
            r#"{ "frame_width": 100, "frame_height": 100,
                 "entries": [ { "timestamp_ms": 0.0,
                                "box": { "x": 0.0, "y": 0.0, "width": 30.0, "height": 70.0 } } ] }"#,
        )
        .unwrap()
    }

    fn session_with<D: FaceDetector>(camera: ScriptedCamera, detector: D) -> TestSession<D> {
        Session::new(
            engine(),
            camera,
            detector,
            MappingConfig::default(),
            &SamplerConfig::default(),
        )
        .unwrap()
    }

    fn session() -> TestSession {
        session_with(ScriptedCamera::new(100, 100), ScriptedDetector::new(face_trace()))
    }

    /// Fails every other call.
    struct FlakyDetector {
        calls: usize,
    }

    impl FaceDetector for FlakyDetector {
        fn load(&mut self) -> Result<()> {
            Ok(())
        }

        fn is_loaded(&self) -> bool {
            true
        }

        fn detect(&mut self, _frame: &CameraFrame) -> Result<Option<BoundingBox>> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Err(ThereminError::Detection("inference timed out".to_string()));
            }
            Ok(Some(BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 20.0,
                height: 20.0,
            }))
        }
    }

    #[test]
    fn malformed_mapping_is_rejected_at_construction() {
        let mapping = MappingConfig {
            input_min: 0.3,
            input_max: 0.3,
            ..MappingConfig::default()
        };
        let result = Session::new(
            engine(),
            ScriptedCamera::new(100, 100),
            ScriptedDetector::new(face_trace()),
            mapping,
            &SamplerConfig::default(),
        );
        assert!(matches!(result, Err(ThereminError::InvalidMapping(_))));
    }

    #[test]
    fn mapping_must_share_the_engine_range() {
        let mapping = MappingConfig {
            output_max: 1_000.0,
            ..MappingConfig::default()
        };
        let result = Session::new(
            engine(),
            ScriptedCamera::new(100, 100),
            ScriptedDetector::new(face_trace()),
            mapping,
            &SamplerConfig::default(),
        );
        assert!(matches!(result, Err(ThereminError::InvalidMapping(_))));
    }

    #[test]
    fn readout_shows_solfege_gaps() {
        let mut session = session();
        session.setup().unwrap();
        session.engine_mut().retune(277.18);

        let readout = session.readout();
        assert_eq!(readout.note, "C#4/Db4");
        assert_eq!(readout.solfege, "レ♭");
        assert_eq!(readout.unmapped, vec!["C#4".to_string()]);
        assert_eq!(
            readout.to_string(),
            "Frequency: 277.18 Hz  Note: C#4/Db4 (レ♭) [no syllable: C#4]"
        );
    }

    #[test]
    fn denied_camera_aborts_before_audio() {
        let camera = ScriptedCamera::new(100, 100).with_permission(Some(PermissionState::Denied));
        let mut session = session_with(camera, ScriptedDetector::new(face_trace()));

        assert!(matches!(
            session.setup(),
            Err(ThereminError::PermissionDenied)
        ));
        assert!(!session.is_ready());
        assert_eq!(session.permission(), PermissionState::Denied);
        assert!(session.permission_notice().is_some());
        assert!(!session.engine().is_playing());
        assert!(!session.detector().is_loaded());
    }

    #[test]
    fn unsupported_permission_query_does_not_block_setup() {
        let camera = ScriptedCamera::new(100, 100).with_permission(None);
        let mut session = session_with(camera, ScriptedDetector::new(face_trace()));
        session.setup().unwrap();
        assert!(session.is_ready());
        assert_eq!(session.permission(), PermissionState::Granted);
        assert!(session.permission_notice().is_none());
    }

    #[test]
    fn detection_requires_setup() {
        let mut clock = RefreshClock::new(60.0);
        let mut session = session();
        assert!(session.start_detection(&mut clock).is_err());
        assert!(!clock.has_pending());
    }

    #[test]
    fn accepted_ticks_retune_the_engine() {
        let mut clock = RefreshClock::new(60.0);
        let mut session = session();
        session.setup().unwrap();
        assert!(session.start_detection(&mut clock).unwrap());

        let (handle, timestamp) = clock.advance().unwrap();
        let applied = session.on_frame(handle, timestamp, &mut clock).unwrap();

        let expected = MappingConfig::default().frequency_for(0.21);
        assert!((applied - expected).abs() < 1e-9);
        assert_eq!(session.engine().frequency(), applied);
        assert_eq!(session.detector().calls(), 1);

        let readout = session.readout();
        assert_eq!(readout.note, nearest_note(applied).name);
        assert!(readout.to_string().starts_with("Frequency: "));
    }

    #[test]
    fn failed_detections_keep_the_loop_alive() {
        let mut clock = RefreshClock::new(60.0);
        let mut session = session_with(ScriptedCamera::new(100, 100), FlakyDetector { calls: 0 });
        session.setup().unwrap();
        session.start_detection(&mut clock).unwrap();

        let mut applied = 0;
        while clock.now_ms() < 1000.0 - 1e-6 {
            if let Some((handle, timestamp)) = clock.advance() {
                if session.on_frame(handle, timestamp, &mut clock).is_some() {
                    applied += 1;
                }
            }
        }
        assert!(session.is_detecting());
        assert!((11..=13).contains(&applied), "applied {applied}");
    }

    #[test]
    fn stop_beats_a_pending_detection() {
        let mut clock = RefreshClock::new(60.0);
        let mut session = session();
        session.setup().unwrap();
        session.start_detection(&mut clock).unwrap();
        let before = session.engine().frequency();

        let (handle, timestamp) = clock.advance().unwrap();
        let ticket = session
            .sampler
            .on_frame(handle, timestamp, &mut clock)
            .unwrap();
        let frame = CameraFrame {
            width: 100,
            height: 100,
            timestamp_ms: timestamp,
        };

        session.stop_detection(&mut clock);
        let face = Some(BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 60.0,
            height: 60.0,
        });
        assert_eq!(session.complete_detection(&ticket, &frame, face), None);
        assert_eq!(session.engine().frequency(), before);
        assert!(!clock.has_pending());
    }

    #[test]
    fn melody_and_detection_exclude_each_other() {
        let mut clock = RefreshClock::new(60.0);
        let mut session = session().with_melody(MelodySequence::twinkle().unwrap());
        session.setup().unwrap();

        session.start_detection(&mut clock).unwrap();
        assert!(matches!(
            session.next_step(),
            Err(ThereminError::SourceBusy("detection"))
        ));
        session.stop_detection(&mut clock);

        assert!(matches!(
            session.next_step().unwrap(),
            StepOutcome::Played { .. }
        ));
        assert!(matches!(
            session.start_detection(&mut clock),
            Err(ThereminError::SourceBusy("melody"))
        ));

        session.reset_melody();
        assert!(session.start_detection(&mut clock).unwrap());
    }

    #[test]
    fn next_step_without_melody_is_an_error() {
        let mut session = session();
        session.setup().unwrap();
        assert!(session.next_step().is_err());
    }

    #[test]
    fn permission_changes_refresh_the_notice() {
        let mut session = session();
        session.setup().unwrap();
        assert!(session.on_permission_change(PermissionState::Denied).is_some());
        assert!(session.on_permission_change(PermissionState::Granted).is_none());
    }
}
