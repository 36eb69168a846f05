//! Rate-gated detection sampling on top of the display refresh loop.

use serde::Serialize;

use crate::camera::CameraFrame;
use crate::detector::BoundingBox;
use crate::timeline::{FrameHandle, FrameScheduler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    Idle,
    Running,
}

/// Permission to run one detection, tied to the session that issued it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleTicket {
    generation: u64,
    pub timestamp_ms: f64,
}

/// Normalised face size extracted from one accepted tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionSample {
    pub relative_area: f64,
    pub timestamp_ms: f64,
}

/// Throttles detector invocations to a target rate independent of the
/// display refresh rate.
#[derive(Debug)]
pub struct DetectionSampler {
    interval_ms: f64,
    state: SamplerState,
    generation: u64,
    last_accepted_ms: Option<f64>,
    pending_frame: Option<FrameHandle>,
    accepted: u64,
}

impl DetectionSampler {
    pub fn new(target_rate: f64) -> Self {
        Self {
            interval_ms: 1000.0 / target_rate,
            state: SamplerState::Idle,
            generation: 0,
            last_accepted_ms: None,
            pending_frame: None,
            accepted: 0,
        }
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SamplerState::Running
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Ticks accepted since construction.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Binds the sampler to the refresh loop. Returns `false` if it was
    /// already running.
    pub fn start(&mut self, scheduler: &mut dyn FrameScheduler) -> bool {
        if self.is_running() {
            return false;
        }
        self.generation += 1;
        self.state = SamplerState::Running;
        self.last_accepted_ms = None;
        self.pending_frame = Some(scheduler.request_frame());
        tracing::debug!(generation = self.generation, "sampler started");
        true
    }

    /// Leaves the refresh loop and cancels the outstanding frame request.
    /// Tickets issued before the stop are invalidated. Idempotent.
    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) -> bool {
        if let Some(handle) = self.pending_frame.take() {
            scheduler.cancel_frame(handle);
        }
        if !self.is_running() {
            return false;
        }
        self.generation += 1;
        self.state = SamplerState::Idle;
        tracing::debug!(generation = self.generation, "sampler stopped");
        true
    }

    /// Handles one refresh callback.
    ///
    /// Always re-arms the loop while running. Returns a ticket when enough
    /// time has passed since the last accepted tick; the last-accepted time
    /// then advances by whole intervals so the remainder carries forward.
    pub fn on_frame(
        &mut self,
        handle: FrameHandle,
        timestamp_ms: f64,
        scheduler: &mut dyn FrameScheduler,
    ) -> Option<SampleTicket> {
        if !self.is_running() || self.pending_frame != Some(handle) {
            return None;
        }
        self.pending_frame = Some(scheduler.request_frame());

        match self.last_accepted_ms {
            None => self.last_accepted_ms = Some(timestamp_ms),
            Some(last) => {
                let elapsed = timestamp_ms - last;
                if elapsed < self.interval_ms {
                    return None;
                }
                let intervals = (elapsed / self.interval_ms).floor();
                self.last_accepted_ms = Some(last + intervals * self.interval_ms);
            }
        }

        self.accepted += 1;
        Some(SampleTicket {
            generation: self.generation,
            timestamp_ms,
        })
    }

    /// True while the ticket belongs to the current running session.
    pub fn is_current(&self, ticket: &SampleTicket) -> bool {
        self.is_running() && ticket.generation == self.generation
    }

    /// Turns a finished detection into a sample, discarding results whose
    /// session has since been stopped or restarted.
    pub fn complete(
        &self,
        ticket: &SampleTicket,
        frame: &CameraFrame,
        detection: Option<BoundingBox>,
    ) -> Option<DetectionSample> {
        if !self.is_current(ticket) {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale detection"
            );
            return None;
        }
        detection.map(|bbox| DetectionSample {
            relative_area: bbox.relative_area(frame),
            timestamp_ms: ticket.timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::RefreshClock;

    fn frame() -> CameraFrame {
        CameraFrame {
            width: 100,
            height: 100,
            timestamp_ms: 0.0,
        }
    }

    fn face() -> Option<BoundingBox> {
        Some(BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 50.0,
        })
    }

    fn run_for(sampler: &mut DetectionSampler, clock: &mut RefreshClock, ms: f64) -> usize {
        let mut accepted = 0;
        while clock.now_ms() < ms - 1e-6 {
            if let Some((handle, timestamp)) = clock.advance() {
                if sampler.on_frame(handle, timestamp, clock).is_some() {
                    accepted += 1;
                }
            }
        }
        accepted
    }

    #[test]
    fn throttles_sixty_hertz_refresh_to_target_rate() {
        let mut clock = RefreshClock::new(60.0);
        let mut sampler = DetectionSampler::new(24.0);
        sampler.start(&mut clock);

        let accepted = run_for(&mut sampler, &mut clock, 1000.0);
        assert!((23..=25).contains(&accepted), "accepted {accepted}");
    }

    #[test]
    fn long_runs_do_not_drift() {
        let mut clock = RefreshClock::new(60.0);
        let mut sampler = DetectionSampler::new(24.0);
        sampler.start(&mut clock);

        let accepted = run_for(&mut sampler, &mut clock, 60_000.0);
        assert!((1439..=1441).contains(&accepted), "accepted {accepted}");
    }

    #[test]
    fn stop_cancels_pending_frame_and_is_idempotent() {
        let mut clock = RefreshClock::new(60.0);
        let mut sampler = DetectionSampler::new(24.0);
        sampler.start(&mut clock);
        assert!(clock.has_pending());

        assert!(sampler.stop(&mut clock));
        assert!(!clock.has_pending());
        assert!(!sampler.stop(&mut clock));
        assert_eq!(sampler.state(), SamplerState::Idle);
        assert!(clock.advance().is_none());
    }

    #[test]
    fn start_twice_keeps_a_single_loop() {
        let mut clock = RefreshClock::new(60.0);
        let mut sampler = DetectionSampler::new(24.0);
        assert!(sampler.start(&mut clock));
        assert!(!sampler.start(&mut clock));
        assert_eq!(run_for(&mut sampler, &mut clock, 80.0), 2);
    }

    #[test]
    fn stale_handles_are_ignored() {
        let mut clock = RefreshClock::new(60.0);
        let mut sampler = DetectionSampler::new(24.0);
        sampler.start(&mut clock);
        let (handle, timestamp) = clock.advance().unwrap();
        assert!(sampler.on_frame(handle, timestamp, &mut clock).is_some());

        // The same callback firing twice must not re-arm or sample again.
        assert!(sampler.on_frame(handle, timestamp + 100.0, &mut clock).is_none());
    }

    #[test]
    fn results_from_a_stopped_session_are_discarded() {
        let mut clock = RefreshClock::new(60.0);
        let mut sampler = DetectionSampler::new(24.0);
        sampler.start(&mut clock);
        let (handle, timestamp) = clock.advance().unwrap();
        let ticket = sampler.on_frame(handle, timestamp, &mut clock).unwrap();

        sampler.stop(&mut clock);
        assert!(sampler.complete(&ticket, &frame(), face()).is_none());

        sampler.start(&mut clock);
        assert!(sampler.complete(&ticket, &frame(), face()).is_none());
    }

    #[test]
    fn current_results_become_samples() {
        let mut clock = RefreshClock::new(60.0);
        let mut sampler = DetectionSampler::new(24.0);
        sampler.start(&mut clock);
        let (handle, timestamp) = clock.advance().unwrap();
        let ticket = sampler.on_frame(handle, timestamp, &mut clock).unwrap();

        let sample = sampler.complete(&ticket, &frame(), face()).unwrap();
        assert!((sample.relative_area - 0.25).abs() < 1e-12);
        assert_eq!(sample.timestamp_ms, timestamp);
        assert!(sampler.complete(&ticket, &frame(), None).is_none());
    }
}
