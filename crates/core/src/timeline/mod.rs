//! Display-refresh scheduling.
//!
//! Frame callbacks are modelled as one-shot requests identified by a
//! [`FrameHandle`]; a requester must ask again from inside each callback to
//! keep a loop alive, and may cancel the outstanding request at any time.

/// Identifies one requested frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

/// Host facility that fires a callback on the next display refresh.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;

    /// Cancels a pending request. Unknown or already fired handles are ignored.
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Virtual display clock that refreshes at a fixed rate.
///
/// Timestamps are derived from the refresh count rather than accumulated, so
/// long replays do not drift.
#[derive(Debug, Clone)]
pub struct RefreshClock {
    interval_ms: f64,
    refreshes: u64,
    next_handle: u64,
    pending: Option<FrameHandle>,
}

impl RefreshClock {
    pub fn new(refresh_rate: f64) -> Self {
        Self {
            interval_ms: 1000.0 / refresh_rate,
            refreshes: 0,
            next_handle: 0,
            pending: None,
        }
    }

    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    pub fn now_ms(&self) -> f64 {
        self.refreshes as f64 * self.interval_ms
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Moves to the next refresh and hands back the callback due on it.
    pub fn advance(&mut self) -> Option<(FrameHandle, f64)> {
        self.refreshes += 1;
        let now = self.now_ms();
        self.pending.take().map(|handle| (handle, now))
    }
}

impl FrameScheduler for RefreshClock {
    fn request_frame(&mut self) -> FrameHandle {
        self.next_handle += 1;
        let handle = FrameHandle(self.next_handle);
        self.pending = Some(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if self.pending == Some(handle) {
            self.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_requested_frames() {
        let mut clock = RefreshClock::new(60.0);
        assert!(clock.advance().is_none());

        let handle = clock.request_frame();
        let (fired, timestamp) = clock.advance().expect("frame was requested");
        assert_eq!(fired, handle);
        assert!((timestamp - 2.0 * 1000.0 / 60.0).abs() < 1e-9);
        assert!(clock.advance().is_none());
    }

    #[test]
    fn cancelled_frames_never_fire() {
        let mut clock = RefreshClock::new(60.0);
        let handle = clock.request_frame();
        clock.cancel_frame(handle);
        assert!(!clock.has_pending());
        assert!(clock.advance().is_none());
    }

    #[test]
    fn timestamps_do_not_accumulate_error() {
        let mut clock = RefreshClock::new(60.0);
        for _ in 0..60_000 {
            clock.advance();
        }
        assert!((clock.now_ms() - 1_000_000.0).abs() < 1e-6);
    }
}
