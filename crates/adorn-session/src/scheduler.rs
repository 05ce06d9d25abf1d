//! Render-tick scheduling, modelled on a display's animation-frame callback:
//! each tick is requested individually and a pending request can be
//! cancelled. A render loop that stops requesting ticks terminates on its own.

use std::time::{Duration, Instant};

/// Identifies one pending tick request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u64);

pub trait FrameScheduler: Send {
    /// Request a single render tick.
    fn request_frame(&mut self, now: Instant) -> FrameHandle;

    /// Cancel a pending tick. Unknown or already-fired handles are ignored.
    fn cancel_frame(&mut self, handle: FrameHandle);

    /// Take the pending tick if it is due at `now`.
    fn take_due(&mut self, now: Instant) -> Option<FrameHandle>;

    /// When the pending tick fires, if any.
    fn next_deadline(&self) -> Option<Instant>;
}

/// Fixed-interval scheduler holding at most one pending tick.
#[derive(Debug)]
pub struct IntervalScheduler {
    interval: Duration,
    next_id: u64,
    pending: Option<(FrameHandle, Instant)>,
}

impl IntervalScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_id: 0,
            pending: None,
        }
    }

    /// Scheduler ticking at `fps` frames per second (at least 1).
    pub fn with_fps(fps: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / fps.max(1) as f64))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl FrameScheduler for IntervalScheduler {
    fn request_frame(&mut self, now: Instant) -> FrameHandle {
        self.next_id += 1;
        let handle = FrameHandle(self.next_id);
        if let Some((old, _)) = self.pending.replace((handle, now + self.interval)) {
            tracing::trace!(handle = old.0, "pending frame superseded");
        }
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if matches!(self.pending, Some((h, _)) if h == handle) {
            self.pending = None;
        }
    }

    fn take_due(&mut self, now: Instant) -> Option<FrameHandle> {
        match self.pending {
            Some((handle, due)) if due <= now => {
                self.pending = None;
                Some(handle)
            }
            _ => None,
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, due)| due)
    }
}
