//! One try-on session: every resource `start` acquires, the per-frame
//! tracking state those resources feed, and the single teardown that
//! releases them.

use crate::render::{OverlayRenderer, RenderError};
use crate::scene::{ModelInstance, Transform};
use crate::scheduler::{FrameHandle, FrameScheduler};
use crate::status::{ErrorReason, SessionStatus};
use adorn_core::anchor::{resolve_anchor, AnchorTuning};
use adorn_core::pose::{apply_rotation_offset, estimate_pose};
use adorn_core::{
    AttachPreset, CoordinateMapper, Detection, DetectorError, LandmarkDetector, LandmarkFrame,
    PoseTarget, SmoothedTransform, SmoothingConfig, TemporalSmoother, TrackingMode,
};
use adorn_hw::{CameraError, Frame, VideoStream};
use chrono::{DateTime, Utc};
use glam::Quat;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Failure of one acquisition step during `starting`.
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("loading detector runtime: {0}")]
    Runtime(#[source] DetectorError),
    #[error("opening camera: {0}")]
    Camera(#[from] CameraError),
    #[error("creating renderer: {0}")]
    Renderer(#[from] RenderError),
    #[error("creating detector: {0}")]
    Detector(#[source] DetectorError),
    #[error("start exceeded {0:?}")]
    Timeout(Duration),
}

impl AcquireError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            AcquireError::Runtime(_) | AcquireError::Detector(_) => ErrorReason::ModuleLoad,
            AcquireError::Camera(e) => camera_reason(e),
            AcquireError::Renderer(_) => ErrorReason::Renderer,
            AcquireError::Timeout(_) => ErrorReason::StartTimeout,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error("camera stream failed: {0}")]
    Stream(#[source] CameraError),
    #[error("render failed: {0}")]
    Render(#[source] RenderError),
    #[error("session start timed out after {0:?}")]
    StartTimeout(Duration),
    #[error("no active session")]
    NotRunning,
    #[error("engine thread exited")]
    ChannelClosed,
}

impl SessionError {
    /// Classified reason for the status surface; `None` for caller errors.
    pub fn reason(&self) -> Option<ErrorReason> {
        match self {
            SessionError::Acquire(e) => Some(e.reason()),
            SessionError::Stream(e) => Some(camera_reason(e)),
            SessionError::Render(_) => Some(ErrorReason::Renderer),
            SessionError::StartTimeout(_) => Some(ErrorReason::StartTimeout),
            SessionError::NotRunning | SessionError::ChannelClosed => None,
        }
    }
}

fn camera_reason(err: &CameraError) -> ErrorReason {
    match err {
        CameraError::PermissionDenied(_) => ErrorReason::PermissionDenied,
        CameraError::InsecureContext => ErrorReason::InsecureContext,
        _ => ErrorReason::CameraUnavailable,
    }
}

/// Per-frame parameters shared by every session of a controller.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrackingContext<'a> {
    pub tuning: &'a AnchorTuning,
    pub mode: TrackingMode,
    /// Consecutive empty detections before the face counts as lost.
    pub no_face_threshold: u32,
}

pub struct Session {
    id: Uuid,
    product: String,
    preset: AttachPreset,
    started_at: DateTime<Utc>,
    mirrored: bool,
    mapper: CoordinateMapper,
    size_multiplier: f32,

    pub(crate) stream: Option<Box<dyn VideoStream>>,
    pub(crate) renderer: Option<Box<dyn OverlayRenderer>>,
    pub(crate) model: Option<ModelInstance>,
    pub(crate) detector: Option<Box<dyn LandmarkDetector>>,
    frame: Option<FrameHandle>,
    animating: bool,

    smoother: TemporalSmoother,
    last_video: Option<Frame>,
    missed_frames: u32,
    tracking_status: SessionStatus,
}

impl Session {
    pub(crate) fn new(
        product: &str,
        preset: AttachPreset,
        smoothing: SmoothingConfig,
        mirrored: bool,
        size_multiplier: f32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product: product.to_string(),
            preset,
            started_at: Utc::now(),
            mirrored,
            mapper: CoordinateMapper::new(1.0, mirrored),
            size_multiplier,
            stream: None,
            renderer: None,
            model: None,
            detector: None,
            frame: None,
            animating: false,
            smoother: TemporalSmoother::new(smoothing),
            last_video: None,
            missed_frames: 0,
            tracking_status: SessionStatus::Searching,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn preset(&self) -> &AttachPreset {
        &self.preset
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn size_multiplier(&self) -> f32 {
        self.size_multiplier
    }

    pub(crate) fn set_size_multiplier(&mut self, value: f32) {
        self.size_multiplier = value;
    }

    pub fn model(&self) -> Option<&ModelInstance> {
        self.model.as_ref()
    }

    /// Smoothed transform; `None` until the first valid pose.
    pub fn smoothed(&self) -> Option<&SmoothedTransform> {
        self.smoother.current()
    }

    #[cfg(test)]
    pub(crate) fn reset_smoother_for_test(&mut self) {
        self.smoother.reset();
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    /// Take ownership of the camera stream and size the mapper to it.
    pub(crate) fn attach_stream(&mut self, stream: Box<dyn VideoStream>) {
        self.mapper = CoordinateMapper::for_frame_size(stream.width(), stream.height(), self.mirrored);
        self.stream = Some(stream);
    }

    pub(crate) fn start_render_loop(&mut self, scheduler: &mut dyn FrameScheduler, now: Instant) {
        self.animating = true;
        self.frame = Some(scheduler.request_frame(now));
    }

    /// Pull one camera frame and run the detector on it. Detector failures
    /// count as an empty frame.
    pub(crate) fn capture(&mut self) -> Result<Option<Detection>, CameraError> {
        let (Some(stream), Some(detector)) = (self.stream.as_mut(), self.detector.as_mut()) else {
            return Ok(None);
        };
        let frame = stream.next_frame()?;
        let detection = match detector.detect(&frame.data, frame.width, frame.height) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(session = %self.id, seq = frame.sequence, error = %e, "detection failed");
                Detection::NoFace
            }
        };
        self.last_video = Some(frame);
        Ok(Some(detection))
    }

    /// Feed one detector result through mapping, pose, anchoring and the
    /// smoother. Returns the new tracking status when it changed.
    ///
    /// An empty frame hides the model immediately but leaves the smoother
    /// alone; the status only moves to no-face-detected once
    /// `no_face_threshold` empty frames have arrived in a row.
    pub(crate) fn track(
        &mut self,
        detection: Detection,
        now: Instant,
        ctx: &TrackingContext<'_>,
    ) -> Option<SessionStatus> {
        match detection {
            Detection::Face(frame) => {
                let Some(target) = self.pose_target(&frame, ctx) else {
                    tracing::debug!(session = %self.id, "required landmarks missing; keeping last pose");
                    return None;
                };
                self.smoother.advance_at(&target, now);
                self.missed_frames = 0;
                self.transition(SessionStatus::Tracking)
            }
            Detection::NoFace => {
                self.missed_frames = self.missed_frames.saturating_add(1);
                tracing::debug!(session = %self.id, missed = self.missed_frames, "no face");
                if self.missed_frames >= ctx.no_face_threshold.max(1) {
                    self.transition(SessionStatus::NoFaceDetected)
                } else {
                    None
                }
            }
        }
    }

    fn pose_target(&self, frame: &LandmarkFrame, ctx: &TrackingContext<'_>) -> Option<PoseTarget> {
        let mapped = self.mapper.map_frame(frame);
        let anchor = resolve_anchor(&self.preset, &mapped, ctx.tuning, self.size_multiplier)?;
        let orientation = match ctx.mode {
            TrackingMode::Full => estimate_pose(&mapped)?,
            TrackingMode::PositionOnly => Quat::IDENTITY,
        };
        Some(PoseTarget {
            position: anchor.position,
            scale: anchor.scale,
            rotation: apply_rotation_offset(orientation, self.preset.rotation_offset),
        })
    }

    fn transition(&mut self, next: SessionStatus) -> Option<SessionStatus> {
        if self.tracking_status == next {
            return None;
        }
        self.tracking_status = next.clone();
        Some(next)
    }

    /// Handle a fired render tick. Ticks for any handle other than the one
    /// this session requested are ignored; the loop reschedules itself only
    /// while animating.
    pub(crate) fn on_tick(
        &mut self,
        handle: FrameHandle,
        scheduler: &mut dyn FrameScheduler,
        now: Instant,
    ) -> Result<(), RenderError> {
        if self.frame != Some(handle) {
            return Ok(());
        }
        self.frame = None;
        if !self.animating {
            return Ok(());
        }
        self.render()?;
        if self.animating {
            self.frame = Some(scheduler.request_frame(now));
        }
        Ok(())
    }

    fn render(&mut self) -> Result<(), RenderError> {
        let (Some(renderer), Some(model)) = (self.renderer.as_mut(), self.model.as_mut()) else {
            return Ok(());
        };
        match (self.smoother.current(), self.missed_frames) {
            (Some(current), 0) => {
                model.transform = Transform::from(current);
                model.visible = true;
            }
            _ => model.visible = false,
        }
        renderer.render(self.last_video.as_ref(), model)
    }

    pub(crate) fn snapshot(&self, path: &std::path::Path) -> Result<(), RenderError> {
        match self.renderer.as_ref() {
            Some(r) => r.snapshot(path),
            None => Err(RenderError::Disposed),
        }
    }

    /// Release everything this session holds: render loop first, then the
    /// camera stream, the detector and the renderer. Disposal errors are
    /// logged and swallowed so one failure never blocks the rest. Safe to
    /// call on a partially acquired session and more than once.
    pub(crate) fn teardown(&mut self, scheduler: &mut dyn FrameScheduler) {
        self.animating = false;
        if let Some(handle) = self.frame.take() {
            scheduler.cancel_frame(handle);
        }
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.stop() {
                tracing::debug!(session = %self.id, error = %e, "stream stop failed");
            }
        }
        if let Some(mut detector) = self.detector.take() {
            if let Err(e) = detector.close() {
                tracing::debug!(session = %self.id, error = %e, "detector close failed");
            }
        }
        if let Some(mut renderer) = self.renderer.take() {
            if let Err(e) = renderer.dispose() {
                tracing::debug!(session = %self.id, error = %e, "renderer dispose failed");
            }
        }
        self.model = None;
        self.last_video = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let denied = SessionError::from(AcquireError::Camera(CameraError::PermissionDenied(
            "/dev/video0".into(),
        )));
        assert_eq!(denied.reason(), Some(ErrorReason::PermissionDenied));

        let busy = AcquireError::Camera(CameraError::DeviceBusy("/dev/video0".into()));
        assert_eq!(busy.reason(), ErrorReason::CameraUnavailable);

        let missing = AcquireError::Runtime(DetectorError::ModelNotFound("x.onnx".into()));
        assert_eq!(missing.reason(), ErrorReason::ModuleLoad);

        assert_eq!(
            AcquireError::Camera(CameraError::InsecureContext).reason(),
            ErrorReason::InsecureContext
        );
        assert_eq!(SessionError::NotRunning.reason(), None);
    }

    #[test]
    fn test_missed_frames_below_threshold_keep_status() {
        let tuning = AnchorTuning::default();
        let ctx = TrackingContext {
            tuning: &tuning,
            mode: TrackingMode::Full,
            no_face_threshold: 3,
        };
        let mut s = Session::new("necklace", AttachPreset::default(), SmoothingConfig::default(), true, 1.0);
        let now = Instant::now();
        assert_eq!(s.track(Detection::NoFace, now, &ctx), None);
        assert_eq!(s.track(Detection::NoFace, now, &ctx), None);
        assert_eq!(s.track(Detection::NoFace, now, &ctx), Some(SessionStatus::NoFaceDetected));
        // Reported once.
        assert_eq!(s.track(Detection::NoFace, now, &ctx), None);
        // Smoother is untouched by empty frames.
        assert!(s.smoothed().is_none());
    }

    #[test]
    fn test_teardown_on_empty_session_is_harmless() {
        let mut s = Session::new("ring", AttachPreset::default(), SmoothingConfig::default(), false, 1.0);
        let mut sched = crate::scheduler::IntervalScheduler::with_fps(30);
        s.teardown(&mut sched);
        s.teardown(&mut sched);
        assert!(!s.is_animating());
    }
}
