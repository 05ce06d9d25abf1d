//! Session lifecycle controller.
//!
//! State machine `idle → starting → running → (error | stopped)`. `start`
//! acquires the detector runtime, camera stream, renderer, model clone and
//! detector instance in that order; any failure rolls back whatever was
//! already acquired before the error is reported. At most one session is
//! alive; switching products is stop-then-start.
//!
//! The controller is single-threaded: the caller drives it by calling
//! [`poll_camera`](SessionController::poll_camera) and
//! [`poll_render`](SessionController::poll_render) from one loop, so a
//! detection write always completes before the next render tick reads it.

use crate::render::{RenderTarget, RendererFactory};
use crate::scene::{ModelInstance, SourceModel};
use crate::scheduler::FrameScheduler;
use crate::session::{AcquireError, Session, SessionError, TrackingContext};
use crate::status::{ErrorReason, SessionStatus};
use adorn_core::{
    clamp_size_multiplier, Catalog, Detection, DetectorFactory, DetectorOptions, SmoothingConfig,
    TrackingMode,
};
use adorn_hw::{CameraSource, StreamRequest};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// External collaborators the controller acquires session resources from.
pub struct Collaborators {
    pub detectors: Box<dyn DetectorFactory>,
    pub cameras: Box<dyn CameraSource>,
    pub renderers: Box<dyn RendererFactory>,
    pub scheduler: Box<dyn FrameScheduler>,
}

/// Tunables applied to every session the controller starts.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub stream: StreamRequest,
    /// Present the feed as a mirror (selfie view).
    pub mirrored: bool,
    pub tracking: TrackingMode,
    pub detector: DetectorOptions,
    pub smoothing: SmoothingConfig,
    /// Consecutive empty detections before status becomes no-face-detected.
    pub no_face_threshold: u32,
    /// Upper bound on the whole `starting` phase.
    pub start_timeout: Duration,
    /// Initial size control; `None` uses the attach class default.
    pub size_multiplier: Option<f32>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            stream: StreamRequest::default(),
            mirrored: true,
            tracking: TrackingMode::Full,
            detector: DetectorOptions::default(),
            smoothing: SmoothingConfig::default(),
            no_face_threshold: 10,
            start_timeout: Duration::from_secs(10),
            size_multiplier: None,
        }
    }
}

/// Lifecycle flags of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    Running,
    Stopped,
    Error(ErrorReason),
}

pub type StatusObserver = Box<dyn FnMut(&SessionStatus) + Send>;

pub struct SessionController {
    collaborators: Collaborators,
    settings: ControllerSettings,
    catalog: Arc<Catalog>,
    state: LifecycleState,
    session: Option<Session>,
    status: SessionStatus,
    observer: Option<StatusObserver>,
}

impl SessionController {
    pub fn new(collaborators: Collaborators, settings: ControllerSettings, catalog: Arc<Catalog>) -> Self {
        Self {
            collaborators,
            settings,
            catalog,
            state: LifecycleState::Idle,
            session: None,
            status: SessionStatus::Idle,
            observer: None,
        }
    }

    /// Receive every status transition.
    pub fn set_observer(&mut self, observer: StatusObserver) {
        self.observer = Some(observer);
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    /// When the next render tick is due, if one is scheduled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.collaborators.scheduler.next_deadline()
    }

    /// Start a session for `product_id`, cloning `model` for it.
    ///
    /// A no-op while a session is already starting or running. On failure
    /// every partially acquired resource is released, the controller enters
    /// `Error` and the classified error is returned.
    pub fn start(&mut self, product_id: &str, model: &SourceModel) -> Result<(), SessionError> {
        if matches!(self.state, LifecycleState::Starting | LifecycleState::Running) {
            tracing::debug!(product = product_id, state = ?self.state, "start ignored: session already active");
            return Ok(());
        }

        let started = Instant::now();
        self.state = LifecycleState::Starting;
        self.publish(SessionStatus::Initializing);

        let preset = self.catalog.lookup(product_id);
        let size = self
            .settings
            .size_multiplier
            .map(clamp_size_multiplier)
            .unwrap_or_else(|| preset.attach.default_size_multiplier());
        let mut session = Session::new(
            product_id,
            preset,
            self.settings.smoothing,
            self.settings.mirrored,
            size,
        );
        tracing::info!(
            session = %session.id(),
            product = product_id,
            attach = %session.preset().attach,
            size,
            "starting session"
        );

        match self.acquire(&mut session, model, started) {
            Ok(()) => {
                session.start_render_loop(self.collaborators.scheduler.as_mut(), Instant::now());
                tracing::info!(
                    session = %session.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "session running"
                );
                self.session = Some(session);
                self.state = LifecycleState::Running;
                self.publish(SessionStatus::Searching);
                Ok(())
            }
            Err(e) => {
                session.teardown(self.collaborators.scheduler.as_mut());
                let reason = e.reason();
                tracing::warn!(
                    session = %session.id(),
                    error = %e,
                    reason = %reason,
                    "session start failed; partial acquisitions released"
                );
                self.fail(reason, e.to_string());
                Err(e.into())
            }
        }
    }

    fn acquire(
        &mut self,
        session: &mut Session,
        model: &SourceModel,
        started: Instant,
    ) -> Result<(), AcquireError> {
        let timeout = self.settings.start_timeout;
        let check_deadline = || {
            if started.elapsed() > timeout {
                Err(AcquireError::Timeout(timeout))
            } else {
                Ok(())
            }
        };

        self.publish(SessionStatus::LoadingModules);
        self.collaborators
            .detectors
            .load_runtime()
            .map_err(AcquireError::Runtime)?;
        check_deadline()?;

        let stream = self.collaborators.cameras.open(&self.settings.stream)?;
        let target = RenderTarget {
            width: stream.width(),
            height: stream.height(),
            mirrored: self.settings.mirrored,
        };
        session.attach_stream(stream);
        check_deadline()?;

        session.renderer = Some(self.collaborators.renderers.create(target)?);
        session.model = Some(ModelInstance::instantiate(model));

        let detector = self
            .collaborators
            .detectors
            .create(&self.settings.detector)
            .map_err(AcquireError::Detector)?;
        session.detector = Some(detector);
        check_deadline()
    }

    /// Stop the active session. Idempotent; also clears a failed start.
    pub fn stop(&mut self) {
        match self.session.take() {
            Some(mut session) => {
                session.teardown(self.collaborators.scheduler.as_mut());
                let ran_for = chrono::Utc::now() - session.started_at();
                tracing::info!(
                    session = %session.id(),
                    product = session.product(),
                    started_at = %session.started_at(),
                    ran_for_ms = ran_for.num_milliseconds(),
                    "session stopped"
                );
            }
            None if matches!(self.state, LifecycleState::Error(_)) => {
                tracing::debug!("stop after failed start; nothing to release");
            }
            None => return,
        }
        self.state = LifecycleState::Stopped;
        self.publish(SessionStatus::Stopped);
    }

    /// Tear down the current session completely, then start a new one.
    pub fn switch_product(&mut self, product_id: &str, model: &SourceModel) -> Result<(), SessionError> {
        self.stop();
        self.start(product_id, model)
    }

    /// Set the live size control. Returns the applied (clamped) value.
    pub fn set_size_multiplier(&mut self, value: f32) -> Result<f32, SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NotRunning)?;
        let applied = clamp_size_multiplier(value);
        session.set_size_multiplier(applied);
        tracing::debug!(session = %session.id(), size = applied, "size multiplier changed");
        Ok(applied)
    }

    /// Deliver one detector result to the active session.
    pub fn on_detection(&mut self, detection: Detection, now: Instant) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let ctx = TrackingContext {
            tuning: &self.catalog.tuning,
            mode: self.settings.tracking,
            no_face_threshold: self.settings.no_face_threshold,
        };
        if let Some(status) = session.track(detection, now, &ctx) {
            self.publish(status);
        }
    }

    /// Capture one camera frame, detect, and track. Blocks on the camera.
    pub fn poll_camera(&mut self, now: Instant) -> Result<(), SessionError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        match session.capture() {
            Ok(Some(detection)) => {
                self.on_detection(detection, now);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                let err = SessionError::Stream(e);
                self.abort_running(&err);
                Err(err)
            }
        }
    }

    /// Run the render tick if it is due.
    pub fn poll_render(&mut self, now: Instant) -> Result<(), SessionError> {
        let Some(handle) = self.collaborators.scheduler.take_due(now) else {
            return Ok(());
        };
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if let Err(e) = session.on_tick(handle, self.collaborators.scheduler.as_mut(), now) {
            let err = SessionError::Render(e);
            self.abort_running(&err);
            return Err(err);
        }
        Ok(())
    }

    /// Write the last composited frame to `path`.
    pub fn snapshot(&self, path: &Path) -> Result<(), SessionError> {
        let session = self.session.as_ref().ok_or(SessionError::NotRunning)?;
        session.snapshot(path).map_err(SessionError::Render)
    }

    /// Roll back a session whose caller stopped waiting for `start`.
    pub fn abandon_start(&mut self) {
        if self.session.is_some() {
            let err = SessionError::StartTimeout(self.settings.start_timeout);
            self.abort_running(&err);
        }
    }

    fn abort_running(&mut self, err: &SessionError) {
        if let Some(mut session) = self.session.take() {
            session.teardown(self.collaborators.scheduler.as_mut());
            tracing::warn!(session = %session.id(), error = %err, "session aborted");
        }
        let reason = err.reason().unwrap_or(ErrorReason::CameraUnavailable);
        self.fail(reason, err.to_string());
    }

    fn fail(&mut self, reason: ErrorReason, message: String) {
        self.state = LifecycleState::Error(reason);
        self.publish(SessionStatus::Error { reason, message });
    }

    fn publish(&mut self, status: SessionStatus) {
        if self.status == status {
            return;
        }
        tracing::info!(status = status.label(), "status");
        self.status = status;
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.status);
        }
    }
}
