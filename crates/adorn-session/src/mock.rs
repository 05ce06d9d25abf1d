//! Recording test doubles for the session collaborators. Every call is
//! appended to a shared [`EventLog`] so tests can assert ordering and counts.

use crate::render::{OverlayRenderer, RenderError, RenderTarget, RendererFactory};
use crate::scene::ModelInstance;
use crate::scheduler::{FrameHandle, FrameScheduler};
use adorn_core::types::index;
use adorn_core::{
    Detection, DetectorError, DetectorFactory, DetectorOptions, Landmark, LandmarkDetector,
    LandmarkFrame,
};
use adorn_hw::{CameraError, CameraSource, Frame, StreamRequest, VideoStream};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub(crate) const MOCK_WIDTH: u32 = 640;
pub(crate) const MOCK_HEIGHT: u32 = 480;

#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.0.lock().unwrap().iter().position(|e| e == event)
    }

    pub fn last_render(&self) -> Option<String> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.starts_with("render:"))
            .cloned()
    }
}

/// Eyes, nose and chin of a frontal face.
pub(crate) fn neck_frame() -> LandmarkFrame {
    LandmarkFrame::sparse([
        (index::LEFT_EYE_OUTER, Landmark::new(0.4, 0.45, 0.0)),
        (index::RIGHT_EYE_OUTER, Landmark::new(0.6, 0.45, 0.0)),
        (index::NOSE_TIP, Landmark::new(0.5, 0.55, 0.0)),
        (index::CHIN, Landmark::new(0.5, 0.75, 0.0)),
    ])
}

// --- Camera ---

type OpenFailure = fn(&str) -> CameraError;

pub(crate) struct MockCameras {
    pub log: EventLog,
    pub faults: Arc<AtomicBool>,
    fail_open: Option<OpenFailure>,
    open_delay: Duration,
}

impl MockCameras {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            faults: Arc::new(AtomicBool::new(false)),
            fail_open: None,
            open_delay: Duration::ZERO,
        }
    }

    pub fn failing(log: EventLog, failure: OpenFailure) -> Self {
        Self {
            fail_open: Some(failure),
            ..Self::new(log)
        }
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

impl CameraSource for MockCameras {
    fn open(&mut self, request: &StreamRequest) -> Result<Box<dyn VideoStream>, CameraError> {
        self.log.push("camera.open");
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        if let Some(fail) = self.fail_open {
            return Err(fail(&request.device));
        }
        Ok(Box::new(MockStream {
            log: self.log.clone(),
            fail_next: Arc::clone(&self.faults),
            stopped: false,
            sequence: 0,
        }))
    }
}

struct MockStream {
    log: EventLog,
    fail_next: Arc<AtomicBool>,
    stopped: bool,
    sequence: u32,
}

impl VideoStream for MockStream {
    fn width(&self) -> u32 {
        MOCK_WIDTH
    }

    fn height(&self) -> u32 {
        MOCK_HEIGHT
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stopped {
            return Err(CameraError::AlreadyStopped);
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CameraError::CaptureFailed("device unplugged".into()));
        }
        self.sequence += 1;
        let mut frame = Frame::solid(MOCK_WIDTH, MOCK_HEIGHT, [90, 90, 90]);
        frame.sequence = self.sequence;
        Ok(frame)
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        if self.stopped {
            return Err(CameraError::AlreadyStopped);
        }
        self.stopped = true;
        self.log.push("stream.stop");
        Ok(())
    }
}

// --- Detector ---

#[derive(Default)]
struct ScriptState {
    queue: VecDeque<Detection>,
    fail_create: bool,
    fail_next_detect: bool,
}

/// Detections the mock detector returns, in order; `NoFace` once drained.
#[derive(Clone, Default)]
pub(crate) struct DetectionScript(Arc<Mutex<ScriptState>>);

impl DetectionScript {
    pub fn push(&self, detection: Detection) {
        self.0.lock().unwrap().queue.push_back(detection);
    }

    pub fn fail_create(&self) {
        self.0.lock().unwrap().fail_create = true;
    }

    pub fn allow_create(&self) {
        self.0.lock().unwrap().fail_create = false;
    }

    pub fn fail_next_detect(&self) {
        self.0.lock().unwrap().fail_next_detect = true;
    }
}

pub(crate) struct MockDetectors {
    log: EventLog,
    pub script: DetectionScript,
}

impl MockDetectors {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            script: DetectionScript::default(),
        }
    }
}

impl DetectorFactory for MockDetectors {
    fn load_runtime(&mut self) -> Result<(), DetectorError> {
        self.log.push("runtime.load");
        Ok(())
    }

    fn create(&mut self, _options: &DetectorOptions) -> Result<Box<dyn LandmarkDetector>, DetectorError> {
        if self.script.0.lock().unwrap().fail_create {
            return Err(DetectorError::ModelNotFound("mock.onnx".into()));
        }
        self.log.push("detector.create");
        Ok(Box::new(MockDetector {
            log: self.log.clone(),
            script: self.script.clone(),
        }))
    }
}

struct MockDetector {
    log: EventLog,
    script: DetectionScript,
}

impl LandmarkDetector for MockDetector {
    fn detect(&mut self, _rgb: &[u8], _width: u32, _height: u32) -> Result<Detection, DetectorError> {
        self.log.push("detector.detect");
        let mut state = self.script.0.lock().unwrap();
        if std::mem::take(&mut state.fail_next_detect) {
            return Err(DetectorError::InferenceFailed("mock".into()));
        }
        Ok(state.queue.pop_front().unwrap_or(Detection::NoFace))
    }

    fn close(&mut self) -> Result<(), DetectorError> {
        self.log.push("detector.close");
        Ok(())
    }
}

// --- Renderer ---

pub(crate) struct MockRenderers {
    log: EventLog,
}

impl MockRenderers {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

impl RendererFactory for MockRenderers {
    fn create(&mut self, _target: RenderTarget) -> Result<Box<dyn OverlayRenderer>, RenderError> {
        self.log.push("renderer.create");
        Ok(Box::new(MockRenderer {
            log: self.log.clone(),
            disposed: false,
        }))
    }
}

struct MockRenderer {
    log: EventLog,
    disposed: bool,
}

impl OverlayRenderer for MockRenderer {
    fn render(&mut self, _video: Option<&Frame>, model: &ModelInstance) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        self.log.push(if model.visible {
            "render:visible"
        } else {
            "render:hidden"
        });
        Ok(())
    }

    fn snapshot(&self, _path: &Path) -> Result<(), RenderError> {
        self.log.push("renderer.snapshot");
        Ok(())
    }

    fn dispose(&mut self) -> Result<(), RenderError> {
        self.disposed = true;
        self.log.push("renderer.dispose");
        Ok(())
    }
}

// --- Scheduler ---

/// Scheduler whose pending tick is always due.
pub(crate) struct MockScheduler {
    log: EventLog,
    next_id: u64,
    pending: Option<FrameHandle>,
}

impl MockScheduler {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            next_id: 0,
            pending: None,
        }
    }
}

impl FrameScheduler for MockScheduler {
    fn request_frame(&mut self, _now: Instant) -> FrameHandle {
        self.next_id += 1;
        self.log.push("frame.request");
        let handle = FrameHandle(self.next_id);
        self.pending = Some(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.log.push("frame.cancel");
        if self.pending == Some(handle) {
            self.pending = None;
        }
    }

    fn take_due(&mut self, _now: Instant) -> Option<FrameHandle> {
        self.pending.take()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|_| Instant::now())
    }
}
