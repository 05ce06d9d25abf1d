use crate::config::Config;
use crate::controller::{Collaborators, SessionController};
use crate::render::SoftwareRendererFactory;
use crate::scene::SourceModel;
use crate::scheduler::IntervalScheduler;
use crate::session::SessionError;
use crate::status::SessionStatus;
use adorn_core::FaceMeshDetectorFactory;
use adorn_hw::V4lCameraSource;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};

impl Collaborators {
    /// ONNX face-mesh detector, V4L2 camera and software compositor.
    pub fn native(config: &Config) -> Self {
        Self {
            detectors: Box::new(FaceMeshDetectorFactory::new(config.face_mesh_model_path())),
            cameras: Box::new(V4lCameraSource::new()),
            renderers: Box::new(SoftwareRendererFactory),
            scheduler: Box::new(IntervalScheduler::with_fps(config.target_fps)),
        }
    }
}

/// Messages sent from callers to the engine thread.
enum EngineRequest {
    Start {
        product: String,
        model: SourceModel,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Switch {
        product: String,
        model: SourceModel,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    SetSize {
        value: f32,
        reply: oneshot::Sender<Result<f32, SessionError>>,
    },
    Snapshot {
        path: PathBuf,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    status: watch::Receiver<SessionStatus>,
    start_timeout: Duration,
}

impl EngineHandle {
    /// Start a try-on session. Gives up after the start timeout; the engine
    /// then rolls back whatever the session acquired.
    pub async fn start(&self, product: &str, model: SourceModel) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::Start {
            product: product.to_string(),
            model,
            reply: reply_tx,
        })
        .await?;
        self.await_start(reply_rx).await
    }

    /// Stop the active session, if any.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::Stop { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    /// Stop the current session completely, then start `product`.
    pub async fn switch_product(&self, product: &str, model: SourceModel) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::Switch {
            product: product.to_string(),
            model,
            reply: reply_tx,
        })
        .await?;
        self.await_start(reply_rx).await
    }

    /// Adjust the live size control; returns the applied value.
    pub async fn set_size_multiplier(&self, value: f32) -> Result<f32, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::SetSize {
            value,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Save the last composited frame as PNG.
    pub async fn snapshot(&self, path: PathBuf) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineRequest::Snapshot {
            path,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Subscribe to status transitions.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// Override how long `start` waits before giving up.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    async fn send(&self, request: EngineRequest) -> Result<(), SessionError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    async fn await_start(
        &self,
        reply_rx: oneshot::Receiver<Result<(), SessionError>>,
    ) -> Result<(), SessionError> {
        match tokio::time::timeout(self.start_timeout, reply_rx).await {
            Ok(reply) => reply.map_err(|_| SessionError::ChannelClosed)?,
            Err(_) => {
                tracing::warn!(timeout = ?self.start_timeout, "session start timed out");
                Err(SessionError::StartTimeout(self.start_timeout))
            }
        }
    }
}

/// Spawn the session controller on a dedicated OS thread.
///
/// The thread is the session's event loop: while a session runs it
/// alternates between camera frames (detection + tracking) and due render
/// ticks, draining requests in between; while idle it blocks on requests.
/// See [`pump`] for how render ticks interleave with capture.
pub fn spawn_engine(mut controller: SessionController) -> EngineHandle {
    let start_timeout = controller.settings().start_timeout;
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);
    let (status_tx, status_rx) = watch::channel(controller.status().clone());
    controller.set_observer(Box::new(move |status| {
        status_tx.send_replace(status.clone());
    }));

    std::thread::Builder::new()
        .name("adorn-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            loop {
                let request = if controller.is_running() {
                    match rx.try_recv() {
                        Ok(req) => Some(req),
                        Err(TryRecvError::Empty) => None,
                        Err(TryRecvError::Disconnected) => break,
                    }
                } else {
                    match rx.blocking_recv() {
                        Some(req) => Some(req),
                        None => break,
                    }
                };

                match request {
                    Some(req) => handle_request(&mut controller, req),
                    None => pump(&mut controller),
                }
            }
            controller.stop();
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle {
        tx,
        status: status_rx,
        start_timeout,
    }
}

/// One running iteration. A tick already due is drawn before the camera
/// blocks for the next frame, and one that came due during capture and
/// inference is drawn straight after, so a slow detector delays a tick by at
/// most one capture instead of skipping it. Errors are already published on
/// the status channel.
fn pump(controller: &mut SessionController) {
    let _ = controller.poll_render(Instant::now());
    if controller.poll_camera(Instant::now()).is_err() {
        return;
    }
    let _ = controller.poll_render(Instant::now());
}

fn handle_request(controller: &mut SessionController, request: EngineRequest) {
    match request {
        EngineRequest::Start {
            product,
            model,
            reply,
        } => {
            let result = controller.start(&product, &model);
            reply_or_rollback(controller, reply, result);
        }
        EngineRequest::Switch {
            product,
            model,
            reply,
        } => {
            let result = controller.switch_product(&product, &model);
            reply_or_rollback(controller, reply, result);
        }
        EngineRequest::Stop { reply } => {
            controller.stop();
            let _ = reply.send(());
        }
        EngineRequest::SetSize { value, reply } => {
            let _ = reply.send(controller.set_size_multiplier(value));
        }
        EngineRequest::Snapshot { path, reply } => {
            let _ = reply.send(controller.snapshot(&path));
        }
    }
}

/// Deliver a start result; if the caller already gave up, undo the start.
fn reply_or_rollback(
    controller: &mut SessionController,
    reply: oneshot::Sender<Result<(), SessionError>>,
    result: Result<(), SessionError>,
) {
    if reply.send(result).is_err() {
        tracing::warn!("start caller gave up; rolling back session");
        controller.abandon_start();
    }
}
