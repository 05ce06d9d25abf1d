//! adorn-session — Face-anchored try-on session.
//!
//! Owns the session lifecycle (start/stop of camera stream, detector and
//! render loop as one unit), feeds detector results through the anchoring
//! pipeline in `adorn-core`, and composites the product model over the
//! mirrored video. [`spawn_engine`] runs a controller on its own thread
//! behind an async [`EngineHandle`].

pub mod config;
pub mod controller;
pub mod engine;
pub mod render;
pub mod scene;
pub mod scheduler;
pub mod session;
pub mod status;

#[cfg(test)]
mod mock;

pub use config::Config;
pub use controller::{Collaborators, ControllerSettings, LifecycleState, SessionController};
pub use engine::{spawn_engine, EngineHandle};
pub use render::{OverlayRenderer, RenderError, RenderTarget, RendererFactory, SoftwareCompositor};
pub use scene::{ModelInstance, PointModel, SourceModel};
pub use scheduler::{FrameHandle, FrameScheduler, IntervalScheduler};
pub use session::{AcquireError, Session, SessionError};
pub use status::{ErrorReason, SessionStatus};
