//! Observable session status and the classified error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a session failed to start or stopped abnormally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    /// Detector runtime (model weights) failed to load.
    ModuleLoad,
    PermissionDenied,
    /// Capture refused because the caller's context is not trusted.
    InsecureContext,
    /// Camera in use elsewhere, unplugged, or never present.
    CameraUnavailable,
    /// Acquisition exceeded the `starting` timeout.
    StartTimeout,
    /// Renderer could not be created or failed mid-session.
    Renderer,
}

impl ErrorReason {
    /// Whether a fresh `start()` can succeed without changing the environment
    /// the process runs in. Permission errors are retryable once access has
    /// been granted externally.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorReason::InsecureContext)
    }

    /// Actionable text for the error panel.
    pub fn guidance(self) -> &'static str {
        match self {
            ErrorReason::ModuleLoad => {
                "The face-tracking model could not be loaded. Check the model directory and retry."
            }
            ErrorReason::PermissionDenied => {
                "Camera access was denied. Grant access (e.g. add your user to the 'video' group) and retry."
            }
            ErrorReason::InsecureContext => {
                "Camera capture is not permitted from this context. Relaunch from a trusted session."
            }
            ErrorReason::CameraUnavailable => {
                "No usable camera was found, or it is in use by another application. Close it and retry."
            }
            ErrorReason::StartTimeout => "The camera did not start in time. Retry.",
            ErrorReason::Renderer => "The overlay renderer failed. Retry.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorReason::ModuleLoad => "module-load",
            ErrorReason::PermissionDenied => "permission-denied",
            ErrorReason::InsecureContext => "insecure-context",
            ErrorReason::CameraUnavailable => "camera-unavailable",
            ErrorReason::StartTimeout => "start-timeout",
            ErrorReason::Renderer => "renderer",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status signal published on every lifecycle or tracking transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Initializing,
    LoadingModules,
    /// Camera started; waiting for the first face.
    Searching,
    Tracking,
    NoFaceDetected,
    Stopped,
    Error {
        reason: ErrorReason,
        message: String,
    },
}

impl SessionStatus {
    pub fn is_error(&self) -> bool {
        matches!(self, SessionStatus::Error { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Initializing => "initializing",
            SessionStatus::LoadingModules => "loading-modules",
            SessionStatus::Searching => "searching",
            SessionStatus::Tracking => "tracking",
            SessionStatus::NoFaceDetected => "no-face-detected",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Error { .. } => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Error { reason, message } => write!(f, "error ({reason}): {message}"),
            other => f.write_str(other.label()),
        }
    }
}
