use crate::controller::ControllerSettings;
use adorn_core::{Catalog, CatalogError, DetectorOptions, SmoothingConfig, TrackingMode};
use adorn_hw::StreamRequest;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Try-on configuration, loaded from environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture size; the driver may negotiate another.
    pub capture_width: u32,
    pub capture_height: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Preset catalog replacing the embedded one.
    pub presets_path: Option<PathBuf>,
    /// Upper bound on session start, in seconds.
    pub start_timeout_secs: u64,
    /// Render loop rate.
    pub target_fps: u32,
    /// Face-presence score below which a frame has no face.
    pub detection_confidence: f32,
    /// Consecutive empty frames before reporting no-face-detected.
    pub no_face_frames: u32,
    /// Present the camera feed mirrored (selfie view).
    pub mirrored: bool,
    pub tracking_mode: TrackingMode,
    /// Where snapshots are written when no explicit path is given.
    pub snapshot_dir: PathBuf,
}

impl Config {
    /// Load configuration from `ADORN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ADORN_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| adorn_core::default_model_dir());

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("adorn");

        let snapshot_dir = std::env::var("ADORN_SNAPSHOT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("snapshots"));

        let tracking_mode = match std::env::var("ADORN_TRACKING_MODE") {
            Ok(v) => v.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring ADORN_TRACKING_MODE");
                TrackingMode::Full
            }),
            Err(_) => TrackingMode::Full,
        };

        Self {
            camera_device: std::env::var("ADORN_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            capture_width: env_u32("ADORN_CAPTURE_WIDTH", 640),
            capture_height: env_u32("ADORN_CAPTURE_HEIGHT", 480),
            model_dir,
            presets_path: std::env::var("ADORN_PRESETS").ok().map(PathBuf::from),
            start_timeout_secs: env_u64("ADORN_START_TIMEOUT_SECS", 10),
            target_fps: env_u32("ADORN_TARGET_FPS", 30),
            detection_confidence: env_f32("ADORN_DETECTION_CONFIDENCE", 0.5),
            no_face_frames: env_u32("ADORN_NO_FACE_FRAMES", 10),
            mirrored: std::env::var("ADORN_MIRROR")
                .map(|v| v != "0")
                .unwrap_or(true),
            tracking_mode,
            snapshot_dir,
        }
    }

    /// Path to the face-mesh landmark model.
    pub fn face_mesh_model_path(&self) -> PathBuf {
        self.model_dir.join(adorn_core::FACE_MESH_MODEL)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Controller settings derived from this configuration.
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            stream: StreamRequest {
                device: self.camera_device.clone(),
                width: self.capture_width,
                height: self.capture_height,
            },
            mirrored: self.mirrored,
            tracking: self.tracking_mode,
            detector: DetectorOptions {
                min_detection_confidence: self.detection_confidence,
            },
            smoothing: SmoothingConfig::default(),
            no_face_threshold: self.no_face_frames,
            start_timeout: self.start_timeout(),
            size_multiplier: None,
        }
    }

    /// The preset catalog: the override file when configured, otherwise the
    /// embedded catalog.
    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.presets_path {
            Some(path) => {
                let catalog = Catalog::load(path)?;
                tracing::info!(path = %path.display(), presets = catalog.presets.len(), "loaded preset catalog");
                Ok(catalog)
            }
            None => Ok(adorn_core::presets::catalog().clone()),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
