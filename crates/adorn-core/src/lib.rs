//! adorn-core — Face-anchored overlay pipeline.
//!
//! Turns a stream of normalized face-mesh landmarks into a smoothed
//! position / scale / orientation for a jewelry model: coordinate mapping,
//! head pose, per-class anchoring and framerate-independent smoothing.
//! Landmarks come from a [`detector::LandmarkDetector`]; the bundled one runs
//! the MediaPipe face-mesh model via ONNX Runtime.

pub mod anchor;
pub mod detector;
pub mod mapper;
pub mod pose;
pub mod presets;
pub mod smoother;
pub mod types;

pub use anchor::{resolve_anchor, AnchorTarget, AnchorTuning, ClassTuning};
pub use detector::{
    Detection, DetectorError, DetectorFactory, DetectorOptions, FaceMeshDetectorFactory,
    LandmarkDetector,
};
pub use mapper::{map_landmark, CoordinateMapper, MappedLandmarks};
pub use pose::estimate_pose;
pub use presets::{Catalog, CatalogError};
pub use smoother::{PoseTarget, SmoothedTransform, SmoothingConfig, TemporalSmoother};
pub use types::{
    clamp_size_multiplier, AttachClass, AttachPreset, EarSide, Landmark, LandmarkFrame,
    TrackingMode,
};

/// File name of the face-mesh model inside the model directory.
pub const FACE_MESH_MODEL: &str = "face_landmark.onnx";

/// Directory searched for ONNX model files when none is configured.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/adorn/models")
}
