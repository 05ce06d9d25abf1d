//! Landmark sources.
//!
//! [`DetectorFactory`] is resolved once per session start: it first loads the
//! detector runtime (model weights), then creates a [`LandmarkDetector`] bound
//! to the session. The bundled factory runs the MediaPipe face-mesh model via
//! ONNX Runtime on a letterboxed RGB frame.

use crate::types::{index::FACE_MESH_POINTS, Landmark, LandmarkFrame};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const MESH_INPUT_SIZE: usize = 192;
const MESH_MEAN: f32 = 127.5;
const MESH_STD: f32 = 127.5;
const MESH_VALUES_PER_POINT: usize = 3;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}; download face_landmark.onnx and place it in the model dir")]
    ModelNotFound(String),
    #[error("detector runtime not loaded")]
    RuntimeNotLoaded,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short: expected {expected}, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Outcome of running the detector on one frame.
#[derive(Debug, Clone)]
pub enum Detection {
    Face(LandmarkFrame),
    NoFace,
}

/// Detector configuration. At most one face is ever tracked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorOptions {
    /// Face-presence score below which a frame reports [`Detection::NoFace`].
    pub min_detection_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
        }
    }
}

/// A detector instance owned by one session.
///
/// `detect` runs to completion before returning, so at most one result is
/// ever in flight.
pub trait LandmarkDetector: Send {
    /// Detect landmarks in a packed RGB8 frame.
    fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Detection, DetectorError>;

    /// Release per-session resources. Called once on teardown.
    fn close(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }
}

/// Creates detectors; may cache the loaded runtime across sessions.
pub trait DetectorFactory: Send {
    /// Load the detector runtime. Idempotent once it has succeeded.
    fn load_runtime(&mut self) -> Result<(), DetectorError>;

    fn create(&mut self, options: &DetectorOptions) -> Result<Box<dyn LandmarkDetector>, DetectorError>;
}

/// Metadata for coordinate de-mapping after letterbox resize.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor positions discovered at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MeshOutputs {
    landmarks: usize,
    score: Option<usize>,
}

/// Loaded face-mesh runtime shared by every detector the factory creates.
struct MeshRuntime {
    session: Mutex<Session>,
    outputs: MeshOutputs,
}

/// ONNX Runtime face-mesh factory. The model session is loaded lazily on the
/// first [`load_runtime`](DetectorFactory::load_runtime) and reused afterwards.
pub struct FaceMeshDetectorFactory {
    model_path: PathBuf,
    runtime: Option<Arc<MeshRuntime>>,
}

impl FaceMeshDetectorFactory {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            runtime: None,
        }
    }
}

impl DetectorFactory for FaceMeshDetectorFactory {
    fn load_runtime(&mut self) -> Result<(), DetectorError> {
        if self.runtime.is_some() {
            return Ok(());
        }
        if !self.model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                self.model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(&self.model_path)?;

        let output_names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = %self.model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded face-mesh model"
        );

        let outputs = discover_outputs(&output_names).ok_or_else(|| {
            DetectorError::InferenceFailed(format!(
                "face-mesh model has no outputs: {output_names:?}"
            ))
        })?;
        tracing::debug!(?outputs, "face-mesh output tensor mapping");

        self.runtime = Some(Arc::new(MeshRuntime {
            session: Mutex::new(session),
            outputs,
        }));
        Ok(())
    }

    fn create(&mut self, options: &DetectorOptions) -> Result<Box<dyn LandmarkDetector>, DetectorError> {
        let runtime = self.runtime.clone().ok_or(DetectorError::RuntimeNotLoaded)?;
        Ok(Box::new(FaceMeshDetector {
            runtime,
            options: *options,
        }))
    }
}

/// Per-session face-mesh detector.
pub struct FaceMeshDetector {
    runtime: Arc<MeshRuntime>,
    options: DetectorOptions,
}

impl LandmarkDetector for FaceMeshDetector {
    fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Detection, DetectorError> {
        let (w, h) = (width as usize, height as usize);
        let expected = w * h * 3;
        if w == 0 || h == 0 || rgb.len() < expected {
            return Err(DetectorError::InvalidFrame {
                expected,
                actual: rgb.len(),
            });
        }

        let (input, letterbox) = preprocess(rgb, w, h);
        let outputs = self.runtime.outputs;

        let (points, score) = {
            let mut session = self
                .runtime
                .session
                .lock()
                .map_err(|_| DetectorError::InferenceFailed("face-mesh session poisoned".into()))?;
            let results = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

            let (_, points) = results[outputs.landmarks]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("landmarks: {e}")))?;
            let points = points.to_vec();

            let score = match outputs.score {
                Some(idx) => {
                    let (_, s) = results[idx]
                        .try_extract_tensor::<f32>()
                        .map_err(|e| DetectorError::InferenceFailed(format!("score: {e}")))?;
                    s.first().copied()
                }
                None => None,
            };
            (points, score)
        };

        if let Some(logit) = score {
            let presence = sigmoid(logit);
            if presence < self.options.min_detection_confidence {
                tracing::trace!(presence, "face-mesh: no face");
                return Ok(Detection::NoFace);
            }
        }

        Ok(decode_landmarks(&points, w, h, &letterbox)
            .map(Detection::Face)
            .unwrap_or(Detection::NoFace))
    }
}

/// Face-mesh exports name their tensors inconsistently ("conv2d_21",
/// "Identity", "landmarks", ...). Named outputs are preferred; otherwise the
/// first output is the landmark tensor and the last is the presence score.
fn discover_outputs(names: &[String]) -> Option<MeshOutputs> {
    if names.is_empty() {
        return None;
    }
    let find = |keys: &[&str]| {
        names
            .iter()
            .position(|n| keys.iter().any(|k| n.to_ascii_lowercase().contains(k)))
    };

    let landmarks = find(&["landmark", "mesh"]).unwrap_or(0);
    let score = find(&["score", "flag", "presence"])
        .or_else(|| (names.len() > 1).then(|| names.len() - 1))
        .filter(|&idx| idx != landmarks);

    Some(MeshOutputs { landmarks, score })
}

/// Letterbox an RGB frame into the square mesh input as NCHW floats.
fn preprocess(rgb: &[u8], width: usize, height: usize) -> (Array4<f32>, LetterboxInfo) {
    let size = MESH_INPUT_SIZE;
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as usize).clamp(1, size);
    let new_h = ((height as f32 * scale).round() as usize).clamp(1, size);
    let pad_x = (size - new_w) as f32 / 2.0;
    let pad_y = (size - new_h) as f32 / 2.0;
    let pad_x_start = pad_x.floor() as usize;
    let pad_y_start = pad_y.floor() as usize;

    // Padding normalizes to 0.0.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    let inv_scale = 1.0 / scale;

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * inv_scale - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * inv_scale - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let px = |xx: usize, yy: usize| rgb[(yy * width + xx) * 3 + c] as f32;
                let val = px(x0, y0) * (1.0 - fx) * (1.0 - fy)
                    + px(x1, y0) * fx * (1.0 - fy)
                    + px(x0, y1) * (1.0 - fx) * fy
                    + px(x1, y1) * fx * fy;
                tensor[[0, c, pad_y_start + y, pad_x_start + x]] = (val - MESH_MEAN) / MESH_STD;
            }
        }
    }

    (tensor, LetterboxInfo { scale, pad_x, pad_y })
}

/// Convert raw mesh output (input-pixel units) to normalized frame landmarks.
fn decode_landmarks(
    raw: &[f32],
    width: usize,
    height: usize,
    letterbox: &LetterboxInfo,
) -> Option<LandmarkFrame> {
    if raw.len() < FACE_MESH_POINTS * MESH_VALUES_PER_POINT {
        tracing::warn!(values = raw.len(), "face-mesh output shorter than expected");
        return None;
    }
    let frame_w = width as f32 * letterbox.scale;
    let points = raw
        .chunks_exact(MESH_VALUES_PER_POINT)
        .take(FACE_MESH_POINTS)
        .map(|p| {
            let x = (p[0] - letterbox.pad_x) / letterbox.scale / width as f32;
            let y = (p[1] - letterbox.pad_y) / letterbox.scale / height as f32;
            // Depth shares the x scale in the mesh model.
            let z = p[2] / frame_w;
            Landmark::new(x, y, z)
        })
        .collect();
    Some(LandmarkFrame::from_points(points))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
