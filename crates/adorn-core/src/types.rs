use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Face-mesh landmark indices used by the anchoring pipeline.
///
/// Indices follow the 468-point MediaPipe face-mesh topology. "Left" and
/// "right" refer to the unmirrored image, not the subject.
pub mod index {
    pub const NOSE_TIP: usize = 1;
    pub const LEFT_EYE_OUTER: usize = 33;
    pub const CHIN: usize = 152;
    pub const LEFT_EAR: usize = 234;
    pub const RIGHT_EYE_OUTER: usize = 263;
    pub const RIGHT_EAR: usize = 454;

    /// Number of points in a full face-mesh detection.
    pub const FACE_MESH_POINTS: usize = 468;
}

/// A single landmark: normalized image coordinates plus relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// One detection's worth of landmarks, addressed by anatomical index.
///
/// Partial detections leave holes; [`LandmarkFrame::get`] returns `None` for
/// indices that are absent or carry non-finite coordinates.
#[derive(Debug, Clone, Default)]
pub struct LandmarkFrame {
    points: Vec<Option<Landmark>>,
}

impl LandmarkFrame {
    /// Build a frame from a dense, index-ordered point list.
    pub fn from_points(points: Vec<Landmark>) -> Self {
        Self {
            points: points.into_iter().map(Some).collect(),
        }
    }

    /// Build a frame holding only the given `(index, landmark)` pairs.
    pub fn sparse(entries: impl IntoIterator<Item = (usize, Landmark)>) -> Self {
        let mut points: Vec<Option<Landmark>> = Vec::new();
        for (idx, lm) in entries {
            if idx >= points.len() {
                points.resize(idx + 1, None);
            }
            points[idx] = Some(lm);
        }
        Self { points }
    }

    pub fn get(&self, idx: usize) -> Option<Landmark> {
        self.points
            .get(idx)
            .copied()
            .flatten()
            .filter(Landmark::is_finite)
    }

    /// Highest addressable index + 1, counting holes.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when no index holds a usable (finite) point.
    pub fn is_empty(&self) -> bool {
        self.iter().all(|p| p.is_none())
    }

    /// Points in index order; holes and non-finite points are `None`.
    pub(crate) fn iter(&self) -> impl Iterator<Item = Option<Landmark>> + '_ {
        self.points.iter().copied().map(|p| p.filter(Landmark::is_finite))
    }
}

/// Where on the face a product is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachClass {
    Ear,
    Neck,
    Nose,
}

impl AttachClass {
    /// Starting value of the user size control for this class.
    pub fn default_size_multiplier(self) -> f32 {
        match self {
            AttachClass::Ear => 0.6,
            AttachClass::Neck => 1.0,
            AttachClass::Nose => 0.3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttachClass::Ear => "ear",
            AttachClass::Neck => "neck",
            AttachClass::Nose => "nose",
        }
    }
}

impl std::fmt::Display for AttachClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Range of the user size control.
pub const SIZE_MULTIPLIER_RANGE: (f32, f32) = (0.1, 3.0);

/// Clamp a user size multiplier into [`SIZE_MULTIPLIER_RANGE`]. Non-finite
/// input resets to 1.0.
pub fn clamp_size_multiplier(value: f32) -> f32 {
    if !value.is_finite() {
        return 1.0;
    }
    value.clamp(SIZE_MULTIPLIER_RANGE.0, SIZE_MULTIPLIER_RANGE.1)
}

/// Which ear landmark an ear-class product hangs from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarSide {
    #[default]
    Left,
    Right,
}

/// Model-local rotation applied after world alignment, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationOffset {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Viewer camera hint carried alongside a preset (product viewer only).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraHint {
    pub fov: f32,
    pub position_z: f32,
}

/// Static per-product anchoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachPreset {
    pub attach: AttachClass,
    /// Scene-space offset added after the class anchor is computed.
    #[serde(default)]
    pub offset: Vec3,
    /// Multiplier on the class's computed scale.
    #[serde(default = "default_preset_scale")]
    pub scale: f32,
    #[serde(default)]
    pub rotation_offset: Option<RotationOffset>,
    #[serde(default)]
    pub side: EarSide,
    #[serde(default)]
    pub camera: Option<CameraHint>,
}

fn default_preset_scale() -> f32 {
    1.0
}

impl Default for AttachPreset {
    fn default() -> Self {
        Self {
            attach: AttachClass::Neck,
            offset: Vec3::new(0.0, -0.22, 0.0),
            scale: 1.2,
            rotation_offset: None,
            side: EarSide::Left,
            camera: None,
        }
    }
}

/// Whether orientation is tracked or only position and scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackingMode {
    /// Position, scale and head-pose orientation.
    #[default]
    Full,
    /// Degraded mode: orientation is the preset rotation offset only.
    PositionOnly,
}

impl std::str::FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(TrackingMode::Full),
            "position-only" | "position_only" | "position" => Ok(TrackingMode::PositionOnly),
            other => Err(format!("unknown tracking mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_frame_holes() {
        let frame = LandmarkFrame::sparse([(index::NOSE_TIP, Landmark::new(0.5, 0.5, 0.0))]);
        assert!(frame.get(index::NOSE_TIP).is_some());
        assert!(frame.get(0).is_none());
        assert!(frame.get(index::LEFT_EAR).is_none());
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_non_finite_landmark_is_absent() {
        let frame = LandmarkFrame::from_points(vec![Landmark::new(f32::NAN, 0.2, 0.0)]);
        assert!(frame.get(0).is_none());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_frame_with_one_finite_point_is_not_empty() {
        let frame = LandmarkFrame::from_points(vec![
            Landmark::new(f32::NAN, 0.2, 0.0),
            Landmark::new(0.5, 0.5, f32::INFINITY),
            Landmark::new(0.5, 0.5, 0.0),
        ]);
        assert!(!frame.is_empty());
        assert_eq!(frame.iter().flatten().count(), 1);
        assert_eq!(frame.len(), 3);
    }

    #[test]
    fn test_preset_toml_defaults() {
        let preset: AttachPreset = toml::from_str("attach = \"ear\"").unwrap();
        assert_eq!(preset.attach, AttachClass::Ear);
        assert_eq!(preset.scale, 1.0);
        assert_eq!(preset.offset, Vec3::ZERO);
        assert_eq!(preset.side, EarSide::Left);
        assert!(preset.rotation_offset.is_none());
    }

    #[test]
    fn test_size_multiplier_clamp() {
        assert_eq!(clamp_size_multiplier(0.0), 0.1);
        assert_eq!(clamp_size_multiplier(9.0), 3.0);
        assert_eq!(clamp_size_multiplier(f32::NAN), 1.0);
        assert_eq!(AttachClass::Nose.default_size_multiplier(), 0.3);
    }

    #[test]
    fn test_tracking_mode_parse() {
        assert_eq!("full".parse::<TrackingMode>().unwrap(), TrackingMode::Full);
        assert_eq!(
            "position-only".parse::<TrackingMode>().unwrap(),
            TrackingMode::PositionOnly
        );
        assert!("orbit".parse::<TrackingMode>().is_err());
    }
}
