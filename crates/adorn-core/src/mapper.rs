//! Normalized image space → overlay scene space.
//!
//! Scene space is centred on the image: x spans `[-aspect, aspect]`, y spans
//! `[-1, 1]` with +y up. When the feed is presented mirrored (selfie view) the
//! x axis is flipped for every landmark of the frame, so scene space always
//! matches what the viewer sees.

use crate::types::{Landmark, LandmarkFrame};
use glam::Vec3;

/// Map one landmark into scene space.
pub fn map_landmark(point: Landmark, camera_aspect: f32, mirrored: bool) -> Vec3 {
    let sign = if mirrored { -1.0 } else { 1.0 };
    Vec3::new(
        sign * (point.x - 0.5) * 2.0 * camera_aspect,
        -(point.y - 0.5) * 2.0,
        point.z * 2.0,
    )
}

/// Inverse of the x/y part of [`map_landmark`] for the *displayed* image.
///
/// Returns view coordinates in `[0, 1]` (u to the right, v down) of the
/// presented (possibly mirrored) video. Because mirroring is folded into the
/// scene x axis, no flag is needed here.
pub fn scene_to_view(point: Vec3, camera_aspect: f32) -> (f32, f32) {
    let aspect = if camera_aspect > 0.0 { camera_aspect } else { 1.0 };
    (0.5 + point.x / (2.0 * aspect), 0.5 - point.y / 2.0)
}

/// Per-session mapping parameters. One mapper is applied to a whole frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    pub aspect: f32,
    pub mirrored: bool,
}

impl CoordinateMapper {
    pub fn new(aspect: f32, mirrored: bool) -> Self {
        Self { aspect, mirrored }
    }

    /// Aspect ratio from frame dimensions, falling back to 1.0 on zero height.
    pub fn for_frame_size(width: u32, height: u32, mirrored: bool) -> Self {
        let aspect = if height > 0 {
            width as f32 / height as f32
        } else {
            1.0
        };
        Self::new(aspect, mirrored)
    }

    pub fn map(&self, point: Landmark) -> Vec3 {
        map_landmark(point, self.aspect, self.mirrored)
    }

    pub fn map_frame(&self, frame: &LandmarkFrame) -> MappedLandmarks {
        MappedLandmarks {
            points: frame.iter().map(|p| p.map(|lm| self.map(lm))).collect(),
            mirrored: self.mirrored,
        }
    }
}

/// A landmark frame in scene space, all points mapped with the same flags.
#[derive(Debug, Clone, Default)]
pub struct MappedLandmarks {
    points: Vec<Option<Vec3>>,
    mirrored: bool,
}

impl MappedLandmarks {
    pub fn get(&self, idx: usize) -> Option<Vec3> {
        self.points.get(idx).copied().flatten()
    }

    /// Whether the x axis was flipped for this frame.
    pub fn mirrored(&self) -> bool {
        self.mirrored
    }
}
