//! Head orientation from a handful of scene-space landmarks.
//!
//! The basis is built from the outer eye corners (x), the nose-to-eye-midpoint
//! direction (approximate up) and their cross product (z). The final y axis is
//! re-derived from z and x so the basis is always orthonormal and
//! right-handed, even for noisy or collapsed input.

use crate::mapper::MappedLandmarks;
use crate::types::{index, RotationOffset};
use glam::{EulerRot, Mat3, Quat, Vec3};

/// Below this length a direction vector is treated as degenerate.
const DEGENERATE_EPS: f32 = 1e-6;

/// Orthonormal head frame in scene space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadBasis {
    pub x: Vec3,
    pub y: Vec3,
    pub z: Vec3,
}

impl HeadBasis {
    pub fn to_quat(&self) -> Quat {
        Quat::from_mat3(&Mat3::from_cols(self.x, self.y, self.z)).normalize()
    }
}

/// Build the head basis, or `None` if the eye corners or nose are missing.
///
/// The x axis runs from the eye corner shown on the viewer's left to the one
/// on the viewer's right, which swaps landmark roles when the frame is
/// mirrored. A frontal face therefore yields the identity in both modes.
pub fn head_basis(mapped: &MappedLandmarks) -> Option<HeadBasis> {
    let (left_idx, right_idx) = if mapped.mirrored() {
        (index::RIGHT_EYE_OUTER, index::LEFT_EYE_OUTER)
    } else {
        (index::LEFT_EYE_OUTER, index::RIGHT_EYE_OUTER)
    };
    let left_eye = mapped.get(left_idx)?;
    let right_eye = mapped.get(right_idx)?;
    let nose = mapped.get(index::NOSE_TIP)?;

    let eye_mid = (left_eye + right_eye) * 0.5;
    let x = normalize_or(right_eye - left_eye, Vec3::X);
    let approx_up = normalize_or(eye_mid - nose, Vec3::Y);

    let z = {
        let z = x.cross(approx_up);
        if z.length() > DEGENERATE_EPS {
            z.normalize()
        } else {
            // Up collapsed onto x: fall back to world z, orthogonalised.
            let candidate = Vec3::Z - x * x.dot(Vec3::Z);
            if candidate.length() > DEGENERATE_EPS {
                candidate.normalize()
            } else {
                x.any_orthonormal_vector()
            }
        }
    };
    let y = z.cross(x).normalize();

    Some(HeadBasis { x, y, z })
}

/// Head orientation for a mapped frame; `None` if anchor landmarks are absent.
pub fn estimate_pose(mapped: &MappedLandmarks) -> Option<Quat> {
    head_basis(mapped).map(|basis| basis.to_quat())
}

/// Right-multiply a preset's model-local rotation offset onto `orientation`.
pub fn apply_rotation_offset(orientation: Quat, offset: Option<RotationOffset>) -> Quat {
    match offset {
        Some(o) => {
            let local = Quat::from_euler(
                EulerRot::XYZ,
                o.x.to_radians(),
                o.y.to_radians(),
                o.z.to_radians(),
            );
            (orientation * local).normalize()
        }
        None => orientation,
    }
}

fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    if v.is_finite() && v.length() > DEGENERATE_EPS {
        v.normalize()
    } else {
        fallback
    }
}
