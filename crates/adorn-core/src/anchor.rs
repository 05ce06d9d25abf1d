//! Per-class anchor rules: where the product sits and how large it is.
//!
//! Every class computes a base anchor from landmarks, then the preset offset
//! is added and the scale is multiplied by the preset scale and the user size
//! control before clamping to the class range.

use crate::mapper::MappedLandmarks;
use crate::pose::head_basis;
use crate::types::{index, AttachClass, AttachPreset, EarSide};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Scale rule for one attach class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassTuning {
    /// Multiplier from scene-space face width to model scale.
    pub baseline: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl ClassTuning {
    /// Inverted ranges resolve to `max_scale` instead of panicking.
    fn scale_for(&self, face_width: f32, factor: f32) -> f32 {
        (face_width * self.baseline * factor)
            .max(self.min_scale)
            .min(self.max_scale)
    }
}

/// Tunable constants for all attach classes.
///
/// Baselines apply to scene-space distances (twice the normalized-image
/// distance), so they are half of the multipliers tuned on raw landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorTuning {
    pub ear: ClassTuning,
    pub neck: ClassTuning,
    pub nose: ClassTuning,
    /// Fraction of the way from the ear landmark toward the eye midpoint.
    pub ear_inward_bias: f32,
    /// Fraction of the way from nose tip toward chin for necklaces.
    pub neck_chin_bias: f32,
    /// Lateral nostril shift along the head x axis, as a fraction of face width.
    pub nose_lateral_shift: f32,
}

impl Default for AnchorTuning {
    fn default() -> Self {
        Self {
            ear: ClassTuning {
                baseline: 1.9,
                min_scale: 0.15,
                max_scale: 1.25,
            },
            neck: ClassTuning {
                baseline: 1.75,
                min_scale: 0.4,
                max_scale: 3.0,
            },
            nose: ClassTuning {
                baseline: 1.6,
                min_scale: 0.05,
                max_scale: 0.6,
            },
            ear_inward_bias: 0.1,
            neck_chin_bias: 0.6,
            nose_lateral_shift: 0.08,
        }
    }
}

impl AnchorTuning {
    pub fn class(&self, attach: AttachClass) -> &ClassTuning {
        match attach {
            AttachClass::Ear => &self.ear,
            AttachClass::Neck => &self.neck,
            AttachClass::Nose => &self.nose,
        }
    }
}

/// Target position and uniform scale for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorTarget {
    pub position: Vec3,
    pub scale: f32,
}

/// Resolve the anchor for `preset` on a mapped frame.
///
/// Returns `None` when a landmark the class needs is missing, so the caller
/// keeps its last valid target instead of writing a garbage one.
pub fn resolve_anchor(
    preset: &AttachPreset,
    mapped: &MappedLandmarks,
    tuning: &AnchorTuning,
    size_multiplier: f32,
) -> Option<AnchorTarget> {
    let width = face_width(mapped)?;
    let factor = preset.scale * size_multiplier;
    let class = tuning.class(preset.attach);

    let base = match preset.attach {
        AttachClass::Ear => {
            let ear_idx = match (preset.side, mapped.mirrored()) {
                (EarSide::Left, false) | (EarSide::Right, true) => index::LEFT_EAR,
                (EarSide::Right, false) | (EarSide::Left, true) => index::RIGHT_EAR,
            };
            let ear = mapped.get(ear_idx)?;
            let eye_mid = eye_midpoint(mapped)?;
            ear.lerp(eye_mid, tuning.ear_inward_bias)
        }
        AttachClass::Neck => {
            let nose = mapped.get(index::NOSE_TIP)?;
            let chin = mapped.get(index::CHIN)?;
            nose.lerp(chin, tuning.neck_chin_bias)
        }
        AttachClass::Nose => {
            let nose = mapped.get(index::NOSE_TIP)?;
            let basis = head_basis(mapped)?;
            nose + basis.x * (width * tuning.nose_lateral_shift)
        }
    };

    Some(AnchorTarget {
        position: base + preset.offset,
        scale: class.scale_for(width, factor),
    })
}

/// Scene-space face width: ear to ear, or eye corner to eye corner when an
/// ear is not tracked.
pub fn face_width(mapped: &MappedLandmarks) -> Option<f32> {
    let pair = |a: usize, b: usize| Some(mapped.get(a)?.distance(mapped.get(b)?));
    pair(index::LEFT_EAR, index::RIGHT_EAR)
        .or_else(|| pair(index::LEFT_EYE_OUTER, index::RIGHT_EYE_OUTER))
}

fn eye_midpoint(mapped: &MappedLandmarks) -> Option<Vec3> {
    let l = mapped.get(index::LEFT_EYE_OUTER)?;
    let r = mapped.get(index::RIGHT_EYE_OUTER)?;
    Some((l + r) * 0.5)
}
