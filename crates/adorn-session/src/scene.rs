//! Product geometry as seen by the session.
//!
//! The asset loader hands over a read-only [`SourceModel`] shared between
//! sessions; each session renders its own [`ModelInstance`] with a private
//! transform and visibility flag.

use adorn_core::SmoothedTransform;
use glam::{Quat, Vec3};
use std::f32::consts::TAU;
use std::sync::Arc;

/// Point-sampled product geometry in model-local units.
#[derive(Debug, Clone, PartialEq)]
pub struct PointModel {
    pub name: String,
    pub points: Vec<Vec3>,
    /// RGB color used when splatting points.
    pub color: [u8; 3],
}

impl PointModel {
    /// Procedural ring used when no product geometry is available.
    pub fn torus() -> Self {
        Self::torus_with(0.5, 0.08, 48, 8)
    }

    /// Torus in the model's XY plane with `major` and `minor` radii.
    pub fn torus_with(major: f32, minor: f32, rings: usize, sides: usize) -> Self {
        let mut points = Vec::with_capacity(rings * sides);
        for i in 0..rings {
            let u = i as f32 / rings as f32 * TAU;
            for j in 0..sides {
                let v = j as f32 / sides as f32 * TAU;
                let r = major + minor * v.cos();
                points.push(Vec3::new(r * u.cos(), r * u.sin(), minor * v.sin()));
            }
        }
        Self {
            name: "placeholder-torus".to_string(),
            points,
            color: [212, 175, 55],
        }
    }
}

/// Shared, immutable source geometry.
pub type SourceModel = Arc<PointModel>;

/// World transform of a model instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub scale: f32,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
            rotation: Quat::IDENTITY,
        }
    }
}

impl From<&SmoothedTransform> for Transform {
    fn from(s: &SmoothedTransform) -> Self {
        Self {
            position: s.position,
            scale: s.scale,
            rotation: s.rotation,
        }
    }
}

impl Transform {
    pub fn apply(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * (local * self.scale)
    }
}

/// A session's private copy of the product model.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    geometry: SourceModel,
    pub transform: Transform,
    /// Hidden until the first valid pose.
    pub visible: bool,
}

impl ModelInstance {
    /// Clone a source model for one session. The source is never mutated.
    pub fn instantiate(source: &SourceModel) -> Self {
        Self {
            geometry: Arc::clone(source),
            transform: Transform::default(),
            visible: false,
        }
    }

    pub fn geometry(&self) -> &PointModel {
        &self.geometry
    }

    /// Model points in scene space.
    pub fn world_points(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.geometry.points.iter().map(|&p| self.transform.apply(p))
    }
}
