//! Framerate-independent exponential smoothing of the overlay transform.
//!
//! The blend factor for a step of `dt` seconds is
//! `k = 1 - (1 - alpha)^(max(1, dt * reference_fps))`, so the filter's time
//! constant stays fixed when detector callbacks arrive at an uneven rate.
//! Position and scale blend linearly; orientation uses slerp.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Responsiveness constants, one per smoothed quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub position_alpha: f32,
    pub scale_alpha: f32,
    pub rotation_alpha: f32,
    /// Frame rate at which `alpha` is the per-step blend.
    pub reference_fps: f32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            position_alpha: 0.22,
            scale_alpha: 0.2,
            rotation_alpha: 0.25,
            reference_fps: 60.0,
        }
    }
}

/// What the current frame's landmarks say the transform should be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseTarget {
    pub position: Vec3,
    pub scale: f32,
    pub rotation: Quat,
}

/// The interpolated transform the render loop reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedTransform {
    pub position: Vec3,
    pub scale: f32,
    pub rotation: Quat,
}

impl From<PoseTarget> for SmoothedTransform {
    fn from(t: PoseTarget) -> Self {
        Self {
            position: t.position,
            scale: t.scale,
            rotation: t.rotation,
        }
    }
}

/// Effective blend factor for a step of `dt` seconds.
pub fn blend_factor(alpha: f32, dt: f32, reference_fps: f32) -> f32 {
    let steps = (dt.max(0.0) * reference_fps).max(1.0);
    1.0 - (1.0 - alpha.clamp(0.0, 1.0)).powf(steps)
}

/// One exponential step from `current` toward `target`. Lands exactly on
/// `target` when rounding would reach or cross it.
fn approach(current: f32, target: f32, k: f32) -> f32 {
    let next = current + (target - current) * k;
    if (target - next) * (target - current) <= 0.0 {
        target
    } else {
        next
    }
}

/// Per-session smoothing state. Empty until the first target arrives.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    config: SmoothingConfig,
    current: Option<SmoothedTransform>,
    last_update: Option<Instant>,
}

impl TemporalSmoother {
    pub fn new(config: SmoothingConfig) -> Self {
        Self {
            config,
            current: None,
            last_update: None,
        }
    }

    /// Blend toward `target` over a step of `dt` seconds.
    ///
    /// The first call after construction or [`reset`](Self::reset) snaps to
    /// the target exactly.
    pub fn advance(&mut self, target: &PoseTarget, dt: f32) -> SmoothedTransform {
        let next = match self.current {
            None => SmoothedTransform::from(*target),
            Some(prev) => {
                let c = &self.config;
                let kp = blend_factor(c.position_alpha, dt, c.reference_fps);
                let ks = blend_factor(c.scale_alpha, dt, c.reference_fps);
                let kr = blend_factor(c.rotation_alpha, dt, c.reference_fps);
                SmoothedTransform {
                    position: Vec3::new(
                        approach(prev.position.x, target.position.x, kp),
                        approach(prev.position.y, target.position.y, kp),
                        approach(prev.position.z, target.position.z, kp),
                    ),
                    scale: approach(prev.scale, target.scale, ks),
                    rotation: prev.rotation.slerp(target.rotation, kr).normalize(),
                }
            }
        };
        self.current = Some(next);
        next
    }

    /// [`advance`](Self::advance) with `dt` taken from the previous update time.
    pub fn advance_at(&mut self, target: &PoseTarget, now: Instant) -> SmoothedTransform {
        let dt = self
            .last_update
            .map(|prev| now.saturating_duration_since(prev).as_secs_f32())
            .unwrap_or(0.0);
        self.last_update = Some(now);
        self.advance(target, dt)
    }

    /// Current smoothed transform; `None` before the first target.
    pub fn current(&self) -> Option<&SmoothedTransform> {
        self.current.as_ref()
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.last_update = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn target(x: f32, scale: f32, yaw: f32) -> PoseTarget {
        PoseTarget {
            position: Vec3::new(x, 0.0, 0.0),
            scale,
            rotation: Quat::from_rotation_y(yaw),
        }
    }

    #[test]
    fn test_first_update_snaps() {
        let mut s = TemporalSmoother::new(SmoothingConfig::default());
        assert!(s.current().is_none());
        let t = target(0.7, 1.3, 0.4);
        let out = s.advance(&t, 0.016);
        assert_eq!(out.position, t.position);
        assert_eq!(out.scale, t.scale);
        assert_eq!(out.rotation, t.rotation);
    }

    #[test]
    fn test_reset_snaps_again() {
        let mut s = TemporalSmoother::new(SmoothingConfig::default());
        s.advance(&target(0.0, 1.0, 0.0), 0.016);
        s.reset();
        let out = s.advance(&target(2.0, 2.0, 0.0), 0.016);
        assert_eq!(out.position.x, 2.0);
    }

    #[test]
    fn test_blend_factor_single_frame_is_alpha() {
        assert!((blend_factor(0.22, 1.0 / 60.0, 60.0) - 0.22).abs() < 1e-6);
        // dt = 0 never blends less than one reference step.
        assert!((blend_factor(0.22, 0.0, 60.0) - 0.22).abs() < 1e-6);
    }

    #[test]
    fn test_dt_normalization() {
        // One 1/30 s step equals two 1/60 s steps.
        let cfg = SmoothingConfig::default();
        let mut slow = TemporalSmoother::new(cfg);
        let mut fast = TemporalSmoother::new(cfg);
        slow.advance(&target(0.0, 1.0, 0.0), 0.0);
        fast.advance(&target(0.0, 1.0, 0.0), 0.0);

        let goal = target(1.0, 2.0, 0.0);
        let a = slow.advance(&goal, 1.0 / 30.0);
        fast.advance(&goal, 1.0 / 60.0);
        let b = fast.advance(&goal, 1.0 / 60.0);
        assert!((a.position.x - b.position.x).abs() < 1e-5);
        assert!((a.scale - b.scale).abs() < 1e-5);
    }

    #[test]
    fn test_rotation_slerps() {
        let mut s = TemporalSmoother::new(SmoothingConfig::default());
        s.advance(&target(0.0, 1.0, 0.0), 0.0);
        let out = s.advance(&target(0.0, 1.0, 1.0), 1.0 / 60.0);
        let angle = out.rotation.angle_between(Quat::IDENTITY);
        assert!((angle - 0.25).abs() < 1e-3, "angle = {angle}");
    }

    #[test]
    fn test_advance_at_uses_elapsed_time() {
        let mut s = TemporalSmoother::new(SmoothingConfig::default());
        let t0 = Instant::now();
        s.advance_at(&target(0.0, 1.0, 0.0), t0);
        let out = s.advance_at(&target(1.0, 1.0, 0.0), t0 + Duration::from_millis(50));
        let expected = blend_factor(0.22, 0.05, 60.0);
        assert!((out.position.x - expected).abs() < 1e-4);
    }

    #[test]
    fn test_converges_within_bound() {
        let mut s = TemporalSmoother::new(SmoothingConfig::default());
        s.advance(&target(0.0, 0.5, 0.0), 0.0);
        let goal = target(1.0, 1.5, 0.8);
        let mut out = s.current().copied().unwrap();
        for _ in 0..60 {
            out = s.advance(&goal, 1.0 / 60.0);
        }
        assert!((out.position.x - 1.0).abs() < 1e-3);
        assert!((out.scale - 1.5).abs() < 1e-3);
        assert!(out.rotation.angle_between(goal.rotation) < 1e-2);
    }

    #[test]
    fn test_step_does_not_cross_target() {
        let mut s = TemporalSmoother::new(SmoothingConfig::default());
        s.advance(&target(-1.6097006, 1.0, 0.0), 0.0);
        let goal = 3.5641577;
        for _ in 0..200 {
            let out = s.advance(&target(goal, 1.0, 0.0), 0.105361134);
            assert!(out.position.x <= goal);
        }
        assert_eq!(s.current().unwrap().position.x, goal);
    }

    proptest! {
        #[test]
        fn prop_monotone_without_overshoot(
            start in -5.0f32..5.0,
            goal in -5.0f32..5.0,
            dt in 0.0f32..0.2,
        ) {
            let mut s = TemporalSmoother::new(SmoothingConfig::default());
            s.advance(&target(start, start.abs() + 0.1, 0.0), 0.0);
            let t = target(goal, goal.abs() + 0.1, 0.0);
            let mut prev_pos = (start - goal).abs();
            let mut prev_scale = ((start.abs() + 0.1) - (goal.abs() + 0.1)).abs();
            let tol = f32::EPSILON * 4.0 * (1.0 + start.abs() + goal.abs());
            for _ in 0..40 {
                let out = s.advance(&t, dt);
                let d_pos = (out.position.x - goal).abs();
                let d_scale = (out.scale - t.scale).abs();
                prop_assert!(d_pos <= prev_pos + tol);
                prop_assert!(d_scale <= prev_scale + tol);
                // Never crosses to the other side of the target.
                prop_assert!((out.position.x - goal) * (start - goal) >= 0.0);
                prop_assert!((out.scale - t.scale) * (start.abs() + 0.1 - t.scale) >= 0.0);
                prev_pos = d_pos;
                prev_scale = d_scale;
            }
            prop_assert!(prev_pos <= (start - goal).abs() * 0.01 + 1e-4);
        }
    }
}
