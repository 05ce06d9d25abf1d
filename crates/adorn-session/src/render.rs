//! Overlay rendering: video frame plus product model composited onto one canvas.
//!
//! [`SoftwareCompositor`] draws into an in-memory RGBA canvas. The video is
//! flipped horizontally when the session is mirrored; model points are
//! projected through the same scene space the landmarks were mapped into, so
//! they land on the displayed face without a second flip.

use crate::scene::ModelInstance;
use adorn_core::mapper::scene_to_view;
use adorn_hw::Frame;
use image::{Rgba, RgbaImage};
use std::path::Path;
use thiserror::Error;

/// Half-size of the square splat drawn per model point, in pixels.
const SPLAT_RADIUS: i64 = 1;
const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("cannot create renderer: {0}")]
    Create(String),
    #[error("renderer already disposed")]
    Disposed,
    #[error("nothing rendered yet")]
    Empty,
    #[error("snapshot failed: {0}")]
    Snapshot(#[from] image::ImageError),
}

/// Canvas parameters for a new renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub width: u32,
    pub height: u32,
    pub mirrored: bool,
}

impl RenderTarget {
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// A renderer owned by one session.
pub trait OverlayRenderer: Send {
    /// Draw the latest video frame (if any) and the model (if visible).
    fn render(&mut self, video: Option<&Frame>, model: &ModelInstance) -> Result<(), RenderError>;

    /// Write the last composited canvas as an image file.
    fn snapshot(&self, path: &Path) -> Result<(), RenderError>;

    /// Release the renderer. Later calls to `render` fail.
    fn dispose(&mut self) -> Result<(), RenderError>;
}

pub trait RendererFactory: Send {
    fn create(&mut self, target: RenderTarget) -> Result<Box<dyn OverlayRenderer>, RenderError>;
}

/// CPU compositor backed by an [`RgbaImage`].
pub struct SoftwareCompositor {
    target: RenderTarget,
    canvas: RgbaImage,
    frames: u64,
    disposed: bool,
}

impl SoftwareCompositor {
    pub fn new(target: RenderTarget) -> Result<Self, RenderError> {
        if target.width == 0 || target.height == 0 {
            return Err(RenderError::Create(format!(
                "invalid canvas size {}x{}",
                target.width, target.height
            )));
        }
        Ok(Self {
            target,
            canvas: RgbaImage::from_pixel(target.width, target.height, BACKGROUND),
            frames: 0,
            disposed: false,
        })
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    fn draw_video(&mut self, video: &Frame) {
        let (cw, ch) = (self.target.width, self.target.height);
        if video.width == 0 || video.height == 0 {
            return;
        }
        for y in 0..ch {
            let sy = (y as u64 * video.height as u64 / ch as u64) as u32;
            for x in 0..cw {
                let dx = if self.target.mirrored { cw - 1 - x } else { x };
                let sx = (dx as u64 * video.width as u64 / cw as u64) as u32;
                if let Some([r, g, b]) = video.pixel(sx, sy) {
                    self.canvas.put_pixel(x, y, Rgba([r, g, b, 255]));
                }
            }
        }
    }

    fn draw_model(&mut self, model: &ModelInstance) {
        let aspect = self.target.aspect();
        let (w, h) = (self.target.width as i64, self.target.height as i64);
        let [r, g, b] = model.geometry().color;
        let color = Rgba([r, g, b, 255]);

        for point in model.world_points() {
            let (u, v) = scene_to_view(point, aspect);
            if !u.is_finite() || !v.is_finite() {
                continue;
            }
            let cx = (u * w as f32) as i64;
            let cy = (v * h as f32) as i64;
            for py in cy - SPLAT_RADIUS..=cy + SPLAT_RADIUS {
                for px in cx - SPLAT_RADIUS..=cx + SPLAT_RADIUS {
                    if (0..w).contains(&px) && (0..h).contains(&py) {
                        self.canvas.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
    }
}

impl OverlayRenderer for SoftwareCompositor {
    fn render(&mut self, video: Option<&Frame>, model: &ModelInstance) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        match video {
            Some(frame) => self.draw_video(frame),
            None => self.canvas.pixels_mut().for_each(|p| *p = BACKGROUND),
        }
        if model.visible {
            self.draw_model(model);
        }
        self.frames += 1;
        Ok(())
    }

    fn snapshot(&self, path: &Path) -> Result<(), RenderError> {
        if self.frames == 0 {
            return Err(RenderError::Empty);
        }
        self.canvas.save(path)?;
        tracing::info!(path = %path.display(), "snapshot saved");
        Ok(())
    }

    fn dispose(&mut self) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        self.disposed = true;
        tracing::debug!(frames = self.frames, "compositor disposed");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareRendererFactory;

impl RendererFactory for SoftwareRendererFactory {
    fn create(&mut self, target: RenderTarget) -> Result<Box<dyn OverlayRenderer>, RenderError> {
        Ok(Box::new(SoftwareCompositor::new(target)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{PointModel, SourceModel};
    use glam::Vec3;
    use std::sync::Arc;

    fn target(mirrored: bool) -> RenderTarget {
        RenderTarget {
            width: 40,
            height: 30,
            mirrored,
        }
    }

    fn single_point_model() -> SourceModel {
        Arc::new(PointModel {
            name: "dot".into(),
            points: vec![Vec3::ZERO],
            color: [0, 255, 0],
        })
    }

    fn half_red_frame() -> Frame {
        // Left half red, right half blue.
        let (w, h) = (40u32, 30u32);
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for _ in 0..h {
            for x in 0..w {
                data.extend_from_slice(if x < w / 2 { &[255u8, 0, 0] } else { &[0u8, 0, 255] });
            }
        }
        Frame::new(data, w, h, 0).unwrap()
    }

    #[test]
    fn test_video_is_mirrored() {
        let model = crate::scene::ModelInstance::instantiate(&single_point_model());
        let frame = half_red_frame();

        let mut plain = SoftwareCompositor::new(target(false)).unwrap();
        plain.render(Some(&frame), &model).unwrap();
        assert_eq!(plain.canvas().get_pixel(0, 0), &Rgba([255, 0, 0, 255]));

        let mut mirror = SoftwareCompositor::new(target(true)).unwrap();
        mirror.render(Some(&frame), &model).unwrap();
        assert_eq!(mirror.canvas().get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_hidden_model_not_drawn() {
        let mut model = crate::scene::ModelInstance::instantiate(&single_point_model());
        let mut r = SoftwareCompositor::new(target(false)).unwrap();

        r.render(None, &model).unwrap();
        assert_eq!(r.canvas().get_pixel(20, 15), &BACKGROUND);

        model.visible = true;
        r.render(None, &model).unwrap();
        assert_eq!(r.canvas().get_pixel(20, 15), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_dispose_stops_rendering() {
        let model = crate::scene::ModelInstance::instantiate(&single_point_model());
        let mut r = SoftwareCompositor::new(target(false)).unwrap();
        r.dispose().unwrap();
        assert!(matches!(r.render(None, &model), Err(RenderError::Disposed)));
        assert!(matches!(r.dispose(), Err(RenderError::Disposed)));
    }

    #[test]
    fn test_snapshot_requires_a_frame() {
        let r = SoftwareCompositor::new(target(false)).unwrap();
        let path = std::env::temp_dir().join("adorn-empty-snapshot.png");
        assert!(matches!(r.snapshot(&path), Err(RenderError::Empty)));
    }

    #[test]
    fn test_snapshot_writes_png() {
        let model = crate::scene::ModelInstance::instantiate(&single_point_model());
        let mut r = SoftwareCompositor::new(target(true)).unwrap();
        r.render(Some(&half_red_frame()), &model).unwrap();
        let path = std::env::temp_dir().join(format!("adorn-snap-{}.png", std::process::id()));
        r.snapshot(&path).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        assert_eq!(back.dimensions(), (40, 30));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_zero_canvas_rejected() {
        let t = RenderTarget {
            width: 0,
            height: 10,
            mirrored: false,
        };
        assert!(matches!(SoftwareCompositor::new(t), Err(RenderError::Create(_))));
    }
}
