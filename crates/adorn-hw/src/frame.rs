//! Frame type and pixel conversion: YUYV and BGR to packed RGB8.

/// A captured color camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB8 pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Build a frame, checking the buffer length against the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = rgb_len(width, height);
        if data.len() < expected {
            return Err(FrameError::InvalidLength {
                format: "RGB",
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    /// Uniformly colored frame.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(rgb_len(width, height))
            .collect();
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    /// Width divided by height; 1.0 for an empty frame.
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }

    /// RGB triple at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data.get(i..i + 3).map(|p| [p[0], p[1], p[2]])
    }
}

fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Convert packed YUYV (4:2:2) to RGB8 with BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share the
/// chroma pair.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "YUYV",
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(rgb_len(width, height));
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

/// Swap BGR24 into RGB8.
pub fn bgr_to_rgb(bgr: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = rgb_len(width, height);
    if bgr.len() < expected {
        return Err(FrameError::InvalidLength {
            format: "BGR3",
            expected,
            actual: bgr.len(),
        });
    }
    Ok(bgr[..expected]
        .chunks_exact(3)
        .flat_map(|p| [p[2], p[1], p[0]])
        .collect())
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as f32 - 16.0) * 1.164;
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    let to_u8 = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        to_u8(c + 1.596 * e),
        to_u8(c - 0.392 * d - 0.813 * e),
        to_u8(c + 2.017 * d),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid {format} length: expected {expected}, got {actual}")]
    InvalidLength {
        format: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_stays_gray() {
        // 2x1 image, neutral chroma: both pixels gray.
        let yuyv = vec![126, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        assert!(rgb[0] == rgb[1] && rgb[1] == rgb[2]);
        assert_eq!(&rgb[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_yuyv_black_and_red() {
        let black = yuyv_to_rgb(&[16, 128, 16, 128], 2, 1).unwrap();
        assert_eq!(black, vec![0; 6]);
        // Pure red in BT.601: Y=81, U=90, V=240.
        let red = yuyv_to_rgb(&[81, 90, 81, 240], 2, 1).unwrap();
        assert!(red[0] > 250 && red[1] < 5 && red[2] < 5, "{red:?}");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_rgb(&[100, 128], 2, 1);
        assert!(matches!(
            result,
            Err(FrameError::InvalidLength { expected: 4, actual: 2, .. })
        ));
    }

    #[test]
    fn test_bgr_swap() {
        let rgb = bgr_to_rgb(&[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(rgb, vec![3, 2, 1, 6, 5, 4]);
        assert!(bgr_to_rgb(&[1, 2], 1, 1).is_err());
    }

    #[test]
    fn test_frame_accessors() {
        let f = Frame::solid(4, 3, [10, 20, 30]);
        assert_eq!(f.data.len(), 36);
        assert!((f.aspect() - 4.0 / 3.0).abs() < 1e-6);
        assert_eq!(f.pixel(3, 2), Some([10, 20, 30]));
        assert_eq!(f.pixel(4, 0), None);
        assert!(Frame::new(vec![0; 5], 2, 1, 0).is_err());
    }
}
