//! Camera sources.
//!
//! A [`CameraSource`] opens a [`VideoStream`]; the session owns the stream and
//! stops it exactly once on teardown. [`V4lCameraSource`] is the V4L2 backend.

use crate::frame::{self, Frame};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const STREAM_BUFFERS: u32 = 4;
const MAX_VIDEO_NODES: u32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("permission denied opening {0}")]
    PermissionDenied(String),
    #[error("camera capture requires a secure context")]
    InsecureContext,
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("stream already stopped")]
    AlreadyStopped,
}

impl CameraError {
    /// Classify an OS error from opening `device`.
    pub fn from_open_error(device: &str, err: &std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EPERM) => Self::PermissionDenied(device.to_string()),
            Some(libc::EBUSY) => Self::DeviceBusy(device.to_string()),
            Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
                Self::DeviceNotFound(device.to_string())
            }
            _ => Self::CaptureFailed(format!("{device}: {err}")),
        }
    }
}

/// Requested capture parameters. The backend may negotiate a different size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub device: String,
    pub width: u32,
    pub height: u32,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
        }
    }
}

/// Something that can hand out a live video stream.
pub trait CameraSource: Send {
    fn open(&mut self, request: &StreamRequest) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// A live camera stream.
pub trait VideoStream: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Block until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Stop capturing and release the device. A second call returns
    /// [`CameraError::AlreadyStopped`].
    fn stop(&mut self) -> Result<(), CameraError>;
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 24-bit RGB.
    Rgb3,
    /// 24-bit BGR.
    Bgr3,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"RGB3" => Some(Self::Rgb3),
            b"BGR3" => Some(Self::Bgr3),
            _ => None,
        }
    }
}

/// V4L2 camera backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct V4lCameraSource;

impl V4lCameraSource {
    pub fn new() -> Self {
        Self
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..MAX_VIDEO_NODES {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl CameraSource for V4lCameraSource {
    fn open(&mut self, request: &StreamRequest) -> Result<Box<dyn VideoStream>, CameraError> {
        let device_path = request.device.as_str();
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path)
            .map_err(|e| CameraError::from_open_error(device_path, &e))?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = request.width;
        fmt.height = request.height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;
        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, RGB3, or BGR3)",
                negotiated.fourcc
            ))
        })?;
        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "negotiated format"
        );

        let stream = MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| match e.raw_os_error() {
                Some(libc::EBUSY) => CameraError::DeviceBusy(device_path.to_string()),
                _ => CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")),
            })?;

        Ok(Box::new(V4lStream {
            device_path: device_path.to_string(),
            width: negotiated.width,
            height: negotiated.height,
            pixel_format,
            stream: Some(stream),
            _device: device,
        }))
    }
}

/// An open V4L2 mmap stream. Dropping the inner stream turns streaming off.
pub struct V4lStream {
    device_path: String,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    stream: Option<MmapStream<'static>>,
    _device: Device,
}

/// Convert one dequeued buffer in `format` to packed RGB8.
fn convert_to_rgb(
    buf: &[u8],
    format: PixelFormat,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, CameraError> {
    let converted = match format {
        PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
        PixelFormat::Bgr3 => frame::bgr_to_rgb(buf, width, height),
        PixelFormat::Rgb3 => {
            let len = width as usize * height as usize * 3;
            if buf.len() < len {
                return Err(CameraError::CaptureFailed(format!(
                    "RGB3 buffer too short: expected {len}, got {}",
                    buf.len()
                )));
            }
            Ok(buf[..len].to_vec())
        }
    };
    converted.map_err(|e| CameraError::CaptureFailed(e.to_string()))
}

impl VideoStream for V4lStream {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (format, width, height) = (self.pixel_format, self.width, self.height);
        let stream = self.stream.as_mut().ok_or(CameraError::AlreadyStopped)?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;
        let rgb = convert_to_rgb(buf, format, width, height)?;
        Frame::new(rgb, width, height, sequence)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                tracing::info!(device = %self.device_path, "camera stream stopped");
                Ok(())
            }
            None => Err(CameraError::AlreadyStopped),
        }
    }
}
