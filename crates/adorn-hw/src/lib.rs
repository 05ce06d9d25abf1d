//! adorn-hw: camera capture for the try-on session.
//!
//! Provides the camera-source abstraction the session acquires streams
//! through, a V4L2 backend, and conversion of camera pixel formats to RGB.

pub mod camera;
pub mod frame;

pub use camera::{
    CameraError, CameraSource, DeviceInfo, PixelFormat, StreamRequest, V4lCameraSource,
    V4lStream, VideoStream,
};
pub use frame::{Frame, FrameError};
