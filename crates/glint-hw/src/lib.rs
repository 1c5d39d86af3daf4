//! glint-hw — Hardware abstraction for color camera capture.
//!
//! Provides V4L2-based camera access and conversion of YUYV, MJPG and
//! RGB3 buffers into packed RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::Frame;
