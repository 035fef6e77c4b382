//! facedash-hw — Camera capture and system probes.
//!
//! Provides V4L2 colour capture (MJPG or YUYV) delivering RGB frames, and
//! a `/proc/meminfo` reader used to warn on low memory during enrollment.

pub mod camera;
pub mod frame;
pub mod meminfo;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::Frame;
