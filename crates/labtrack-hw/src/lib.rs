//! labtrack-hw — V4L2 camera capture and hardware capability probing.

pub mod camera;
pub mod capability;
pub mod frame;

pub use camera::{Camera, CameraError, FrameSource, PixelFormat};
pub use capability::{probe_with_cache, CapabilitySnapshot};
pub use frame::Frame;
