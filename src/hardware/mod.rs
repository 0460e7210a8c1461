//! Camera Hardware Layer
//!
//! GenICam node access, the camera SDK seam, and the mock SDK used for
//! testing and SDK-less operation.

pub mod camera_adapter;
pub mod mock_camera;
pub mod node_map;
pub mod nodes;

pub use camera_adapter::{
    CameraDevice, CameraSystem, PixelFormat, RawFrame, SdkImage, IMAGE_STATUS_OK,
};
pub use mock_camera::{MockCamera, MockControls, MockSystem, SystemControls, TestPattern};
pub use node_map::{FloatRange, IntRange, NodeAccess, NodeAccessor, NodeMap};
