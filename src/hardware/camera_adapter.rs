//! Camera SDK adapter traits.
//!
//! Lightweight seam over the vendor machine-vision SDK. A [`CameraSystem`] is
//! the process-wide SDK instance that enumerates devices; each
//! [`CameraDevice`] owns its node maps and its capture stream.
//!
//! Frames come back as an [`SdkImage`] that borrows the SDK's internal buffer.
//! The buffer is recycled by the next capture call, so callers take a
//! [`SdkImage::deep_copy`] before asking for another image.

use std::time::Duration;

use crate::error::{CameraError, CameraResult};
use crate::hardware::node_map::NodeMap;
use crate::hardware::nodes::entries;

/// Pixel layouts this crate understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit samples behind a 2x2 on-chip polarizer mosaic (90°/45° over 135°/0°).
    Polarized8,
    /// 8-bit monochrome.
    Mono8,
}

impl PixelFormat {
    /// GenICam entry name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::Polarized8 => entries::POLARIZED8,
            PixelFormat::Mono8 => entries::MONO8,
        }
    }

    /// Parse a `PixelFormat` entry name.
    pub fn from_symbolic(name: &str) -> CameraResult<Self> {
        match name {
            entries::POLARIZED8 => Ok(PixelFormat::Polarized8),
            entries::MONO8 => Ok(PixelFormat::Mono8),
            other => Err(CameraError::UnsupportedPixelFormat(other.to_string())),
        }
    }
}

/// Image status reported for a fully transferred frame.
pub const IMAGE_STATUS_OK: i32 = 0;

/// Frame still owned by the SDK.
#[derive(Debug)]
pub struct SdkImage<'a> {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Device frame counter
    pub frame_id: u64,
    /// Software timestamp (nanoseconds since the Unix epoch)
    pub timestamp_ns: i64,
    /// Transport status; anything other than [`IMAGE_STATUS_OK`] means missing data
    pub status: i32,
    pub data: &'a [u8],
}

impl SdkImage<'_> {
    pub fn is_incomplete(&self) -> bool {
        self.status != IMAGE_STATUS_OK
    }

    /// [`CameraError::IncompleteFrame`] unless the transfer completed.
    pub fn check_complete(&self) -> CameraResult<()> {
        if self.is_incomplete() {
            return Err(CameraError::IncompleteFrame {
                status: self.status,
            });
        }
        Ok(())
    }

    /// Copy the frame out of the SDK buffer.
    pub fn deep_copy(&self) -> RawFrame {
        RawFrame {
            width: self.width,
            height: self.height,
            pixel_format: self.pixel_format,
            frame_id: self.frame_id,
            timestamp_ns: self.timestamp_ns,
            data: self.data.to_vec(),
        }
    }
}

/// Owned sensor frame, row-major, one byte per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    /// Device frame counter
    pub frame_id: u64,
    /// Nanoseconds since the Unix epoch
    pub timestamp_ns: i64,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Sample at column `x`, row `y`.
    pub fn sample(&self, x: u32, y: u32) -> u8 {
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Mean sample value, used for exposure diagnostics.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&v| v as u64).sum();
        sum as f64 / self.data.len() as f64
    }
}

/// One physical camera.
///
/// Property access is only valid between [`init`](Self::init) and
/// [`deinit`](Self::deinit).
pub trait CameraDevice: Send {
    /// Device serial number
    fn serial(&self) -> String;

    fn init(&mut self) -> CameraResult<()>;
    fn deinit(&mut self) -> CameraResult<()>;
    fn is_initialized(&self) -> bool;

    /// GenICam device node map
    fn node_map(&mut self) -> &mut dyn NodeMap;

    /// Transport-layer stream node map (buffer handling)
    fn stream_node_map(&mut self) -> &mut dyn NodeMap;

    fn begin_acquisition(&mut self) -> CameraResult<()>;
    fn end_acquisition(&mut self) -> CameraResult<()>;
    fn is_streaming(&self) -> bool;

    /// Block for up to `timeout` waiting for the next frame.
    fn next_image(&mut self, timeout: Duration) -> CameraResult<SdkImage<'_>>;
}

/// Process-wide SDK instance.
pub trait CameraSystem: Send {
    /// SDK version as `major.minor.type.build`
    fn library_version(&self) -> String;

    /// Enumerate connected cameras. Each device is handed out once.
    fn cameras(&mut self) -> CameraResult<Vec<Box<dyn CameraDevice>>>;

    /// Release the SDK instance. Every device must be de-initialized first.
    fn release(&mut self) -> CameraResult<()>;
}
