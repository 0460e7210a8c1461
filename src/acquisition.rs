//! Acquisition session: device lifecycle and frame capture.
//!
//! ```text
//! Closed --open()--> Initialized --start()--> Streaming
//!   ^                   |   ^                    |
//!   +------close()------+   +------stop()--------+
//! ```
//!
//! `open` acquires every detected camera and applies the default settings:
//! newest-only stream buffering, front-light auto exposure, Polarized8 at
//! full sensor size, continuous acquisition. `close` de-initializes every
//! device and releases the system instance exactly once. It also runs on drop.
//!
//! The session does no internal locking: exactly one thread drives a session
//! at a time (see [`crate::capture_worker`]).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{CameraError, CameraResult};
use crate::hardware::camera_adapter::{CameraDevice, CameraSystem, RawFrame};
use crate::hardware::node_map::NodeAccessor;
use crate::hardware::nodes::{self, entries};

/// Default slack added to the exposure time when waiting for a frame.
pub const DEFAULT_TIMEOUT_MARGIN: Duration = Duration::from_millis(1000);

/// Lifecycle of an [`AcquisitionSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Cameras deinitialized and the system released
    Closed,
    /// Cameras initialized and configured, not streaming
    Initialized,
    /// Acquisition running on every camera
    Streaming,
}

/// Behavior of `start` on a device that is already streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Log a warning and keep streaming
    #[default]
    Ignore,
    /// Fail with [`CameraError::AlreadyStreaming`]
    Error,
}

/// Tunables applied when opening and grabbing.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Added to the exposure time to get the grab timeout
    pub timeout_margin: Duration,
    pub start_policy: StartPolicy,
    /// `AutoExposureLightingMode` entry applied at open, if any
    pub lighting_mode: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_margin: DEFAULT_TIMEOUT_MARGIN,
            start_policy: StartPolicy::default(),
            lighting_mode: Some(entries::FRONTLIGHT.to_string()),
        }
    }
}

/// Frame timeout: exposure converted to milliseconds plus `margin`.
pub fn grab_timeout(exposure_us: f64, margin: Duration) -> Duration {
    Duration::from_millis((exposure_us.max(0.0) / 1000.0) as u64) + margin
}

/// Serve the most recent frame and drop stale buffers.
pub fn configure_stream(stream: &mut NodeAccessor<'_>) -> CameraResult<()> {
    stream.set_enum_entry(nodes::STREAM_BUFFER_HANDLING_MODE, entries::NEWEST_ONLY)?;
    info!("Stream buffer handling mode set to NewestOnly");
    Ok(())
}

/// Polarized8 at full sensor size in continuous mode.
///
/// Width and height are skipped with a warning when locked.
pub fn configure_acquisition_control(accessor: &mut NodeAccessor<'_>) -> CameraResult<()> {
    accessor.set_enum_entry(nodes::PIXEL_FORMAT, entries::POLARIZED8)?;
    info!("Pixel format set to Polarized8");

    for node in [nodes::WIDTH, nodes::HEIGHT] {
        if !accessor.is_read_write(node) {
            warn!(node, "Not readable or writable, keeping current value");
            continue;
        }
        let max = accessor.int_range(node)?.max;
        accessor.set_int(node, max)?;
        info!(node, value = max, "Set to sensor maximum");
    }

    accessor.set_enum_entry(nodes::ACQUISITION_MODE, entries::CONTINUOUS)?;
    info!("Acquisition mode set to continuous");
    Ok(())
}

/// Best effort: models without the lighting-mode node keep their default.
pub fn apply_lighting_mode(accessor: &mut NodeAccessor<'_>, mode: &str) {
    match accessor.set_enum_entry(nodes::AUTO_EXPOSURE_LIGHTING_MODE, mode) {
        Ok(()) => info!(mode, "Auto exposure lighting mode set"),
        Err(err) if err.is_unsupported() => {
            debug!(mode, %err, "Auto exposure lighting mode not supported")
        }
        Err(err) => warn!(mode, %err, "Unable to set auto exposure lighting mode"),
    }
}

/// Owns the camera system and every acquired device.
///
/// Opening initializes each camera and applies continuous acquisition with
/// newest-only buffering. Frames are grabbed from the first device only.
/// [`AcquisitionSession::close`] (also run on drop) stops acquisition,
/// deinitializes the cameras and releases the system exactly once.
pub struct AcquisitionSession {
    system: Option<Box<dyn CameraSystem>>,
    devices: Vec<Box<dyn CameraDevice>>,
    settings: SessionSettings,
    state: SessionState,
}

impl AcquisitionSession {
    /// Acquire all cameras from `system` and apply the default settings.
    ///
    /// With no camera attached the system is released before returning
    /// [`CameraError::NoDeviceFound`].
    pub fn open(mut system: Box<dyn CameraSystem>, settings: SessionSettings) -> CameraResult<Self> {
        info!(version = %system.library_version(), "Camera system acquired");

        let devices = match system.cameras() {
            Ok(devices) => devices,
            Err(err) => {
                if let Err(release_err) = system.release() {
                    warn!(%release_err, "Failed to release camera system");
                }
                return Err(err);
            }
        };
        info!(count = devices.len(), "Cameras detected");

        if devices.is_empty() {
            error!("No cameras detected");
            if let Err(release_err) = system.release() {
                warn!(%release_err, "Failed to release camera system");
            }
            return Err(CameraError::NoDeviceFound);
        }

        let mut session = Self {
            system: Some(system),
            devices,
            settings,
            state: SessionState::Closed,
        };
        for index in 0..session.devices.len() {
            if let Err(err) = session.init_device(index) {
                error!(%err, "Camera initialization failed");
                if let Err(close_err) = session.close() {
                    warn!(%close_err, "Cleanup after failed initialization incomplete");
                }
                return Err(err);
            }
        }
        session.state = SessionState::Initialized;
        Ok(session)
    }

    fn init_device(&mut self, index: usize) -> CameraResult<()> {
        let settings = &self.settings;
        let device = &mut self.devices[index];
        device.init()?;

        configure_stream(&mut NodeAccessor::new(device.stream_node_map()))?;

        let mut accessor = NodeAccessor::new(device.node_map());
        if let Some(mode) = &settings.lighting_mode {
            apply_lighting_mode(&mut accessor, mode);
        }
        configure_acquisition_control(&mut accessor)?;

        info!(serial = %device.serial(), "Camera initialized");
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Serial numbers in acquisition order.
    pub fn serials(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.serial()).collect()
    }

    /// All acquired devices. Sequencer programming applies to each of them.
    pub fn devices_mut(&mut self) -> &mut [Box<dyn CameraDevice>] {
        &mut self.devices
    }

    /// The device frames are grabbed from.
    pub fn primary(&mut self) -> CameraResult<&mut dyn CameraDevice> {
        match self.devices.first_mut() {
            Some(device) => Ok(device.as_mut()),
            None => Err(CameraError::InvalidState("session is closed".to_string())),
        }
    }

    /// Begin acquisition on every camera.
    ///
    /// A camera that is already streaming is handled per [`StartPolicy`].
    pub fn start(&mut self) -> CameraResult<()> {
        if self.state == SessionState::Closed {
            return Err(CameraError::InvalidState("session is closed".to_string()));
        }
        for device in &mut self.devices {
            if device.is_streaming() {
                match self.settings.start_policy {
                    StartPolicy::Ignore => {
                        warn!(serial = %device.serial(), "Acquisition already running, ignoring start");
                        continue;
                    }
                    StartPolicy::Error => {
                        return Err(CameraError::AlreadyStreaming {
                            serial: device.serial(),
                        });
                    }
                }
            }
            device.begin_acquisition()?;
            info!(serial = %device.serial(), "Acquisition started");
        }
        self.state = SessionState::Streaming;
        Ok(())
    }

    /// End streaming on every device. Stopping an idle session is a no-op.
    pub fn stop(&mut self) -> CameraResult<()> {
        let mut result = Ok(());
        for device in &mut self.devices {
            if !device.is_streaming() {
                continue;
            }
            match device.end_acquisition() {
                Ok(()) => info!(serial = %device.serial(), "Acquisition stopped"),
                Err(err) => {
                    error!(serial = %device.serial(), %err, "Failed to stop acquisition");
                    if result.is_ok() {
                        result = Err(err);
                    }
                }
            }
        }
        if self.state == SessionState::Streaming {
            self.state = SessionState::Initialized;
        }
        result
    }

    /// Next complete frame, deep-copied out of the SDK buffer.
    ///
    /// An incomplete transfer yields `Ok(None)`.
    pub fn grab(&mut self) -> CameraResult<Option<RawFrame>> {
        let margin = self.settings.timeout_margin;
        let device = self.primary()?;
        if !device.is_streaming() {
            return Err(CameraError::InvalidState(
                "acquisition has not been started".to_string(),
            ));
        }

        let exposure_us = NodeAccessor::new(device.node_map()).float_value(nodes::EXPOSURE_TIME)?;
        let timeout = grab_timeout(exposure_us, margin);

        let image = device.next_image(timeout)?;
        if let Err(err) = image.check_complete() {
            warn!(%err, "Discarding image");
            return Ok(None);
        }
        let frame = image.deep_copy();
        debug!(
            frame_id = frame.frame_id,
            width = frame.width,
            height = frame.height,
            "Frame grabbed"
        );
        Ok(Some(frame))
    }

    /// Up to `count` frames in capture order; stops at the first failed or
    /// incomplete grab.
    pub fn grab_sequence(&mut self, count: usize) -> Vec<RawFrame> {
        // count is caller-controlled, grow with the frames actually grabbed
        let mut frames = Vec::new();
        for index in 0..count {
            match self.grab() {
                Ok(Some(frame)) => {
                    debug!(index, "Grabbed sequence image");
                    frames.push(frame);
                }
                Ok(None) => {
                    warn!(index, "Sequence truncated by incomplete frame");
                    break;
                }
                Err(err) => {
                    warn!(index, %err, "Sequence truncated");
                    break;
                }
            }
        }
        frames
    }

    /// De-initialize every device and release the system instance.
    ///
    /// Safe to call repeatedly; only the first call releases anything.
    pub fn close(&mut self) -> CameraResult<()> {
        let mut first_err = None;
        for mut device in self.devices.drain(..) {
            if device.is_streaming() {
                if let Err(err) = device.end_acquisition() {
                    warn!(%err, "Failed to end acquisition during close");
                    first_err.get_or_insert(err);
                }
            }
            if let Err(err) = device.deinit() {
                warn!(%err, "Failed to de-initialize camera");
                first_err.get_or_insert(err);
            }
        }
        if let Some(mut system) = self.system.take() {
            match system.release() {
                Ok(()) => info!("Camera system released"),
                Err(err) => {
                    error!(%err, "Failed to release camera system");
                    first_err.get_or_insert(err);
                }
            }
        }
        self.state = SessionState::Closed;
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for AcquisitionSession {
    fn drop(&mut self) {
        if self.system.is_some() {
            if let Err(err) = self.close() {
                warn!(%err, "Error closing acquisition session on drop");
            }
        }
    }
}
