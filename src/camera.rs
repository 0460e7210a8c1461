//! Polarization camera facade.
//!
//! [`PolarCam`] is the object the CLI and the capture worker talk to. It owns
//! an [`AcquisitionSession`] and layers the sequencer protocol, frame
//! decomposition and the live exposure/gain/frame-rate controls on top.
//!
//! Sequencer programming, reset and preview configuration apply to every
//! acquired camera. Frames and live controls use the primary (first) camera.

use image::GrayImage;
use tracing::{info, warn};

use crate::acquisition::{
    configure_acquisition_control, AcquisitionSession, SessionSettings, SessionState,
};
use crate::error::CameraResult;
use crate::hardware::camera_adapter::{CameraSystem, RawFrame};
use crate::hardware::node_map::NodeAccessor;
use crate::hardware::nodes::{self, entries};
use crate::polarization::{self, CompositeKind, DecomposedFrame};
use crate::sequencer::{self, ClampPolicy, ProgrammedState, SequenceStep};

/// Default cap for the exposure slider, in microseconds.
pub const DEFAULT_EXPOSURE_CEILING_US: f64 = 500_000.0;

/// Everything [`PolarCam`] needs besides the SDK itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PolarCamSettings {
    pub session: SessionSettings,
    /// Fitting of requested exposure and gain to the node limits
    pub clamp_policy: ClampPolicy,
    /// Composite shown in the normalized panel slot
    pub composite: CompositeKind,
    /// Upper end of the exposure slider; the node maximum applies if lower
    pub exposure_ceiling_us: f64,
}

impl Default for PolarCamSettings {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            clamp_policy: ClampPolicy::default(),
            composite: CompositeKind::default(),
            exposure_ceiling_us: DEFAULT_EXPOSURE_CEILING_US,
        }
    }
}

/// Range and current value of a float node at refresh time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
    /// Node minimum
    pub min: f64,
    /// Node maximum
    pub max: f64,
    /// Value read at refresh
    pub current: f64,
}

/// Snapshot of the exposure, gain and frame-rate limits.
///
/// Values only change on [`CameraLimits::refresh`]. A `None` entry means the
/// node was not readable at the time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraLimits {
    /// `ExposureTime`, microseconds
    pub exposure_us: Option<Limit>,
    /// `Gain`, dB
    pub gain_db: Option<Limit>,
    /// `AcquisitionFrameRate`, frames per second
    pub fps: Option<Limit>,
}

impl CameraLimits {
    /// Read all three limits. Unreadable nodes become `None`.
    pub fn read(accessor: &NodeAccessor<'_>) -> Self {
        Self {
            exposure_us: read_limit(accessor, nodes::EXPOSURE_TIME),
            gain_db: read_limit(accessor, nodes::GAIN),
            fps: read_limit(accessor, nodes::ACQUISITION_FRAME_RATE),
        }
    }

    pub fn refresh(&mut self, accessor: &NodeAccessor<'_>) {
        *self = Self::read(accessor);
    }
}

fn read_limit(accessor: &NodeAccessor<'_>, node: &str) -> Option<Limit> {
    let range = accessor.float_range(node).ok()?;
    let current = accessor.float_value(node).ok()?;
    Some(Limit {
        min: range.min,
        max: range.max,
        current,
    })
}

/// Map a 0..=100 slider position linearly onto `[min, max]`.
pub fn slider_value(step: f64, min: f64, max: f64) -> f64 {
    min + step.clamp(0.0, 100.0) / 100.0 * (max - min)
}

/// High-level polarization camera.
///
/// Wraps an [`AcquisitionSession`] and adds sequencer programming, the
/// Polarized8 decomposition and cached node limits for the controls.
pub struct PolarCam {
    session: AcquisitionSession,
    settings: PolarCamSettings,
    library_version: String,
    limits: CameraLimits,
}

impl PolarCam {
    /// Open every camera of `system` and read the initial limits.
    pub fn open(system: Box<dyn CameraSystem>, settings: PolarCamSettings) -> CameraResult<Self> {
        let library_version = system.library_version();
        let session = AcquisitionSession::open(system, settings.session.clone())?;
        let mut camera = Self {
            session,
            settings,
            library_version,
            limits: CameraLimits::default(),
        };
        camera.refresh_limits()?;
        Ok(camera)
    }

    pub fn library_version(&self) -> &str {
        &self.library_version
    }

    pub fn serials(&self) -> Vec<String> {
        self.session.serials()
    }

    pub fn settings(&self) -> &PolarCamSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Limits as of the last refresh.
    pub fn limits(&self) -> &CameraLimits {
        &self.limits
    }

    /// Re-read exposure, gain and frame-rate limits from the primary camera.
    pub fn refresh_limits(&mut self) -> CameraResult<&CameraLimits> {
        let device = self.session.primary()?;
        self.limits.refresh(&NodeAccessor::new(device.node_map()));
        Ok(&self.limits)
    }

    /// Program `steps` into the sequencer of every camera and start it.
    ///
    /// Switches to Polarized8 first when the pixel format is writable. Stops
    /// at the first failing camera without rolling anything back.
    pub fn configure_image_sequence(
        &mut self,
        steps: &[SequenceStep],
    ) -> CameraResult<Vec<ProgrammedState>> {
        let clamp = self.settings.clamp_policy;
        let mut programmed = Vec::new();
        for device in self.session.devices_mut() {
            let mut accessor = NodeAccessor::new(device.node_map());
            set_polarized8(&mut accessor);
            programmed = sequencer::configure_sequence(&mut accessor, steps, clamp)?;
        }
        Ok(programmed)
    }

    pub fn start_acquisition(&mut self) -> CameraResult<()> {
        self.session.start()
    }

    pub fn stop_acquisition(&mut self) -> CameraResult<()> {
        self.session.stop()
    }

    /// Next complete frame, or `None` if the transfer was incomplete.
    pub fn grab_image(&mut self) -> CameraResult<Option<RawFrame>> {
        self.session.grab()
    }

    /// Up to `count` frames, truncated at the first failed grab.
    pub fn grab_sequence(&mut self, count: usize) -> Vec<RawFrame> {
        self.session.grab_sequence(count)
    }

    /// Four orientations plus the configured normalized composite and the
    /// glare-reduced composite.
    pub fn grab_all_polarized_image(&self, frame: &RawFrame) -> CameraResult<DecomposedFrame> {
        polarization::decompose(frame, self.settings.composite)
    }

    /// Tile six equally sized images into the 2x3 display panel.
    pub fn append_images_to_panel(
        i0: &GrayImage,
        i45: &GrayImage,
        i90: &GrayImage,
        i135: &GrayImage,
        normalized: &GrayImage,
        glare_reduced: &GrayImage,
    ) -> CameraResult<GrayImage> {
        polarization::tile_panel(i0, i45, i90, i135, normalized, glare_reduced)
    }

    /// Stop the sequencer, restore the auto loops and re-apply the default
    /// acquisition control on every camera.
    pub fn reset_sequencer(&mut self) -> CameraResult<()> {
        for device in self.session.devices_mut() {
            let mut accessor = NodeAccessor::new(device.node_map());
            sequencer::reset_sequencer(&mut accessor)?;
            configure_acquisition_control(&mut accessor)?;
        }
        self.refresh_limits()?;
        Ok(())
    }

    /// Free-running Polarized8 preview: sequencer off, pixel format forced.
    ///
    /// Cameras where either node is locked are skipped with a warning.
    pub fn configure_polarized8_preview(&mut self) {
        for device in self.session.devices_mut() {
            let serial = device.serial();
            let mut accessor = NodeAccessor::new(device.node_map());
            if let Err(err) = accessor.set_enum_entry(nodes::SEQUENCER_MODE, entries::OFF) {
                warn!(%serial, %err, "Unable to turn off sequencer mode");
                continue;
            }
            info!(%serial, "Turning off sequencer mode");
            set_polarized8(&mut accessor);
        }
    }

    /// Current exposure time in microseconds.
    pub fn exposure_us(&mut self) -> CameraResult<f64> {
        self.read_float(nodes::EXPOSURE_TIME)
    }

    pub fn gain_db(&mut self) -> CameraResult<f64> {
        self.read_float(nodes::GAIN)
    }

    pub fn fps(&mut self) -> CameraResult<f64> {
        self.read_float(nodes::ACQUISITION_FRAME_RATE)
    }

    /// `true` selects `Continuous`, `false` selects `Off`.
    pub fn set_exposure_auto(&mut self, on: bool) -> CameraResult<()> {
        self.set_toggle(nodes::EXPOSURE_AUTO, on, entries::CONTINUOUS)
    }

    /// `true` selects `Continuous`, `false` selects `Off`.
    pub fn set_gain_auto(&mut self, on: bool) -> CameraResult<()> {
        self.set_toggle(nodes::GAIN_AUTO, on, entries::CONTINUOUS)
    }

    /// Frame-rate control: `true` enables a fixed rate (`On`), `false`
    /// lets the exposure time decide.
    pub fn set_fps_auto(&mut self, on: bool) -> CameraResult<()> {
        self.set_toggle(nodes::ACQUISITION_FRAME_RATE_ENABLE, on, entries::ON)
    }

    /// Disable auto exposure and set the exposure from a slider position.
    /// The top of the slider is the smaller of the node maximum and the
    /// configured ceiling.
    pub fn set_exposure_from_step(&mut self, step: f64) -> CameraResult<f64> {
        let ceiling = self.settings.exposure_ceiling_us;
        let mut accessor = NodeAccessor::new(self.session.primary()?.node_map());
        accessor.set_enum_entry(nodes::EXPOSURE_AUTO, entries::OFF)?;
        let range = accessor.float_range(nodes::EXPOSURE_TIME)?;
        let max = range.max.min(ceiling).max(range.min);
        let value = slider_value(step, range.min, max);
        accessor.set_float(nodes::EXPOSURE_TIME, value)?;
        info!(value, "Exposure time set");
        Ok(value)
    }

    /// Disable auto gain and set the gain from a slider position.
    pub fn set_gain_from_step(&mut self, step: f64) -> CameraResult<f64> {
        let mut accessor = NodeAccessor::new(self.session.primary()?.node_map());
        accessor.set_enum_entry(nodes::GAIN_AUTO, entries::OFF)?;
        let range = accessor.float_range(nodes::GAIN)?;
        let value = slider_value(step, range.min, range.max);
        accessor.set_float(nodes::GAIN, value)?;
        info!(value, "Gain set");
        Ok(value)
    }

    /// Set the frame rate from a slider position. Requires frame-rate
    /// control to be enabled via [`set_fps_auto`](Self::set_fps_auto).
    pub fn set_fps_from_step(&mut self, step: f64) -> CameraResult<f64> {
        let mut accessor = NodeAccessor::new(self.session.primary()?.node_map());
        let range = accessor.float_range(nodes::ACQUISITION_FRAME_RATE)?;
        let value = slider_value(step, range.min, range.max);
        accessor.set_float(nodes::ACQUISITION_FRAME_RATE, value)?;
        info!(value, "Frame rate set");
        Ok(value)
    }

    /// Stop streaming, de-initialize the cameras and release the SDK.
    pub fn close(&mut self) -> CameraResult<()> {
        self.session.close()
    }

    fn read_float(&mut self, node: &str) -> CameraResult<f64> {
        NodeAccessor::new(self.session.primary()?.node_map()).float_value(node)
    }

    fn set_toggle(&mut self, node: &str, on: bool, on_entry: &str) -> CameraResult<()> {
        let entry = if on { on_entry } else { entries::OFF };
        NodeAccessor::new(self.session.primary()?.node_map()).set_enum_entry(node, entry)?;
        info!(node, entry, "Automatic mode changed");
        Ok(())
    }
}

fn set_polarized8(accessor: &mut NodeAccessor<'_>) {
    if accessor.is_read_write(nodes::PIXEL_FORMAT) {
        match accessor.set_enum_entry(nodes::PIXEL_FORMAT, entries::POLARIZED8) {
            Ok(()) => info!("Pixel format set to Polarized8"),
            Err(err) => warn!(%err, "Unable to set pixel format"),
        }
    } else {
        warn!("Pixel format not available");
    }
}
