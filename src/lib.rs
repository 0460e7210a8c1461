//! Polarization camera control.
//!
//! This library drives a machine-vision camera with an on-sensor polarizer
//! mosaic through its GenICam node map:
//! - programming the device-resident acquisition sequencer ([`sequencer`])
//! - splitting Polarized8 frames into the four orientations and the Stokes
//!   composites ([`polarization`])
//! - owning the SDK session and device lifecycle ([`acquisition`])
//!
//! [`camera::PolarCam`] bundles these for applications, and
//! [`capture_worker`] runs it on a dedicated thread. The vendor SDK sits
//! behind the traits in [`hardware`]; [`hardware::MockSystem`] is an
//! in-process implementation used by the tests and the CLI.
//!
//! # Example
//!
//! ```no_run
//! use polarcam::camera::{PolarCam, PolarCamSettings};
//! use polarcam::hardware::{MockCamera, MockSystem};
//! use polarcam::sequencer::SequenceStep;
//!
//! fn main() -> anyhow::Result<()> {
//!     let system = MockSystem::new(vec![MockCamera::new("CAM0")]);
//!     let mut camera = PolarCam::open(Box::new(system), PolarCamSettings::default())?;
//!
//!     camera.configure_image_sequence(&[
//!         SequenceStep::new(640, 480, 5000.0, 0.0),
//!         SequenceStep::new(640, 480, 20000.0, 0.0),
//!     ])?;
//!     camera.start_acquisition()?;
//!     let frames = camera.grab_sequence(2);
//!     camera.stop_acquisition()?;
//!     camera.reset_sequencer()?;
//!     println!("captured {} frames", frames.len());
//!     Ok(())
//! }
//! ```

pub mod acquisition;
pub mod camera;
pub mod capture_worker;
pub mod config;
pub mod error;
pub mod hardware;
pub mod output;
pub mod polarization;
pub mod sequencer;

// Re-exports for convenience
pub use acquisition::{AcquisitionSession, SessionSettings, SessionState, StartPolicy};
pub use camera::{CameraLimits, PolarCam, PolarCamSettings};
pub use capture_worker::{CaptureEvent, CaptureMode, CaptureWorker};
pub use config::{ConfigError, PolarCamConfig};
pub use error::{CameraError, CameraResult};
pub use hardware::{CameraDevice, CameraSystem, PixelFormat, RawFrame};
pub use polarization::{CompositeKind, DecomposedFrame, PolarQuadrant};
pub use sequencer::{ClampPolicy, ProgrammedState, SequenceStep};
