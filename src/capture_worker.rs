//! Dedicated capture worker.
//!
//! Frame grabs block for up to the exposure-derived timeout, so capture runs
//! on a blocking thread that takes ownership of the [`PolarCam`]. Results go
//! out over a tokio mpsc channel; the caller stops the worker through a shared
//! flag and gets the camera back from [`CaptureWorker::join`].
//!
//! Only the worker touches the camera while it runs, which provides the
//! one-thread-per-device guarantee the session relies on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use image::GrayImage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::camera::PolarCam;
use crate::error::CameraResult;
use crate::hardware::camera_adapter::RawFrame;
use crate::sequencer::SequenceStep;

/// What the worker captures.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureMode {
    /// Free-running Polarized8 preview, one tiled panel per frame. Runs until
    /// stopped when `frames` is `None`.
    Preview { frames: Option<usize> },
    /// Program `steps`, grab `frames` images, then reset the sequencer.
    Sequence {
        steps: Vec<SequenceStep>,
        frames: usize,
    },
}

/// Sent from the worker thread to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Tiled 2x3 panel of one preview frame
    Panel { frame_id: u64, panel: GrayImage },
    /// Frames of a sequence capture, in capture order
    Sequence(Vec<RawFrame>),
    /// Capture aborted; the camera is still returned on join
    Failed(String),
}

/// Capture loop running on a blocking tokio thread.
///
/// The worker owns the camera for its lifetime and hands it back from
/// [`CaptureWorker::join`].
pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<PolarCam>,
}

impl CaptureWorker {
    /// Move `camera` onto a blocking thread and start capturing.
    pub fn spawn(camera: PolarCam, mode: CaptureMode, events: mpsc::Sender<CaptureEvent>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = tokio::task::spawn_blocking(move || run(camera, mode, events, flag));
        Self { stop, handle }
    }

    /// Ask the worker to finish after the current frame.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and take the camera back.
    pub async fn join(self) -> Result<PolarCam> {
        self.handle.await.context("Capture worker panicked")
    }
}

fn run(
    mut camera: PolarCam,
    mode: CaptureMode,
    events: mpsc::Sender<CaptureEvent>,
    stop: Arc<AtomicBool>,
) -> PolarCam {
    info!(?mode, "Capture worker started");
    let result = match &mode {
        CaptureMode::Preview { frames } => preview(&mut camera, *frames, &events, &stop),
        CaptureMode::Sequence { steps, frames } => sequence(&mut camera, steps, *frames, &events),
    };

    if let Err(err) = camera.stop_acquisition() {
        warn!(%err, "Failed to stop acquisition");
    }
    if let Err(err) = result {
        error!(%err, "Capture failed");
        // receiver may already be gone on shutdown
        let _ = events.blocking_send(CaptureEvent::Failed(err.to_string()));
    }
    info!("Capture worker finished");
    camera
}

fn preview(
    camera: &mut PolarCam,
    frames: Option<usize>,
    events: &mpsc::Sender<CaptureEvent>,
    stop: &AtomicBool,
) -> CameraResult<()> {
    camera.configure_polarized8_preview();
    camera.start_acquisition()?;

    let mut delivered = 0;
    while !stop.load(Ordering::SeqCst) && frames.map_or(true, |n| delivered < n) {
        let Some(frame) = camera.grab_image()? else {
            continue;
        };
        let panel = camera.grab_all_polarized_image(&frame)?.to_panel()?;
        let event = CaptureEvent::Panel {
            frame_id: frame.frame_id,
            panel,
        };
        if events.blocking_send(event).is_err() {
            debug!("Panel receiver dropped, stopping preview");
            break;
        }
        delivered += 1;
    }
    Ok(())
}

fn sequence(
    camera: &mut PolarCam,
    steps: &[SequenceStep],
    frames: usize,
    events: &mpsc::Sender<CaptureEvent>,
) -> CameraResult<()> {
    let captured = camera
        .configure_image_sequence(steps)
        .and_then(|_| camera.start_acquisition())
        .map(|()| camera.grab_sequence(frames));
    if let Err(err) = camera.stop_acquisition() {
        warn!(%err, "Failed to stop acquisition");
    }
    // back to free-running, auto-exposed operation whether or not capture worked
    let reset = camera.reset_sequencer();

    let captured = captured?;
    reset?;
    info!(count = captured.len(), "Sequence captured");
    if events.blocking_send(CaptureEvent::Sequence(captured)).is_err() {
        debug!("Sequence receiver dropped");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PolarCamSettings;
    use crate::hardware::mock_camera::{MockCamera, MockSystem};

    fn open() -> PolarCam {
        let camera = MockCamera::with_sensor("CAM0", 64, 48);
        PolarCam::open(
            Box::new(MockSystem::new(vec![camera])),
            PolarCamSettings::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_preview_delivers_panels() {
        let (tx, mut rx) = mpsc::channel(8);
        let worker = CaptureWorker::spawn(open(), CaptureMode::Preview { frames: Some(3) }, tx);

        let mut panels = 0;
        while let Some(event) = rx.recv().await {
            match event {
                CaptureEvent::Panel { panel, .. } => {
                    assert_eq!(panel.dimensions(), (96, 48));
                    panels += 1;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(panels, 3);

        let mut camera = worker.join().await.unwrap();
        assert!(camera.grab_image().is_err());
    }

    #[tokio::test]
    async fn test_stop_flag_ends_preview() {
        let (tx, mut rx) = mpsc::channel(1);
        let worker = CaptureWorker::spawn(open(), CaptureMode::Preview { frames: None }, tx);
        assert!(rx.recv().await.is_some());
        worker.request_stop();
        // drain so a blocked send can complete
        while rx.recv().await.is_some() {}
        let camera = worker.join().await.unwrap();
        assert_eq!(camera.serials(), vec!["CAM0".to_string()]);
    }

    #[tokio::test]
    async fn test_sequence_capture_resets_sequencer() {
        let (tx, mut rx) = mpsc::channel(2);
        let steps = vec![
            SequenceStep::new(64, 48, 5000.0, 0.0),
            SequenceStep::new(64, 48, 10000.0, 0.0),
        ];
        let worker = CaptureWorker::spawn(open(), CaptureMode::Sequence { steps, frames: 2 }, tx);

        match rx.recv().await {
            Some(CaptureEvent::Sequence(frames)) => assert_eq!(frames.len(), 2),
            other => panic!("unexpected event {other:?}"),
        }
        let mut camera = worker.join().await.unwrap();
        // auto exposure is back after the reset
        camera.set_exposure_auto(true).unwrap();
    }
}
