//! Open, program, stream and decompose through the public facade.

use std::time::Duration;

use image::Luma;
use tempfile::tempdir;
use tokio::sync::mpsc;

use polarcam::camera::{PolarCam, PolarCamSettings};
use polarcam::capture_worker::{CaptureEvent, CaptureMode, CaptureWorker};
use polarcam::hardware::mock_camera::NodeValue;
use polarcam::hardware::nodes::{self, entries};
use polarcam::hardware::{MockCamera, MockSystem, PixelFormat, TestPattern};
use polarcam::output::ImageStore;
use polarcam::polarization::sequence_strip;
use polarcam::sequencer::SequenceStep;
use polarcam::{CameraError, SessionState};

fn open(camera: MockCamera) -> PolarCam {
    PolarCam::open(Box::new(MockSystem::new(vec![camera])), PolarCamSettings::default()).unwrap()
}

#[test]
fn test_three_state_sequence_brightens_with_exposure() {
    let camera = MockCamera::with_sensor("E2E", 1280, 960);
    let controls = camera.controls();
    let mut cam = open(camera);

    let steps = [
        SequenceStep::new(640, 480, 20_000.0, 0.0),
        SequenceStep::new(640, 480, 40_000.0, 0.0),
        SequenceStep::new(640, 480, 80_000.0, 0.0),
    ];
    cam.configure_image_sequence(&steps).unwrap();
    cam.start_acquisition().unwrap();
    let frames = cam.grab_sequence(3);
    cam.stop_acquisition().unwrap();

    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert_eq!((frame.width, frame.height), (640, 480));
        assert_eq!(frame.pixel_format, PixelFormat::Polarized8);
    }
    let means: Vec<f64> = frames.iter().map(|f| f.mean()).collect();
    assert!(means[0] < means[1] && means[1] < means[2], "means {means:?}");

    let strip = sequence_strip(&frames).unwrap();
    assert_eq!(strip.dimensions(), (1920, 480));

    cam.reset_sequencer().unwrap();
    assert_eq!(
        controls.node_value(nodes::SEQUENCER_MODE),
        Some(NodeValue::Enum(entries::OFF.to_string()))
    );
    cam.close().unwrap();
    assert_eq!(cam.state(), SessionState::Closed);
}

#[test]
fn test_exposure_and_gain_ramp_brightens_each_state() {
    let camera = MockCamera::with_sensor("RAMP", 1280, 960);
    let mut cam = open(camera);

    let programmed = cam
        .configure_image_sequence(&[
            SequenceStep::new(640, 480, 5_000.0, 10.0),
            SequenceStep::new(640, 480, 10_000.0, 14.0),
            SequenceStep::new(640, 480, 15_000.0, 18.0),
        ])
        .unwrap();
    assert_eq!(programmed.len(), 3);
    assert_eq!(programmed[2].gain_db, 18.0);
    assert_eq!(programmed[2].next, 0);

    cam.start_acquisition().unwrap();
    let frames = cam.grab_sequence(3);
    cam.stop_acquisition().unwrap();

    assert_eq!(frames.len(), 3);
    for frame in &frames {
        assert_eq!((frame.width, frame.height), (640, 480));
    }
    let means: Vec<f64> = frames.iter().map(|f| f.mean()).collect();
    assert!(means[0] < means[1] && means[1] < means[2], "means {means:?}");
    cam.reset_sequencer().unwrap();
}

#[test]
fn test_sequence_repeats_after_last_state() {
    let camera = MockCamera::with_sensor("CYCLE", 640, 480);
    let mut cam = open(camera);
    cam.configure_image_sequence(&[
        SequenceStep::new(320, 240, 10_000.0, 0.0),
        SequenceStep::new(160, 120, 10_000.0, 0.0),
    ])
    .unwrap();
    cam.start_acquisition().unwrap();
    let sizes: Vec<(u32, u32)> = cam
        .grab_sequence(5)
        .iter()
        .map(|f| (f.width, f.height))
        .collect();
    assert_eq!(
        sizes,
        vec![(320, 240), (160, 120), (320, 240), (160, 120), (320, 240)]
    );
}

#[test]
fn test_incomplete_frame_is_skipped() {
    let camera = MockCamera::with_sensor("DROP", 64, 48);
    let controls = camera.controls();
    let mut cam = open(camera);
    cam.start_acquisition().unwrap();

    controls.fail_next_frames(1);
    assert!(cam.grab_image().unwrap().is_none());
    let frame = cam.grab_image().unwrap().unwrap();
    assert_eq!((frame.width, frame.height), (64, 48));
    // 10 ms default exposure plus the 1 s margin
    assert_eq!(controls.last_timeout(), Some(Duration::from_millis(1010)));
}

#[test]
fn test_synthetic_pattern_panel() {
    let camera = MockCamera::with_sensor("PANEL", 64, 48).with_pattern(
        TestPattern::ConstantQuadrants {
            i0: 10,
            i45: 20,
            i90: 30,
            i135: 40,
        },
    );
    let mut cam = open(camera);
    cam.start_acquisition().unwrap();
    let frame = cam.grab_image().unwrap().unwrap();

    let panel = cam.grab_all_polarized_image(&frame).unwrap().to_panel().unwrap();
    assert_eq!(panel.dimensions(), (96, 48));
    let tile = |col: u32, row: u32| *panel.get_pixel(col * 32 + 5, row * 24 + 5);
    assert_eq!(tile(0, 0), Luma([10]));
    assert_eq!(tile(1, 0), Luma([20]));
    assert_eq!(tile(2, 0), Luma([25]));
    assert_eq!(tile(0, 1), Luma([30]));
    assert_eq!(tile(1, 1), Luma([40]));
    assert_eq!(tile(2, 1), Luma([11]));
}

#[test]
fn test_no_camera_releases_system() {
    let system = MockSystem::empty();
    let controls = system.controls();
    let err = PolarCam::open(Box::new(system), PolarCamSettings::default())
        .err()
        .unwrap();
    assert_eq!(err, CameraError::NoDeviceFound);
    assert_eq!(controls.release_count(), 1);
}

#[test]
fn test_drop_releases_system_once() {
    let system = MockSystem::new(vec![MockCamera::with_sensor("DROP", 64, 48)]);
    let controls = system.controls();
    {
        let mut cam = PolarCam::open(Box::new(system), PolarCamSettings::default()).unwrap();
        cam.start_acquisition().unwrap();
    }
    assert_eq!(controls.release_count(), 1);

    let system = MockSystem::new(vec![MockCamera::with_sensor("CLOSE", 64, 48)]);
    let controls = system.controls();
    let mut cam = PolarCam::open(Box::new(system), PolarCamSettings::default()).unwrap();
    cam.close().unwrap();
    cam.close().unwrap();
    drop(cam);
    assert_eq!(controls.release_count(), 1);
}

#[tokio::test]
async fn test_worker_sequence_saved_to_disk() {
    let dir = tempdir().unwrap();
    let store = ImageStore::new(dir.path());
    let cam = open(MockCamera::with_sensor("SAVE", 128, 96));

    let (tx, mut rx) = mpsc::channel(2);
    let steps = vec![
        SequenceStep::new(64, 48, 5_000.0, 0.0),
        SequenceStep::new(64, 48, 50_000.0, 0.0),
    ];
    let worker = CaptureWorker::spawn(cam, CaptureMode::Sequence { steps, frames: 2 }, tx);

    let Some(CaptureEvent::Sequence(frames)) = rx.recv().await else {
        panic!("expected a captured sequence");
    };
    let strip = sequence_strip(&frames).unwrap();
    let paths = store.save_sequence(&frames, Some(&strip)).unwrap();
    assert_eq!(paths.len(), 3);
    assert!(paths.iter().all(|p| p.exists()));

    let cam = worker.join().await.unwrap();
    assert_eq!(cam.state(), SessionState::Initialized);
}
