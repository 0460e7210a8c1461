//! Sequencer protocol against the mock firmware.

use polarcam::camera::{PolarCam, PolarCamSettings};
use polarcam::hardware::mock_camera::{MockControls, NodeValue};
use polarcam::hardware::nodes::{self, entries};
use polarcam::hardware::{CameraDevice, MockCamera, MockSystem, NodeAccess, NodeAccessor};
use polarcam::sequencer::{
    configure_sequence, finalize_configuration, prepare_configuration, program_states,
    reset_sequencer, ClampPolicy, SequenceStep,
};
use polarcam::CameraError;

fn ready_camera(width: u32, height: u32) -> (MockCamera, MockControls) {
    let mut camera = MockCamera::with_sensor("SEQ-TEST", width, height);
    camera.init().unwrap();
    let controls = camera.controls();
    (camera, controls)
}

fn steps(count: usize) -> Vec<SequenceStep> {
    (0..count)
        .map(|i| SequenceStep::new(320, 240, 1000.0 * (i as f64 + 1.0), 0.0))
        .collect()
}

#[test]
fn test_successor_links_form_a_cycle() {
    for count in [1, 2, 3, 7, 32] {
        let (mut camera, controls) = ready_camera(640, 480);
        let programmed = configure_sequence(
            &mut NodeAccessor::new(camera.node_map()),
            &steps(count),
            ClampPolicy::UpperOnly,
        )
        .unwrap();

        assert_eq!(programmed.len(), count);
        let stored = controls.stored_states();
        assert_eq!(stored.len(), count);
        for (index, state) in &stored {
            let expected = if *index == count as i64 - 1 { 0 } else { index + 1 };
            assert_eq!(state.next, expected, "state {index} of {count}");
            assert_eq!(state.trigger_source, entries::FRAME_START);
        }
        assert_eq!(
            controls.node_value(nodes::SEQUENCER_CONFIGURATION_VALID),
            Some(NodeValue::Enum(entries::YES.to_string()))
        );
    }
}

#[test]
fn test_dimensions_aligned_to_node_increment() {
    let (mut camera, controls) = ready_camera(640, 480);
    let requested = [
        SequenceStep::new(650, 481, 5000.0, 0.0),
        SequenceStep::new(9999, 9999, 5000.0, 0.0),
        SequenceStep::new(17, 3, 5000.0, 0.0),
    ];
    let programmed = configure_sequence(
        &mut NodeAccessor::new(camera.node_map()),
        &requested,
        ClampPolicy::UpperOnly,
    )
    .unwrap();

    let stored = controls.stored_states();
    for (step, state) in requested.iter().zip(&programmed) {
        let width = state.width.unwrap();
        let height = state.height.unwrap();
        assert!(width <= step.width && width % 16 == 0, "width {width}");
        assert!(height <= step.height && height % 2 == 0, "height {height}");
        assert_eq!(stored[&state.index].width, width);
        assert_eq!(stored[&state.index].height, height);
    }
    assert_eq!((programmed[0].width, programmed[0].height), (Some(640), Some(480)));
    assert_eq!((programmed[1].width, programmed[1].height), (Some(640), Some(480)));
    assert_eq!((programmed[2].width, programmed[2].height), (Some(16), Some(2)));
}

#[test]
fn test_exposure_and_gain_clamped_to_maximum() {
    let (mut camera, controls) = ready_camera(640, 480);
    let programmed = configure_sequence(
        &mut NodeAccessor::new(camera.node_map()),
        &[SequenceStep::new(640, 480, 90_000_000.0, 60.0)],
        ClampPolicy::UpperOnly,
    )
    .unwrap();

    assert_eq!(programmed[0].exposure_us, 30_000_000.0);
    assert_eq!(programmed[0].gain_db, 47.99);
    assert_eq!(controls.stored_states()[&0].exposure_us, 30_000_000.0);
}

#[test]
fn test_minimum_only_clamped_with_min_max_policy() {
    let below_min = [SequenceStep::new(640, 480, 5.0, 0.0)];

    let (mut camera, _controls) = ready_camera(640, 480);
    let err = configure_sequence(
        &mut NodeAccessor::new(camera.node_map()),
        &below_min,
        ClampPolicy::UpperOnly,
    )
    .unwrap_err();
    // the device itself refuses the out-of-range value
    assert!(matches!(err, CameraError::Sdk(_)));

    let (mut camera, _controls) = ready_camera(640, 480);
    let programmed = configure_sequence(
        &mut NodeAccessor::new(camera.node_map()),
        &below_min,
        ClampPolicy::MinMax,
    )
    .unwrap();
    assert_eq!(programmed[0].exposure_us, 20.0);
}

#[test]
fn test_locked_geometry_is_skipped() {
    let (mut camera, controls) = ready_camera(640, 480);
    controls.force_access(nodes::WIDTH, NodeAccess::ReadOnly);

    let programmed = configure_sequence(
        &mut NodeAccessor::new(camera.node_map()),
        &steps(2),
        ClampPolicy::UpperOnly,
    )
    .unwrap();

    assert!(programmed.iter().all(|state| state.width.is_none()));
    assert!(programmed.iter().all(|state| state.height == Some(240)));
    assert!(controls.writes().iter().all(|write| write.node != nodes::WIDTH));
}

#[test]
fn test_locked_exposure_aborts_programming() {
    let (mut camera, controls) = ready_camera(640, 480);
    let mut accessor = NodeAccessor::new(camera.node_map());
    prepare_configuration(&mut accessor).unwrap();
    controls.force_access(nodes::EXPOSURE_TIME, NodeAccess::ReadOnly);

    let err = program_states(&mut accessor, &steps(3), ClampPolicy::UpperOnly).unwrap_err();
    assert_eq!(
        err,
        CameraError::NodeNotWritable {
            node: nodes::EXPOSURE_TIME.to_string()
        }
    );
    assert!(controls.stored_states().is_empty());
}

#[test]
fn test_prepare_is_idempotent() {
    let (mut camera, controls) = ready_camera(640, 480);
    let mut accessor = NodeAccessor::new(camera.node_map());
    prepare_configuration(&mut accessor).unwrap();
    let first = controls.node_snapshot();
    prepare_configuration(&mut accessor).unwrap();
    assert_eq!(controls.node_snapshot(), first);

    // same with a running sequence to stop
    let (mut camera, controls) = ready_camera(640, 480);
    let mut accessor = NodeAccessor::new(camera.node_map());
    configure_sequence(&mut accessor, &steps(2), ClampPolicy::UpperOnly).unwrap();
    prepare_configuration(&mut accessor).unwrap();
    let first = controls.node_snapshot();
    prepare_configuration(&mut accessor).unwrap();
    assert_eq!(controls.node_snapshot(), first);
}

#[test]
fn test_empty_sequence_reports_device_validity() {
    let (mut camera, _controls) = ready_camera(640, 480);
    let err = configure_sequence(
        &mut NodeAccessor::new(camera.node_map()),
        &[],
        ClampPolicy::UpperOnly,
    )
    .unwrap_err();
    assert_eq!(err, CameraError::ValidationFailed);

    // a previously stored table still forms a cycle
    let (mut camera, controls) = ready_camera(640, 480);
    let mut accessor = NodeAccessor::new(camera.node_map());
    configure_sequence(&mut accessor, &steps(2), ClampPolicy::UpperOnly).unwrap();
    let programmed = configure_sequence(&mut accessor, &[], ClampPolicy::UpperOnly).unwrap();
    assert!(programmed.is_empty());
    assert_eq!(controls.stored_states().len(), 2);
}

#[test]
fn test_rejected_table_then_reset() {
    let (mut camera, controls) = ready_camera(640, 480);
    controls.reject_sequences(true);
    let mut accessor = NodeAccessor::new(camera.node_map());
    prepare_configuration(&mut accessor).unwrap();
    program_states(&mut accessor, &steps(2), ClampPolicy::UpperOnly).unwrap();
    assert_eq!(
        finalize_configuration(&mut accessor).unwrap_err(),
        CameraError::ValidationFailed
    );

    reset_sequencer(&mut accessor).unwrap();
    assert_eq!(
        controls.node_value(nodes::SEQUENCER_MODE),
        Some(NodeValue::Enum(entries::OFF.to_string()))
    );
    assert_eq!(
        controls.node_value(nodes::EXPOSURE_AUTO),
        Some(NodeValue::Enum(entries::CONTINUOUS.to_string()))
    );
    assert_eq!(
        controls.node_value(nodes::GAIN_AUTO),
        Some(NodeValue::Enum(entries::CONTINUOUS.to_string()))
    );
}

#[test]
fn test_reset_then_configure_matches_cold_start() {
    let first = vec![
        SequenceStep::new(480, 360, 2000.0, 1.0),
        SequenceStep::new(320, 240, 8000.0, 2.0),
    ];
    let second = vec![
        SequenceStep::new(640, 480, 4000.0, 0.0),
        SequenceStep::new(160, 120, 16000.0, 3.0),
    ];

    let cold = MockCamera::with_sensor("COLD", 640, 480);
    let cold_controls = cold.controls();
    let mut cold_cam =
        PolarCam::open(Box::new(MockSystem::new(vec![cold])), PolarCamSettings::default()).unwrap();
    cold_cam.configure_image_sequence(&second).unwrap();

    let warm = MockCamera::with_sensor("WARM", 640, 480);
    let warm_controls = warm.controls();
    let mut warm_cam =
        PolarCam::open(Box::new(MockSystem::new(vec![warm])), PolarCamSettings::default()).unwrap();
    warm_cam.configure_image_sequence(&first).unwrap();
    warm_cam.reset_sequencer().unwrap();
    warm_cam.configure_image_sequence(&second).unwrap();

    assert_eq!(warm_controls.node_snapshot(), cold_controls.node_snapshot());
    assert_eq!(warm_controls.stored_states(), cold_controls.stored_states());
}
