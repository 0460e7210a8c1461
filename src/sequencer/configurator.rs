//! Sequencer mode transitions.
//!
//! The firmware validates the programmed table itself (successor links must
//! form a cycle through state 0), so the host configures optimistically and
//! checks `SequencerConfigurationValid` once the sequencer is running.

use tracing::{debug, error, info};

use crate::error::{CameraError, CameraResult};
use crate::hardware::node_map::NodeAccessor;
use crate::hardware::nodes::{self, entries};
use crate::sequencer::state::program_states;
use crate::sequencer::{ClampPolicy, ProgrammedState, SequenceStep};

/// Put the device into sequencer configuration mode.
///
/// Disables a running sequence, turns automatic exposure and gain off and
/// enables configuration mode. Running it again before
/// [`finalize_configuration`] leaves the node state unchanged.
pub fn prepare_configuration(accessor: &mut NodeAccessor<'_>) -> CameraResult<()> {
    info!("Configuring sequencer");

    // A valid table means the sequencer may be running. An invalid one cannot
    // run, unless a previous finalize switched the mode on before failing.
    let valid = accessor.enum_is(nodes::SEQUENCER_CONFIGURATION_VALID, entries::YES)?;
    let running = accessor
        .enum_is(nodes::SEQUENCER_MODE, entries::ON)
        .unwrap_or(valid);
    if running {
        accessor.set_enum_entry(nodes::SEQUENCER_MODE, entries::OFF)?;
        info!("Sequencer mode disabled");
    } else if valid {
        debug!("Sequencer configuration valid, sequencer mode already off");
    }

    accessor.set_enum_entry(nodes::EXPOSURE_AUTO, entries::OFF)?;
    info!("Automatic exposure disabled");
    accessor.set_enum_entry(nodes::GAIN_AUTO, entries::OFF)?;
    info!("Automatic gain disabled");

    accessor.set_enum_entry(nodes::SEQUENCER_CONFIGURATION_MODE, entries::ON)?;
    info!("Sequencer configuration mode enabled");
    Ok(())
}

/// Leave configuration mode, start the sequencer and verify the device accepted
/// the table.
pub fn finalize_configuration(accessor: &mut NodeAccessor<'_>) -> CameraResult<()> {
    accessor.set_enum_entry(nodes::SEQUENCER_CONFIGURATION_MODE, entries::OFF)?;
    info!("Sequencer configuration mode disabled");

    accessor.set_enum_entry(nodes::SEQUENCER_MODE, entries::ON)?;
    info!("Sequencer mode enabled");

    if !accessor.enum_is(nodes::SEQUENCER_CONFIGURATION_VALID, entries::YES)? {
        error!("Sequencer configuration not valid");
        return Err(CameraError::ValidationFailed);
    }
    info!("Sequencer configuration valid");
    Ok(())
}

/// Full protocol: prepare, program every step, finalize.
pub fn configure_sequence(
    accessor: &mut NodeAccessor<'_>,
    steps: &[SequenceStep],
    clamp: ClampPolicy,
) -> CameraResult<Vec<ProgrammedState>> {
    prepare_configuration(accessor)?;
    let programmed = program_states(accessor, steps, clamp)?;
    finalize_configuration(accessor)?;
    info!(states = programmed.len(), "Sequencer configured");
    Ok(programmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::camera_adapter::CameraDevice;
    use crate::hardware::mock_camera::{MockCamera, NodeValue};
    use crate::hardware::node_map::NodeAccess;

    fn camera() -> MockCamera {
        let mut camera = MockCamera::with_sensor("TEST", 640, 480);
        camera.init().unwrap();
        camera
    }

    fn enum_value(name: &str) -> Option<NodeValue> {
        Some(NodeValue::Enum(name.to_string()))
    }

    #[test]
    fn test_prepare_disables_autos_and_enters_configuration() {
        let mut camera = camera();
        let controls = camera.controls();
        prepare_configuration(&mut NodeAccessor::new(camera.node_map())).unwrap();

        assert_eq!(controls.node_value(nodes::EXPOSURE_AUTO), enum_value(entries::OFF));
        assert_eq!(controls.node_value(nodes::GAIN_AUTO), enum_value(entries::OFF));
        assert_eq!(
            controls.node_value(nodes::SEQUENCER_CONFIGURATION_MODE),
            enum_value(entries::ON)
        );
    }

    #[test]
    fn test_prepare_fails_when_validity_unreadable() {
        let mut camera = camera();
        let controls = camera.controls();
        controls.force_access(nodes::SEQUENCER_CONFIGURATION_VALID, NodeAccess::Unavailable);

        let err = prepare_configuration(&mut NodeAccessor::new(camera.node_map())).unwrap_err();
        assert!(matches!(err, CameraError::NodeUnavailable { .. }));
        assert!(controls.writes().is_empty());
    }

    #[test]
    fn test_prepare_stops_at_first_failure() {
        let mut camera = camera();
        let controls = camera.controls();
        controls.force_access(nodes::GAIN_AUTO, NodeAccess::ReadOnly);

        let err = prepare_configuration(&mut NodeAccessor::new(camera.node_map())).unwrap_err();
        assert!(matches!(err, CameraError::NodeNotWritable { .. }));
        // exposure auto was already switched off and is not rolled back
        assert_eq!(controls.node_value(nodes::EXPOSURE_AUTO), enum_value(entries::OFF));
        assert_eq!(
            controls.node_value(nodes::SEQUENCER_CONFIGURATION_MODE),
            enum_value(entries::OFF)
        );
    }

    #[test]
    fn test_configure_sequence_runs_sequencer() {
        let mut camera = camera();
        let controls = camera.controls();
        let steps = [
            SequenceStep::new(640, 480, 5000.0, 10.0),
            SequenceStep::new(640, 480, 10000.0, 14.0),
        ];
        let programmed = configure_sequence(
            &mut NodeAccessor::new(camera.node_map()),
            &steps,
            ClampPolicy::UpperOnly,
        )
        .unwrap();

        assert_eq!(programmed.len(), 2);
        assert_eq!(controls.node_value(nodes::SEQUENCER_MODE), enum_value(entries::ON));
        assert_eq!(
            controls.node_value(nodes::SEQUENCER_CONFIGURATION_VALID),
            enum_value(entries::YES)
        );
    }

    #[test]
    fn test_finalize_reports_rejected_table() {
        let mut camera = camera();
        let controls = camera.controls();
        controls.reject_sequences(true);
        let err = configure_sequence(
            &mut NodeAccessor::new(camera.node_map()),
            &[SequenceStep::new(640, 480, 5000.0, 0.0)],
            ClampPolicy::UpperOnly,
        )
        .unwrap_err();
        assert_eq!(err, CameraError::ValidationFailed);

        // a later attempt recovers once the firmware accepts the table
        controls.reject_sequences(false);
        configure_sequence(
            &mut NodeAccessor::new(camera.node_map()),
            &[SequenceStep::new(640, 480, 5000.0, 0.0)],
            ClampPolicy::UpperOnly,
        )
        .unwrap();
    }
}
