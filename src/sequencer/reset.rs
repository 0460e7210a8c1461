//! Return the device to free-running, auto-exposed operation.

use tracing::{info, warn};

use crate::error::CameraResult;
use crate::hardware::node_map::NodeAccessor;
use crate::hardware::nodes::{self, entries};

/// Turn sequencer mode off and hand exposure and gain back to the auto loops.
///
/// Disabling the sequencer is mandatory. Restoring the auto modes is best
/// effort: models without a writable auto node or a `Continuous` entry are
/// skipped with a warning.
pub fn reset_sequencer(accessor: &mut NodeAccessor<'_>) -> CameraResult<()> {
    // SequencerMode stays locked while a failed programming run left
    // configuration mode on.
    if accessor
        .enum_is(nodes::SEQUENCER_CONFIGURATION_MODE, entries::ON)
        .unwrap_or(false)
    {
        accessor.set_enum_entry(nodes::SEQUENCER_CONFIGURATION_MODE, entries::OFF)?;
        info!("Sequencer configuration mode disabled");
    }

    accessor.set_enum_entry(nodes::SEQUENCER_MODE, entries::OFF)?;
    info!("Turning off sequencer mode");

    restore_continuous(accessor, nodes::EXPOSURE_AUTO);
    restore_continuous(accessor, nodes::GAIN_AUTO);
    Ok(())
}

fn restore_continuous(accessor: &mut NodeAccessor<'_>, node: &str) {
    if !accessor.is_read_write(node) {
        warn!(node, "Unable to restore automatic mode, node not writable");
        return;
    }
    match accessor.set_enum_entry(node, entries::CONTINUOUS) {
        Ok(()) => info!(node, "Automatic mode restored"),
        Err(err) => warn!(node, %err, "Unable to restore automatic mode"),
    }
}
