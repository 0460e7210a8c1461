//! Per-state programming.
//!
//! Writes one row of the sequencer table: geometry, exposure, gain, trigger
//! source and successor, then persists it with `SequencerSetSave`. Only valid
//! while sequencer configuration mode is on.

use tracing::{debug, info, warn};

use crate::error::CameraResult;
use crate::hardware::node_map::{IntRange, NodeAccessor};
use crate::hardware::nodes::{self, entries};
use crate::sequencer::{ClampPolicy, ProgrammedState, SequenceStep};

/// Largest multiple of the node increment that is `<= value` and `<= range.max`.
pub fn align_down(value: i64, range: IntRange) -> i64 {
    let capped = value.min(range.max);
    if range.inc <= 1 {
        return capped;
    }
    capped.div_euclid(range.inc) * range.inc
}

/// Successor of `index`; the last state links back to 0.
pub fn successor(index: i64, last_index: i64) -> i64 {
    if index == last_index {
        0
    } else {
        index + 1
    }
}

/// Program and save state `index` of a sequence whose final state is `last_index`.
pub fn program_state(
    accessor: &mut NodeAccessor<'_>,
    index: i64,
    step: &SequenceStep,
    last_index: i64,
    clamp: ClampPolicy,
) -> CameraResult<ProgrammedState> {
    accessor.set_int(nodes::SEQUENCER_SET_SELECTOR, index)?;
    info!(index, "Setting sequencer state");

    let width = program_dimension(accessor, nodes::WIDTH, step.width)?;
    let height = program_dimension(accessor, nodes::HEIGHT, step.height)?;

    accessor.require_read_write(nodes::EXPOSURE_TIME)?;
    let exposure_us = clamp.apply(step.exposure_us, accessor.float_range(nodes::EXPOSURE_TIME)?);
    accessor.set_float(nodes::EXPOSURE_TIME, exposure_us)?;

    accessor.require_read_write(nodes::GAIN)?;
    let gain_db = clamp.apply(step.gain_db, accessor.float_range(nodes::GAIN)?);
    accessor.set_float(nodes::GAIN, gain_db)?;

    accessor.set_enum_entry(nodes::SEQUENCER_TRIGGER_SOURCE, entries::FRAME_START)?;

    let next = successor(index, last_index);
    accessor.set_int(nodes::SEQUENCER_SET_NEXT, next)?;

    accessor.execute(nodes::SEQUENCER_SET_SAVE)?;
    debug!(index, ?width, ?height, exposure_us, gain_db, next, "State saved");

    Ok(ProgrammedState {
        index,
        width,
        height,
        exposure_us,
        gain_db,
        next,
    })
}

/// Program `steps` as states `0..steps.len()`, stopping at the first failure.
pub fn program_states(
    accessor: &mut NodeAccessor<'_>,
    steps: &[SequenceStep],
    clamp: ClampPolicy,
) -> CameraResult<Vec<ProgrammedState>> {
    let last_index = steps.len() as i64 - 1;
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| program_state(accessor, index as i64, step, last_index, clamp))
        .collect()
}

/// Per-state width/height is model dependent: skip with a warning when the
/// node cannot be read and written.
fn program_dimension(
    accessor: &mut NodeAccessor<'_>,
    node: &str,
    requested: i64,
) -> CameraResult<Option<i64>> {
    if !accessor.is_read_write(node) {
        warn!(
            node,
            "Per-state value not supported on this camera model, skipping"
        );
        return Ok(None);
    }
    let value = align_down(requested, accessor.int_range(node)?);
    accessor.set_int(node, value)?;
    Ok(Some(value))
}
