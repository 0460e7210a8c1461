//! Camera Sequencer Programming
//!
//! The sequencer is a device-resident table of acquisition states that the
//! camera cycles through on its own, one state per frame start. Programming it
//! follows a strict order:
//!
//! 1. [`prepare_configuration`]: stop a running sequence, disable the auto
//!    loops and unlock per-state writes.
//! 2. [`program_state`] for every requested [`SequenceStep`].
//! 3. [`finalize_configuration`]: lock the table, start the sequencer and let
//!    the firmware confirm the table is usable.
//!
//! [`configure_sequence`] runs all three. [`reset_sequencer`] undoes the run
//! mode and hands exposure and gain back to the auto loops.
//!
//! Every step stops at its first failure. Nothing is rolled back; callers that
//! need the device in a known state call [`reset_sequencer`] on the error path.

pub mod configurator;
pub mod reset;
pub mod state;

use serde::{Deserialize, Serialize};

use crate::hardware::node_map::FloatRange;

pub use configurator::{configure_sequence, finalize_configuration, prepare_configuration};
pub use reset::reset_sequencer;
pub use state::{align_down, program_state, program_states, successor};

/// Requested parameters of one sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Width in pixels
    pub width: i64,
    /// Height in pixels
    pub height: i64,
    /// Exposure time in microseconds
    pub exposure_us: f64,
    /// Analog gain in dB
    pub gain_db: f64,
}

impl SequenceStep {
    pub fn new(width: i64, height: i64, exposure_us: f64, gain_db: f64) -> Self {
        Self {
            width,
            height,
            exposure_us,
            gain_db,
        }
    }
}

/// How requested exposure and gain are fitted to the node limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPolicy {
    /// Clamp to the node maximum only. Values under the minimum reach the device as-is.
    #[default]
    UpperOnly,
    /// Clamp to both ends of the node range.
    MinMax,
}

impl ClampPolicy {
    /// Fit `value` to `range` according to the policy.
    pub fn apply(self, value: f64, range: FloatRange) -> f64 {
        let capped = value.min(range.max);
        match self {
            ClampPolicy::UpperOnly => capped,
            ClampPolicy::MinMax => capped.max(range.min),
        }
    }
}

/// Values actually written for one programmed state.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgrammedState {
    /// State index
    pub index: i64,
    /// `None` when the model does not support per-state geometry
    pub width: Option<i64>,
    pub height: Option<i64>,
    /// Exposure after clamping, microseconds
    pub exposure_us: f64,
    /// Gain after clamping, dB
    pub gain_db: f64,
    /// Successor index
    pub next: i64,
}
