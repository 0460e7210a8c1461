//! Error types for camera control.
//!
//! `CameraError` is the single error kind surfaced by every component that
//! talks to the device. Each protocol step returns a [`CameraResult`] and
//! phases compose them with `?`, so the first failing step aborts the rest
//! of its phase.
//!
//! ## Error Taxonomy
//!
//! - **`NodeUnavailable`**: the node is missing or unreadable on this camera model.
//!   Fatal for protocol-critical nodes (sequencer mode, trigger source), logged and
//!   skipped for cosmetic ones (per-state width/height, lighting mode).
//! - **`EntryUnavailable`**: an enumeration node exists but the requested symbolic
//!   entry is missing or unreadable.
//! - **`NodeNotWritable`**: the node is present but its access mode forbids the write,
//!   typically because the device is in the wrong mode (mid-sequence, streaming).
//! - **`ValidationFailed`**: the firmware rejected the programmed sequence after the fact.
//! - **`IncompleteFrame`**: the transport delivered partial data. `grab` turns this into
//!   "no frame this cycle" rather than propagating it.
//! - **`NoDeviceFound`**: terminal at session open.
//!
//! Errors never trigger a rollback. A caller that needs the device back in a
//! known state calls the sequencer reset on its failure path.

use thiserror::Error;

/// Convenience alias for results using the camera error type.
pub type CameraResult<T> = std::result::Result<T, CameraError>;

/// Errors raised by node access, sequencer programming and acquisition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Node '{node}' is not available on this camera")]
    NodeUnavailable { node: String },

    #[error("Entry '{entry}' of node '{node}' is not available")]
    EntryUnavailable { node: String, entry: String },

    #[error("Node '{node}' is not writable in the current device mode")]
    NodeNotWritable { node: String },

    /// `SequencerConfigurationValid` read back `No`
    #[error("Sequencer configuration rejected by the device")]
    ValidationFailed,

    #[error("Incomplete frame (image status {status})")]
    IncompleteFrame { status: i32 },

    /// The system reported no camera at open
    #[error("No cameras detected")]
    NoDeviceFound,

    #[error("Acquisition already running on camera {serial}")]
    AlreadyStreaming { serial: String },

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Image dimensions differ: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("SDK error: {0}")]
    Sdk(String),
}

impl CameraError {
    pub(crate) fn unavailable(node: &str) -> Self {
        Self::NodeUnavailable {
            node: node.to_string(),
        }
    }

    pub(crate) fn entry_unavailable(node: &str, entry: &str) -> Self {
        Self::EntryUnavailable {
            node: node.to_string(),
            entry: entry.to_string(),
        }
    }

    pub(crate) fn not_writable(node: &str) -> Self {
        Self::NodeNotWritable {
            node: node.to_string(),
        }
    }

    /// True for errors caused by a model lacking a node or entry, as opposed to
    /// a node in the wrong mode or a device fault.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::NodeUnavailable { .. } | Self::EntryUnavailable { .. }
        )
    }
}
