//! GenICam feature and entry names used by the polarization camera.

/// Enumeration: sequencer running (`On`) or stopped (`Off`).
pub const SEQUENCER_MODE: &str = "SequencerMode";
/// Enumeration: per-state programming unlocked (`On`) or locked (`Off`).
pub const SEQUENCER_CONFIGURATION_MODE: &str = "SequencerConfigurationMode";
/// Read-only enumeration reporting whether the stored state table is usable.
pub const SEQUENCER_CONFIGURATION_VALID: &str = "SequencerConfigurationValid";
/// Integer: index of the state being programmed.
pub const SEQUENCER_SET_SELECTOR: &str = "SequencerSetSelector";
/// Integer: successor of the selected state.
pub const SEQUENCER_SET_NEXT: &str = "SequencerSetNext";
/// Command: persist the selected state.
pub const SEQUENCER_SET_SAVE: &str = "SequencerSetSave";
/// Enumeration: event that advances the sequencer to the successor state.
pub const SEQUENCER_TRIGGER_SOURCE: &str = "SequencerTriggerSource";

/// Enumeration: `Off`, `Once` or `Continuous`.
pub const EXPOSURE_AUTO: &str = "ExposureAuto";
/// Float: exposure time in microseconds.
pub const EXPOSURE_TIME: &str = "ExposureTime";
/// Enumeration: `Off`, `Once` or `Continuous`.
pub const GAIN_AUTO: &str = "GainAuto";
/// Float: analog gain in dB.
pub const GAIN: &str = "Gain";
/// Integer: region of interest width.
pub const WIDTH: &str = "Width";
/// Integer: region of interest height.
pub const HEIGHT: &str = "Height";
/// Enumeration: sensor output format.
pub const PIXEL_FORMAT: &str = "PixelFormat";
/// Enumeration: continuous, single or multi frame.
pub const ACQUISITION_MODE: &str = "AcquisitionMode";
/// Float: target frame rate when enabled.
pub const ACQUISITION_FRAME_RATE: &str = "AcquisitionFrameRate";
/// Boolean-like enumeration: fixed frame rate on or off.
pub const ACQUISITION_FRAME_RATE_ENABLE: &str = "AcquisitionFrameRateEnable";
/// Enumeration: auto exposure metering preset.
pub const AUTO_EXPOSURE_LIGHTING_MODE: &str = "AutoExposureLightingMode";

/// Transport-layer stream node.
pub const STREAM_BUFFER_HANDLING_MODE: &str = "StreamBufferHandlingMode";

/// Symbolic enumeration entries.
pub mod entries {
    #![allow(missing_docs)]

    pub const ON: &str = "On";
    pub const OFF: &str = "Off";
    pub const YES: &str = "Yes";
    pub const NO: &str = "No";
    pub const CONTINUOUS: &str = "Continuous";
    pub const FRAME_START: &str = "FrameStart";
    pub const NEWEST_ONLY: &str = "NewestOnly";
    pub const OLDEST_FIRST: &str = "OldestFirst";
    pub const FRONTLIGHT: &str = "Frontlight";
    pub const BACKLIGHT: &str = "Backlight";
    pub const POLARIZED8: &str = "Polarized8";
    pub const MONO8: &str = "Mono8";
}
