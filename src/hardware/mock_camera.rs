//! Mock camera SDK
//!
//! In-process stand-in for a polarization camera and its SDK, used by the
//! test-suite and by the CLI when no vendor binding is linked.
//!
//! The node map behaves like the firmware where it matters to the sequencer
//! protocol:
//!
//! - sequencer state nodes (selector, next, trigger source, save) are only
//!   writable while `SequencerConfigurationMode` is `On`
//! - `SequencerConfigurationMode` is locked while `SequencerMode` is `On` and
//!   vice versa
//! - `ExposureTime` / `Gain` are locked while their auto mode is active
//! - geometry, pixel format and acquisition mode are locked while streaming
//! - out-of-range or misaligned integer writes are rejected
//!
//! `SequencerConfigurationValid` reports `Yes` only when the stored state table,
//! followed from state 0 through the successor links, closes back on state 0.
//! While streaming with the sequencer on, every frame is rendered with the
//! parameters of the active state and the sequencer then advances.
//!
//! [`MockControls`] and [`SystemControls`] stay with the test after the device has
//! been handed to a session and allow inspection and fault injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::f64::consts::FRAC_PI_4;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::{CameraError, CameraResult};
use crate::hardware::camera_adapter::{
    CameraDevice, CameraSystem, PixelFormat, SdkImage, IMAGE_STATUS_OK,
};
use crate::hardware::node_map::{FloatRange, IntRange, NodeAccess, NodeMap};
use crate::hardware::nodes::{self, entries};
use crate::polarization::PolarQuadrant;

/// Status attached to frames forced incomplete via [`MockControls::fail_next_frames`].
pub const MOCK_INCOMPLETE_STATUS: i32 = 3;

/// Exposure at which a gain of 0 dB renders the scene at nominal brightness.
const REFERENCE_EXPOSURE_US: f64 = 100_000.0;

const WIDTH_INC: i64 = 16;
const HEIGHT_INC: i64 = 2;
const MAX_SEQUENCER_STATES: i64 = 32;

/// Node value as seen by a test.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Int(i64),
    Float(f64),
    /// Symbolic name of the current entry
    Enum(String),
    Command,
}

/// One write accepted by the mock node map.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeWrite {
    pub node: String,
    pub value: NodeValue,
}

/// Sequencer state as persisted by `SequencerSetSave`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    pub width: i64,
    pub height: i64,
    pub exposure_us: f64,
    pub gain_db: f64,
    pub trigger_source: String,
    pub next: i64,
}

/// Image content rendered by the mock sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TestPattern {
    /// Gradient scene with a strongly polarized specular spot in the middle.
    /// Brightness scales with exposure and gain.
    Scene,
    /// Every polarizer orientation reads a fixed value, independent of exposure.
    ConstantQuadrants { i0: u8, i45: u8, i90: u8, i135: u8 },
}

#[derive(Debug, Clone)]
enum MockNode {
    Enum {
        entries: Vec<(&'static str, i64)>,
        value: i64,
    },
    Int {
        value: i64,
        range: IntRange,
    },
    Float {
        value: f64,
        range: FloatRange,
    },
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Device,
    Stream,
}

struct FrameParameters {
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    exposure_us: f64,
    gain_db: f64,
}

struct CameraState {
    initialized: bool,
    streaming: bool,
    device: BTreeMap<&'static str, MockNode>,
    stream: BTreeMap<&'static str, MockNode>,
    forced: HashMap<String, NodeAccess>,
    hidden_entries: HashSet<(String, String)>,
    stored: BTreeMap<i64, StoredState>,
    reject_sequences: bool,
    active_state: i64,
    frame_counter: u64,
    incomplete_frames: usize,
    last_timeout: Option<Duration>,
    acquisition_starts: usize,
    writes: Vec<NodeWrite>,
    pattern: TestPattern,
}

fn lock(state: &Mutex<CameraState>) -> MutexGuard<'_, CameraState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn enumeration(entries: &[(&'static str, i64)], current: &str) -> MockNode {
    let value = entries
        .iter()
        .find(|(name, _)| *name == current)
        .map(|(_, v)| *v)
        .unwrap_or_default();
    MockNode::Enum {
        entries: entries.to_vec(),
        value,
    }
}

impl CameraState {
    fn new(sensor_width: u32, sensor_height: u32) -> Self {
        let width_max = (sensor_width as i64 / WIDTH_INC).max(1) * WIDTH_INC;
        let height_max = (sensor_height as i64 / HEIGHT_INC).max(1) * HEIGHT_INC;
        let on_off = [(entries::OFF, 0), (entries::ON, 1)];
        let auto = [(entries::OFF, 0), ("Once", 1), (entries::CONTINUOUS, 2)];
        let state_index = IntRange {
            min: 0,
            max: MAX_SEQUENCER_STATES - 1,
            inc: 1,
        };

        let mut device = BTreeMap::new();
        device.insert(nodes::SEQUENCER_MODE, enumeration(&on_off, entries::OFF));
        device.insert(
            nodes::SEQUENCER_CONFIGURATION_MODE,
            enumeration(&on_off, entries::OFF),
        );
        device.insert(
            nodes::SEQUENCER_CONFIGURATION_VALID,
            enumeration(&[(entries::NO, 0), (entries::YES, 1)], entries::NO),
        );
        device.insert(
            nodes::SEQUENCER_SET_SELECTOR,
            MockNode::Int {
                value: 0,
                range: state_index,
            },
        );
        device.insert(
            nodes::SEQUENCER_SET_NEXT,
            MockNode::Int {
                value: 0,
                range: state_index,
            },
        );
        device.insert(nodes::SEQUENCER_SET_SAVE, MockNode::Command);
        device.insert(
            nodes::SEQUENCER_TRIGGER_SOURCE,
            enumeration(&[(entries::OFF, 0), (entries::FRAME_START, 1)], entries::OFF),
        );
        device.insert(nodes::EXPOSURE_AUTO, enumeration(&auto, entries::CONTINUOUS));
        device.insert(nodes::GAIN_AUTO, enumeration(&auto, entries::CONTINUOUS));
        device.insert(
            nodes::EXPOSURE_TIME,
            MockNode::Float {
                value: 10_000.0,
                range: FloatRange {
                    min: 20.0,
                    max: 30_000_000.0,
                },
            },
        );
        device.insert(
            nodes::GAIN,
            MockNode::Float {
                value: 0.0,
                range: FloatRange {
                    min: 0.0,
                    max: 47.99,
                },
            },
        );
        device.insert(
            nodes::WIDTH,
            MockNode::Int {
                value: width_max,
                range: IntRange {
                    min: WIDTH_INC,
                    max: width_max,
                    inc: WIDTH_INC,
                },
            },
        );
        device.insert(
            nodes::HEIGHT,
            MockNode::Int {
                value: height_max,
                range: IntRange {
                    min: HEIGHT_INC,
                    max: height_max,
                    inc: HEIGHT_INC,
                },
            },
        );
        device.insert(
            nodes::PIXEL_FORMAT,
            enumeration(
                &[(entries::MONO8, 0x0108_0001), (entries::POLARIZED8, 0x8108_0001)],
                entries::MONO8,
            ),
        );
        device.insert(
            nodes::ACQUISITION_MODE,
            enumeration(
                &[
                    (entries::CONTINUOUS, 0),
                    ("SingleFrame", 1),
                    ("MultiFrame", 2),
                ],
                "SingleFrame",
            ),
        );
        device.insert(
            nodes::ACQUISITION_FRAME_RATE,
            MockNode::Float {
                value: 24.0,
                range: FloatRange {
                    min: 1.0,
                    max: 75.0,
                },
            },
        );
        device.insert(
            nodes::ACQUISITION_FRAME_RATE_ENABLE,
            enumeration(&on_off, entries::OFF),
        );
        device.insert(
            nodes::AUTO_EXPOSURE_LIGHTING_MODE,
            enumeration(
                &[
                    ("AutoDetect", 0),
                    (entries::BACKLIGHT, 1),
                    (entries::FRONTLIGHT, 2),
                    ("Normal", 3),
                ],
                "AutoDetect",
            ),
        );

        let mut stream = BTreeMap::new();
        stream.insert(
            nodes::STREAM_BUFFER_HANDLING_MODE,
            enumeration(
                &[
                    (entries::OLDEST_FIRST, 0),
                    ("OldestFirstOverwrite", 1),
                    ("NewestFirst", 2),
                    (entries::NEWEST_ONLY, 3),
                ],
                entries::OLDEST_FIRST,
            ),
        );

        Self {
            initialized: false,
            streaming: false,
            device,
            stream,
            forced: HashMap::new(),
            hidden_entries: HashSet::new(),
            stored: BTreeMap::new(),
            reject_sequences: false,
            active_state: 0,
            frame_counter: 0,
            incomplete_frames: 0,
            last_timeout: None,
            acquisition_starts: 0,
            writes: Vec::new(),
            pattern: TestPattern::Scene,
        }
    }

    fn table(&self, layer: Layer) -> &BTreeMap<&'static str, MockNode> {
        match layer {
            Layer::Device => &self.device,
            Layer::Stream => &self.stream,
        }
    }

    fn table_mut(&mut self, layer: Layer) -> &mut BTreeMap<&'static str, MockNode> {
        match layer {
            Layer::Device => &mut self.device,
            Layer::Stream => &mut self.stream,
        }
    }

    fn node(&self, layer: Layer, node: &str) -> CameraResult<&MockNode> {
        self.table(layer)
            .get(node)
            .ok_or_else(|| CameraError::unavailable(node))
    }

    fn entry_name(&self, node: &str) -> Option<&'static str> {
        let value = self.current_enum(Layer::Device, node).ok()?;
        match self.device.get(node)? {
            MockNode::Enum { entries, .. } => entries
                .iter()
                .find(|(_, v)| *v == value)
                .map(|(name, _)| *name),
            _ => None,
        }
    }

    fn enum_is(&self, node: &str, entry: &str) -> bool {
        self.entry_name(node) == Some(entry)
    }

    fn current_enum(&self, layer: Layer, node: &str) -> CameraResult<i64> {
        if layer == Layer::Device && node == nodes::SEQUENCER_CONFIGURATION_VALID {
            return Ok(i64::from(self.sequence_valid()));
        }
        match self.node(layer, node)? {
            MockNode::Enum { value, .. } => Ok(*value),
            _ => Err(CameraError::Sdk(format!("{node} is not an enumeration"))),
        }
    }

    fn int(&self, node: &str) -> i64 {
        match self.device.get(node) {
            Some(MockNode::Int { value, .. }) => *value,
            _ => 0,
        }
    }

    fn float(&self, node: &str) -> f64 {
        match self.device.get(node) {
            Some(MockNode::Float { value, .. }) => *value,
            _ => 0.0,
        }
    }

    fn access(&self, layer: Layer, node: &str) -> NodeAccess {
        if !self.initialized {
            return NodeAccess::Unavailable;
        }
        if let Some(forced) = self.forced.get(node) {
            return *forced;
        }
        if !self.table(layer).contains_key(node) {
            return NodeAccess::Unavailable;
        }
        match layer {
            Layer::Stream => NodeAccess::ReadWrite,
            Layer::Device => self.device_access(node),
        }
    }

    fn device_access(&self, node: &str) -> NodeAccess {
        let unlocked = |open: bool| {
            if open {
                NodeAccess::ReadWrite
            } else {
                NodeAccess::ReadOnly
            }
        };
        let configuring = self.enum_is(nodes::SEQUENCER_CONFIGURATION_MODE, entries::ON);
        match node {
            nodes::SEQUENCER_CONFIGURATION_VALID => NodeAccess::ReadOnly,
            nodes::SEQUENCER_MODE => unlocked(!configuring),
            nodes::SEQUENCER_CONFIGURATION_MODE => {
                unlocked(!self.enum_is(nodes::SEQUENCER_MODE, entries::ON))
            }
            nodes::SEQUENCER_SET_SELECTOR
            | nodes::SEQUENCER_SET_NEXT
            | nodes::SEQUENCER_TRIGGER_SOURCE => unlocked(configuring),
            nodes::SEQUENCER_SET_SAVE => {
                if configuring {
                    NodeAccess::WriteOnly
                } else {
                    NodeAccess::ReadOnly
                }
            }
            nodes::EXPOSURE_TIME => unlocked(self.enum_is(nodes::EXPOSURE_AUTO, entries::OFF)),
            nodes::GAIN => unlocked(self.enum_is(nodes::GAIN_AUTO, entries::OFF)),
            nodes::ACQUISITION_FRAME_RATE => {
                unlocked(self.enum_is(nodes::ACQUISITION_FRAME_RATE_ENABLE, entries::ON))
            }
            nodes::WIDTH | nodes::HEIGHT | nodes::PIXEL_FORMAT | nodes::ACQUISITION_MODE => {
                unlocked(!self.streaming)
            }
            _ => NodeAccess::ReadWrite,
        }
    }

    fn check_writable(&self, layer: Layer, node: &str) -> CameraResult<()> {
        match self.access(layer, node) {
            NodeAccess::Unavailable => Err(CameraError::unavailable(node)),
            access if access.is_writable() => Ok(()),
            _ => Err(CameraError::not_writable(node)),
        }
    }

    fn check_readable(&self, layer: Layer, node: &str) -> CameraResult<()> {
        if self.access(layer, node).is_readable() {
            Ok(())
        } else {
            Err(CameraError::unavailable(node))
        }
    }

    fn entry_value(&self, layer: Layer, node: &str, entry: &str) -> Option<i64> {
        if !self.initialized
            || self
                .hidden_entries
                .contains(&(node.to_string(), entry.to_string()))
        {
            return None;
        }
        match self.table(layer).get(node)? {
            MockNode::Enum { entries, .. } => entries
                .iter()
                .find(|(name, _)| *name == entry)
                .map(|(_, v)| *v),
            _ => None,
        }
    }

    fn set_enum(&mut self, layer: Layer, node: &str, value: i64) -> CameraResult<()> {
        self.check_writable(layer, node)?;
        let symbolic = match self.table_mut(layer).get_mut(node) {
            Some(MockNode::Enum { entries, value: current }) => {
                let name = entries
                    .iter()
                    .find(|(_, v)| *v == value)
                    .map(|(name, _)| *name)
                    .ok_or_else(|| {
                        CameraError::Sdk(format!("{node}: no entry with value {value}"))
                    })?;
                *current = value;
                name
            }
            _ => return Err(CameraError::Sdk(format!("{node} is not an enumeration"))),
        };
        if node == nodes::SEQUENCER_MODE && symbolic == entries::ON {
            self.active_state = 0;
        }
        self.record(node, NodeValue::Enum(symbolic.to_string()));
        Ok(())
    }

    fn set_int(&mut self, node: &str, value: i64) -> CameraResult<()> {
        self.check_writable(Layer::Device, node)?;
        match self.device.get_mut(node) {
            Some(MockNode::Int { value: current, range }) => {
                if value < range.min || value > range.max || (value - range.min) % range.inc != 0
                {
                    return Err(CameraError::Sdk(format!(
                        "{node}: value {value} outside [{}, {}] step {}",
                        range.min, range.max, range.inc
                    )));
                }
                *current = value;
            }
            _ => return Err(CameraError::Sdk(format!("{node} is not an integer"))),
        }
        self.record(node, NodeValue::Int(value));
        Ok(())
    }

    fn set_float(&mut self, node: &str, value: f64) -> CameraResult<()> {
        self.check_writable(Layer::Device, node)?;
        match self.device.get_mut(node) {
            Some(MockNode::Float { value: current, range }) => {
                if value < range.min || value > range.max {
                    return Err(CameraError::Sdk(format!(
                        "{node}: value {value} outside [{}, {}]",
                        range.min, range.max
                    )));
                }
                *current = value;
            }
            _ => return Err(CameraError::Sdk(format!("{node} is not a float"))),
        }
        self.record(node, NodeValue::Float(value));
        Ok(())
    }

    fn execute(&mut self, node: &str) -> CameraResult<()> {
        self.check_writable(Layer::Device, node)?;
        if !matches!(self.device.get(node), Some(MockNode::Command)) {
            return Err(CameraError::Sdk(format!("{node} is not a command")));
        }
        if node == nodes::SEQUENCER_SET_SAVE {
            let index = self.int(nodes::SEQUENCER_SET_SELECTOR);
            let stored = StoredState {
                width: self.int(nodes::WIDTH),
                height: self.int(nodes::HEIGHT),
                exposure_us: self.float(nodes::EXPOSURE_TIME),
                gain_db: self.float(nodes::GAIN),
                trigger_source: self
                    .entry_name(nodes::SEQUENCER_TRIGGER_SOURCE)
                    .unwrap_or(entries::OFF)
                    .to_string(),
                next: self.int(nodes::SEQUENCER_SET_NEXT),
            };
            debug!(index, ?stored, "mock sequencer state saved");
            self.stored.insert(index, stored);
        }
        self.record(node, NodeValue::Command);
        Ok(())
    }

    fn record(&mut self, node: &str, value: NodeValue) {
        self.writes.push(NodeWrite {
            node: node.to_string(),
            value,
        });
    }

    fn sequence_valid(&self) -> bool {
        if self.reject_sequences || self.stored.is_empty() {
            return false;
        }
        let mut index = 0;
        for _ in 0..self.stored.len() {
            let Some(state) = self.stored.get(&index) else {
                return false;
            };
            if state.trigger_source != entries::FRAME_START {
                return false;
            }
            index = state.next;
            if index == 0 {
                return true;
            }
        }
        false
    }

    fn pixel_format(&self) -> PixelFormat {
        self.entry_name(nodes::PIXEL_FORMAT)
            .and_then(|name| PixelFormat::from_symbolic(name).ok())
            .unwrap_or(PixelFormat::Mono8)
    }

    /// Parameters for the next frame, advancing the sequencer when it runs.
    fn next_frame_parameters(&mut self) -> FrameParameters {
        let pixel_format = self.pixel_format();
        if self.enum_is(nodes::SEQUENCER_MODE, entries::ON) && self.sequence_valid() {
            if let Some(state) = self.stored.get(&self.active_state).cloned() {
                self.active_state = state.next;
                return FrameParameters {
                    width: state.width as u32,
                    height: state.height as u32,
                    pixel_format,
                    exposure_us: state.exposure_us,
                    gain_db: state.gain_db,
                };
            }
        }
        FrameParameters {
            width: self.int(nodes::WIDTH) as u32,
            height: self.int(nodes::HEIGHT) as u32,
            pixel_format,
            exposure_us: self.float(nodes::EXPOSURE_TIME),
            gain_db: self.float(nodes::GAIN),
        }
    }

    fn snapshot(&self) -> BTreeMap<String, NodeValue> {
        let mut out = BTreeMap::new();
        for (layer, table) in [(Layer::Device, &self.device), (Layer::Stream, &self.stream)] {
            for (name, node) in table {
                let value = match node {
                    MockNode::Enum { entries, .. } => {
                        let current = self.current_enum(layer, name).unwrap_or_default();
                        let symbolic = entries
                            .iter()
                            .find(|(_, v)| *v == current)
                            .map(|(n, _)| n.to_string())
                            .unwrap_or_default();
                        NodeValue::Enum(symbolic)
                    }
                    MockNode::Int { value, .. } => NodeValue::Int(*value),
                    MockNode::Float { value, .. } => NodeValue::Float(*value),
                    MockNode::Command => continue,
                };
                out.insert(name.to_string(), value);
            }
        }
        out
    }
}

/// Node map view onto the shared camera state.
struct MockNodeMap {
    state: Arc<Mutex<CameraState>>,
    layer: Layer,
}

impl NodeMap for MockNodeMap {
    fn access(&self, node: &str) -> NodeAccess {
        lock(&self.state).access(self.layer, node)
    }

    fn entry_value(&self, node: &str, entry: &str) -> Option<i64> {
        lock(&self.state).entry_value(self.layer, node, entry)
    }

    fn enum_value(&self, node: &str) -> CameraResult<i64> {
        let state = lock(&self.state);
        state.check_readable(self.layer, node)?;
        state.current_enum(self.layer, node)
    }

    fn set_enum_value(&mut self, node: &str, value: i64) -> CameraResult<()> {
        lock(&self.state).set_enum(self.layer, node, value)
    }

    fn int_value(&self, node: &str) -> CameraResult<i64> {
        let state = lock(&self.state);
        state.check_readable(self.layer, node)?;
        match state.node(self.layer, node)? {
            MockNode::Int { value, .. } => Ok(*value),
            _ => Err(CameraError::Sdk(format!("{node} is not an integer"))),
        }
    }

    fn set_int_value(&mut self, node: &str, value: i64) -> CameraResult<()> {
        if self.layer == Layer::Stream {
            return Err(CameraError::unavailable(node));
        }
        lock(&self.state).set_int(node, value)
    }

    fn int_range(&self, node: &str) -> CameraResult<IntRange> {
        let state = lock(&self.state);
        state.check_readable(self.layer, node)?;
        match state.node(self.layer, node)? {
            MockNode::Int { range, .. } => Ok(*range),
            _ => Err(CameraError::Sdk(format!("{node} is not an integer"))),
        }
    }

    fn float_value(&self, node: &str) -> CameraResult<f64> {
        let state = lock(&self.state);
        state.check_readable(self.layer, node)?;
        match state.node(self.layer, node)? {
            MockNode::Float { value, .. } => Ok(*value),
            _ => Err(CameraError::Sdk(format!("{node} is not a float"))),
        }
    }

    fn set_float_value(&mut self, node: &str, value: f64) -> CameraResult<()> {
        if self.layer == Layer::Stream {
            return Err(CameraError::unavailable(node));
        }
        lock(&self.state).set_float(node, value)
    }

    fn float_range(&self, node: &str) -> CameraResult<FloatRange> {
        let state = lock(&self.state);
        state.check_readable(self.layer, node)?;
        match state.node(self.layer, node)? {
            MockNode::Float { range, .. } => Ok(*range),
            _ => Err(CameraError::Sdk(format!("{node} is not a float"))),
        }
    }

    fn execute(&mut self, node: &str) -> CameraResult<()> {
        if self.layer == Layer::Stream {
            return Err(CameraError::unavailable(node));
        }
        lock(&self.state).execute(node)
    }
}

/// Mock polarization camera.
pub struct MockCamera {
    serial: String,
    state: Arc<Mutex<CameraState>>,
    device_nodes: MockNodeMap,
    stream_nodes: MockNodeMap,
    buffer: Vec<u8>,
}

impl MockCamera {
    /// Full-resolution 2448 x 2048 polarization sensor.
    pub fn new(serial: &str) -> Self {
        Self::with_sensor(serial, 2448, 2048)
    }

    /// Sensor of the given size; width is aligned down to 16 and height to 2.
    pub fn with_sensor(serial: &str, width: u32, height: u32) -> Self {
        let state = Arc::new(Mutex::new(CameraState::new(width, height)));
        Self {
            serial: serial.to_string(),
            device_nodes: MockNodeMap {
                state: Arc::clone(&state),
                layer: Layer::Device,
            },
            stream_nodes: MockNodeMap {
                state: Arc::clone(&state),
                layer: Layer::Stream,
            },
            state,
            buffer: Vec::new(),
        }
    }

    pub fn with_pattern(self, pattern: TestPattern) -> Self {
        lock(&self.state).pattern = pattern;
        self
    }

    /// Handle for inspecting this camera after it has been moved into a session.
    pub fn controls(&self) -> MockControls {
        MockControls {
            state: Arc::clone(&self.state),
        }
    }
}

impl CameraDevice for MockCamera {
    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn init(&mut self) -> CameraResult<()> {
        lock(&self.state).initialized = true;
        debug!(serial = %self.serial, "mock camera initialized");
        Ok(())
    }

    fn deinit(&mut self) -> CameraResult<()> {
        let mut state = lock(&self.state);
        state.streaming = false;
        state.initialized = false;
        debug!(serial = %self.serial, "mock camera de-initialized");
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        lock(&self.state).initialized
    }

    fn node_map(&mut self) -> &mut dyn NodeMap {
        &mut self.device_nodes
    }

    fn stream_node_map(&mut self) -> &mut dyn NodeMap {
        &mut self.stream_nodes
    }

    fn begin_acquisition(&mut self) -> CameraResult<()> {
        let mut state = lock(&self.state);
        if !state.initialized {
            return Err(CameraError::Sdk("camera not initialized".to_string()));
        }
        if state.streaming {
            return Err(CameraError::Sdk("stream has already been started".to_string()));
        }
        state.streaming = true;
        state.active_state = 0;
        state.acquisition_starts += 1;
        Ok(())
    }

    fn end_acquisition(&mut self) -> CameraResult<()> {
        let mut state = lock(&self.state);
        if !state.streaming {
            return Err(CameraError::Sdk("stream has not been started".to_string()));
        }
        state.streaming = false;
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }

    fn next_image(&mut self, timeout: Duration) -> CameraResult<SdkImage<'_>> {
        let (params, frame_id, status, pattern) = {
            let mut state = lock(&self.state);
            if !state.streaming {
                return Err(CameraError::Sdk("stream has not been started".to_string()));
            }
            state.last_timeout = Some(timeout);
            let params = state.next_frame_parameters();
            state.frame_counter += 1;
            let status = if state.incomplete_frames > 0 {
                state.incomplete_frames -= 1;
                MOCK_INCOMPLETE_STATUS
            } else {
                IMAGE_STATUS_OK
            };
            (params, state.frame_counter, status, state.pattern)
        };

        render(&mut self.buffer, &params, pattern, frame_id);

        Ok(SdkImage {
            width: params.width,
            height: params.height,
            pixel_format: params.pixel_format,
            frame_id,
            timestamp_ns: chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
            status,
            data: &self.buffer,
        })
    }
}

fn render(buffer: &mut Vec<u8>, params: &FrameParameters, pattern: TestPattern, frame_id: u64) {
    let (width, height) = (params.width as usize, params.height as usize);
    buffer.clear();
    buffer.resize(width * height, 0);

    let scale = params.exposure_us / REFERENCE_EXPOSURE_US * 10f64.powf(params.gain_db / 20.0);
    let spot_radius = (width.min(height) as f64) / 6.0;
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let mut rng = StdRng::seed_from_u64(frame_id);

    for y in 0..height {
        for x in 0..width {
            let quadrant = PolarQuadrant::at(x as u32, y as u32);
            let value = match pattern {
                TestPattern::ConstantQuadrants { i0, i45, i90, i135 } => match quadrant {
                    PolarQuadrant::I0 => i0,
                    PolarQuadrant::I45 => i45,
                    PolarQuadrant::I90 => i90,
                    PolarQuadrant::I135 => i135,
                },
                TestPattern::Scene => {
                    let radiance = 0.2 + 0.6 * (x as f64 / width.max(1) as f64);
                    let in_spot = (x as f64 - cx).hypot(y as f64 - cy) < spot_radius;
                    // specular highlight: bright and strongly polarized at 0°
                    let (radiance, dolp, aop) = if in_spot {
                        (1.0, 0.9, 0.0)
                    } else {
                        (radiance, 0.1, FRAC_PI_4)
                    };
                    let analyzer = match params.pixel_format {
                        PixelFormat::Polarized8 => {
                            (1.0 + dolp * (2.0 * (quadrant.angle_radians() - aop)).cos()) / 2.0
                        }
                        PixelFormat::Mono8 => 0.5,
                    };
                    let noise: f64 = rng.gen_range(-1.5..1.5);
                    (radiance * analyzer * scale * 255.0 + noise)
                        .round()
                        .clamp(0.0, 255.0) as u8
                }
            };
            buffer[y * width + x] = value;
        }
    }
}

/// Test-side handle onto a [`MockCamera`].
#[derive(Clone)]
pub struct MockControls {
    state: Arc<Mutex<CameraState>>,
}

impl MockControls {
    pub fn is_initialized(&self) -> bool {
        lock(&self.state).initialized
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.state).streaming
    }

    pub fn acquisition_starts(&self) -> usize {
        lock(&self.state).acquisition_starts
    }

    /// Timeout passed to the most recent `next_image` call.
    pub fn last_timeout(&self) -> Option<Duration> {
        lock(&self.state).last_timeout
    }

    /// Current values of every readable-in-principle node.
    pub fn node_snapshot(&self) -> BTreeMap<String, NodeValue> {
        lock(&self.state).snapshot()
    }

    pub fn node_value(&self, node: &str) -> Option<NodeValue> {
        self.node_snapshot().remove(node)
    }

    /// Accepted writes in order.
    pub fn writes(&self) -> Vec<NodeWrite> {
        lock(&self.state).writes.clone()
    }

    pub fn clear_writes(&self) {
        lock(&self.state).writes.clear();
    }

    /// Persisted sequencer table.
    pub fn stored_states(&self) -> BTreeMap<i64, StoredState> {
        lock(&self.state).stored.clone()
    }

    pub fn active_state(&self) -> i64 {
        lock(&self.state).active_state
    }

    /// Override the access mode reported for `node`.
    pub fn force_access(&self, node: &str, access: NodeAccess) {
        lock(&self.state).forced.insert(node.to_string(), access);
    }

    pub fn clear_forced_access(&self, node: &str) {
        lock(&self.state).forced.remove(node);
    }

    /// Make an enumeration entry unreadable.
    pub fn hide_entry(&self, node: &str, entry: &str) {
        lock(&self.state)
            .hidden_entries
            .insert((node.to_string(), entry.to_string()));
    }

    /// Deliver the next `count` frames flagged incomplete.
    pub fn fail_next_frames(&self, count: usize) {
        lock(&self.state).incomplete_frames = count;
    }

    /// Make the firmware report every sequence as invalid.
    pub fn reject_sequences(&self, reject: bool) {
        lock(&self.state).reject_sequences = reject;
    }

    pub fn set_int_range(&self, node: &str, new_range: IntRange) {
        let mut state = lock(&self.state);
        if let Some(MockNode::Int { value, range }) = state.device.get_mut(node) {
            *range = new_range;
            *value = (*value).clamp(new_range.min, new_range.max);
        }
    }

    pub fn set_float_range(&self, node: &str, new_range: FloatRange) {
        let mut state = lock(&self.state);
        if let Some(MockNode::Float { value, range }) = state.device.get_mut(node) {
            *range = new_range;
            *value = value.clamp(new_range.min, new_range.max);
        }
    }
}

/// Mock SDK instance.
pub struct MockSystem {
    cameras: Vec<MockCamera>,
    releases: Arc<AtomicUsize>,
    release_fault: Arc<AtomicBool>,
}

impl MockSystem {
    /// System exposing `cameras` in order.
    pub fn new(cameras: Vec<MockCamera>) -> Self {
        info!(count = cameras.len(), "mock camera system created");
        Self {
            cameras,
            releases: Arc::new(AtomicUsize::new(0)),
            release_fault: Arc::new(AtomicBool::new(false)),
        }
    }

    /// System with no camera attached.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Handle for inspecting the system after it has been moved into a session.
    pub fn controls(&self) -> SystemControls {
        SystemControls {
            releases: Arc::clone(&self.releases),
            release_fault: Arc::clone(&self.release_fault),
        }
    }
}

impl CameraSystem for MockSystem {
    fn library_version(&self) -> String {
        "0.1.0.0 (mock)".to_string()
    }

    fn cameras(&mut self) -> CameraResult<Vec<Box<dyn CameraDevice>>> {
        Ok(self
            .cameras
            .drain(..)
            .map(|camera| Box::new(camera) as Box<dyn CameraDevice>)
            .collect())
    }

    fn release(&mut self) -> CameraResult<()> {
        if self.releases.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(CameraError::Sdk("system instance already released".to_string()));
        }
        if self.release_fault.load(Ordering::SeqCst) {
            return Err(CameraError::Sdk("system release refused".to_string()));
        }
        Ok(())
    }
}

/// Test-side handle onto a [`MockSystem`].
#[derive(Clone)]
pub struct SystemControls {
    releases: Arc<AtomicUsize>,
    release_fault: Arc<AtomicBool>,
}

impl SystemControls {
    /// Number of `release` calls observed.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Make every subsequent `release` call fail.
    pub fn fail_release(&self) {
        self.release_fault.store(true, Ordering::SeqCst);
    }
}
