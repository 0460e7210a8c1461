//! Property-node capability surface.
//!
//! [`NodeMap`] is the contract the vendor SDK fulfils: typed reads and writes
//! on named nodes plus a dynamic access query. Access depends on the current
//! device mode (sequencer configuration, auto-exposure, streaming), so it is
//! never cached.
//!
//! [`NodeAccessor`] is the checked front door used by every component. Each
//! helper re-queries [`NodeMap::access`] immediately before acting and maps a
//! failed check onto the matching [`CameraError`] variant.

use tracing::debug;

use crate::error::{CameraError, CameraResult};

/// Access mode of a node at the moment of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeAccess {
    /// Not implemented by the device, or not reachable in the current mode
    Unavailable,
    /// Value can be read but writes are rejected
    ReadOnly,
    /// Writes accepted, value not readable (commands)
    WriteOnly,
    ReadWrite,
}

impl NodeAccess {
    /// True for [`NodeAccess::ReadOnly`] and [`NodeAccess::ReadWrite`].
    pub fn is_readable(self) -> bool {
        matches!(self, NodeAccess::ReadOnly | NodeAccess::ReadWrite)
    }

    /// True for [`NodeAccess::WriteOnly`] and [`NodeAccess::ReadWrite`].
    pub fn is_writable(self) -> bool {
        matches!(self, NodeAccess::WriteOnly | NodeAccess::ReadWrite)
    }
}

/// Limits of an integer node. `min` and `max` are multiples of `inc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    /// Smallest accepted value
    pub min: i64,
    /// Largest accepted value
    pub max: i64,
    /// Step between accepted values
    pub inc: i64,
}

/// Limits of a float node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatRange {
    /// Smallest accepted value
    pub min: f64,
    /// Largest accepted value
    pub max: f64,
}

/// Raw node operations exposed by the camera SDK.
///
/// Implementations report faults (including writes the device refuses) as
/// errors; they do not need to pre-check access, [`NodeAccessor`] does that.
pub trait NodeMap: Send {
    /// Current access mode of `node`.
    fn access(&self, node: &str) -> NodeAccess;

    /// Integer value of an enumeration entry, `None` when the entry is missing
    /// or not readable.
    fn entry_value(&self, node: &str, entry: &str) -> Option<i64>;

    /// Integer value of the current entry of an enumeration node.
    fn enum_value(&self, node: &str) -> CameraResult<i64>;

    /// Select an enumeration entry by writing its integer value.
    fn set_enum_value(&mut self, node: &str, value: i64) -> CameraResult<()>;

    fn int_value(&self, node: &str) -> CameraResult<i64>;
    fn set_int_value(&mut self, node: &str, value: i64) -> CameraResult<()>;
    fn int_range(&self, node: &str) -> CameraResult<IntRange>;

    fn float_value(&self, node: &str) -> CameraResult<f64>;
    fn set_float_value(&mut self, node: &str, value: f64) -> CameraResult<()>;
    fn float_range(&self, node: &str) -> CameraResult<FloatRange>;

    /// Execute a command node.
    fn execute(&mut self, node: &str) -> CameraResult<()>;
}

/// Checked access to a [`NodeMap`].
pub struct NodeAccessor<'a> {
    map: &'a mut dyn NodeMap,
}

impl<'a> NodeAccessor<'a> {
    /// Wrap the node map of an initialized device.
    pub fn new(map: &'a mut dyn NodeMap) -> Self {
        Self { map }
    }

    /// Current access mode of `node`.
    pub fn access(&self, node: &str) -> NodeAccess {
        self.map.access(node)
    }

    /// True when the node is currently both readable and writable.
    pub fn is_read_write(&self, node: &str) -> bool {
        self.map.access(node) == NodeAccess::ReadWrite
    }

    /// [`CameraError::NodeUnavailable`] unless `node` can be read.
    pub fn require_readable(&self, node: &str) -> CameraResult<()> {
        if self.map.access(node).is_readable() {
            Ok(())
        } else {
            Err(CameraError::unavailable(node))
        }
    }

    /// [`CameraError::NodeNotWritable`] unless `node` can be written.
    pub fn require_writable(&self, node: &str) -> CameraResult<()> {
        match self.map.access(node) {
            NodeAccess::Unavailable => Err(CameraError::unavailable(node)),
            access if access.is_writable() => Ok(()),
            _ => Err(CameraError::not_writable(node)),
        }
    }

    /// Both of the above.
    pub fn require_read_write(&self, node: &str) -> CameraResult<()> {
        self.require_readable(node)?;
        self.require_writable(node)
    }

    /// Integer value of a readable entry.
    pub fn entry(&self, node: &str, entry: &str) -> CameraResult<i64> {
        self.map
            .entry_value(node, entry)
            .ok_or_else(|| CameraError::entry_unavailable(node, entry))
    }

    /// True when the enumeration currently sits on `entry`.
    pub fn enum_is(&self, node: &str, entry: &str) -> CameraResult<bool> {
        self.require_readable(node)?;
        let wanted = self.entry(node, entry)?;
        Ok(self.map.enum_value(node)? == wanted)
    }

    /// Select `entry` on an enumeration node.
    pub fn set_enum_entry(&mut self, node: &str, entry: &str) -> CameraResult<()> {
        self.require_read_write(node)?;
        let value = self.entry(node, entry)?;
        self.map.set_enum_value(node, value)?;
        debug!(node, entry, "enumeration set");
        Ok(())
    }

    /// Current value of a readable integer node.
    pub fn int_value(&self, node: &str) -> CameraResult<i64> {
        self.require_readable(node)?;
        self.map.int_value(node)
    }

    pub fn int_range(&self, node: &str) -> CameraResult<IntRange> {
        self.require_readable(node)?;
        self.map.int_range(node)
    }

    /// Write an integer node that only needs to be writable (selectors, links).
    pub fn set_int(&mut self, node: &str, value: i64) -> CameraResult<()> {
        self.require_writable(node)?;
        self.map.set_int_value(node, value)?;
        debug!(node, value, "integer set");
        Ok(())
    }

    /// Current value of a readable float node.
    pub fn float_value(&self, node: &str) -> CameraResult<f64> {
        self.require_readable(node)?;
        self.map.float_value(node)
    }

    pub fn float_range(&self, node: &str) -> CameraResult<FloatRange> {
        self.require_readable(node)?;
        self.map.float_range(node)
    }

    /// Write a float node. The node must be readable and writable.
    pub fn set_float(&mut self, node: &str, value: f64) -> CameraResult<()> {
        self.require_read_write(node)?;
        self.map.set_float_value(node, value)?;
        debug!(node, value, "float set");
        Ok(())
    }

    /// Run a command node.
    pub fn execute(&mut self, node: &str) -> CameraResult<()> {
        self.require_writable(node)?;
        self.map.execute(node)?;
        debug!(node, "command executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal map: one enumeration node with a configurable access mode.
    struct SingleEnum {
        access: NodeAccess,
        value: i64,
        entries: HashMap<&'static str, i64>,
    }

    impl NodeMap for SingleEnum {
        fn access(&self, node: &str) -> NodeAccess {
            if node == "Mode" {
                self.access
            } else {
                NodeAccess::Unavailable
            }
        }
        fn entry_value(&self, _node: &str, entry: &str) -> Option<i64> {
            self.entries.get(entry).copied()
        }
        fn enum_value(&self, _node: &str) -> CameraResult<i64> {
            Ok(self.value)
        }
        fn set_enum_value(&mut self, _node: &str, value: i64) -> CameraResult<()> {
            self.value = value;
            Ok(())
        }
        fn int_value(&self, node: &str) -> CameraResult<i64> {
            Err(CameraError::unavailable(node))
        }
        fn set_int_value(&mut self, node: &str, _value: i64) -> CameraResult<()> {
            Err(CameraError::unavailable(node))
        }
        fn int_range(&self, node: &str) -> CameraResult<IntRange> {
            Err(CameraError::unavailable(node))
        }
        fn float_value(&self, node: &str) -> CameraResult<f64> {
            Err(CameraError::unavailable(node))
        }
        fn set_float_value(&mut self, node: &str, _value: f64) -> CameraResult<()> {
            Err(CameraError::unavailable(node))
        }
        fn float_range(&self, node: &str) -> CameraResult<FloatRange> {
            Err(CameraError::unavailable(node))
        }
        fn execute(&mut self, node: &str) -> CameraResult<()> {
            Err(CameraError::unavailable(node))
        }
    }

    fn map(access: NodeAccess) -> SingleEnum {
        SingleEnum {
            access,
            value: 0,
            entries: HashMap::from([("Off", 0), ("On", 1)]),
        }
    }

    #[test]
    fn test_set_enum_entry_read_write() {
        let mut m = map(NodeAccess::ReadWrite);
        let mut nodes = NodeAccessor::new(&mut m);
        nodes.set_enum_entry("Mode", "On").unwrap();
        assert!(nodes.enum_is("Mode", "On").unwrap());
    }

    #[test]
    fn test_read_only_node_is_not_writable() {
        let mut m = map(NodeAccess::ReadOnly);
        let mut nodes = NodeAccessor::new(&mut m);
        let err = nodes.set_enum_entry("Mode", "On").unwrap_err();
        assert!(matches!(err, CameraError::NodeNotWritable { .. }));
        assert_eq!(m.value, 0);
    }

    #[test]
    fn test_write_only_node_fails_read_check() {
        let mut m = map(NodeAccess::WriteOnly);
        let mut nodes = NodeAccessor::new(&mut m);
        let err = nodes.set_enum_entry("Mode", "On").unwrap_err();
        assert!(matches!(err, CameraError::NodeUnavailable { .. }));
    }

    #[test]
    fn test_missing_node_and_entry() {
        let mut m = map(NodeAccess::ReadWrite);
        let mut nodes = NodeAccessor::new(&mut m);
        assert!(matches!(
            nodes.require_writable("Other").unwrap_err(),
            CameraError::NodeUnavailable { .. }
        ));
        assert!(matches!(
            nodes.set_enum_entry("Mode", "Continuous").unwrap_err(),
            CameraError::EntryUnavailable { .. }
        ));
    }

    #[test]
    fn test_access_flags() {
        assert!(NodeAccess::ReadWrite.is_readable() && NodeAccess::ReadWrite.is_writable());
        assert!(!NodeAccess::WriteOnly.is_readable());
        assert!(!NodeAccess::ReadOnly.is_writable());
        assert!(!NodeAccess::Unavailable.is_readable());
    }
}
