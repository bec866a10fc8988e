//! Identity types for the filter graph.
//!
//! Nodes live in the `Pipeline` arena and are addressed by `NodeId`, a newtype
//! over `u32` that doubles as the slot index. Plugs and sockets are owned by
//! their node, so they are addressed by the owning node plus a position.

use std::fmt;

/// Index into `Pipeline::nodes`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const INVALID: NodeId = NodeId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "NodeId(INVALID)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Input attachment point: plug `index` of `node`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlugRef {
    pub node: NodeId,
    pub index: usize,
}

impl PlugRef {
    pub const fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Debug for PlugRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plug(node={}, plug={})", self.node.0, self.index)
    }
}

/// Output attachment point: socket `index` of `node`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketRef {
    pub node: NodeId,
    pub index: usize,
}

impl SocketRef {
    pub const fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Debug for SocketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Socket(node={}, socket={})", self.node.0, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId(42);
        assert!(id.is_valid());
        assert_eq!(id.index(), 42);
        assert!(!NodeId::INVALID.is_valid());
    }

    #[test]
    fn test_port_refs_order_by_node_then_index() {
        let a = PlugRef::new(NodeId(1), 3);
        let b = PlugRef::new(NodeId(2), 0);
        assert!(a < b);
        assert_eq!(format!("{:?}", SocketRef::new(NodeId(7), 1)), "Socket(node=7, socket=1)");
    }
}
