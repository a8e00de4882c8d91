use crate::node::{Node, NodeId};
use std::collections::HashMap;

/// The node arena is the single owner of all nodes in a document. Tree
/// structure is expressed through the parent/children ids on the nodes.
#[derive(Debug)]
pub struct NodeArena {
    /// Current nodes, keyed by id
    nodes: HashMap<NodeId, Node>,
    /// Next id to hand out
    next_id: NodeId,
}

impl NodeArena {
    /// Creates a new arena
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: NodeId::default(),
        }
    }

    /// Gets the node with the given id
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Gets the node with the given id as a mutable reference
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Registers a new node and returns its id. The node is not attached to
    /// any parent yet.
    pub fn register_node(&mut self, mut node: Node) -> NodeId {
        let id = self.next_id;
        self.next_id = id.next();

        node.id = id;
        node.parent = None;
        self.nodes.insert(id, node);
        id
    }

    /// Attaches a registered node as the last child of the given parent.
    pub fn attach_node(&mut self, parent_id: NodeId, node_id: NodeId) {
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.push(node_id);
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.parent = Some(parent_id);
        }
    }

    /// Detaches a node from its parent, leaving it and its subtree in the
    /// arena.
    pub fn detach_node(&mut self, node_id: NodeId) {
        let parent_id = match self.nodes.get(&node_id).and_then(|node| node.parent) {
            Some(parent_id) => parent_id,
            None => return,
        };

        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.retain(|&child_id| child_id != node_id);
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.parent = None;
        }
    }

    /// Detaches a node and removes it and its whole subtree from the arena.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if node_id.is_root() {
            return;
        }

        self.detach_node(node_id);

        let mut pending = vec![node_id];
        while let Some(id) = pending.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                pending.extend(node.children);
            }
        }
    }

    /// Number of live nodes in the arena
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}
