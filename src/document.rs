//! Document wrapper around the node arena.
use crate::node::arena::NodeArena;
use crate::node::{Node, NodeData, NodeId};
use crate::whitelist;
use std::fmt;
use std::fmt::Display;

/// A purified document tree. Created with a single root node; the tree
/// builder attaches everything else underneath it.
#[derive(Debug)]
pub struct Document {
    arena: NodeArena,
}

impl Document {
    pub fn new() -> Self {
        let mut arena = NodeArena::new();
        arena.register_node(Node::new_document());
        Self { arena }
    }

    /// Registers a node and attaches it as the last child of the parent.
    /// Returns the id of the new node.
    pub fn add_node(&mut self, node: Node, parent_id: NodeId) -> NodeId {
        let node_id = self.arena.register_node(node);
        self.arena.attach_node(parent_id, node_id);
        node_id
    }

    /// Detaches a node from its parent without deleting it.
    pub fn detach_node(&mut self, node_id: NodeId) {
        self.arena.detach_node(node_id);
    }

    /// Removes a node and its whole subtree from the document.
    pub fn remove_node(&mut self, node_id: NodeId) {
        self.arena.remove_node(node_id);
    }

    pub fn get_node_by_id(&self, node_id: NodeId) -> Option<&Node> {
        self.arena.node(node_id)
    }

    pub fn get_mut_node_by_id(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.arena.node_mut(node_id)
    }

    /// Last child of the given node, if any.
    pub fn last_child_of(&self, node_id: NodeId) -> Option<&Node> {
        let node = self.arena.node(node_id)?;
        let last_id = node.children.last()?;
        self.arena.node(*last_id)
    }

    pub fn node_count(&self) -> usize {
        self.arena.node_count()
    }

    /// Whether a node renders as nothing: a whitespace-only text node, or an
    /// element whose children are all empty. Void elements such as `br` and
    /// `img` are never empty, so a paragraph holding only an image survives
    /// pruning. The root is never empty.
    pub fn is_empty_node(&self, node_id: NodeId) -> bool {
        let Some(node) = self.arena.node(node_id) else {
            return true;
        };
        match &node.data {
            NodeData::Document => false,
            NodeData::Text { value } => value.trim().is_empty(),
            NodeData::Element { .. } => {
                if whitelist::is_void(&node.name) {
                    return false;
                }
                node.children.iter().all(|&child| self.is_empty_node(child))
            }
        }
    }

    fn print_tree(&self, node_id: NodeId, prefix: String, last: bool, f: &mut fmt::Formatter) {
        let Some(node) = self.arena.node(node_id) else {
            return;
        };

        let mut buffer = prefix.clone();
        if last {
            buffer.push_str("└─ ");
        } else {
            buffer.push_str("├─ ");
        }

        match &node.data {
            NodeData::Document => {
                _ = writeln!(f, "{buffer}Document");
            }
            NodeData::Text { value } => {
                _ = writeln!(f, "{buffer}{value:?}");
            }
            NodeData::Element { attributes } => {
                _ = write!(f, "{buffer}<{}", node.name);
                for (name, value) in attributes {
                    _ = write!(f, " {name}={value:?}");
                }
                _ = writeln!(f, ">");
            }
        }

        let children = node.children.clone();
        let child_prefix = format!("{}{}", prefix, if last { "   " } else { "│  " });
        for (idx, &child) in children.iter().enumerate() {
            self.print_tree(child, child_prefix.clone(), idx == children.len() - 1, f);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.print_tree(NodeId::root(), "".to_string(), true, f);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_has_root() {
        let document = Document::new();
        let root = document.get_node_by_id(NodeId::root());
        assert!(root.is_some_and(|n| n.data == NodeData::Document));
        assert_eq!(document.node_count(), 1);
    }

    #[test]
    fn add_node_attaches_to_parent() {
        let mut document = Document::new();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        let text = document.add_node(Node::new_text("hi"), p);

        assert_eq!(
            document.get_node_by_id(p).and_then(|n| n.parent),
            Some(NodeId::root())
        );
        assert_eq!(document.last_child_of(p).map(|n| n.id), Some(text));
    }

    #[test]
    fn empty_detection() {
        let mut document = Document::new();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        assert!(document.is_empty_node(p));

        let blank = document.add_node(Node::new_text("  \n "), p);
        assert!(document.is_empty_node(blank));
        assert!(document.is_empty_node(p));

        document.add_node(Node::new_text("words"), p);
        assert!(!document.is_empty_node(p));
    }

    #[test]
    fn void_elements_are_never_empty() {
        let mut document = Document::new();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        let img = document.add_node(
            Node::new_element("img", vec![("src".into(), "x.png".into())]),
            p,
        );

        assert!(!document.is_empty_node(img));
        assert!(!document.is_empty_node(p));
    }

    #[test]
    fn nested_empty_elements_count_as_empty() {
        let mut document = Document::new();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        let strong = document.add_node(Node::new_element("strong", vec![]), p);
        document.add_node(Node::new_text(" "), strong);

        assert!(document.is_empty_node(p));
    }

    #[test]
    fn display_renders_tree() {
        let mut document = Document::new();
        let p = document.add_node(Node::new_element("p", vec![]), NodeId::root());
        document.add_node(Node::new_text("hi"), p);

        let rendered = format!("{document}");
        assert!(rendered.contains("Document"));
        assert!(rendered.contains("<p>"));
        assert!(rendered.contains("\"hi\""));
    }
}
