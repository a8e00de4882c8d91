//! Tree node model. Nodes live in a [`arena::NodeArena`] and reference each
//! other by [`NodeId`], so the builder can hold onto ids across mutations.
use derive_more::Display;

pub mod arena;

/// Id used to identify a node inside the arena
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Id of the document root. The root is created by
    /// [`crate::document::Document::new`] and is never detached or removed.
    pub const ROOT: NodeId = NodeId(0);

    pub fn root() -> Self {
        Self::ROOT
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    pub(crate) fn next(&self) -> Self {
        NodeId(self.0 + 1)
    }
}

/// Data attached to a node, depending on its kind.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeData {
    /// The document root. Exactly one per tree.
    Document,
    /// Character data. Adjacent text children are merged on insertion.
    Text { value: String },
    /// An element with its attributes in source order.
    Element {
        attributes: Vec<(String, String)>,
    },
}

/// A node in the purified tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Id of the node, 0 for the root
    pub id: NodeId,
    /// Parent of the node, if any
    pub parent: Option<NodeId>,
    /// Children in tree order
    pub children: Vec<NodeId>,
    /// Canonical (lowercase, post-rename) tag name; empty for non-elements
    pub name: String,
    /// Kind-specific payload
    pub data: NodeData,
}

impl Node {
    pub fn new_document() -> Self {
        Node {
            id: NodeId::default(),
            parent: None,
            children: vec![],
            name: String::new(),
            data: NodeData::Document,
        }
    }

    pub fn new_element(name: &str, attributes: Vec<(String, String)>) -> Self {
        Node {
            id: NodeId::default(),
            parent: None,
            children: vec![],
            name: name.to_owned(),
            data: NodeData::Element { attributes },
        }
    }

    pub fn new_text(value: &str) -> Self {
        Node {
            id: NodeId::default(),
            parent: None,
            children: vec![],
            name: String::new(),
            data: NodeData::Text {
                value: value.to_owned(),
            },
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text { .. })
    }

    /// Character data of a text node.
    pub fn text_value(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text { value } => Some(value),
            _ => None,
        }
    }

    /// Attributes of an element node, in source order.
    pub fn attributes(&self) -> &[(String, String)] {
        match &self.data {
            NodeData::Element { attributes } => attributes,
            _ => &[],
        }
    }

    /// First attribute with the given (lowercase) name.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    /// Shallow copy of an element: tag name and attributes, no tree links.
    /// Used when reconstructing active formatting elements.
    pub fn cloned_element(&self) -> Node {
        Node::new_element(&self.name, self.attributes().to_vec())
    }
}
