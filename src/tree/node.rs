use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fmt::{Debug, Display},
};

use super::{EdgeLength, NodeId};

/// Value of a user attribute attached to a node
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Free text
    Text(String),
    /// A numeric value (e.g. a sampling height)
    Number(f64),
    /// A boolean flag
    Flag(bool),
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Text(s) => write!(f, "{s}"),
            AttributeValue::Number(v) => write!(f, "{v}"),
            AttributeValue::Flag(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_owned())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Flag(value)
    }
}

use crate::tree::tree_impl::IdentityHasher;
type BuildIdentityHasher = core::hash::BuildHasherDefault<IdentityHasher>;

#[derive(Clone)]
/// A node of a rooted [`Tree`](super::Tree).
///
/// Nodes are only created through the tree (see
/// [`Tree::create_external_node`](super::Tree::create_external_node) and
/// [`Tree::create_internal_node`](super::Tree::create_internal_node)), which
/// owns them and hands out their [`NodeId`].
pub struct Node {
    /// Index of the node
    pub id: NodeId,
    /// Taxon bound to the node, only set for external nodes
    pub taxon: Option<String>,
    /// Optional label of an internal node (e.g. read from a newick string)
    pub label: Option<String>,
    /// Index of the parent node
    pub parent: Option<NodeId>,
    /// Indices of child nodes, in insertion order
    pub children: Vec<NodeId>,
    /// Stored length of the branch between parent and node
    pub(crate) length: Option<EdgeLength>,
    /// Stored height of the node (distance to the present)
    pub(crate) height: Option<f64>,
    /// Arbitrary name-value pairs
    pub(crate) attributes: BTreeMap<String, AttributeValue>,
    /// Distance to descendants of this node
    pub(crate) subtree_distances: RefCell<Option<HashMap<NodeId, EdgeLength, BuildIdentityHasher>>>,
}

impl Node {
    /// Creates a new, unattached node
    pub(crate) fn new() -> Self {
        Self {
            id: 0,
            taxon: None,
            label: None,
            parent: None,
            children: vec![],
            length: None,
            height: None,
            attributes: BTreeMap::new(),
            subtree_distances: RefCell::new(None),
        }
    }

    /// Creates a new node bound to a taxon
    pub(crate) fn new_external(taxon: &str) -> Self {
        Self {
            taxon: Some(String::from(taxon)),
            ..Self::new()
        }
    }

    /// Set the parent node
    pub(crate) fn set_parent(&mut self, parent: NodeId) {
        self.parent = Some(parent);
    }

    /// Adds a child to the node
    pub(crate) fn add_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    /// Check if the node is an external node (a tip)
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }

    /// Check if the node is a root node
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of edges incident to this node
    pub fn degree(&self) -> usize {
        self.children.len() + usize::from(self.parent.is_some())
    }

    /// Sets an attribute on the node, replacing any previous value
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_owned(), value.into());
    }

    /// Gets an attribute of the node
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Removes an attribute from the node and returns it
    pub fn remove_attribute(&mut self, name: &str) -> Option<AttributeValue> {
        self.attributes.remove(name)
    }

    /// Names of the attributes set on the node, in lexical order
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// The name to display for this node: its taxon, else its label
    pub fn name(&self) -> Option<&str> {
        self.taxon.as_deref().or(self.label.as_deref())
    }
}

/// Quotes a taxon name for newick output when it contains anything
/// other than ASCII alphanumerics, `_` or `-`.
pub(crate) fn quote_name(name: &str) -> String {
    let bare = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        name.to_owned()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        if self.parent.is_none() != other.parent.is_none() {
            return false;
        }

        let lengths_equal = match (self.length, other.length) {
            (None, None) => true,
            (Some(l1), Some(l2)) => (l1 - l2).abs() < f64::EPSILON,
            _ => false,
        };

        self.taxon == other.taxon
            && self.label == other.label
            && self.children.len() == other.children.len()
            && lengths_equal
    }
}

impl Eq for Node {}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name().unwrap_or_default())
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:?}) {:?} Id[{}] Parent[{:?}] Height[{:?}] Children({:?})",
            self.length,
            self.name(),
            self.id,
            self.parent,
            self.height,
            self.children,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(quote_name("Homo_sapiens"), "Homo_sapiens");
        assert_eq!(quote_name("seq-1"), "seq-1");
        assert_eq!(quote_name("Homo sapiens"), "'Homo sapiens'");
        assert_eq!(quote_name("it's"), "'it''s'");
        assert_eq!(quote_name("a:b"), "'a:b'");
        assert_eq!(quote_name(""), "''");
    }

    #[test]
    fn attributes() {
        let mut node = Node::new_external("A");
        assert!(node.get_attribute("height").is_none());

        node.set_attribute("height", 2.5);
        node.set_attribute("colour", "red");
        node.set_attribute("sampled", true);

        assert_eq!(
            node.get_attribute("height"),
            Some(&AttributeValue::Number(2.5))
        );
        assert_eq!(
            node.attribute_names().collect::<Vec<_>>(),
            vec!["colour", "height", "sampled"]
        );
        assert_eq!(
            node.remove_attribute("colour"),
            Some(AttributeValue::Text("red".into()))
        );
        assert_eq!(node.attribute_names().count(), 2);
    }

    #[test]
    fn children_and_degree() {
        let mut node = Node::new();
        node.id = 3;
        node.add_child(1);
        node.add_child(2);
        assert_eq!(node.degree(), 2);
        node.set_parent(7);
        assert_eq!(node.degree(), 3);
        assert!(!node.is_tip());
        assert!(!node.is_root());
    }
}
