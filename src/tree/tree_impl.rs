use accurate::sum::NaiveSum;
use accurate::traits::*;
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use log::{debug, trace};
use ptree::{print_tree, TreeBuilder};
use std::collections::VecDeque;
use std::iter::zip;
use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fs,
    path::Path,
};
use thiserror::Error;

use super::node::{quote_name, AttributeValue, Node};
use super::unrooted::UnrootedTree;
use super::{EdgeDepth, EdgeLength, NodeId};

use crate::distance::{upper_triangle_index, DistanceMatrix, MatrixError};

/// Errors that can occur when reading, writing and manipulating [`Tree`]
/// and [`UnrootedTree`] structs.
#[derive(Error, Debug)]
pub enum TreeError {
    /// The tree is empty and we are trying to do something that require at least one node
    #[error("This tree is empty.")]
    IsEmpty,
    /// No root node was found in the tree and we are trying to do something
    /// that requires a root node
    #[error("No root node found")]
    RootNotFound,
    /// The requested node with index [`NodeId`] does not exist in the tree
    #[error("There is no node with index: {0}")]
    NodeNotFound(NodeId),
    /// A node is already bound to this taxon
    #[error("Taxon '{0}' is already present in the tree.")]
    DuplicateTaxon(String),
    /// The node was given as a child but is already attached to a parent
    #[error("Node {0} already has a parent.")]
    NodeHasParent(NodeId),
    /// The same node was listed several times as a child of a new node
    #[error("Node {0} is listed more than once as a child.")]
    RepeatedChild(NodeId),
    /// An internal node must be created with at least one child
    #[error("Cannot create an internal node without children.")]
    NoChildren,
    /// The node should be an external node (a tip)
    #[error("Node {0} is not an external node.")]
    NotExternal(NodeId),
    /// Branch lengths must be non-negative
    #[error("Branch lengths cannot be negative (got {0}).")]
    NegativeLength(EdgeLength),
    /// An edge cannot connect a node to itself
    #[error("Cannot connect node {0} to itself.")]
    SelfLoop(NodeId),
    /// The two nodes are already adjacent
    #[error("Nodes {0} and {1} are already connected.")]
    DuplicateEdge(NodeId, NodeId),
    /// The edge would connect two nodes that are already connected
    #[error("Connecting nodes {0} and {1} would create a cycle.")]
    Cycle(NodeId, NodeId),
    /// A node that ends up as a leaf has no taxon
    #[error("Node {0} would be a leaf but has no taxon.")]
    UnnamedLeaf(NodeId),
    /// The two nodes do not belong to the same connected tree
    #[error("Nodes {0} and {1} are not connected.")]
    Disconnected(NodeId, NodeId),
    /// Some branches of the tree have no length
    #[error("The tree must have all branch lengths.")]
    MissingBranchLengths,
    /// Switching between lengths and heights would drop the value stored
    /// for this node
    #[error("The value stored for node {0} cannot be carried over to the other representation.")]
    IncompleteRepresentation(NodeId),
    /// The trees we want to compare have different tips
    #[error("The trees have different tips indices.")]
    DifferentTipIndices,
    /// The tree structure contradicts itself (e.g. an adjacency that is not
    /// mirrored). This is a bug in this library, never a problem with the input.
    #[error("Internal graph inconsistency: {0}")]
    GraphInconsistency(String),
    /// There was a [`std::io::Error`] when writin the tree to a file
    #[error("Error writing tree to file")]
    IoError(#[from] std::io::Error),
    /// There was a [`MatrixError`] when extracting distance matrix
    #[error("Could not convert to matrix")]
    MatrixError(#[from] MatrixError),
}

/// Errors that can occur when parsing newick files.
#[derive(Error, Debug)]
pub enum NewickParseError {
    /// There is an unclosed bracket in the newick String
    #[error("Missing a closing bracket.")]
    UnclosedBracket,
    /// A quoted name is never closed
    #[error("Missing a closing quote.")]
    UnclosedQuote,
    /// The newick string is missing a final semi-colon
    #[error("The tree is missing a semi colon at the end.")]
    NoClosingSemicolon,
    /// We are trying to close a subtree but have no parent node.
    #[error("Parent node of subtree not found")]
    NoSubtreeParent,
    /// A leaf of the newick string has no taxon name
    #[error("All leaves must be named.")]
    UnnamedLeaf,
    /// There was a [`TreeError`] when building a tree fromthe newick string
    #[error("Problem with building the tree.")]
    TreeError(#[from] TreeError),
    /// There was a [`std::num::ParseFloatError`] when parsing branch lengths
    #[error("Could not parse a branch length")]
    FloatError(#[from] std::num::ParseFloatError),
    /// There was a [`std::io::Error`] when reading a newick file
    #[error("Problem reading file")]
    IoError(#[from] std::io::Error),
}

/// Which of branch lengths or node heights is stored for a [`Tree`].
/// The other one is derived on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Primary {
    /// Branch lengths are stored, heights are derived
    #[default]
    Lengths,
    /// Node heights are stored, branch lengths are derived
    Heights,
}

type Partition = FixedBitSet;
type PartitionSet = HashSet<Partition>;

/// A rooted phylogenetic tree.
///
/// Nodes are stored in an arena and addressed by their [`NodeId`]. Trees are
/// grown bottom-up: external nodes are created first with
/// [`Tree::create_external_node`], then grouped under new parents with
/// [`Tree::create_internal_node`]. The most recently created parentless node
/// is the root.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    taxa: HashMap<String, NodeId>,
    primary: Primary,
    derived: RefCell<Option<Vec<Option<f64>>>>,
    leaf_index: RefCell<Option<Vec<String>>>,
    partitions: RefCell<Option<PartitionSet>>,
}

/// Base methods to add and get [`Node`] objects to and from the [`Tree`].
///
/// ----
/// ----
impl Tree {
    /// Create a new empty Tree object
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            taxa: HashMap::new(),
            primary: Primary::Lengths,
            derived: RefCell::new(None),
            leaf_index: RefCell::new(None),
            partitions: RefCell::new(None),
        }
    }

    // ############################
    // # ADDING AND GETTING NODES #
    // ############################

    fn push(&mut self, node: Node) -> NodeId {
        let idx = self.nodes.len();
        let mut node = node;
        node.id = idx;
        self.nodes.push(node);
        self.invalidate_caches();

        idx
    }

    /// Creates a parentless external node bound to `taxon`.
    ///
    /// Nothing is created if the taxon is already present in the tree.
    /// ```
    /// use phylonj::tree::{Tree, TreeError};
    ///
    /// let mut tree = Tree::new();
    /// let a = tree.create_external_node("A").unwrap();
    ///
    /// assert_eq!(tree.get_taxon(&a).unwrap(), Some("A"));
    /// assert!(matches!(
    ///     tree.create_external_node("A"),
    ///     Err(TreeError::DuplicateTaxon(_))
    /// ));
    /// assert_eq!(tree.size(), 1);
    /// ```
    pub fn create_external_node(&mut self, taxon: &str) -> Result<NodeId, TreeError> {
        if self.taxa.contains_key(taxon) {
            return Err(TreeError::DuplicateTaxon(taxon.to_owned()));
        }
        let id = self.push(Node::new_external(taxon));
        self.taxa.insert(taxon.to_owned(), id);

        Ok(id)
    }

    /// Creates a parentless internal node with the given children, in order.
    /// Every child must exist and must not have a parent yet.
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let mut tree = Tree::new();
    /// let a = tree.create_external_node("A").unwrap();
    /// let b = tree.create_external_node("B").unwrap();
    /// let parent = tree.create_internal_node(&[a, b]).unwrap();
    ///
    /// assert_eq!(tree.get_root().unwrap(), parent);
    /// assert_eq!(tree.get_children(&parent).unwrap(), &[a, b]);
    /// assert_eq!(tree.get_parent(&a).unwrap(), Some(parent));
    /// ```
    pub fn create_internal_node(&mut self, children: &[NodeId]) -> Result<NodeId, TreeError> {
        if children.is_empty() {
            return Err(TreeError::NoChildren);
        }
        let mut seen = HashSet::new();
        for child in children {
            if self.get(child)?.parent.is_some() {
                return Err(TreeError::NodeHasParent(*child));
            }
            if !seen.insert(*child) {
                return Err(TreeError::RepeatedChild(*child));
            }
        }

        let id = self.push(Node::new());
        for &child in children {
            self.nodes[child].set_parent(id);
            self.nodes[id].add_child(child);
        }

        Ok(id)
    }

    /// Get a reference to a specific Node of the tree
    pub fn get(&self, id: &NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(*id).ok_or(TreeError::NodeNotFound(*id))
    }

    /// Get a mutable reference to a specific Node of the tree
    pub(crate) fn get_mut(&mut self, id: &NodeId) -> Result<&mut Node, TreeError> {
        self.nodes.get_mut(*id).ok_or(TreeError::NodeNotFound(*id))
    }

    /// Gets the id of the external node bound to a taxon
    pub fn get_by_taxon(&self, taxon: &str) -> Option<NodeId> {
        self.taxa.get(taxon).copied()
    }

    /// Gets the root node, i.e. the most recently created node without a parent.
    pub fn get_root(&self) -> Result<NodeId, TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::IsEmpty);
        }
        self.nodes
            .iter()
            .rev()
            .find(|node| node.parent.is_none())
            .map(|node| node.id)
            .ok_or(TreeError::RootNotFound)
    }

    /// Children of a node, in insertion order
    pub fn get_children(&self, id: &NodeId) -> Result<&[NodeId], TreeError> {
        Ok(&self.get(id)?.children)
    }

    /// Parent of a node, if any
    pub fn get_parent(&self, id: &NodeId) -> Result<Option<NodeId>, TreeError> {
        Ok(self.get(id)?.parent)
    }

    /// Checks if a node has no children
    pub fn is_external(&self, id: &NodeId) -> Result<bool, TreeError> {
        Ok(self.get(id)?.is_tip())
    }

    /// Taxon bound to a node, only set for external nodes
    pub fn get_taxon(&self, id: &NodeId) -> Result<Option<&str>, TreeError> {
        Ok(self.get(id)?.taxon.as_deref())
    }

    /// Number of edges incident to a node
    pub fn degree(&self, id: &NodeId) -> Result<usize, TreeError> {
        Ok(self.get(id)?.degree())
    }

    /// Sets the label of a node (e.g. a support value or a clade name)
    pub fn set_label(&mut self, id: &NodeId, label: &str) -> Result<(), TreeError> {
        self.get_mut(id)?.label = Some(label.to_owned());
        Ok(())
    }

    /// Sets a user attribute on a node
    pub fn set_attribute(
        &mut self,
        id: &NodeId,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> Result<(), TreeError> {
        self.get_mut(id)?.set_attribute(name, value);
        Ok(())
    }

    /// Gets a user attribute of a node
    pub fn get_attribute(&self, id: &NodeId, name: &str) -> Result<Option<&AttributeValue>, TreeError> {
        Ok(self.get(id)?.get_attribute(name))
    }

    /// Returns a [`Vec`] containing the Node IDs of leaf nodes of the tree
    pub fn get_leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|&node| node.is_tip())
            .map(|node| node.id)
            .collect()
    }

    /// Iterates over external nodes, in creation order
    pub fn external_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| node.is_tip())
    }

    /// Iterates over internal nodes, in creation order
    pub fn internal_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.is_tip())
    }

    /// Ids of the nodes with exactly `degree` incident edges
    pub fn nodes_with_degree(&self, degree: usize) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.degree() == degree)
            .map(|node| node.id)
            .collect()
    }

    /// Gets the node ids of all the nodes in the subtree rooted at the specified node
    pub fn get_subtree(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        self.preorder(root)
    }

    /// Gets the node ids of all the leaves in the subtree rooted at the specified node
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;").unwrap();
    /// let c = tree.get_by_taxon("C").unwrap();
    /// let sub_root = tree.get_parent(&c).unwrap().unwrap();
    /// let sub_leaves: Vec<_> = tree.get_subtree_leaves(&sub_root)
    ///     .unwrap()
    ///     .iter()
    ///     .filter_map(|id| tree.get_taxon(id).unwrap())
    ///     .collect();
    ///
    /// assert_eq!(sub_leaves, vec!["C", "D"])
    /// ```
    pub fn get_subtree_leaves(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut leaves = vec![];
        for id in self.get_subtree(root)? {
            if self.get(&id)?.is_tip() {
                leaves.push(id);
            }
        }
        Ok(leaves)
    }

    fn invalidate_caches(&mut self) {
        *self.derived.get_mut() = None;
        *self.leaf_index.get_mut() = None;
        *self.partitions.get_mut() = None;
    }
}

/// Branch lengths and node heights.
///
/// A tree stores one of them (its [`Primary`] representation) and derives
/// the other lazily. Derived values are cached until the next mutation.
///
/// ----
/// ----
impl Tree {
    // #########################
    // # LENGTHS AND HEIGHTS   #
    // #########################

    /// The stored representation of the tree
    pub fn primary(&self) -> Primary {
        self.primary
    }

    /// Sets the length of the branch between a node and its parent.
    ///
    /// If heights were the primary representation, every derived length is
    /// stored first and lengths become primary.
    /// The switch is refused with [`TreeError::IncompleteRepresentation`] if
    /// a stored value cannot be carried over.
    /// ```
    /// use phylonj::tree::{Primary, Tree};
    ///
    /// let mut tree = Tree::new();
    /// let a = tree.create_external_node("A").unwrap();
    /// let b = tree.create_external_node("B").unwrap();
    /// let root = tree.create_internal_node(&[a, b]).unwrap();
    ///
    /// tree.set_height(&a, 0.0).unwrap();
    /// tree.set_height(&b, 0.0).unwrap();
    /// tree.set_height(&root, 2.0).unwrap();
    /// assert_eq!(tree.get_length(&a).unwrap(), Some(2.0));
    ///
    /// tree.set_length(&a, 1.0).unwrap();
    /// assert_eq!(tree.primary(), Primary::Lengths);
    /// assert_eq!(tree.get_length(&b).unwrap(), Some(2.0));
    /// assert_eq!(tree.get_height(&a).unwrap(), Some(1.0));
    /// ```
    pub fn set_length(&mut self, id: &NodeId, length: EdgeLength) -> Result<(), TreeError> {
        if length < 0.0 {
            return Err(TreeError::NegativeLength(length));
        }
        self.get(id)?;

        if self.primary == Primary::Heights {
            self.switch_primary()?;
        }

        self.nodes[*id].length = Some(length);
        self.invalidate_caches();
        Ok(())
    }

    /// Sets the height of a node (its distance to the present).
    ///
    /// If lengths were the primary representation, every derived height is
    /// stored first and heights become primary.
    /// The switch is refused with [`TreeError::IncompleteRepresentation`] if
    /// a stored value cannot be carried over.
    pub fn set_height(&mut self, id: &NodeId, height: f64) -> Result<(), TreeError> {
        self.get(id)?;

        if self.primary == Primary::Lengths {
            self.switch_primary()?;
        }

        self.nodes[*id].height = Some(height);
        self.invalidate_caches();
        Ok(())
    }

    /// Stores the derived representation in place of the primary one.
    /// Fails, leaving the tree untouched, if a stored length (or the height
    /// of a non-root node) cannot be recovered from the derived values.
    fn switch_primary(&mut self) -> Result<(), TreeError> {
        let derived = self.derived_values();
        let known = |id: NodeId| derived.get(id).copied().flatten().is_some();

        let lost = self.nodes.iter().find(|node| match self.primary {
            Primary::Lengths => {
                node.length.is_some() && node.parent.is_some_and(|p| !known(p) || !known(node.id))
            }
            Primary::Heights => node.height.is_some() && node.parent.is_some() && !known(node.id),
        });
        if let Some(node) = lost {
            return Err(TreeError::IncompleteRepresentation(node.id));
        }

        let primary = match self.primary {
            Primary::Lengths => Primary::Heights,
            Primary::Heights => Primary::Lengths,
        };
        for (node, value) in self.nodes.iter_mut().zip(derived) {
            match primary {
                Primary::Heights => {
                    node.height = value;
                    node.length = None;
                }
                Primary::Lengths => {
                    node.length = value;
                    node.height = None;
                }
            }
        }
        self.primary = primary;
        debug!("Tree switched to {primary:?} as primary representation");
        Ok(())
    }

    /// Length of the branch between a node and its parent
    pub fn get_length(&self, id: &NodeId) -> Result<Option<EdgeLength>, TreeError> {
        let node = self.get(id)?;
        Ok(match self.primary {
            Primary::Lengths => node.length,
            Primary::Heights => self.derived_value(*id),
        })
    }

    /// Height of a node. When lengths are primary, the height of a node is
    /// the height of the tree minus its distance from the root.
    pub fn get_height(&self, id: &NodeId) -> Result<Option<f64>, TreeError> {
        let node = self.get(id)?;
        Ok(match self.primary {
            Primary::Lengths => self.derived_value(*id),
            Primary::Heights => node.height,
        })
    }

    /// Checks that every non-root node has a branch length
    pub fn has_lengths(&self) -> bool {
        let lengths = match self.primary {
            Primary::Lengths => self.nodes.iter().map(|node| node.length).collect_vec(),
            Primary::Heights => self.derived_values(),
        };
        self.nodes.len() > 1
            && zip(self.nodes.iter(), lengths).all(|(node, len)| node.is_root() || len.is_some())
    }

    /// Checks that every node has a height
    pub fn has_heights(&self) -> bool {
        let heights = match self.primary {
            Primary::Lengths => self.derived_values(),
            Primary::Heights => self.nodes.iter().map(|node| node.height).collect_vec(),
        };
        !heights.is_empty() && heights.iter().all(Option::is_some)
    }

    fn derived_value(&self, id: NodeId) -> Option<f64> {
        self.ensure_derived();
        self.derived
            .borrow()
            .as_ref()
            .and_then(|values| values.get(id).copied().flatten())
    }

    fn derived_values(&self) -> Vec<Option<f64>> {
        self.ensure_derived();
        self.derived.borrow().clone().unwrap_or_default()
    }

    fn ensure_derived(&self) {
        if self.derived.borrow().is_some() {
            return;
        }
        let values = match self.primary {
            Primary::Lengths => self.heights_from_lengths(),
            Primary::Heights => self.lengths_from_heights(),
        };
        trace!("Computed {} derived values", values.len());
        *self.derived.borrow_mut() = Some(values);
    }

    /// Heights of every node, derived separately for each parentless
    /// subtree. A subtree with a missing tip distance gets no heights.
    fn heights_from_lengths(&self) -> Vec<Option<f64>> {
        let mut heights = vec![None; self.nodes.len()];
        let mut from_root = vec![None; self.nodes.len()];

        for root in self.nodes.iter().filter(|node| node.is_root()).map(|node| node.id) {
            let Ok(order) = self.preorder(&root) else {
                continue;
            };

            from_root[root] = Some(0.0);
            for &id in order.iter().skip(1) {
                let node = &self.nodes[id];
                from_root[id] = match (node.parent.and_then(|p| from_root[p]), node.length) {
                    (Some(d), Some(l)) => Some(d + l),
                    _ => None,
                };
            }

            let tip_distances: Option<Vec<f64>> = order
                .iter()
                .filter(|&&id| self.nodes[id].is_tip())
                .map(|&id| from_root[id])
                .collect();
            let Some(tip_distances) = tip_distances else {
                continue;
            };
            let root_height = tip_distances.into_iter().fold(0.0, f64::max);

            for id in order {
                heights[id] = from_root[id].map(|d| root_height - d);
            }
        }
        heights
    }

    fn lengths_from_heights(&self) -> Vec<Option<f64>> {
        self.nodes
            .iter()
            .map(|node| {
                let parent = node.parent?;
                Some(self.nodes[parent].height? - node.height?)
            })
            .collect()
    }

    /// Checks if all tips are at the same height, within a relative tolerance of 1e-9.
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A:1,B:1):1,C:2);").unwrap();
    /// assert!(tree.is_ultrametric().unwrap());
    ///
    /// let tree = Tree::from_newick("((A:1,B:2):1,C:2);").unwrap();
    /// assert!(!tree.is_ultrametric().unwrap());
    /// ```
    pub fn is_ultrametric(&self) -> Result<bool, TreeError> {
        let mut tip_heights = vec![];
        for id in self.get_leaves() {
            tip_heights.push(self.get_height(&id)?.ok_or(TreeError::MissingBranchLengths)?);
        }
        let Some((min, max)) = tip_heights.into_iter().minmax().into_option() else {
            return Err(TreeError::IsEmpty);
        };
        let root_height = self
            .get_height(&self.get_root()?)?
            .ok_or(TreeError::MissingBranchLengths)?;
        let tolerance = 1e-9 * root_height.abs().max(1.0);

        Ok(max - min <= tolerance)
    }

    /// Smallest height among the tips under a node
    pub fn min_node_height(&self, id: &NodeId) -> Result<Option<f64>, TreeError> {
        let mut min: Option<f64> = None;
        for leaf in self.get_subtree_leaves(id)? {
            match self.get_height(&leaf)? {
                Some(h) => min = Some(min.map_or(h, |m| m.min(h))),
                None => return Ok(None),
            }
        }
        Ok(min)
    }

    /// Height of a node if it is known, else the number of edges between
    /// the node and its farthest descendant tip.
    pub fn safe_node_height(&self, id: &NodeId) -> Result<f64, TreeError> {
        match self.get_height(id)? {
            Some(height) => Ok(height),
            None => Ok(self.levels_below(id)? as f64),
        }
    }

    /// Multiplies every stored branch length (or node height) by `factor`
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let mut tree = Tree::from_newick("(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;").unwrap();
    /// tree.rescale(2.0);
    ///
    /// assert_eq!(
    ///     tree.to_newick().unwrap(),
    ///     "(A:0.2,B:0.4,(C:0.6,D:0.8)E:1)F;"
    /// )
    /// ```
    pub fn rescale(&mut self, factor: f64) {
        for node in self.nodes.iter_mut() {
            match self.primary {
                Primary::Lengths => node.length = node.length.map(|l| l * factor),
                Primary::Heights => node.height = node.height.map(|h| h * factor),
            }
        }
        self.invalidate_caches();
    }
}

/// Methods to traverse the [`Tree`]
///
/// ----
/// ----
impl Tree {
    // ###################
    // # TREE TRAVERSALS #
    // ###################

    /// Gets the node indices in a pre-order traversal of the tree
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B)D,C)E;").unwrap();
    /// let root = tree.get_root().unwrap();
    /// let names: Vec<_> = tree
    ///     .preorder(&root)
    ///     .unwrap()
    ///     .iter()
    ///     .filter_map(|id| tree.get(id).unwrap().name())
    ///     .collect();
    ///
    /// assert_eq!(names, vec!["E", "D", "A", "B", "C"]);
    /// ```
    pub fn preorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut indices = vec![];
        let mut stack = vec![*root];
        while let Some(id) = stack.pop() {
            indices.push(id);
            stack.extend(self.get(&id)?.children.iter().rev().copied());
        }

        Ok(indices)
    }

    /// Gets the node indices in a post-order traversal of the tree
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B)D,C)E;").unwrap();
    /// let root = tree.get_root().unwrap();
    /// let names: Vec<_> = tree
    ///     .postorder(&root)
    ///     .unwrap()
    ///     .iter()
    ///     .filter_map(|id| tree.get(id).unwrap().name())
    ///     .collect();
    ///
    /// assert_eq!(names, vec!["A", "B", "D", "C", "E"]);
    /// ```
    pub fn postorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        // parents before children, right to left, then reversed
        let mut indices = vec![];
        let mut stack = vec![*root];
        while let Some(id) = stack.pop() {
            indices.push(id);
            stack.extend(self.get(&id)?.children.iter().copied());
        }
        indices.reverse();

        Ok(indices)
    }

    /// Gets the node indices in a level-order traversal of the tree
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B)D,C)E;").unwrap();
    /// let root = tree.get_root().unwrap();
    /// let names: Vec<_> = tree
    ///     .levelorder(&root)
    ///     .unwrap()
    ///     .iter()
    ///     .filter_map(|id| tree.get(id).unwrap().name())
    ///     .collect();
    ///
    /// assert_eq!(names, vec!["E", "D", "C", "A", "B"]);
    /// ```
    pub fn levelorder(&self, root: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut indices = vec![];
        let mut queue = VecDeque::new();
        queue.push_back(*root);
        while let Some(id) = queue.pop_front() {
            indices.push(id);
            queue.extend(self.get(&id)?.children.iter().copied());
        }

        Ok(indices)
    }

    /// Tips in left-to-right order
    fn tip_order(&self) -> Result<Vec<NodeId>, TreeError> {
        Ok(self
            .preorder(&self.get_root()?)?
            .into_iter()
            .filter(|id| self.nodes[*id].is_tip())
            .collect())
    }

    fn neighbour(&self, tip: &NodeId, offset: isize) -> Result<Option<NodeId>, TreeError> {
        if !self.is_external(tip)? {
            return Err(TreeError::NotExternal(*tip));
        }
        let order = self.tip_order()?;
        let Some(position) = order.iter().position(|id| id == tip) else {
            return Ok(None);
        };
        Ok(position
            .checked_add_signed(offset)
            .and_then(|p| order.get(p).copied()))
    }

    /// The tip drawn right after `tip` (`None` for the last tip)
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,B),C);").unwrap();
    /// let a = tree.get_by_taxon("A").unwrap();
    /// let b = tree.get_by_taxon("B").unwrap();
    /// let c = tree.get_by_taxon("C").unwrap();
    ///
    /// assert_eq!(tree.right_neighbour(&b).unwrap(), Some(c));
    /// assert_eq!(tree.right_neighbour(&c).unwrap(), None);
    /// assert_eq!(tree.left_neighbour(&b).unwrap(), Some(a));
    /// ```
    pub fn right_neighbour(&self, tip: &NodeId) -> Result<Option<NodeId>, TreeError> {
        self.neighbour(tip, 1)
    }

    /// The tip drawn right before `tip` (`None` for the first tip)
    pub fn left_neighbour(&self, tip: &NodeId) -> Result<Option<NodeId>, TreeError> {
        self.neighbour(tip, -1)
    }
}

/// Methods that compute characteristics and measures to describe the [`Tree`]
///
/// ----
/// ----
impl Tree {
    // #######################################
    // # GETTING CHARACTERISTICS OF THE TREE #
    // #######################################

    /// Check if the tree is binary: the root has two children and every other
    /// internal node has degree 3.
    pub fn is_binary(&self) -> Result<bool, TreeError> {
        let root = self.get_root()?;
        if self.nodes.len() == 1 {
            return Ok(true);
        }
        for node in self.nodes.iter() {
            if node.id == root {
                if node.children.len() != 2 {
                    return Ok(false);
                }
            } else if !node.is_tip() && node.degree() != 3 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns the number of nodes in the tree
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of leaves in the tree
    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|&node| node.is_tip()).count()
    }

    /// Number of tips under a node
    pub fn external_node_count(&self, id: &NodeId) -> Result<usize, TreeError> {
        Ok(self.get_subtree_leaves(id)?.len())
    }

    fn levels_below(&self, id: &NodeId) -> Result<EdgeDepth, TreeError> {
        let mut levels = 0;
        let mut stack = vec![(*id, 0)];
        while let Some((node, depth)) = stack.pop() {
            levels = levels.max(depth);
            stack.extend(self.get(&node)?.children.iter().map(|&c| (c, depth + 1)));
        }
        Ok(levels)
    }

    /// Largest number of edges between the root and a tip
    pub fn max_levels(&self) -> Result<EdgeDepth, TreeError> {
        self.levels_below(&self.get_root()?)
    }

    fn sum_or_edges(&self, source: &NodeId, target: &NodeId) -> Result<f64, TreeError> {
        let (edge_sum, num_edges) = self.get_distance(source, target)?;
        Ok(edge_sum.unwrap_or(num_edges as f64))
    }

    /// Returns the height of the tree
    /// (i.e. the number of edges or branch length sum from the root to the deepest tip)
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A:0.1,B:0.2)G:0.1,(C:0.3,D:0.4)E:0.5)F;").unwrap();
    /// assert_eq!(tree.height().unwrap(), 0.9);
    ///
    /// let tree_no_brlen = Tree::from_newick("((A,B)G,(C,D)E)F;").unwrap();
    /// assert_eq!(tree_no_brlen.height().unwrap(), 2.);
    /// ```
    pub fn height(&self) -> Result<EdgeLength, TreeError> {
        let root = self.get_root()?;
        let mut height: Option<f64> = None;
        for leaf in self.get_leaves() {
            let d = self.sum_or_edges(&root, &leaf)?;
            height = Some(height.map_or(d, |h| h.max(d)));
        }
        height.ok_or(TreeError::IsEmpty)
    }

    /// Returns the diameter of the tree
    /// (i.e. longest tip to tip distance)
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;").unwrap();
    /// assert_eq!(tree.diameter().unwrap(), 1.1);
    ///
    /// let tree_no_brlen = Tree::from_newick("(A,B,(C,D)E)F;").unwrap();
    /// assert_eq!(tree_no_brlen.diameter().unwrap(), 3.);
    /// ```
    pub fn diameter(&self) -> Result<EdgeLength, TreeError> {
        let mut diameter: Option<f64> = None;
        for (a, b) in self.get_leaves().iter().tuple_combinations() {
            let d = self.sum_or_edges(a, b)?;
            diameter = Some(diameter.map_or(d, |m| m.max(d)));
        }
        diameter.ok_or(TreeError::IsEmpty)
    }

    /// Returns the length of the tree
    /// (i.e. the sum of branch lengths)
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;").unwrap();
    /// assert!((tree.length().unwrap() - 1.5).abs() < 1e-12);
    /// ```
    pub fn length(&self) -> Result<EdgeLength, TreeError> {
        let mut total = 0.0;
        for node in self.nodes.iter().filter(|n| !n.is_root()) {
            total += self
                .get_length(&node.id)?
                .ok_or(TreeError::MissingBranchLengths)?;
        }
        Ok(total)
    }
}

/// Methods to compare the topology of two [`Tree`] objects.
///
/// ----
/// ----
impl Tree {
    // #########################
    // # GET EDGES IN THE TREE #
    // #########################

    /// Initializes the leaf index
    fn init_leaf_index(&self) -> Result<(), TreeError> {
        if self.nodes.is_empty() {
            return Err(TreeError::IsEmpty);
        }
        if self.leaf_index.borrow().is_some() {
            return Ok(());
        }

        let names = self
            .external_nodes()
            .filter_map(|node| node.taxon.clone())
            .sorted()
            .collect();
        (*self.leaf_index.borrow_mut()) = Some(names);

        Ok(())
    }

    /// Get the partition corresponding to the branch associated to the node at index
    fn get_partition(&self, index: &NodeId) -> Result<Partition, TreeError> {
        self.init_leaf_index()?;

        let leaf_index = self.leaf_index.borrow();
        let leaf_index = leaf_index.as_deref().unwrap_or_default();

        let mut bitset = FixedBitSet::with_capacity(leaf_index.len());
        for leaf in self.get_subtree_leaves(index)? {
            if let Some(taxon) = &self.nodes[leaf].taxon {
                if let Ok(position) = leaf_index.binary_search(taxon) {
                    bitset.insert(position);
                }
            }
        }

        let mut toggled = bitset.clone();
        toggled.toggle_range(..);

        Ok(toggled.min(bitset))
    }

    /// Helper function to view a partition as the taxa on its stored side
    pub fn partition_to_leaves(&self, partition: &Partition) -> Result<Vec<String>, TreeError> {
        self.init_leaf_index()?;

        let leaf_index = self.leaf_index.borrow();
        let leaf_index = leaf_index.as_deref().unwrap_or_default();
        Ok(partition
            .ones()
            .filter_map(|i| leaf_index.get(i).cloned())
            .collect())
    }

    /// Caches non-trivial partitions
    fn init_partitions(&self) -> Result<(), TreeError> {
        self.init_leaf_index()?;

        if self.partitions.borrow().is_some() {
            return Ok(());
        }

        let n_leaves = self.leaf_index.borrow().as_ref().map_or(0, Vec::len);
        let mut partitions = PartitionSet::new();
        for node in self
            .nodes
            .iter()
            .filter(|n| !(n.parent.is_none() || n.is_tip()))
        {
            let part = self.get_partition(&node.id)?;
            // a side holding a single leaf is trivial
            let ones = part.count_ones(..);
            if ones > 1 && ones + 1 < n_leaves {
                partitions.insert(part);
            }
        }

        (*self.partitions.borrow_mut()) = Some(partitions);

        Ok(())
    }

    /// Get all non-trivial bipartitions of a tree
    pub fn get_partitions(&self) -> Result<PartitionSet, TreeError> {
        self.init_partitions()?;

        Ok(self.partitions.borrow().clone().unwrap_or_default())
    }

    // #################
    // # COMPARE TREES #
    // #################

    /// Computes the [Robinson Foulds distance](https://en.wikipedia.org/wiki/Robinson–Foulds_metric)
    /// [(Robinson & Foulds, 1981)](https://doi.org/10.1016/0025-5564(81)90043-2)
    /// between two trees, seen as unrooted:
    /// $$
    /// RF = |A\cup B| - |A\cap B|
    /// $$
    /// Where $A$ and $B$ are the sets of bipartitions of the first and second trees.
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let t1 = Tree::from_newick("((A,B),(C,D),E);").unwrap();
    /// let t2 = Tree::from_newick("((A,C),(B,D),E);").unwrap();
    ///
    /// assert_eq!(t1.robinson_foulds(&t1).unwrap(), 0);
    /// assert_eq!(t1.robinson_foulds(&t2).unwrap(), 4);
    /// ```
    pub fn robinson_foulds(&self, other: &Self) -> Result<usize, TreeError> {
        let partitions_s = self.get_partitions()?;
        let partitions_o = other.get_partitions()?;

        if *(self.leaf_index.borrow()) != *(other.leaf_index.borrow()) {
            return Err(TreeError::DifferentTipIndices);
        }

        let i = partitions_o.intersection(&partitions_s).count();
        Ok(partitions_o.len() + partitions_s.len() - 2 * i)
    }
}

/// Methods to find paths and distances within the [`Tree`].
///
/// ----
/// ----
impl Tree {
    // ##########################
    // # FIND PATHS IN THE TREE #
    // ##########################

    /// Returns the path from the root to the node
    pub fn get_path_from_root(&self, node: &NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut path = vec![];
        let mut current_node = *node;
        loop {
            path.push(current_node);
            match self.get(&current_node)?.parent {
                Some(parent) => current_node = parent,
                None => break,
            }
        }

        Ok(path.into_iter().rev().collect())
    }

    /// Index where the paths from the root to `source` and `target` split
    fn divergence_point(
        &self,
        source: &NodeId,
        target: &NodeId,
    ) -> Result<(Vec<NodeId>, Vec<NodeId>, usize), TreeError> {
        let root_to_source = self.get_path_from_root(source)?;
        let root_to_target = self.get_path_from_root(target)?;

        let cursor = zip(root_to_source.iter(), root_to_target.iter())
            .position(|(s, t)| s != t)
            .unwrap_or_else(|| {
                // One node is an ancestor of the other
                root_to_source.len().min(root_to_target.len())
            });

        if cursor == 0 {
            return Err(TreeError::Disconnected(*source, *target));
        }

        Ok((root_to_source, root_to_target, cursor))
    }

    /// Gets the most recent common ancestor between two tree nodes
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let ancestor = tree.get_common_ancestor(
    ///     &tree.get_by_taxon("A").unwrap(),
    ///     &tree.get_by_taxon("C").unwrap(),
    /// ).unwrap();
    ///
    /// assert_eq!(tree.get(&ancestor).unwrap().label, Some("B".to_owned()))
    /// ```
    pub fn get_common_ancestor(
        &self,
        source: &NodeId,
        target: &NodeId,
    ) -> Result<NodeId, TreeError> {
        if source == target {
            return Ok(*source);
        }
        let (root_to_source, _, cursor) = self.divergence_point(source, target)?;

        Ok(root_to_source[cursor - 1])
    }

    /// Gets the distance between 2 nodes, returns the sum of branch lengths (if all
    /// branches in the path have lengths) and the number of edges in the path.
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A,(C,E)D)B,((H)I)G)F;").unwrap();
    /// let (sum_edge_lengths, num_edges) = tree.get_distance(
    ///     &tree.get_by_taxon("A").unwrap(),
    ///     &tree.get_by_taxon("H").unwrap(),
    /// ).unwrap();
    ///
    /// assert_eq!(num_edges, 5);
    /// assert!(sum_edge_lengths.is_none());
    /// ```
    pub fn get_distance(
        &self,
        source: &NodeId,
        target: &NodeId,
    ) -> Result<(Option<f64>, usize), TreeError> {
        if source == target {
            return Ok((Some(0.0), 0));
        }

        let (root_to_source, root_to_target, cursor) = self.divergence_point(source, target)?;

        let mut dist = Some(0.0);
        let mut branches = 0;
        for list in [root_to_source, root_to_target] {
            for node in list.iter().skip(cursor) {
                dist = match (dist, self.get_length(node)?) {
                    (Some(total), Some(d)) => Some(total + d),
                    _ => None,
                };
                branches += 1;
            }
        }

        Ok((dist, branches))
    }

    /// Computes the patristic distance matrix of the tree, with taxa sorted
    /// by name. Branches without a length count as 1.
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((T3:0.2,T1:0.2):0.3,(T2:0.4,T0:0.5):0.6);").unwrap();
    /// let matrix = tree.distance_matrix().unwrap();
    ///
    /// let phylip="\
    /// 4
    /// T0    0  1.6  0.9  1.6
    /// T1    1.6  0  1.5  0.4
    /// T2    0.9  1.5  0  1.5
    /// T3    1.6  0.4  1.5  0
    /// ";
    ///
    /// assert_eq!(phylip, matrix.to_phylip(true).unwrap())
    /// ```
    pub fn distance_matrix(&self) -> Result<DistanceMatrix, TreeError> {
        let root = self.get_root()?;
        let mut leaf_order = self.get_leaves();
        leaf_order.sort_by(|a, b| self.nodes[*a].taxon.cmp(&self.nodes[*b].taxon));

        // per-node distances left over from a previous call may be stale
        for node in self.nodes.iter() {
            *node.subtree_distances.borrow_mut() = None;
        }

        let n = leaf_order.len();
        let mut pairwise_vec = vec![NaiveSum::<f64>::zero(); n * n.saturating_sub(1) / 2];

        let mut leaf_position = vec![None; self.nodes.len()];
        for (position, &leaf) in leaf_order.iter().enumerate() {
            leaf_position[leaf] = Some(position);
        }
        // Converts the node index of a leaf to its index in the leaf_order array
        let get_leaf_index = |leaf: usize| -> Result<usize, TreeError> {
            leaf_position[leaf].ok_or(TreeError::NodeNotFound(leaf))
        };

        for current_node in self.levelorder(&root)?.iter().rev() {
            let mut node_cache: HashMap<_, _, BuildIdentityHasher> = HashMap::default();

            let parent = self.get(current_node)?;
            if parent.is_tip() {
                node_cache.insert(*current_node, 0.);
            }

            // Compute distances from current node to descendant leaves
            for child_id in parent.children.iter() {
                let child_len = self.get_length(child_id)?.unwrap_or(1.0);
                let child = self.get(child_id)?;

                for (leaf, distance) in child
                    .subtree_distances
                    .borrow()
                    .as_ref()
                    .ok_or(TreeError::MissingBranchLengths)?
                    .iter()
                {
                    node_cache.insert(*leaf, child_len + distance);
                }
            }

            // Compute distances between leaves of different subtrees
            for subtree_roots in parent.children.iter().combinations(2) {
                let subtree1 = self.get(subtree_roots[0])?.subtree_distances.borrow();
                let subtree2 = self.get(subtree_roots[1])?.subtree_distances.borrow();
                let leaves1 = subtree1.as_ref().ok_or(TreeError::MissingBranchLengths)?;
                let leaves2 = subtree2.as_ref().ok_or(TreeError::MissingBranchLengths)?;

                for leaf1 in leaves1.keys() {
                    for leaf2 in leaves2.keys() {
                        let distance1 = node_cache.get(leaf1).ok_or(TreeError::NodeNotFound(*leaf1))?;
                        let distance2 = node_cache.get(leaf2).ok_or(TreeError::NodeNotFound(*leaf2))?;

                        let mut i = get_leaf_index(*leaf1)?;
                        let mut j = get_leaf_index(*leaf2)?;
                        if j < i {
                            std::mem::swap(&mut i, &mut j);
                        }
                        pairwise_vec[upper_triangle_index(n, i, j)] += distance1 + distance2;
                    }
                }
            }

            // Save distance between current node and descendant leaves
            (*parent.subtree_distances.borrow_mut()) = Some(node_cache);
        }

        let taxa = leaf_order
            .iter()
            .map(|i| self.nodes[*i].taxon.clone().unwrap_or_default())
            .collect_vec();
        let sums = pairwise_vec.into_iter().map(|v| v.sum()).collect_vec();

        let mut matrix = DistanceMatrix::new(taxa)?;
        for (i, j) in (0..n).tuple_combinations() {
            matrix.set(i, j, sums[upper_triangle_index(n, i, j)])?;
        }

        Ok(matrix)
    }
}

/// Methods to manipulate and alter the [`Tree`] object.
///
/// ----
/// ----
impl Tree {
    // ##################
    // # ALTER THE TREE #
    // ##################

    /// Sort children of a node by number of descendants
    ///
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let mut tree = Tree::from_newick("(A,(((D,(E,F)),C),B));").unwrap();
    /// tree.ladderize().unwrap();
    ///
    /// assert_eq!("(A,(B,(C,(D,(E,F)))));", tree.to_newick().unwrap());
    /// ```
    pub fn ladderize(&mut self) -> Result<(), TreeError> {
        let mut descendant_counter = vec![0; self.nodes.len()];
        let root = self.get_root()?;
        // Go from tips to root
        for node_id in self.levelorder(&root)?.into_iter().rev() {
            let node = self.get_mut(&node_id)?;
            for child in node.children.iter() {
                descendant_counter[node_id] += descendant_counter[*child] + 1;
            }
            node.children.sort_by_key(|v| descendant_counter[*v]);
        }
        self.invalidate_caches();

        Ok(())
    }

    /// Forgets the root: builds an [`UnrootedTree`] with the same node ids
    /// and one edge per parent-child link. A root with two children is kept
    /// as a node of degree 2.
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let tree = Tree::from_newick("((A:1,B:1):1,C:2);").unwrap();
    /// let graph = tree.to_unrooted().unwrap();
    ///
    /// assert_eq!(graph.nodes_with_degree(2), vec![tree.get_root().unwrap()]);
    /// assert_eq!(graph.external_nodes().len(), 3);
    /// ```
    pub fn to_unrooted(&self) -> Result<UnrootedTree, TreeError> {
        let weighted = self.has_lengths();
        let mut graph = UnrootedTree::new();
        for node in self.nodes.iter() {
            graph.push_node(node.taxon.clone(), node.label.clone());
        }
        for node in self.nodes.iter() {
            if let Some(parent) = node.parent {
                let length = if weighted {
                    self.get_length(&node.id)?.unwrap_or(0.0)
                } else {
                    1.0
                };
                graph.add_edge(parent, node.id, length)?;
            }
        }
        if !weighted {
            graph.mark_unweighted();
        }

        Ok(graph)
    }
}

/// Methods to read and write [`Tree`] objects to and from files or [`String`] objects.
///
/// ----
/// ----
impl Tree {
    // ########################
    // # READ AND WRITE TREES #
    // ########################

    /// Generate newick representation of tree
    fn to_newick_impl(&self, root: &NodeId, with_lengths: bool, sorted: bool) -> Result<String, TreeError> {
        let mut reprs: Vec<Option<String>> = vec![None; self.nodes.len()];

        for id in self.postorder(root)? {
            let node = self.get(&id)?;
            let mut repr = if node.is_tip() {
                quote_name(node.taxon.as_deref().unwrap_or_default())
            } else {
                let mut children = node
                    .children
                    .iter()
                    .map(|child| reprs[*child].take().ok_or(TreeError::NodeNotFound(*child)))
                    .collect::<Result<Vec<_>, _>>()?;
                if sorted {
                    children.sort_by(|a, b| b.cmp(a));
                }
                let mut repr = format!("({})", children.join(","));
                if let Some(label) = &node.label {
                    repr.push_str(&quote_name(label));
                }
                repr
            };

            if with_lengths && !node.is_root() {
                if let Some(length) = self.get_length(&id)? {
                    repr.push_str(&format!(":{length}"));
                }
            }
            reprs[id] = Some(repr);
        }

        reprs[*root].take().ok_or(TreeError::NodeNotFound(*root))
    }

    /// Writes the tree as a newick formatted string. Branch lengths are
    /// written when every branch has one, the root length never is.
    /// # Example
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let newick = "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(tree.to_newick().unwrap(), newick);
    /// ```
    pub fn to_newick(&self) -> Result<String, TreeError> {
        let root = self.get_root()?;
        Ok(self.to_newick_impl(&root, self.has_lengths(), false)? + ";")
    }

    /// Writes the tree as a newick string where the children of every node are
    /// sorted in descending order of their own representation, so that two
    /// trees with the same topology and lengths give the same string.
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let t1 = Tree::from_newick("((A,B),C);").unwrap();
    /// let t2 = Tree::from_newick("(C,(B,A));").unwrap();
    ///
    /// assert_eq!(t1.to_unique_newick().unwrap(), "(C,(B,A));");
    /// assert_eq!(t1.to_unique_newick().unwrap(), t2.to_unique_newick().unwrap());
    /// ```
    pub fn to_unique_newick(&self) -> Result<String, TreeError> {
        let root = self.get_root()?;
        Ok(self.to_newick_impl(&root, self.has_lengths(), true)? + ";")
    }

    /// Binds the name and length read for the element that was just closed,
    /// creating the external node if the element is a leaf.
    fn close_element(
        &mut self,
        current_index: Option<NodeId>,
        name: Option<String>,
        length: Option<String>,
    ) -> Result<NodeId, NewickParseError> {
        let id = match current_index {
            Some(id) => {
                if let Some(label) = name {
                    self.set_label(&id, &label)?;
                }
                id
            }
            None => self.create_external_node(&name.ok_or(NewickParseError::UnnamedLeaf)?)?,
        };
        if let Some(length) = length {
            self.set_length(&id, length.parse()?)?;
        }
        Ok(id)
    }

    /// Read a newick formatted string and build a [`Tree`] struct from it.
    ///
    /// Names may be quoted with `'` (a doubled `''` stands for one quote) or
    /// `"`. Bracketed comments are skipped. Names after a closing parenthesis
    /// become node labels.
    /// # Example
    /// ```
    /// use phylonj::tree::Tree;
    ///
    /// let newick = "(A:0.1,B:0.2,(C:0.3,D:0.4)E:0.5)F;";
    /// let tree = Tree::from_newick(newick).unwrap();
    ///
    /// assert_eq!(tree.size(), 6);
    /// assert_eq!(tree.n_leaves(), 4);
    /// assert!(tree.has_lengths());
    /// ```
    pub fn from_newick(newick: &str) -> Result<Self, NewickParseError> {
        #[derive(Debug, PartialEq)]
        enum Field {
            Name,
            Length,
            Comment,
        }

        let mut tree = Tree::new();

        let mut parsing = Field::Name;
        let mut current_name: Option<String> = None;
        let mut current_length: Option<String> = None;
        let mut current_index: Option<NodeId> = None;
        let mut open_groups: Vec<Vec<NodeId>> = Vec::new();

        let mut quote: Option<char> = None;
        let mut chars = newick.chars().peekable();

        while let Some(c) = chars.next() {
            // Add character in quotes to name
            if let Some(q) = quote {
                if c == q {
                    if q == '\'' && chars.peek() == Some(&'\'') {
                        chars.next();
                    } else {
                        quote = None;
                        continue;
                    }
                }
                current_name.get_or_insert_with(String::new).push(c);
                continue;
            }

            if parsing == Field::Comment {
                if c == ']' {
                    parsing = Field::Name;
                }
                continue;
            }

            // Skip unquoted whitespace
            if c.is_whitespace() {
                continue;
            }

            match c {
                '\'' | '"' if parsing == Field::Name => {
                    quote = Some(c);
                    current_name.get_or_insert_with(String::new);
                }
                '[' => {
                    parsing = Field::Comment;
                }
                '(' => {
                    open_groups.push(Vec::new());
                }
                ':' => {
                    parsing = Field::Length;
                }
                ',' => {
                    let id = tree.close_element(
                        current_index.take(),
                        current_name.take(),
                        current_length.take(),
                    )?;
                    open_groups
                        .last_mut()
                        .ok_or(NewickParseError::NoSubtreeParent)?
                        .push(id);
                    parsing = Field::Name;
                }
                ')' => {
                    let id = tree.close_element(
                        current_index.take(),
                        current_name.take(),
                        current_length.take(),
                    )?;
                    let mut children = open_groups
                        .pop()
                        .ok_or(NewickParseError::NoSubtreeParent)?;
                    children.push(id);
                    current_index = Some(tree.create_internal_node(&children)?);
                    parsing = Field::Name;
                }
                ';' => {
                    if !open_groups.is_empty() {
                        return Err(NewickParseError::UnclosedBracket);
                    }
                    tree.close_element(current_index, current_name, current_length)?;
                    trace!("Parsed newick tree with {} nodes", tree.size());
                    return Ok(tree);
                }
                _ => match parsing {
                    Field::Name => current_name.get_or_insert_with(String::new).push(c),
                    Field::Length => current_length.get_or_insert_with(String::new).push(c),
                    Field::Comment => unreachable!("comments are consumed above"),
                },
            }
        }

        if quote.is_some() {
            return Err(NewickParseError::UnclosedQuote);
        }
        Err(NewickParseError::NoClosingSemicolon)
    }

    /// Writes the tree to a newick file
    pub fn to_file(&self, path: &Path) -> Result<(), TreeError> {
        fs::write(path, self.to_newick()? + "\n")?;
        Ok(())
    }

    /// Creates a tree from a newick file
    pub fn from_file(path: &Path) -> Result<Self, NewickParseError> {
        let newick_string = fs::read_to_string(path)?;
        Self::from_newick(&newick_string)
    }

    /// Outputs a Nexus formatted string of the tree
    pub fn to_nexus(&self) -> Result<String, TreeError> {
        let nwk = self.to_newick()?;
        let n = self.n_leaves();
        let labels = self
            .external_nodes()
            .filter_map(|node| node.taxon.as_deref().map(quote_name))
            .join(" ");

        Ok(format!(
            "#NEXUS
BEGIN TAXA;
    DIMENSIONS NTAX={n};
    TAXLABELS {labels};
END;
BEGIN TREES;
    TREE tree1 = {nwk}
END;
"
        ))
    }

    fn print_label(&self, id: &NodeId) -> Result<String, TreeError> {
        let name = self.get(id)?.to_string();
        Ok(match self.get_length(id)? {
            Some(l) if !self.get(id)?.is_root() => format!("({l:.3}) {name}"),
            _ => name,
        })
    }

    /// Recursive function that adds node representation to a printable tree builder
    fn print_nodes(&self, root_idx: &NodeId, output_tree: &mut TreeBuilder) -> Result<(), TreeError> {
        let label = self.print_label(root_idx)?;
        let root = self.get(root_idx)?;

        if root.children.is_empty() {
            output_tree.add_empty_child(label);
        } else {
            output_tree.begin_child(label);
            for child_idx in root.children.iter() {
                self.print_nodes(child_idx, output_tree)?;
            }
            output_tree.end_child();
        }

        Ok(())
    }

    /// Print the tree to the console
    pub fn print(&self) -> Result<(), TreeError> {
        let root = self.get_root()?;
        let mut builder = TreeBuilder::new(self.print_label(&root)?);
        for child_idx in self.get(&root)?.children.iter() {
            self.print_nodes(child_idx, &mut builder)?;
        }
        let tree = builder.build();
        print_tree(&tree)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct IdentityHasher(usize);

impl core::hash::Hasher for IdentityHasher {
    fn finish(&self) -> u64 {
        self.0 as u64
    }

    fn write(&mut self, _bytes: &[u8]) {
        unimplemented!("IdentityHasher only supports usize keys")
    }

    fn write_usize(&mut self, i: usize) {
        self.0 = i;
    }
}

type BuildIdentityHasher = core::hash::BuildHasherDefault<IdentityHasher>;

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Generates example tree from the tree traversal wikipedia page
    /// https://en.wikipedia.org/wiki/Tree_traversal#Depth-first_search
    fn build_simple_tree() -> Result<Tree, TreeError> {
        let mut tree = Tree::new();
        let a = tree.create_external_node("A")?;
        let c = tree.create_external_node("C")?;
        let e = tree.create_external_node("E")?;
        let d = tree.create_internal_node(&[c, e])?;
        let b = tree.create_internal_node(&[a, d])?;
        let h = tree.create_external_node("H")?;
        let i = tree.create_internal_node(&[h])?;
        let g = tree.create_internal_node(&[i])?;
        let f = tree.create_internal_node(&[b, g])?;

        for (id, label) in [(d, "D"), (b, "B"), (i, "I"), (g, "G"), (f, "F")] {
            tree.set_label(&id, label)?;
        }

        Ok(tree)
    }

    /// ((A:0.1,B:0.2)G:0.1,(C:0.3,D:0.4)E:0.5)F;
    fn build_tree_with_lengths() -> Result<Tree, TreeError> {
        let mut tree = Tree::new();
        let mut leaves = vec![];
        for (taxon, length) in [("A", 0.1), ("B", 0.2), ("C", 0.3), ("D", 0.4)] {
            let id = tree.create_external_node(taxon)?;
            tree.set_length(&id, length)?;
            leaves.push(id);
        }
        let g = tree.create_internal_node(&leaves[..2])?;
        tree.set_length(&g, 0.1)?;
        let e = tree.create_internal_node(&leaves[2..])?;
        tree.set_length(&e, 0.5)?;
        tree.create_internal_node(&[g, e])?;

        Ok(tree)
    }

    fn names(tree: &Tree, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| tree.get(id).unwrap().name().map(String::from))
            .collect()
    }

    #[test]
    fn traversals() {
        let tree = build_simple_tree().unwrap();
        let root = tree.get_root().unwrap();

        assert_eq!(
            names(&tree, &tree.preorder(&root).unwrap()),
            vec!["F", "B", "A", "D", "C", "E", "G", "I", "H"]
        );
        assert_eq!(
            names(&tree, &tree.postorder(&root).unwrap()),
            vec!["A", "C", "E", "D", "B", "H", "I", "G", "F"]
        );
        assert_eq!(
            names(&tree, &tree.levelorder(&root).unwrap()),
            vec!["F", "B", "G", "A", "D", "I", "C", "E", "H"]
        );
    }

    #[test]
    fn tips_and_degrees() {
        let tree = build_simple_tree().unwrap();

        assert_eq!(names(&tree, &tree.get_leaves()), vec!["A", "C", "E", "H"]);
        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.size(), 9);
        assert_eq!(tree.external_nodes().count(), 4);
        assert_eq!(tree.internal_nodes().count(), 5);
        assert_eq!(names(&tree, &tree.nodes_with_degree(2)), vec!["I", "G", "F"]);
        assert_eq!(tree.max_levels().unwrap(), 3);

        let d = tree.get_parent(&tree.get_by_taxon("C").unwrap()).unwrap().unwrap();
        assert_eq!(tree.degree(&d).unwrap(), 3);
        assert_eq!(tree.external_node_count(&d).unwrap(), 2);
        assert!(!tree.is_external(&d).unwrap());
    }

    #[test]
    fn duplicate_taxon_creates_nothing() {
        let mut tree = Tree::new();
        tree.create_external_node("A").unwrap();
        let size = tree.size();

        assert!(matches!(
            tree.create_external_node("A"),
            Err(TreeError::DuplicateTaxon(name)) if name == "A"
        ));
        assert_eq!(tree.size(), size);
    }

    #[test]
    fn internal_node_children_must_be_free() {
        let mut tree = Tree::new();
        let a = tree.create_external_node("A").unwrap();
        let b = tree.create_external_node("B").unwrap();
        let c = tree.create_external_node("C").unwrap();
        tree.create_internal_node(&[a, b]).unwrap();

        assert!(matches!(
            tree.create_internal_node(&[a, c]),
            Err(TreeError::NodeHasParent(id)) if id == a
        ));
        assert!(matches!(
            tree.create_internal_node(&[c, c]),
            Err(TreeError::RepeatedChild(id)) if id == c
        ));
        assert!(matches!(
            tree.create_internal_node(&[]),
            Err(TreeError::NoChildren)
        ));
        assert!(matches!(
            tree.create_internal_node(&[42]),
            Err(TreeError::NodeNotFound(42))
        ));
        assert_eq!(tree.size(), 4);
        assert_eq!(tree.get_parent(&c).unwrap(), None);
    }

    #[test]
    fn binary() {
        let tree = build_simple_tree().unwrap();
        assert!(!tree.is_binary().unwrap());

        let tree = build_tree_with_lengths().unwrap();
        assert!(tree.is_binary().unwrap());

        let tree = Tree::from_newick("(A,B,C);").unwrap();
        assert!(!tree.is_binary().unwrap());
    }

    #[test]
    fn derived_heights() {
        let tree = build_tree_with_lengths().unwrap();
        let root = tree.get_root().unwrap();

        assert!(tree.has_lengths());
        assert!(tree.has_heights());
        assert_relative_eq!(tree.get_height(&root).unwrap().unwrap(), 0.9, epsilon = 1e-12);

        let a = tree.get_by_taxon("A").unwrap();
        let d = tree.get_by_taxon("D").unwrap();
        assert_relative_eq!(tree.get_height(&a).unwrap().unwrap(), 0.7, epsilon = 1e-12);
        assert_relative_eq!(tree.get_height(&d).unwrap().unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(tree.min_node_height(&root).unwrap().unwrap(), 0.0, epsilon = 1e-12);
        assert!(!tree.is_ultrametric().unwrap());
    }

    #[test]
    fn switching_primary_representation() {
        let mut tree = build_tree_with_lengths().unwrap();
        let a = tree.get_by_taxon("A").unwrap();
        let root = tree.get_root().unwrap();

        tree.set_height(&a, 0.0).unwrap();
        assert_eq!(tree.primary(), Primary::Heights);
        assert_relative_eq!(tree.get_height(&root).unwrap().unwrap(), 0.9, epsilon = 1e-12);
        assert_relative_eq!(tree.get_length(&a).unwrap().unwrap(), 0.8, epsilon = 1e-12);

        let g = tree.get_parent(&a).unwrap().unwrap();
        tree.set_length(&g, 0.2).unwrap();
        assert_eq!(tree.primary(), Primary::Lengths);
        assert_relative_eq!(tree.get_length(&a).unwrap().unwrap(), 0.8, epsilon = 1e-12);
        assert_relative_eq!(tree.length().unwrap(), 0.8 + 0.2 + 0.2 + 0.3 + 0.4 + 0.5, epsilon = 1e-12);
    }

    #[test]
    fn set_height_keeps_lengths_of_other_subtrees() {
        let mut tree = Tree::new();
        let a = tree.create_external_node("A").unwrap();
        let b = tree.create_external_node("B").unwrap();
        let ab = tree.create_internal_node(&[a, b]).unwrap();
        tree.set_length(&a, 1.0).unwrap();
        tree.set_length(&b, 1.0).unwrap();

        let c = tree.create_external_node("C").unwrap();
        tree.set_height(&c, 0.0).unwrap();

        assert_eq!(tree.primary(), Primary::Heights);
        assert_eq!(tree.get_height(&ab).unwrap(), Some(1.0));
        assert_eq!(tree.get_length(&a).unwrap(), Some(1.0));
        assert_eq!(tree.get_length(&b).unwrap(), Some(1.0));

        let root = tree.create_internal_node(&[ab, c]).unwrap();
        tree.set_height(&root, 3.0).unwrap();
        assert_eq!(tree.to_newick().unwrap(), "((A:1,B:1):2,C:3);");
    }

    #[test]
    fn switch_refused_when_values_would_be_lost() {
        let mut tree = Tree::from_newick("((A:1,B),C:1);").unwrap();
        let a = tree.get_by_taxon("A").unwrap();
        assert!(matches!(
            tree.set_height(&a, 0.0),
            Err(TreeError::IncompleteRepresentation(_))
        ));
        assert_eq!(tree.primary(), Primary::Lengths);
        assert_eq!(tree.get_length(&a).unwrap(), Some(1.0));

        let mut tree = Tree::new();
        let a = tree.create_external_node("A").unwrap();
        let b = tree.create_external_node("B").unwrap();
        let ab = tree.create_internal_node(&[a, b]).unwrap();
        tree.set_height(&a, 0.0).unwrap();
        assert!(matches!(
            tree.set_length(&b, 1.0),
            Err(TreeError::IncompleteRepresentation(id)) if id == a
        ));
        tree.set_height(&b, 0.0).unwrap();
        tree.set_height(&ab, 2.0).unwrap();
        tree.set_length(&b, 1.0).unwrap();
        assert_eq!(tree.get_length(&a).unwrap(), Some(2.0));
    }

    #[test]
    fn distance_matrix_follows_mutations() {
        let mut tree = Tree::from_newick("((A:1,B:1):1,C:2);").unwrap();
        let before = tree.distance_matrix().unwrap();
        assert_eq!(before.get(0, 2), 4.0);

        let a = tree.get_by_taxon("A").unwrap();
        tree.set_length(&a, 3.0).unwrap();
        let after = tree.distance_matrix().unwrap();
        assert_eq!(after.get(0, 1), 4.0);
        assert_eq!(after.get(0, 2), 6.0);
        assert_eq!(after.get(1, 2), 4.0);

        let root = tree.get_root().unwrap();
        let d = tree.create_external_node("D").unwrap();
        let top = tree.create_internal_node(&[root, d]).unwrap();
        tree.set_length(&root, 1.0).unwrap();
        tree.set_length(&d, 1.0).unwrap();
        assert_eq!(tree.get_root().unwrap(), top);
        let grown = tree.distance_matrix().unwrap();
        assert_eq!(grown.size(), 4);
        assert_eq!(grown.get(0, 3), 6.0);
        assert_eq!(grown.get(2, 3), 4.0);
    }

    #[test]
    fn deep_caterpillar_traversals() {
        let mut tree = Tree::new();
        let mut spine = tree.create_external_node("T0").unwrap();
        tree.set_length(&spine, 1.0).unwrap();
        let first = spine;
        for i in 1..5000 {
            let tip = tree.create_external_node(&format!("T{i}")).unwrap();
            tree.set_length(&tip, 1.0).unwrap();
            spine = tree.create_internal_node(&[spine, tip]).unwrap();
            tree.set_length(&spine, 1.0).unwrap();
        }
        let root = tree.get_root().unwrap();
        assert_eq!(root, spine);

        let preorder = tree.preorder(&root).unwrap();
        assert_eq!(preorder.len(), 9999);
        assert_eq!(preorder[0], root);
        assert_eq!(preorder[4999], first);

        let postorder = tree.postorder(&root).unwrap();
        assert_eq!(postorder.len(), 9999);
        assert_eq!(postorder[0], first);
        assert_eq!(postorder.last(), Some(&root));

        assert_eq!(tree.max_levels().unwrap(), 4999);
        assert_eq!(tree.get_height(&root).unwrap(), Some(4999.0));
        assert_eq!(tree.get_height(&first).unwrap(), Some(0.0));
        assert!(tree.to_newick().unwrap().starts_with(&"(".repeat(4999)));
    }

    #[test]
    fn negative_length_rejected() {
        let mut tree = build_tree_with_lengths().unwrap();
        assert!(matches!(
            tree.set_length(&0, -1.0),
            Err(TreeError::NegativeLength(_))
        ));
    }

    #[test]
    fn missing_lengths() {
        let tree = Tree::from_newick("((A:1,B),C:1);").unwrap();
        assert!(!tree.has_lengths());
        assert!(!tree.has_heights());
        assert_eq!(tree.to_newick().unwrap(), "((A,B),C);");
        assert!(matches!(tree.length(), Err(TreeError::MissingBranchLengths)));
        assert!(matches!(
            tree.is_ultrametric(),
            Err(TreeError::MissingBranchLengths)
        ));
        assert_eq!(tree.safe_node_height(&tree.get_root().unwrap()).unwrap(), 2.0);
    }

    #[test]
    fn ultrametric() {
        let mut tree = Tree::new();
        let a = tree.create_external_node("A").unwrap();
        let b = tree.create_external_node("B").unwrap();
        let c = tree.create_external_node("C").unwrap();
        let ab = tree.create_internal_node(&[a, b]).unwrap();
        let root = tree.create_internal_node(&[ab, c]).unwrap();
        for (id, h) in [(a, 0.0), (b, 0.0), (c, 0.0), (ab, 1.0), (root, 3.0)] {
            tree.set_height(&id, h).unwrap();
        }

        assert!(tree.is_ultrametric().unwrap());
        assert_eq!(tree.to_newick().unwrap(), "((A:1,B:1):2,C:3);");
    }

    #[test]
    fn neighbours() {
        let tree = build_simple_tree().unwrap();
        let [a, c, e, h] = ["A", "C", "E", "H"].map(|t| tree.get_by_taxon(t).unwrap());

        assert_eq!(tree.left_neighbour(&a).unwrap(), None);
        assert_eq!(tree.right_neighbour(&a).unwrap(), Some(c));
        assert_eq!(tree.right_neighbour(&e).unwrap(), Some(h));
        assert_eq!(tree.left_neighbour(&h).unwrap(), Some(e));
        assert_eq!(tree.right_neighbour(&h).unwrap(), None);

        let root = tree.get_root().unwrap();
        assert!(matches!(
            tree.right_neighbour(&root),
            Err(TreeError::NotExternal(_))
        ));
    }

    #[test]
    fn paths_and_distances() {
        let tree = build_tree_with_lengths().unwrap();
        let a = tree.get_by_taxon("A").unwrap();
        let b = tree.get_by_taxon("B").unwrap();
        let d = tree.get_by_taxon("D").unwrap();
        let root = tree.get_root().unwrap();

        assert_eq!(tree.get_path_from_root(&a).unwrap().first(), Some(&root));
        assert_eq!(
            tree.get_common_ancestor(&a, &b).unwrap(),
            tree.get_parent(&a).unwrap().unwrap()
        );
        assert_eq!(tree.get_common_ancestor(&a, &d).unwrap(), root);

        let (dist, edges) = tree.get_distance(&a, &d).unwrap();
        assert_eq!(edges, 4);
        assert_relative_eq!(dist.unwrap(), 1.1, epsilon = 1e-12);

        assert_relative_eq!(tree.height().unwrap(), 0.9, epsilon = 1e-12);
        assert_relative_eq!(tree.diameter().unwrap(), 1.2, epsilon = 1e-12);
    }

    #[test]
    fn disconnected_nodes() {
        let mut tree = Tree::new();
        let a = tree.create_external_node("A").unwrap();
        let b = tree.create_external_node("B").unwrap();

        assert!(matches!(
            tree.get_distance(&a, &b),
            Err(TreeError::Disconnected(_, _))
        ));
    }

    #[test]
    fn patristic_matrix() {
        let tree = build_tree_with_lengths().unwrap();
        let matrix = tree.distance_matrix().unwrap();

        assert_eq!(matrix.taxa(), &["A", "B", "C", "D"]);
        assert_relative_eq!(matrix.get_by_name("A", "B").unwrap(), 0.3, epsilon = 1e-12);
        assert_relative_eq!(matrix.get_by_name("A", "C").unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(matrix.get_by_name("D", "B").unwrap(), 1.2, epsilon = 1e-12);
        assert_relative_eq!(matrix.get_by_name("C", "D").unwrap(), 0.7, epsilon = 1e-12);
    }

    #[test]
    fn read_newick() {
        let tree = Tree::from_newick("((A:0.1,B:0.2)G:0.1,(C:0.3,D:0.4)E:0.5)F;").unwrap();
        assert_eq!(names(&tree, &tree.get_leaves()), vec!["A", "B", "C", "D"]);
        assert_eq!(tree.get(&tree.get_root().unwrap()).unwrap().label, Some("F".into()));
        assert_eq!(tree.robinson_foulds(&build_tree_with_lengths().unwrap()).unwrap(), 0);
    }

    #[test]
    fn read_newick_quotes_and_comments() {
        let tree =
            Tree::from_newick("('Homo sapiens':1,'it''s'[a comment]:2,\"Pan troglodytes\":3);")
                .unwrap();
        assert!(tree.get_by_taxon("Homo sapiens").is_some());
        assert!(tree.get_by_taxon("it's").is_some());
        assert!(tree.get_by_taxon("Pan troglodytes").is_some());
        assert_eq!(
            tree.to_newick().unwrap(),
            "('Homo sapiens':1,'it''s':2,'Pan troglodytes':3);"
        );
    }

    #[test]
    fn read_newick_fails() {
        assert!(matches!(
            Tree::from_newick("((A,B),C"),
            Err(NewickParseError::NoClosingSemicolon)
        ));
        assert!(matches!(
            Tree::from_newick("((A,B),C;"),
            Err(NewickParseError::UnclosedBracket)
        ));
        assert!(matches!(
            Tree::from_newick("(A,B));"),
            Err(NewickParseError::NoSubtreeParent)
        ));
        assert!(matches!(
            Tree::from_newick("(A,,B);"),
            Err(NewickParseError::UnnamedLeaf)
        ));
        assert!(matches!(
            Tree::from_newick("('A,B);"),
            Err(NewickParseError::UnclosedQuote)
        ));
        assert!(matches!(
            Tree::from_newick("(A:x,B);"),
            Err(NewickParseError::FloatError(_))
        ));
        assert!(matches!(
            Tree::from_newick("(A,(B,A));"),
            Err(NewickParseError::TreeError(TreeError::DuplicateTaxon(_)))
        ));
    }

    #[test]
    fn newick_round_trip() {
        let newick = "((T3:0.2,T1:0.2):0.3,(T2:0.4,'T 0':0.5):0.6,T4:1e-7);";
        let tree = Tree::from_newick(newick).unwrap();
        let reread = Tree::from_newick(&tree.to_newick().unwrap()).unwrap();

        assert_eq!(tree.robinson_foulds(&reread).unwrap(), 0);
        for leaf in tree.get_leaves() {
            let taxon = tree.get_taxon(&leaf).unwrap().unwrap();
            let other = reread.get_by_taxon(taxon).unwrap();
            assert_relative_eq!(
                tree.get_length(&leaf).unwrap().unwrap(),
                reread.get_length(&other).unwrap().unwrap(),
                max_relative = 1e-9
            );
        }
        assert_eq!(tree.to_newick().unwrap(), "((T3:0.2,T1:0.2):0.3,(T2:0.4,'T 0':0.5):0.6,T4:0.0000001);");
    }

    #[test]
    fn root_length_is_not_written() {
        let tree = Tree::from_newick("(A:1,B:2):5;").unwrap();
        assert_eq!(tree.to_newick().unwrap(), "(A:1,B:2);");
    }

    #[test]
    fn unique_newick() {
        let t1 = Tree::from_newick("((A:1,B:2):1,(D:1,C:1):2);").unwrap();
        let t2 = Tree::from_newick("((C:1,D:1):2,(B:2,A:1):1);").unwrap();
        assert_eq!(
            t1.to_unique_newick().unwrap(),
            t2.to_unique_newick().unwrap()
        );
    }

    #[test]
    fn nexus() {
        let tree = Tree::from_newick("((A,B),'C c');").unwrap();
        let nexus = tree.to_nexus().unwrap();
        assert!(nexus.starts_with("#NEXUS"));
        assert!(nexus.contains("DIMENSIONS NTAX=3;"));
        assert!(nexus.contains("TAXLABELS A B 'C c';"));
        assert!(nexus.contains("TREE tree1 = ((A,B),'C c');"));
    }

    #[test]
    fn partitions() {
        let tree = Tree::from_newick("((A,B),(C,(D,E)));").unwrap();
        let partitions = tree.get_partitions().unwrap();
        let mut sides = partitions
            .iter()
            .map(|p| tree.partition_to_leaves(p).unwrap().join(""))
            .collect_vec();
        sides.sort();

        // each partition is stored as the side with the smallest bitset
        assert_eq!(sides, vec!["AB", "ABC"]);
    }

    #[test]
    fn rf_different_tips() {
        let t1 = Tree::from_newick("((A,B),(C,D));").unwrap();
        let t2 = Tree::from_newick("((A,B),(C,E));").unwrap();
        assert!(matches!(
            t1.robinson_foulds(&t2),
            Err(TreeError::DifferentTipIndices)
        ));
    }

    #[test]
    fn attributes_and_labels() {
        let mut tree = build_tree_with_lengths().unwrap();
        let a = tree.get_by_taxon("A").unwrap();
        tree.set_attribute(&a, "sampled", 0.5).unwrap();

        assert_eq!(
            tree.get_attribute(&a, "sampled").unwrap(),
            Some(&AttributeValue::Number(0.5))
        );
        assert_eq!(tree.get_attribute(&a, "missing").unwrap(), None);
        assert!(tree.set_attribute(&99, "x", true).is_err());
    }

    #[test]
    fn unrooted_conversion() {
        let tree = build_tree_with_lengths().unwrap();
        let graph = tree.to_unrooted().unwrap();
        let root = tree.get_root().unwrap();
        let g = tree.get_parent(&tree.get_by_taxon("A").unwrap()).unwrap().unwrap();

        assert!(graph.has_lengths());
        assert_eq!(graph.degree(root).unwrap(), 2);
        assert_relative_eq!(graph.edge_length(root, g).unwrap(), 0.1, epsilon = 1e-12);
        assert_eq!(graph.get_taxon(0).unwrap(), Some("A"));

        let unweighted = Tree::from_newick("((A,B),C);").unwrap().to_unrooted().unwrap();
        assert!(!unweighted.has_lengths());
    }
}
