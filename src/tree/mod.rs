//! Build, store and re-root phylogenetic trees.
//!
//! This module defines the structures used to represent phylogenetic trees:
//!  - The [`Node`] struct that represents a node of a rooted tree.
//!  - The [`Tree`] struct, an arena of [`Node`] objects with a single root.
//!  - The [`UnrootedTree`] struct, an arena of nodes linked by undirected,
//!    weighted edges (what neighbor-joining produces).
//!  - The [`PhyloTree`] enum that holds either kind, and the rooting
//!    algorithms that turn any [`PhyloTree`] into a rooted [`Tree`].
//!

mod node;
mod rooting;
mod tree_impl;
mod unrooted;

pub use self::node::{AttributeValue, Node};
pub use self::rooting::{path_length, root_the_tree, root_tree_at_center};
pub use self::tree_impl::{NewickParseError, Primary, Tree, TreeError};
pub use self::unrooted::{GraphNode, UnrootedTree};

/// A type that represents Identifiers of nodes
/// within a phylogenetic [`Tree`] or [`UnrootedTree`] object.
pub type NodeId = usize;

/// A type that represents branch lengths between nodes
/// within a phylogenetic tree.
pub type EdgeLength = f64;

/// A type that represents the depth (i.e. number of edges from the root) of a
/// given node within a phylogenetic [`Tree`] object.
pub type EdgeDepth = usize;

/// Any tree produced or consumed by this crate, rooted or not.
#[derive(Debug, Clone)]
pub enum PhyloTree {
    /// A tree with a designated root node
    Rooted(Tree),
    /// A tree only represented by undirected adjacencies
    Unrooted(UnrootedTree),
}

impl PhyloTree {
    /// Number of leaves in the tree
    pub fn n_leaves(&self) -> usize {
        match self {
            PhyloTree::Rooted(tree) => tree.n_leaves(),
            PhyloTree::Unrooted(graph) => graph.external_nodes().len(),
        }
    }

    /// Whether the tree carries real branch lengths
    pub fn has_lengths(&self) -> bool {
        match self {
            PhyloTree::Rooted(tree) => tree.has_lengths(),
            PhyloTree::Unrooted(graph) => graph.has_lengths(),
        }
    }

    /// Checks if this tree has a designated root
    pub fn is_rooted(&self) -> bool {
        matches!(self, PhyloTree::Rooted(_))
    }

    /// Newick representation of the tree, see [`Tree::to_newick`] and
    /// [`UnrootedTree::to_newick`]
    pub fn to_newick(&self) -> Result<String, TreeError> {
        match self {
            PhyloTree::Rooted(tree) => tree.to_newick(),
            PhyloTree::Unrooted(graph) => graph.to_newick(),
        }
    }
}

impl From<Tree> for PhyloTree {
    fn from(tree: Tree) -> Self {
        PhyloTree::Rooted(tree)
    }
}

impl From<UnrootedTree> for PhyloTree {
    fn from(graph: UnrootedTree) -> Self {
        PhyloTree::Unrooted(graph)
    }
}
