//! Turn unrooted trees into rooted ones.
//!
//! The center of a tree is the point `c` (on a node or inside an edge) that
//! minimises the largest distance from `c` to any tip. It lies halfway along
//! the longest tip-to-tip path.

use std::collections::HashMap;

use log::debug;

use super::tree_impl::{Tree, TreeError};
use super::unrooted::UnrootedTree;
use super::{EdgeLength, NodeId, PhyloTree};

/// Where the root of an oriented graph sits
#[derive(Debug, Clone, Copy)]
enum RootPosition {
    /// On an existing node
    Node(NodeId),
    /// On a new node inside the edge `(a, b)`, at `offset` from `a`
    Edge {
        a: NodeId,
        b: NodeId,
        offset: EdgeLength,
    },
}

/// Longest distances from a node leaving through one of its edges.
/// A fresh cache is used for every rooting.
struct DirectedDistances<'a> {
    graph: &'a UnrootedTree,
    memo: HashMap<(NodeId, NodeId), EdgeLength>,
}

impl<'a> DirectedDistances<'a> {
    fn new(graph: &'a UnrootedTree) -> Self {
        Self {
            graph,
            memo: HashMap::new(),
        }
    }

    /// Length of the longest path that starts at `from` and goes through `towards`
    fn longest(&mut self, from: NodeId, towards: NodeId) -> Result<EdgeLength, TreeError> {
        let graph = self.graph;
        // an edge is resolved once every edge leaving its head is
        let mut stack = vec![(from, towards, false)];
        while let Some((tail, head, expanded)) = stack.pop() {
            if self.memo.contains_key(&(tail, head)) {
                continue;
            }
            let onwards = graph
                .adjacencies(head)?
                .iter()
                .map(|&(next, _)| next)
                .filter(|&next| next != tail);

            if !expanded {
                stack.push((tail, head, true));
                stack.extend(
                    onwards
                        .filter(|&next| !self.memo.contains_key(&(head, next)))
                        .map(|next| (head, next, false)),
                );
                continue;
            }

            let mut further: EdgeLength = 0.0;
            for next in onwards {
                further = further.max(self.memoized(head, next)?);
            }
            let d = graph.edge_length(tail, head)? + further;
            self.memo.insert((tail, head), d);
        }

        self.memoized(from, towards)
    }

    fn memoized(&self, from: NodeId, towards: NodeId) -> Result<EdgeLength, TreeError> {
        self.memo.get(&(from, towards)).copied().ok_or_else(|| {
            TreeError::GraphInconsistency(format!("no distance through edge {from}-{towards}"))
        })
    }

    /// Neighbour of `node` (other than `previous`) leading to the farthest tip
    fn farthest_direction(
        &mut self,
        node: NodeId,
        previous: Option<NodeId>,
    ) -> Result<Option<(NodeId, EdgeLength)>, TreeError> {
        let graph = self.graph;
        let mut best: Option<(NodeId, EdgeLength)> = None;
        for &(next, _) in graph.adjacencies(node)? {
            if Some(next) == previous {
                continue;
            }
            let d = self.longest(node, next)?;
            if best.map_or(true, |(_, max)| d > max) {
                best = Some((next, d));
            }
        }
        Ok(best)
    }
}

/// Sum of the edge lengths on the path between two nodes.
/// ```
/// use phylonj::tree::{path_length, UnrootedTree};
///
/// let mut graph = UnrootedTree::new();
/// let a = graph.create_external_node("A").unwrap();
/// let b = graph.create_external_node("B").unwrap();
/// let c = graph.create_external_node("C").unwrap();
/// graph.create_internal_node(&[(a, 1.0), (b, 2.0), (c, 3.0)]).unwrap();
///
/// assert_eq!(path_length(&graph, a, c).unwrap(), 4.0);
/// ```
pub fn path_length(graph: &UnrootedTree, a: NodeId, b: NodeId) -> Result<EdgeLength, TreeError> {
    graph.get(b)?;
    let mut stack = vec![(a, None, 0.0)];
    while let Some((node, previous, distance)) = stack.pop() {
        if node == b {
            return Ok(distance);
        }
        for &(next, _) in graph.adjacencies(node)? {
            if Some(next) != previous {
                stack.push((next, Some(node), distance + graph.edge_length(node, next)?));
            }
        }
    }
    Err(TreeError::Disconnected(a, b))
}

/// Roots a tree at its center: the midpoint of its longest tip-to-tip path.
///
/// A new root node is inserted inside the edge holding the midpoint (possibly
/// at one of its ends, with a zero length branch), and every node is oriented
/// away from it. The largest root-to-tip distance of the result is half the
/// diameter of the input.
/// ```
/// use phylonj::tree::{root_tree_at_center, UnrootedTree};
///
/// let mut graph = UnrootedTree::new();
/// let a = graph.create_external_node("A").unwrap();
/// let b = graph.create_external_node("B").unwrap();
/// let c = graph.create_external_node("C").unwrap();
/// graph.create_internal_node(&[(a, 1.0), (b, 2.0), (c, 5.0)]).unwrap();
///
/// let tree = root_tree_at_center(&graph).unwrap();
/// assert_eq!(tree.to_newick().unwrap(), "((A:1,B:2):1.5,C:3.5);");
/// ```
pub fn root_tree_at_center(graph: &UnrootedTree) -> Result<Tree, TreeError> {
    Ok(center(graph)?.0)
}

fn center(graph: &UnrootedTree) -> Result<(Tree, Origins), TreeError> {
    if graph.size() == 0 {
        return Err(TreeError::IsEmpty);
    }
    let mut distances = DirectedDistances::new(graph);

    // one end of the longest path
    let mut longest: Option<(NodeId, NodeId, EdgeLength)> = None;
    for tip in graph.external_nodes() {
        for &(next, _) in graph.adjacencies(tip)? {
            let d = distances.longest(tip, next)?;
            if longest.map_or(true, |(_, _, max)| d > max) {
                longest = Some((tip, next, d));
            }
        }
    }

    let Some((mut current, mut direction, diameter)) = longest else {
        // a lone node
        return orient(graph, RootPosition::Node(0));
    };
    debug!("Tree diameter is {diameter}, starting from node {current}");

    // walk along the longest path up to its middle
    let mut left = diameter / 2.0;
    loop {
        let length = graph.edge_length(current, direction)?;
        if left <= length {
            debug!("Center lies on edge {current}-{direction}, {left} away from {current}");
            let position = RootPosition::Edge {
                a: current,
                b: direction,
                offset: left,
            };
            return orient(graph, position);
        }
        left -= length;

        let (next, _) = distances
            .farthest_direction(direction, Some(current))?
            .ok_or_else(|| {
                TreeError::GraphInconsistency(format!(
                    "longest path ends at node {direction} before reaching its middle"
                ))
            })?;
        current = direction;
        direction = next;
    }
}

/// Returns a rooted version of any tree.
///
/// Rooted trees are returned untouched. If exactly one node has degree 2 it
/// is a natural root and is used as is. Otherwise the tree is first rooted at
/// its center, then re-rooted at the internal child of that center with the
/// shortest branch. When the center has no internal child (a two-tip tree)
/// the centered tree is returned.
/// ```
/// use phylonj::tree::{root_the_tree, PhyloTree, Tree};
///
/// let tree = Tree::from_newick("((A:1,B:1):1,C:2);").unwrap();
/// let rooted = root_the_tree(PhyloTree::Unrooted(tree.to_unrooted().unwrap())).unwrap();
///
/// assert_eq!(rooted.to_newick().unwrap(), "((A:1,B:1):1,C:2);");
/// ```
pub fn root_the_tree(tree: PhyloTree) -> Result<Tree, TreeError> {
    let graph = match tree {
        PhyloTree::Rooted(tree) => return Ok(tree),
        PhyloTree::Unrooted(graph) => graph,
    };

    if let [natural_root] = graph.nodes_with_degree(2)[..] {
        debug!("Rooting at natural root {natural_root}");
        return Ok(orient(&graph, RootPosition::Node(natural_root))?.0);
    }

    let (centered, origins) = center(&graph)?;
    let root = centered.get_root()?;

    let mut closest: Option<(NodeId, EdgeLength)> = None;
    for child in centered.get_children(&root)? {
        if centered.is_external(child)? {
            continue;
        }
        let length = centered.get_length(child)?.unwrap_or(0.0);
        if closest.map_or(true, |(_, min)| length < min) {
            closest = Some((*child, length));
        }
    }

    match closest {
        Some((child, _)) => {
            let graph_node = *origins.get(&child).ok_or_else(|| {
                TreeError::GraphInconsistency(format!("node {child} has no counterpart"))
            })?;
            debug!("Rooting at internal node {graph_node} next to the center");
            Ok(orient(&graph, RootPosition::Node(graph_node))?.0)
        }
        None => Ok(centered),
    }
}

/// Maps the nodes of a rooted tree to the graph nodes they were built from
type Origins = HashMap<NodeId, NodeId>;

/// Builds the rooted tree obtained by orienting every edge away from `position`
fn orient(graph: &UnrootedTree, position: RootPosition) -> Result<(Tree, Origins), TreeError> {
    let weighted = graph.has_lengths();
    let mut tree = Tree::new();
    let mut origins = Origins::new();

    match position {
        RootPosition::Node(node) => {
            attach(graph, &mut tree, &mut origins, node, None, weighted)?;
        }
        RootPosition::Edge { a, b, offset } => {
            let length = graph.edge_length(a, b)?;
            let left = attach(graph, &mut tree, &mut origins, a, Some(b), weighted)?;
            let right = attach(graph, &mut tree, &mut origins, b, Some(a), weighted)?;
            if weighted {
                tree.set_length(&left, offset)?;
                tree.set_length(&right, (length - offset).max(0.0))?;
            }
            tree.create_internal_node(&[left, right])?;
        }
    };

    let expected = match position {
        RootPosition::Node(_) => graph.size(),
        RootPosition::Edge { .. } => graph.size() + 1,
    };
    if tree.size() != expected {
        return Err(TreeError::GraphInconsistency(format!(
            "only {} of {} nodes are reachable from the root",
            tree.size(),
            expected
        )));
    }

    Ok((tree, origins))
}

/// Copies the part of the graph reached from `node` without going back
/// through `from`. Children are created before their parent.
fn attach(
    graph: &UnrootedTree,
    tree: &mut Tree,
    origins: &mut Origins,
    node: NodeId,
    from: Option<NodeId>,
    weighted: bool,
) -> Result<NodeId, TreeError> {
    let mut copies: HashMap<NodeId, NodeId> = HashMap::new();
    let mut stack = vec![(node, from, false)];

    while let Some((current, previous, expanded)) = stack.pop() {
        let source = graph.get(current)?;
        let onwards = source
            .adjacencies
            .iter()
            .map(|&(next, _)| next)
            .filter(|&next| Some(next) != previous);

        if !expanded {
            stack.push((current, previous, true));
            stack.extend(onwards.rev().map(|next| (next, Some(current), false)));
            continue;
        }

        let mut children = vec![];
        for next in onwards {
            let child = *copies.get(&next).ok_or_else(|| {
                TreeError::GraphInconsistency(format!("node {next} was not copied before {current}"))
            })?;
            if weighted {
                tree.set_length(&child, graph.edge_length(current, next)?)?;
            }
            children.push(child);
        }

        let id = if children.is_empty() {
            let taxon = source
                .taxon
                .as_deref()
                .ok_or(TreeError::UnnamedLeaf(current))?;
            tree.create_external_node(taxon)?
        } else {
            let id = tree.create_internal_node(&children)?;
            if let Some(label) = source.label.as_deref().or(source.taxon.as_deref()) {
                tree.set_label(&id, label)?;
            }
            id
        };
        origins.insert(id, current);
        copies.insert(current, id);
    }

    copies.get(&node).copied().ok_or_else(|| {
        TreeError::GraphInconsistency(format!("node {node} was not copied"))
    })
}
