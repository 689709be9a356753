use std::collections::HashMap;

use super::node::quote_name;
use super::tree_impl::TreeError;
use super::{EdgeLength, NodeId};

/// A node of an [`UnrootedTree`]
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Index of the node
    pub id: NodeId,
    /// Taxon bound to the node, only set for external nodes
    pub taxon: Option<String>,
    /// Optional label of an internal node
    pub label: Option<String>,
    /// Neighbours of the node, with the length of the connecting edge
    pub(crate) adjacencies: Vec<(NodeId, EdgeLength)>,
}

impl GraphNode {
    fn new(id: NodeId, taxon: Option<String>, label: Option<String>) -> Self {
        Self {
            id,
            taxon,
            label,
            adjacencies: vec![],
        }
    }

    /// Number of incident edges
    pub fn degree(&self) -> usize {
        self.adjacencies.len()
    }
}

/// An unrooted phylogenetic tree: nodes linked by undirected, weighted edges.
///
/// Every edge is stored in the adjacency lists of both of its ends. Edges
/// are only created through [`UnrootedTree::add_edge`] and
/// [`UnrootedTree::create_internal_node`], which refuse anything that would
/// close a cycle, so the graph is always a forest.
#[derive(Debug, Clone)]
pub struct UnrootedTree {
    nodes: Vec<GraphNode>,
    taxa: HashMap<String, NodeId>,
    /// Union-find parents used to reject cycles
    components: Vec<NodeId>,
    weighted: bool,
}

impl UnrootedTree {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self {
            nodes: vec![],
            taxa: HashMap::new(),
            components: vec![],
            weighted: true,
        }
    }

    pub(crate) fn push_node(&mut self, taxon: Option<String>, label: Option<String>) -> NodeId {
        let id = self.nodes.len();
        if let Some(taxon) = &taxon {
            self.taxa.insert(taxon.clone(), id);
        }
        self.nodes.push(GraphNode::new(id, taxon, label));
        self.components.push(id);
        id
    }

    /// Records that edge lengths are placeholders (e.g. converted from a
    /// tree without branch lengths)
    pub(crate) fn mark_unweighted(&mut self) {
        self.weighted = false;
    }

    /// Creates an isolated external node bound to `taxon`.
    /// Nothing is created if the taxon is already present.
    pub fn create_external_node(&mut self, taxon: &str) -> Result<NodeId, TreeError> {
        if self.taxa.contains_key(taxon) {
            return Err(TreeError::DuplicateTaxon(taxon.to_owned()));
        }
        Ok(self.push_node(Some(taxon.to_owned()), None))
    }

    /// Creates an internal node connected to each of `children` by an edge
    /// of the given length.
    /// ```
    /// use phylonj::tree::UnrootedTree;
    ///
    /// let mut graph = UnrootedTree::new();
    /// let a = graph.create_external_node("A").unwrap();
    /// let b = graph.create_external_node("B").unwrap();
    /// let c = graph.create_external_node("C").unwrap();
    /// let center = graph.create_internal_node(&[(a, 1.0), (b, 2.0), (c, 3.0)]).unwrap();
    ///
    /// assert_eq!(graph.degree(center).unwrap(), 3);
    /// assert_eq!(graph.edge_length(b, center).unwrap(), 2.0);
    /// ```
    pub fn create_internal_node(
        &mut self,
        children: &[(NodeId, EdgeLength)],
    ) -> Result<NodeId, TreeError> {
        if children.is_empty() {
            return Err(TreeError::NoChildren);
        }
        for (i, &(child, length)) in children.iter().enumerate() {
            self.get(child)?;
            if length < 0.0 {
                return Err(TreeError::NegativeLength(length));
            }
            if children[..i].iter().any(|&(other, _)| other == child) {
                return Err(TreeError::RepeatedChild(child));
            }
        }
        for (i, &(a, _)) in children.iter().enumerate() {
            for &(b, _) in children[i + 1..].iter() {
                if self.find(a) == self.find(b) {
                    return Err(TreeError::Cycle(a, b));
                }
            }
        }

        let id = self.push_node(None, None);
        for &(child, length) in children {
            self.add_edge(id, child, length)?;
        }

        Ok(id)
    }

    /// Connects two nodes. Self loops, duplicate edges, negative lengths and
    /// edges closing a cycle are rejected.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId, length: EdgeLength) -> Result<(), TreeError> {
        self.get(a)?;
        self.get(b)?;
        if a == b {
            return Err(TreeError::SelfLoop(a));
        }
        if length < 0.0 {
            return Err(TreeError::NegativeLength(length));
        }
        if self.nodes[a].adjacencies.iter().any(|&(n, _)| n == b) {
            return Err(TreeError::DuplicateEdge(a, b));
        }
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a == root_b {
            return Err(TreeError::Cycle(a, b));
        }

        self.components[root_a] = root_b;
        self.nodes[a].adjacencies.push((b, length));
        self.nodes[b].adjacencies.push((a, length));

        Ok(())
    }

    fn find(&mut self, mut id: NodeId) -> NodeId {
        while self.components[id] != id {
            self.components[id] = self.components[self.components[id]];
            id = self.components[id];
        }
        id
    }

    /// Get a reference to a specific node of the graph
    pub fn get(&self, id: NodeId) -> Result<&GraphNode, TreeError> {
        self.nodes.get(id).ok_or(TreeError::NodeNotFound(id))
    }

    /// Gets the id of the external node bound to a taxon
    pub fn get_by_taxon(&self, taxon: &str) -> Option<NodeId> {
        self.taxa.get(taxon).copied()
    }

    /// Neighbours of a node with the length of the connecting edges
    pub fn adjacencies(&self, id: NodeId) -> Result<&[(NodeId, EdgeLength)], TreeError> {
        Ok(&self.get(id)?.adjacencies)
    }

    /// Number of edges incident to a node
    pub fn degree(&self, id: NodeId) -> Result<usize, TreeError> {
        Ok(self.get(id)?.degree())
    }

    /// Length of the edge between two adjacent nodes.
    ///
    /// Fails with [`TreeError::GraphInconsistency`] when the nodes are not
    /// adjacent, or when only one of them lists the other.
    pub fn edge_length(&self, a: NodeId, b: NodeId) -> Result<EdgeLength, TreeError> {
        let forward = self.get(a)?.adjacencies.iter().find(|&&(n, _)| n == b);
        let backward = self.get(b)?.adjacencies.iter().find(|&&(n, _)| n == a);
        match (forward, backward) {
            (Some(&(_, l1)), Some(&(_, l2))) if l1 == l2 => Ok(l1),
            (Some(_), Some(_)) => Err(TreeError::GraphInconsistency(format!(
                "edge {a}-{b} has two different lengths"
            ))),
            (None, None) => Err(TreeError::GraphInconsistency(format!(
                "no edge between nodes {a} and {b}"
            ))),
            _ => Err(TreeError::GraphInconsistency(format!(
                "edge {a}-{b} is only recorded on one side"
            ))),
        }
    }

    /// Ids of the nodes bound to a taxon
    pub fn external_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.taxon.is_some())
            .map(|node| node.id)
            .collect()
    }

    /// Ids of the nodes without a taxon
    pub fn internal_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.taxon.is_none())
            .map(|node| node.id)
            .collect()
    }

    /// Ids of the nodes with exactly `degree` incident edges
    pub fn nodes_with_degree(&self, degree: usize) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.degree() == degree)
            .map(|node| node.id)
            .collect()
    }

    /// Taxon bound to a node
    pub fn get_taxon(&self, id: NodeId) -> Result<Option<&str>, TreeError> {
        Ok(self.get(id)?.taxon.as_deref())
    }

    /// Checks that the edges carry real lengths
    pub fn has_lengths(&self) -> bool {
        self.weighted && self.nodes.iter().any(|node| !node.adjacencies.is_empty())
    }

    /// Number of nodes in the graph
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges in the graph
    pub fn n_edges(&self) -> usize {
        self.nodes.iter().map(GraphNode::degree).sum::<usize>() / 2
    }

    /// Newick representation of the subtree hanging from `id` when the graph
    /// is entered from `from`, followed by the length of that edge.
    fn edge_newick(
        &self,
        id: NodeId,
        from: NodeId,
        length: EdgeLength,
        visited: &mut [bool],
    ) -> Result<String, TreeError> {
        // parents come before their children
        let mut order = vec![];
        let mut stack = vec![(id, from, length)];
        while let Some((node, previous, length)) = stack.pop() {
            if visited[node] {
                return Err(TreeError::GraphInconsistency(format!(
                    "node {node} is reached twice"
                )));
            }
            visited[node] = true;
            order.push((node, previous, length));
            stack.extend(
                self.get(node)?
                    .adjacencies
                    .iter()
                    .rev()
                    .filter(|(n, _)| *n != previous)
                    .map(|&(n, l)| (n, node, l)),
            );
        }

        let mut reprs: HashMap<NodeId, String> = HashMap::new();
        for &(current, previous, length) in order.iter().rev() {
            let node = self.get(current)?;
            let children = node
                .adjacencies
                .iter()
                .filter(|(n, _)| *n != previous)
                .map(|(n, _)| {
                    reprs.remove(n).ok_or_else(|| {
                        TreeError::GraphInconsistency(format!("node {n} was not written"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let repr = match (&node.taxon, children.is_empty()) {
                (Some(taxon), true) => quote_name(taxon),
                (None, true) => return Err(TreeError::UnnamedLeaf(current)),
                (taxon, false) => {
                    let label = taxon.as_ref().or(node.label.as_ref());
                    format!(
                        "({}){}",
                        children.join(","),
                        label.map(|l| quote_name(l)).unwrap_or_default()
                    )
                }
            };
            let repr = if self.weighted {
                format!("{repr}:{length}")
            } else {
                repr
            };
            reprs.insert(current, repr);
        }

        reprs
            .remove(&id)
            .ok_or_else(|| TreeError::GraphInconsistency(format!("node {id} was not written")))
    }

    /// Writes the graph as a newick string, with a multifurcation at the most
    /// recently created internal node. A graph without internal nodes is
    /// written from its first node, as a zero-length leaf of the root.
    /// ```
    /// use phylonj::tree::UnrootedTree;
    ///
    /// let mut graph = UnrootedTree::new();
    /// let a = graph.create_external_node("A").unwrap();
    /// let b = graph.create_external_node("B").unwrap();
    /// let c = graph.create_external_node("C").unwrap();
    /// graph.create_internal_node(&[(a, 1.0), (b, 2.0), (c, 0.5)]).unwrap();
    ///
    /// assert_eq!(graph.to_newick().unwrap(), "(A:1,B:2,C:0.5);");
    /// ```
    pub fn to_newick(&self) -> Result<String, TreeError> {
        let start = self
            .nodes
            .iter()
            .rev()
            .find(|node| node.taxon.is_none() && node.degree() > 0)
            .or_else(|| self.nodes.first())
            .ok_or(TreeError::IsEmpty)?;

        let mut visited = vec![false; self.nodes.len()];
        visited[start.id] = true;
        let mut parts = vec![];
        if let Some(taxon) = &start.taxon {
            let taxon = quote_name(taxon);
            parts.push(if self.weighted { format!("{taxon}:0") } else { taxon });
        }
        for &(n, length) in start.adjacencies.iter() {
            parts.push(self.edge_newick(n, start.id, length, &mut visited)?);
        }

        if let Some(missing) = visited.iter().position(|v| !v) {
            return Err(TreeError::Disconnected(start.id, missing));
        }

        let repr = match (&start.taxon, start.degree()) {
            (Some(taxon), 0) => quote_name(taxon),
            _ => format!("({})", parts.join(",")),
        };
        Ok(repr + ";")
    }

    #[cfg(test)]
    pub(crate) fn drop_half_edge(&mut self, a: NodeId, b: NodeId) {
        self.nodes[a].adjacencies.retain(|&(n, _)| n != b);
    }
}

impl Default for UnrootedTree {
    fn default() -> Self {
        Self::new()
    }
}
