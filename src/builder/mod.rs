//! Build trees from distance matrices by agglomerative clustering.
//!
//! [`ClusteringTreeBuilder`] drives the clustering: it starts with one
//! cluster per taxon and repeatedly merges the pair of clusters chosen by a
//! [`ClusteringStrategy`], until few enough clusters remain. The strategy
//! decides which pair to merge, the branch lengths of the merged clusters and
//! the distances to the new cluster. Two strategies are provided:
//!  - [`NeighborJoining`], which builds an [`UnrootedTree`]
//!  - [`Upgma`], which builds a rooted, ultrametric [`Tree`]
//!

use clap::ValueEnum;
use log::{debug, info, trace};
use thiserror::Error;

use crate::distance::{DistanceMatrix, DistanceModel, DistanceOptions, MatrixError, SequenceRecord};
use crate::progress::{Phase, Progress};
use crate::tree::{EdgeLength, NodeId, PhyloTree, Tree, TreeError, UnrootedTree};

mod nj;
mod upgma;

pub use self::nj::NeighborJoining;
pub use self::upgma::Upgma;

/// Errors that can occur when building a tree
#[derive(Error, Debug)]
pub enum BuildError {
    /// At least 2 taxa are needed to build a tree
    #[error("Cannot build a tree from {0} taxa, at least 2 are needed.")]
    TooFewTaxa(usize),
    /// The strategy stops at a number of clusters the builder can not finish from
    #[error("Clustering must stop at 2 or 3 clusters, not {0}.")]
    UnsupportedStop(usize),
    /// The strategy picked a pair that is not two distinct active clusters
    #[error("Cannot merge clusters {0} and {1} out of {2}.")]
    InvalidPair(usize, usize, usize),
    /// The distance matrix could not be built
    #[error("Invalid distance matrix")]
    Matrix(#[from] MatrixError),
    /// The output tree refused an operation
    #[error("Could not build the tree")]
    Tree(#[from] TreeError),
}

/// Operations the clustering engine needs from the tree it builds
pub trait ClusterTree: Default {
    /// Creates the leaf of a taxon
    fn create_external_node(&mut self, taxon: &str) -> Result<NodeId, TreeError>;
    /// Joins existing subtrees under a new node, with the given branch lengths
    fn create_internal_node(&mut self, children: &[(NodeId, EdgeLength)]) -> Result<NodeId, TreeError>;
    /// Links the last two subtrees with a branch of the given length
    fn connect(&mut self, a: NodeId, b: NodeId, length: EdgeLength) -> Result<(), TreeError>;
}

impl ClusterTree for UnrootedTree {
    fn create_external_node(&mut self, taxon: &str) -> Result<NodeId, TreeError> {
        UnrootedTree::create_external_node(self, taxon)
    }

    fn create_internal_node(&mut self, children: &[(NodeId, EdgeLength)]) -> Result<NodeId, TreeError> {
        UnrootedTree::create_internal_node(self, children)
    }

    fn connect(&mut self, a: NodeId, b: NodeId, length: EdgeLength) -> Result<(), TreeError> {
        self.add_edge(a, b, length)
    }
}

impl ClusterTree for Tree {
    fn create_external_node(&mut self, taxon: &str) -> Result<NodeId, TreeError> {
        Tree::create_external_node(self, taxon)
    }

    fn create_internal_node(&mut self, children: &[(NodeId, EdgeLength)]) -> Result<NodeId, TreeError> {
        let ids: Vec<NodeId> = children.iter().map(|(id, _)| *id).collect();
        let node = Tree::create_internal_node(self, &ids)?;
        for (child, length) in children {
            self.set_length(child, *length)?;
        }
        Ok(node)
    }

    /// A rooted tree can not hold an edge between two roots: a new root is
    /// placed halfway along it.
    fn connect(&mut self, a: NodeId, b: NodeId, length: EdgeLength) -> Result<(), TreeError> {
        ClusterTree::create_internal_node(self, &[(a, length / 2.0), (b, length / 2.0)])?;
        Ok(())
    }
}

/// An active cluster: a subtree of the tree being built
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    /// Creation rank of the cluster (taxa first, in matrix order)
    pub id: usize,
    /// Root of the subtree
    pub node: NodeId,
    /// Number of taxa in the cluster
    pub size: usize,
    /// Distance from the root of the subtree to its farthest taxon
    pub height: f64,
}

/// Distances between the active clusters.
///
/// Clusters are addressed by their current index. When two clusters are
/// merged they are removed, the remaining ones keep their relative order and
/// the merged cluster is appended last.
#[derive(Debug, Clone)]
pub struct ClusterDistances {
    clusters: Vec<Cluster>,
    /// Square matrix, `clusters.len()` wide
    distances: Vec<f64>,
}

impl ClusterDistances {
    fn new(matrix: &DistanceMatrix, nodes: &[NodeId]) -> Self {
        let n = matrix.size();
        let clusters = nodes
            .iter()
            .enumerate()
            .map(|(id, &node)| Cluster {
                id,
                node,
                size: 1,
                height: 0.0,
            })
            .collect();
        let mut distances = Vec::with_capacity(n * n);
        for i in 0..n {
            distances.extend(matrix.row(i));
        }

        Self {
            clusters,
            distances,
        }
    }

    /// Number of active clusters
    pub fn size(&self) -> usize {
        self.clusters.len()
    }

    /// Distance between the clusters at indices `i` and `j`
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.distances[i * self.size() + j]
    }

    /// Active cluster at index `i`
    pub fn cluster(&self, i: usize) -> &Cluster {
        &self.clusters[i]
    }

    /// All active clusters, by index
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Replaces clusters `i` and `j` by `merged`. `new_distances` holds the
    /// distances from the remaining clusters, in order, to `merged`.
    fn merge(&mut self, i: usize, j: usize, merged: Cluster, new_distances: &[f64]) {
        let n = self.size();
        let kept: Vec<usize> = (0..n).filter(|&k| k != i && k != j).collect();
        let m = kept.len() + 1;

        let mut distances = Vec::with_capacity(m * m);
        for (a, &k) in kept.iter().enumerate() {
            distances.extend(kept.iter().map(|&l| self.get(k, l)));
            distances.push(new_distances[a]);
        }
        distances.extend_from_slice(new_distances);
        distances.push(0.0);

        self.clusters = kept
            .iter()
            .map(|&k| self.clusters[k])
            .chain(std::iter::once(merged))
            .collect();
        self.distances = distances;
    }
}

/// The criterion used to drive the clustering
pub trait ClusteringStrategy {
    /// Tree built by the strategy
    type Tree: ClusterTree;

    /// The loop merges clusters while there are at least this many of them:
    /// 3 for unrooted trees, where the last two clusters are linked by an
    /// edge, 2 for rooted trees
    fn minimum_clusters(&self) -> usize;

    /// Picks the indices `(i, j)`, `i < j`, of the next clusters to merge
    fn find_next_pair(&mut self, distances: &ClusterDistances) -> (usize, usize);

    /// Branch lengths from clusters `i` and `j` to their merged parent
    fn join_clusters(&mut self, distances: &ClusterDistances, i: usize, j: usize) -> (f64, f64);

    /// Distance from cluster `k` to the cluster made by merging `i` and `j`
    fn updated_distance(&self, distances: &ClusterDistances, i: usize, j: usize, k: usize) -> f64;
}

/// Builds a tree from a distance matrix with a clustering strategy.
///
/// The builder is consumed by [`ClusteringTreeBuilder::build`].
/// ```
/// use phylonj::builder::{ClusteringTreeBuilder, NeighborJoining};
/// use phylonj::distance::DistanceMatrix;
/// use phylonj::progress::NoProgress;
///
/// let matrix = DistanceMatrix::from_rows(
///     vec!["A".into(), "B".into(), "C".into(), "D".into()],
///     vec![
///         vec![0.0, 2.0, 4.0, 4.0],
///         vec![2.0, 0.0, 4.0, 4.0],
///         vec![4.0, 4.0, 0.0, 2.0],
///         vec![4.0, 4.0, 2.0, 0.0],
///     ],
/// ).unwrap();
///
/// let builder = ClusteringTreeBuilder::new(&matrix, NeighborJoining::default()).unwrap();
/// let tree = builder.build(&NoProgress).unwrap().unwrap();
///
/// assert_eq!(tree.external_nodes().len(), 4);
/// assert_eq!(tree.internal_nodes().len(), 2);
/// ```
pub struct ClusteringTreeBuilder<'a, S: ClusteringStrategy> {
    matrix: &'a DistanceMatrix,
    strategy: S,
}

impl<'a, S: ClusteringStrategy> ClusteringTreeBuilder<'a, S> {
    /// Checks that a tree can be built from the matrix with the strategy
    pub fn new(matrix: &'a DistanceMatrix, strategy: S) -> Result<Self, BuildError> {
        if matrix.size() < 2 {
            return Err(BuildError::TooFewTaxa(matrix.size()));
        }
        let stop = strategy.minimum_clusters();
        if !(2..=3).contains(&stop) {
            return Err(BuildError::UnsupportedStop(stop));
        }

        Ok(Self { matrix, strategy })
    }

    /// Runs the clustering to completion. Returns `Ok(None)` if `ctx` is
    /// cancelled, which is checked before each merge.
    pub fn build(mut self, ctx: &dyn Progress) -> Result<Option<S::Tree>, BuildError> {
        let n = self.matrix.size();
        let stop = self.strategy.minimum_clusters();
        let total_merges = n + 1 - stop.min(n + 1);
        info!("Clustering {n} taxa, {total_merges} merges to do");

        let mut tree = S::Tree::default();
        let nodes = self
            .matrix
            .taxa()
            .iter()
            .map(|taxon| tree.create_external_node(taxon))
            .collect::<Result<Vec<_>, _>>()?;
        let mut distances = ClusterDistances::new(self.matrix, &nodes);

        let mut merged = 0;
        while distances.size() >= stop {
            if ctx.is_cancelled() {
                info!("Clustering cancelled after {merged} merges");
                return Ok(None);
            }

            let (i, j) = self.strategy.find_next_pair(&distances);
            let (i, j) = (i.min(j), i.max(j));
            if i == j || j >= distances.size() {
                return Err(BuildError::InvalidPair(i, j, distances.size()));
            }

            let (li, lj) = self.strategy.join_clusters(&distances, i, j);
            let (ci, cj) = (*distances.cluster(i), *distances.cluster(j));
            let node = tree.create_internal_node(&[(ci.node, li), (cj.node, lj)])?;
            trace!(
                "Merged clusters {} and {} (distance {}) with lengths {li} and {lj}",
                ci.id,
                cj.id,
                distances.get(i, j)
            );

            let new_distances: Vec<f64> = (0..distances.size())
                .filter(|&k| k != i && k != j)
                .map(|k| self.strategy.updated_distance(&distances, i, j, k))
                .collect();
            let cluster = Cluster {
                id: n + merged,
                node,
                size: ci.size + cj.size,
                height: (ci.height + li).max(cj.height + lj),
            };
            distances.merge(i, j, cluster, &new_distances);

            merged += 1;
            ctx.report_progress(merged as f64 / total_merges as f64);
        }

        if distances.size() == 2 {
            let (a, b) = (distances.cluster(0).node, distances.cluster(1).node);
            let length = distances.get(0, 1);
            debug!("Linking the last two clusters with a branch of length {length}");
            tree.connect(a, b, length)?;
        }

        ctx.report_progress(1.0);
        info!("Tree built");

        Ok(Some(tree))
    }
}

/// Available tree building methods
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Method {
    /// [Neighbor joining](https://en.wikipedia.org/wiki/Neighbor_joining),
    /// gives an unrooted tree
    #[value(name = "nj")]
    NeighborJoining,
    /// [UPGMA](https://en.wikipedia.org/wiki/UPGMA), gives a rooted
    /// ultrametric tree
    #[value(name = "upgma")]
    Upgma,
}

/// Builds a tree from a distance matrix with the given method
/// ```
/// use phylonj::builder::{build_tree, Method};
/// use phylonj::distance::DistanceMatrix;
/// use phylonj::progress::NoProgress;
///
/// let matrix = DistanceMatrix::from_rows(
///     vec!["A".into(), "B".into(), "C".into()],
///     vec![
///         vec![0.0, 2.0, 6.0],
///         vec![2.0, 0.0, 6.0],
///         vec![6.0, 6.0, 0.0],
///     ],
/// ).unwrap();
///
/// let tree = build_tree(&matrix, Method::Upgma, &NoProgress).unwrap().unwrap();
/// assert!(tree.is_rooted());
/// assert_eq!(tree.n_leaves(), 3);
/// ```
pub fn build_tree(
    matrix: &DistanceMatrix,
    method: Method,
    ctx: &dyn Progress,
) -> Result<Option<PhyloTree>, BuildError> {
    let tree = match method {
        Method::NeighborJoining => ClusteringTreeBuilder::new(matrix, NeighborJoining::default())?
            .build(ctx)?
            .map(PhyloTree::from),
        Method::Upgma => ClusteringTreeBuilder::new(matrix, Upgma)?
            .build(ctx)?
            .map(PhyloTree::from),
    };

    Ok(tree)
}

/// Computes the distance matrix of aligned sequences, then builds a tree
/// from it. The two steps each take half of the progress range.
pub fn build_from_sequences(
    records: &[SequenceRecord],
    model: DistanceModel,
    options: DistanceOptions,
    method: Method,
    ctx: &dyn Progress,
) -> Result<Option<(PhyloTree, DistanceMatrix)>, BuildError> {
    let phases = Phase::split(ctx, &[0.5, 0.5]);

    info!("Computing genetic distance for all pairs");
    let Some(matrix) = DistanceMatrix::from_sequences(records, model, options, &phases[0])? else {
        return Ok(None);
    };

    info!("Building tree");
    let Some(tree) = build_tree(&matrix, method, &phases[1])? else {
        return Ok(None);
    };

    Ok(Some((tree, matrix)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancellationToken, NoProgress};
    use crate::tree::path_length;

    fn matrix(names: &[&str], rows: Vec<Vec<f64>>) -> DistanceMatrix {
        DistanceMatrix::from_rows(names.iter().map(|s| s.to_string()).collect(), rows).unwrap()
    }

    fn quartet() -> DistanceMatrix {
        matrix(
            &["A", "B", "C", "D"],
            vec![
                vec![0.0, 2.0, 4.0, 4.0],
                vec![2.0, 0.0, 4.0, 4.0],
                vec![4.0, 4.0, 0.0, 2.0],
                vec![4.0, 4.0, 2.0, 0.0],
            ],
        )
    }

    #[test]
    fn compaction_keeps_order() {
        let m = quartet();
        let mut distances = ClusterDistances::new(&m, &[10, 11, 12, 13]);
        let merged = Cluster {
            id: 4,
            node: 14,
            size: 2,
            height: 1.0,
        };
        distances.merge(0, 1, merged, &[3.0, 3.5]);

        assert_eq!(distances.size(), 3);
        let nodes: Vec<_> = distances.clusters().iter().map(|c| c.node).collect();
        assert_eq!(nodes, vec![12, 13, 14]);
        assert_eq!(distances.get(0, 1), 2.0);
        assert_eq!(distances.get(0, 2), 3.0);
        assert_eq!(distances.get(2, 1), 3.5);
        assert_eq!(distances.get(2, 2), 0.0);
    }

    #[test]
    fn compaction_in_the_middle() {
        let m = quartet();
        let mut distances = ClusterDistances::new(&m, &[0, 1, 2, 3]);
        let merged = Cluster {
            id: 4,
            node: 4,
            size: 2,
            height: 0.0,
        };
        distances.merge(1, 3, merged, &[7.0, 8.0]);

        let ids: Vec<_> = distances.clusters().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 2, 4]);
        assert_eq!(distances.get(0, 1), 4.0);
        assert_eq!(distances.get(1, 2), 8.0);
    }

    #[test]
    fn too_few_taxa() {
        let single = matrix(&["A"], vec![vec![0.0]]);
        assert!(matches!(
            ClusteringTreeBuilder::new(&single, NeighborJoining::default()),
            Err(BuildError::TooFewTaxa(1))
        ));
        let empty = DistanceMatrix::new(vec![]).unwrap();
        assert!(matches!(
            build_tree(&empty, Method::Upgma, &NoProgress),
            Err(BuildError::TooFewTaxa(0))
        ));
    }

    #[test]
    fn two_taxa() {
        let m = matrix(&["A", "B"], vec![vec![0.0, 3.0], vec![3.0, 0.0]]);

        let graph = ClusteringTreeBuilder::new(&m, NeighborJoining::default())
            .unwrap()
            .build(&NoProgress)
            .unwrap()
            .unwrap();
        assert_eq!(graph.size(), 2);
        assert_eq!(graph.edge_length(0, 1).unwrap(), 3.0);

        let tree = ClusteringTreeBuilder::new(&m, Upgma)
            .unwrap()
            .build(&NoProgress)
            .unwrap()
            .unwrap();
        assert_eq!(tree.to_newick().unwrap(), "(A:1.5,B:1.5);");
    }

    #[test]
    fn cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let result = ClusteringTreeBuilder::new(&quartet(), NeighborJoining::default())
            .unwrap()
            .build(&token)
            .unwrap();
        assert!(result.is_none());
        assert!(build_tree(&quartet(), Method::Upgma, &token)
            .unwrap()
            .is_none());
    }

    #[test]
    fn progress_is_reported() {
        let token = CancellationToken::new();
        build_tree(&quartet(), Method::NeighborJoining, &token)
            .unwrap()
            .unwrap();
        assert_eq!(token.last_reported(), 1.0);
    }

    /// Always merges the first cluster with itself
    struct Broken;

    impl ClusteringStrategy for Broken {
        type Tree = Tree;

        fn minimum_clusters(&self) -> usize {
            2
        }
        fn find_next_pair(&mut self, _: &ClusterDistances) -> (usize, usize) {
            (0, 0)
        }
        fn join_clusters(&mut self, _: &ClusterDistances, _: usize, _: usize) -> (f64, f64) {
            (0.0, 0.0)
        }
        fn updated_distance(&self, _: &ClusterDistances, _: usize, _: usize, _: usize) -> f64 {
            0.0
        }
    }

    #[test]
    fn invalid_pair() {
        let result = ClusteringTreeBuilder::new(&quartet(), Broken)
            .unwrap()
            .build(&NoProgress);
        assert!(matches!(result, Err(BuildError::InvalidPair(0, 0, 4))));
    }

    #[test]
    fn tree_from_sequences() {
        let records = vec![
            SequenceRecord::new("A", b"ACGTACGTACGTACGTACGT"),
            SequenceRecord::new("B", b"ACGTACGTACGTACGTACGA"),
            SequenceRecord::new("C", b"ACGTACGTACGTACGTTTTT"),
            SequenceRecord::new("D", b"ACGTACGTACGTACTTTTTA"),
        ];
        let token = CancellationToken::new();
        let (tree, matrix) = build_from_sequences(
            &records,
            DistanceModel::JukesCantor,
            DistanceOptions::default(),
            Method::NeighborJoining,
            &token,
        )
        .unwrap()
        .unwrap();

        assert_eq!(matrix.size(), 4);
        assert_eq!(tree.n_leaves(), 4);
        assert!(!tree.is_rooted());
        assert_eq!(token.last_reported(), 1.0);

        let PhyloTree::Unrooted(graph) = tree else {
            panic!("neighbor joining gives unrooted trees")
        };
        let (a, b) = (graph.get_by_taxon("A").unwrap(), graph.get_by_taxon("B").unwrap());
        assert!(path_length(&graph, a, b).unwrap() > 0.0);
    }
}
