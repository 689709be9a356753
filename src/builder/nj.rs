use super::{ClusterDistances, ClusteringStrategy};
use crate::tree::UnrootedTree;

/// [Neighbor joining](https://en.wikipedia.org/wiki/Neighbor_joining)
/// [(Saitou & Nei, 1987)](https://doi.org/10.1093/oxfordjournals.molbev.a040454).
///
/// With $n$ active clusters and $r_i = \frac{1}{n-2}\sum_k d(i,k)$, the pair
/// minimising $d(i,j) - r_i - r_j$ is merged. Their branch lengths are
/// $l_i = \frac{1}{2}(d(i,j) + r_i - r_j)$ and $l_j = d(i,j) - l_i$, and the
/// distance from any other cluster $k$ to the new one is
/// $\frac{1}{2}(d(k,i) + d(k,j) - d(i,j))$. Negative values, which noisy
/// distances can produce, are replaced by 0.
///
/// The last two clusters are linked directly, giving an unrooted tree.
#[derive(Debug, Default, Clone)]
pub struct NeighborJoining {
    /// Normalised distance sums of the active clusters
    r: Vec<f64>,
}

impl ClusteringStrategy for NeighborJoining {
    type Tree = UnrootedTree;

    fn minimum_clusters(&self) -> usize {
        3
    }

    fn find_next_pair(&mut self, distances: &ClusterDistances) -> (usize, usize) {
        let n = distances.size();
        self.r.clear();
        for i in 0..n {
            let sum: f64 = (0..n).map(|j| distances.get(i, j)).sum();
            self.r.push(sum / (n as f64 - 2.0));
        }

        let mut best = (0, 1);
        let mut min = f64::MAX;
        for i in 0..n {
            for j in (i + 1)..n {
                let score = distances.get(i, j) - (self.r[i] + self.r[j]);
                if score < min {
                    min = score;
                    best = (i, j);
                }
            }
        }

        best
    }

    fn join_clusters(&mut self, distances: &ClusterDistances, i: usize, j: usize) -> (f64, f64) {
        let dij = distances.get(i, j);
        let li = (dij + (self.r[i] - self.r[j])) * 0.5;
        let lj = dij - li;

        (li.max(0.0), lj.max(0.0))
    }

    fn updated_distance(&self, distances: &ClusterDistances, i: usize, j: usize, k: usize) -> f64 {
        let d = (distances.get(k, i) + distances.get(k, j) - distances.get(i, j)) * 0.5;
        d.max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ClusteringTreeBuilder;
    use crate::distance::DistanceMatrix;
    use crate::progress::NoProgress;
    use crate::simulate::{generate_tree, Distr};
    use crate::tree::{path_length, root_the_tree, PhyloTree};
    use approx::assert_relative_eq;
    use itertools::Itertools;

    fn matrix(names: &[&str], rows: Vec<Vec<f64>>) -> DistanceMatrix {
        DistanceMatrix::from_rows(names.iter().map(|s| s.to_string()).collect(), rows).unwrap()
    }

    fn neighbor_joining(matrix: &DistanceMatrix) -> UnrootedTree {
        ClusteringTreeBuilder::new(matrix, NeighborJoining::default())
            .unwrap()
            .build(&NoProgress)
            .unwrap()
            .unwrap()
    }

    fn leaf_distance(graph: &UnrootedTree, a: &str, b: &str) -> f64 {
        let a = graph.get_by_taxon(a).unwrap();
        let b = graph.get_by_taxon(b).unwrap();
        path_length(graph, a, b).unwrap()
    }

    /// Checks that every path between leaves has the length given in the matrix
    fn assert_additive(graph: &UnrootedTree, matrix: &DistanceMatrix) {
        for (a, b) in matrix.taxa().iter().tuple_combinations() {
            assert_relative_eq!(
                leaf_distance(graph, a, b),
                matrix.get_by_name(a, b).unwrap(),
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn quartet() {
        let m = matrix(
            &["A", "B", "C", "D"],
            vec![
                vec![0.0, 2.0, 4.0, 4.0],
                vec![2.0, 0.0, 4.0, 4.0],
                vec![4.0, 4.0, 0.0, 2.0],
                vec![4.0, 4.0, 2.0, 0.0],
            ],
        );
        let graph = neighbor_joining(&m);

        assert_eq!(graph.external_nodes(), vec![0, 1, 2, 3]);
        assert_eq!(graph.internal_nodes(), vec![4, 5]);

        // first join is (A, B), second (C, D)
        let ab = graph.get(4).unwrap();
        let neighbours = ab.adjacencies.iter().map(|(n, _)| *n).collect_vec();
        assert_eq!(neighbours, vec![0, 1, 5]);
        let cd = graph.get(5).unwrap();
        let neighbours = cd.adjacencies.iter().map(|(n, _)| *n).collect_vec();
        assert_eq!(neighbours, vec![2, 3, 4]);

        for leaf in 0..4 {
            assert_eq!(graph.adjacencies(leaf).unwrap()[0].1, 1.0);
        }
        assert_eq!(graph.edge_length(4, 5).unwrap(), 2.0);
    }

    #[test]
    fn wikipedia_example() {
        // https://en.wikipedia.org/wiki/Neighbor_joining#Example
        let m = matrix(
            &["a", "b", "c", "d", "e"],
            vec![
                vec![0.0, 5.0, 9.0, 9.0, 8.0],
                vec![5.0, 0.0, 10.0, 10.0, 9.0],
                vec![9.0, 10.0, 0.0, 8.0, 7.0],
                vec![9.0, 10.0, 8.0, 0.0, 3.0],
                vec![8.0, 9.0, 7.0, 3.0, 0.0],
            ],
        );
        let graph = neighbor_joining(&m);
        let length_to_parent = |taxon: &str| {
            let id = graph.get_by_taxon(taxon).unwrap();
            graph.adjacencies(id).unwrap()[0].1
        };

        assert_eq!(length_to_parent("a"), 2.0);
        assert_eq!(length_to_parent("b"), 3.0);
        assert_eq!(length_to_parent("c"), 4.0);
        assert_eq!(length_to_parent("d"), 2.0);
        assert_eq!(length_to_parent("e"), 1.0);
        assert_eq!(graph.internal_nodes().len(), 3);
        assert_additive(&graph, &m);
    }

    #[test]
    fn unbalanced_quartet() {
        // https://www.tenderisthebyte.com/blog/2022/08/31/neighbor-joining-trees/
        let m = matrix(
            &["A", "B", "C", "D"],
            vec![
                vec![0.0, 4.0, 5.0, 10.0],
                vec![4.0, 0.0, 7.0, 12.0],
                vec![5.0, 7.0, 0.0, 9.0],
                vec![10.0, 12.0, 9.0, 0.0],
            ],
        );
        let graph = neighbor_joining(&m);
        for (taxon, length) in [("A", 1.0), ("B", 3.0), ("C", 2.0), ("D", 7.0)] {
            let id = graph.get_by_taxon(taxon).unwrap();
            assert_eq!(graph.adjacencies(id).unwrap()[0].1, length, "{taxon}");
        }
        assert_eq!(graph.edge_length(4, 5).unwrap(), 2.0);
    }

    #[test]
    fn noisy_distances_give_non_negative_lengths() {
        let m = matrix(
            &["A", "B", "C", "D", "E"],
            vec![
                vec![0.0, 0.1, 9.0, 0.2, 5.0],
                vec![0.1, 0.0, 0.1, 8.0, 0.3],
                vec![9.0, 0.1, 0.0, 0.1, 7.0],
                vec![0.2, 8.0, 0.1, 0.0, 0.1],
                vec![5.0, 0.3, 7.0, 0.1, 0.0],
            ],
        );
        let graph = neighbor_joining(&m);

        assert_eq!(graph.size(), 5 + 3);
        for node in 0..graph.size() {
            for (_, length) in graph.adjacencies(node).unwrap() {
                assert!(*length >= 0.0);
            }
        }
    }

    #[test]
    fn recovers_additive_trees() {
        for n_leaves in [3, 5, 10, 25] {
            let tree = generate_tree(n_leaves, true, Distr::Uniform).unwrap();
            let m = tree.distance_matrix().unwrap();
            let graph = neighbor_joining(&m);

            assert_eq!(graph.external_nodes().len(), n_leaves);
            assert_eq!(graph.internal_nodes().len(), n_leaves - 2);
            assert_additive(&graph, &m);

            let rooted = root_the_tree(PhyloTree::Unrooted(graph)).unwrap();
            assert_eq!(tree.robinson_foulds(&rooted).unwrap(), 0);
        }
    }
}
