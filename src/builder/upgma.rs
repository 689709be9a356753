use super::{ClusterDistances, ClusteringStrategy};
use crate::tree::Tree;

/// [UPGMA](https://en.wikipedia.org/wiki/UPGMA): average linkage clustering.
///
/// The closest pair of clusters is merged, at a height of half their
/// distance, and the distance to the new cluster is the average of the
/// distances to its two parts, weighted by their number of taxa. Merging
/// continues down to a single cluster, the root of a rooted tree. The tree
/// is ultrametric when the distances are.
#[derive(Debug, Default, Clone, Copy)]
pub struct Upgma;

impl ClusteringStrategy for Upgma {
    type Tree = Tree;

    fn minimum_clusters(&self) -> usize {
        2
    }

    fn find_next_pair(&mut self, distances: &ClusterDistances) -> (usize, usize) {
        let n = distances.size();
        let mut best = (0, 1);
        let mut min = f64::MAX;
        for i in 0..n {
            for j in (i + 1)..n {
                if distances.get(i, j) < min {
                    min = distances.get(i, j);
                    best = (i, j);
                }
            }
        }

        best
    }

    fn join_clusters(&mut self, distances: &ClusterDistances, i: usize, j: usize) -> (f64, f64) {
        let height = distances.get(i, j) / 2.0;
        let li = height - distances.cluster(i).height;
        let lj = height - distances.cluster(j).height;

        (li.max(0.0), lj.max(0.0))
    }

    fn updated_distance(&self, distances: &ClusterDistances, i: usize, j: usize, k: usize) -> f64 {
        let si = distances.cluster(i).size as f64;
        let sj = distances.cluster(j).size as f64;

        (si * distances.get(k, i) + sj * distances.get(k, j)) / (si + sj)
    }
}
