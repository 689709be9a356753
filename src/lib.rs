#![warn(missing_docs)]

//! Build phylogenetic trees from distances with neighbor joining or UPGMA.
//!
//! The [`distance`] module holds the [`DistanceMatrix`](distance::DistanceMatrix)
//! that tree builders consume, read from PHYLIP files or computed from aligned
//! sequences. The [`builder`] module clusters the matrix into a tree, and the
//! [`tree`] module holds the rooted and unrooted tree models, along with the
//! algorithms that root an unrooted tree.
//!
//! ```
//! use phylonj::builder::{build_tree, Method};
//! use phylonj::distance::DistanceMatrix;
//! use phylonj::progress::NoProgress;
//! use phylonj::tree::root_the_tree;
//!
//! let matrix = DistanceMatrix::from_phylip(
//!     "4
//! A  0  2  4  4
//! B  2  0  4  4
//! C  4  4  0  2
//! D  4  4  2  0",
//!     true,
//! )
//! .unwrap();
//!
//! let tree = build_tree(&matrix, Method::NeighborJoining, &NoProgress)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(tree.n_leaves(), 4);
//!
//! let rooted = root_the_tree(tree).unwrap();
//! assert_eq!(rooted.to_unique_newick().unwrap(), "(B:1,A:1,(D:1,C:1):2);");
//! ```

pub mod builder;
pub mod distance;
pub mod progress;
pub mod simulate;
pub mod states;
pub mod tree;
