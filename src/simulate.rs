//! Simulate random trees, to test and benchmark tree building.
//!
//! [`generate_tree`] and [`generate_caterpillar`] give random topologies with
//! branch lengths drawn from a [`Distr`]. [`CoalescentSimulator`] gives trees
//! whose node heights follow a constant size coalescent process, with tips
//! possibly sampled at different times.

use std::collections::VecDeque;
use std::fmt::{Debug, Display};

use clap::ValueEnum;
use log::{debug, trace};
use num_traits::{Float, Zero};
use numeric_literals::replace_numeric_literals;
use rand::prelude::*;
use rand_distr::{uniform::SampleUniform, Distribution, Exp, Gamma, Uniform};
use thiserror::Error;
use trait_set::trait_set;

use crate::tree::{NodeId, Tree, TreeError};

/// Errors that can occur when simulating trees
#[derive(Error, Debug)]
pub enum SimulationError {
    /// A tree needs at least one tip
    #[error("Cannot simulate a tree without tips.")]
    NoTips,
    /// The coalescent needs a positive population size
    #[error("Population size must be positive, not {0}.")]
    InvalidPopulationSize(f64),
    /// Sampling heights must be finite
    #[error("Invalid sampling height {0}.")]
    InvalidHeight(f64),
    /// A branch length distribution could not be set up
    #[error("Invalid branch length distribution: {0}")]
    InvalidDistribution(String),
    /// The simulated tree could not be built
    #[error("Could not build the tree")]
    Tree(#[from] TreeError),
}

trait_set! {
    /// Trait describing objects that can be used as branch lengths
    /// in simulated trees.
    pub trait BranchLength = Debug + Display + Float + Zero + SampleUniform;
}

/// Available branch length distributions
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Distr {
    /// A [uniform](https://en.wikipedia.org/wiki/Continuous_uniform_distribution)
    /// distribution over $[0.002, 1.0)$
    Uniform,
    /// An [exponential](https://en.wikipedia.org/wiki/Exponential_distribution)
    /// distribution with rate $\lambda=0.15$
    Exponential,
    /// A [gamma](https://en.wikipedia.org/wiki/Gamma_distribution) distribution
    /// with a shape $k=4$ and scale $\theta=1.0$.
    Gamma,
}

/// Draws branch lengths from a [`Distr`]
pub(crate) enum Sampler<T>
where
    T: BranchLength,
    rand_distr::StandardNormal: Distribution<T>,
    rand_distr::Exp1: Distribution<T>,
    rand_distr::Open01: Distribution<T>,
{
    Uniform(Uniform<T>),
    Exponential(Exp<T>),
    Gamma(Gamma<T>),
}

impl<T> Sampler<T>
where
    T: BranchLength,
    rand_distr::StandardNormal: Distribution<T>,
    rand_distr::Exp1: Distribution<T>,
    rand_distr::Open01: Distribution<T>,
{
    #[replace_numeric_literals(T::from(literal).unwrap())]
    pub(crate) fn new(distr: Distr) -> Result<Self, SimulationError> {
        let invalid = |e: &dyn Display| SimulationError::InvalidDistribution(e.to_string());
        Ok(match distr {
            Distr::Uniform => Self::Uniform(Uniform::new(0.002, 1.0)),
            Distr::Exponential => Self::Exponential(Exp::new(0.15).map_err(|e| invalid(&e))?),
            Distr::Gamma => Self::Gamma(Gamma::new(4.0, 1.0).map_err(|e| invalid(&e))?),
        })
    }
}

impl<T> Distribution<T> for Sampler<T>
where
    T: BranchLength,
    rand_distr::StandardNormal: Distribution<T>,
    rand_distr::Exp1: Distribution<T>,
    rand_distr::Open01: Distribution<T>,
{
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        match self {
            Sampler::Uniform(u) => u.sample(rng),
            Sampler::Exponential(e) => e.sample(rng),
            Sampler::Gamma(g) => g.sample(rng),
        }
    }
}

/// Joins two subtrees under a new node, drawing their branch lengths if needed
fn join(
    tree: &mut Tree,
    children: [NodeId; 2],
    sampler: Option<&Sampler<f64>>,
    rng: &mut impl Rng,
) -> Result<NodeId, TreeError> {
    let node = tree.create_internal_node(&children)?;
    if let Some(sampler) = sampler {
        for child in children {
            tree.set_length(&child, sampler.sample(rng))?;
        }
    }
    Ok(node)
}

/// Generates a random binary tree of a given size, with tips named `Tip_i`.
/// Subtrees are joined two by two, from either end of the list of available
/// subtrees.
/// ```
/// use phylonj::simulate::{generate_tree, Distr};
///
/// let tree = generate_tree(10, true, Distr::Gamma).unwrap();
/// assert_eq!(tree.n_leaves(), 10);
/// assert!(tree.is_binary().unwrap());
/// assert!(tree.has_lengths());
/// ```
pub fn generate_tree(n_leaves: usize, brlens: bool, distr: Distr) -> Result<Tree, SimulationError> {
    if n_leaves == 0 {
        return Err(SimulationError::NoTips);
    }
    let mut tree = Tree::new();
    let mut rng = thread_rng();
    let sampler = if brlens {
        Some(Sampler::new(distr)?)
    } else {
        None
    };

    let mut available = VecDeque::with_capacity(n_leaves);
    for i in 0..n_leaves {
        available.push_back(tree.create_external_node(&format!("Tip_{i}"))?);
    }

    while available.len() > 1 {
        let pair = if rng.gen_bool(0.5) {
            [available.pop_front(), available.pop_front()]
        } else {
            [available.pop_back(), available.pop_back()]
        };
        if let [Some(a), Some(b)] = pair {
            available.push_back(join(&mut tree, [a, b], sampler.as_ref(), &mut rng)?);
        }
    }
    debug!("Generated random tree with {n_leaves} tips");

    Ok(tree)
}

/// Generates a caterpillar tree: each internal node has a tip as one of its
/// children, tips are named `Tip_1` to `Tip_n`.
/// ```
/// use phylonj::simulate::{generate_caterpillar, Distr};
///
/// let tree = generate_caterpillar(5, false, Distr::Uniform).unwrap();
/// assert_eq!(tree.to_newick().unwrap(), "((((Tip_1,Tip_2),Tip_3),Tip_4),Tip_5);");
/// ```
pub fn generate_caterpillar(
    n_leaves: usize,
    brlens: bool,
    distr: Distr,
) -> Result<Tree, SimulationError> {
    if n_leaves == 0 {
        return Err(SimulationError::NoTips);
    }
    let mut tree = Tree::new();
    let mut rng = thread_rng();
    let sampler = if brlens {
        Some(Sampler::new(distr)?)
    } else {
        None
    };

    let mut spine = tree.create_external_node("Tip_1")?;
    for i in 2..=n_leaves {
        let tip = tree.create_external_node(&format!("Tip_{i}"))?;
        spine = join(&mut tree, [spine, tip], sampler.as_ref(), &mut rng)?;
    }

    Ok(tree)
}

/// Simulates trees backwards in time under a constant size coalescent.
///
/// Tips are added at their sampling heights. While $k$ lineages are
/// active, the waiting time until two of them merge is exponential with
/// rate $\binom{k}{2} / N$, and the two lineages are picked uniformly. Heights
/// are the primary representation of the simulated trees.
/// ```
/// use phylonj::simulate::CoalescentSimulator;
///
/// let simulator = CoalescentSimulator::new(10.0);
/// let tree = simulator.simulate(&[0.0, 0.0, 1.0, 2.5]).unwrap();
///
/// assert_eq!(tree.n_leaves(), 4);
/// let tip = tree.get_by_taxon("tip4").unwrap();
/// assert_eq!(tree.get_height(&tip).unwrap(), Some(2.5));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CoalescentSimulator {
    population_size: f64,
    median_heights: bool,
}

impl CoalescentSimulator {
    /// Creates a simulator for a population of the given (effective) size
    pub fn new(population_size: f64) -> Self {
        Self {
            population_size,
            median_heights: false,
        }
    }

    /// Uses the median of each waiting time instead of a random draw.
    /// Topologies are still random.
    pub fn with_median_heights(self) -> Self {
        Self {
            median_heights: true,
            ..self
        }
    }

    /// Waiting time until the next coalescence, from a uniform deviate in $(0, 1]$
    fn interval(&self, u: f64, lineages: usize) -> f64 {
        let pairs = (lineages * (lineages - 1)) as f64 / 2.0;
        -u.ln() * self.population_size / pairs
    }

    /// Simulates a tree with one tip per sampling height, tip `i` (from 1)
    /// being named `tip{i}`.
    pub fn simulate(&self, sampling_heights: &[f64]) -> Result<Tree, SimulationError> {
        self.simulate_with_rng(sampling_heights, &mut thread_rng())
    }

    /// Simulates a tree, drawing random numbers from `rng`
    pub fn simulate_with_rng<R: Rng>(
        &self,
        sampling_heights: &[f64],
        rng: &mut R,
    ) -> Result<Tree, SimulationError> {
        if !(self.population_size > 0.0) {
            return Err(SimulationError::InvalidPopulationSize(self.population_size));
        }
        if sampling_heights.is_empty() {
            return Err(SimulationError::NoTips);
        }
        if let Some(&h) = sampling_heights.iter().find(|h| !h.is_finite()) {
            return Err(SimulationError::InvalidHeight(h));
        }

        let mut tree = Tree::new();
        let mut tips = vec![];
        for (i, &height) in sampling_heights.iter().enumerate() {
            let tip = tree.create_external_node(&format!("tip{}", i + 1))?;
            tree.set_height(&tip, height)?;
            tree.set_attribute(&tip, "height", height)?;
            tips.push((tip, height));
        }
        // most recent samples first
        tips.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut active: Vec<NodeId> = vec![];
        let mut current = 0.0;
        let mut next = 0.0;
        let mut next_sample = 0;
        let mut more_samples = true;

        loop {
            // add at least 2 lineages, and all those sampled before the current height
            while more_samples && (active.len() < 2 || current >= next) {
                let (tip, height) = tips[next_sample];
                current = height;
                active.push(tip);
                next_sample += 1;
                match tips.get(next_sample) {
                    Some((_, height)) => next = *height,
                    None => more_samples = false,
                }
            }
            if active.len() < 2 {
                break;
            }

            let u = if self.median_heights {
                0.5
            } else {
                1.0 - rng.gen::<f64>()
            };
            current += self.interval(u, active.len());

            if !more_samples || current < next {
                let left = active.remove(rng.gen_range(0..active.len()));
                let right = active.remove(rng.gen_range(0..active.len()));
                let node = tree.create_internal_node(&[left, right])?;
                tree.set_height(&node, current)?;
                trace!("Coalescence of {left} and {right} at height {current}");
                active.push(node);
            }

            if !more_samples && active.len() == 1 {
                break;
            }
        }

        Ok(tree)
    }
}
