use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

use phylonj::{builder::Method, distance::DistanceModel, simulate::Distr};

/// Build phylogenetic trees from distance matrices or aligned sequences
#[derive(Parser, Debug)]
#[command(version)]
pub struct Args {
    /// Increase the log level (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    /// The command to execute
    pub command: Commands,
}

/// Shapes of simulated trees
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Shape {
    /// Random binary tree
    Random,
    /// Each internal node has a tip as a child
    Caterpillar,
    /// Constant size coalescent, all tips sampled at the present
    Coalescent,
}

/// The available commands in the `phylonj` tool
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a tree from a PHYLIP distance matrix
    Build {
        /// The distance matrix
        matrix: PathBuf,
        /// Tree building method
        #[arg(value_enum, short, long, default_value_t = Method::NeighborJoining)]
        method: Method,
        /// Read a lower triangle matrix instead of a square one
        #[arg(short, long)]
        triangle: bool,
        /// Root the tree before writing it
        #[arg(short, long)]
        root: bool,
        /// File to save the newick tree to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a tree from aligned sequences in a FASTA file
    Align {
        /// The FASTA alignment
        sequences: PathBuf,
        /// Distance model
        #[arg(value_enum, long, default_value_t = DistanceModel::JukesCantor)]
        model: DistanceModel,
        /// Tree building method
        #[arg(value_enum, short, long, default_value_t = Method::NeighborJoining)]
        method: Method,
        /// Use twice the largest distance for pairs of sequences too divergent
        /// to have a distance
        #[arg(long)]
        twice_max: bool,
        /// Root the tree before writing it
        #[arg(short, long)]
        root: bool,
        /// File to save the newick tree to
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// File to save the distance matrix to
        #[arg(long)]
        save_matrix: Option<PathBuf>,
    },

    /// Root a newick tree
    ///
    /// Trees with a bifurcating root are left as is. Others are rooted at
    /// their only degree 2 node if there is one, and next to their center
    /// otherwise.
    #[clap(verbatim_doc_comment)]
    Root {
        /// The phylogenetic tree
        tree: PathBuf,
        /// File to save the tree to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Output the distance matrix of aligned sequences
    Matrix {
        /// The FASTA alignment
        sequences: PathBuf,
        /// Distance model
        #[arg(value_enum, long, default_value_t = DistanceModel::JukesCantor)]
        model: DistanceModel,
        /// Use twice the largest distance for pairs of sequences too divergent
        /// to have a distance
        #[arg(long)]
        twice_max: bool,
        /// Output a square matrix instead of a triangular one
        #[arg(short, long)]
        square: bool,
        /// File to save the matrix to
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate random tree(s)
    Simulate {
        /// Number of tips in the generated tree
        #[arg(short, long, default_value_t = 20)]
        tips: usize,
        /// Shape of the tree
        #[arg(value_enum, long, default_value_t = Shape::Random)]
        shape: Shape,
        /// Generate branch lengths (always on for coalescent trees)
        #[arg(short, long)]
        branch_lengths: bool,
        /// Distribution of branch lengths
        #[arg(value_enum, short, long, default_value_t = Distr::Uniform)]
        distribution: Distr,
        /// Population size of the coalescent
        #[arg(short, long, default_value_t = 1.0)]
        population_size: f64,
        /// Number of trees to generate
        #[arg(short = 'n', long)]
        trees: Option<usize>,
        /// Output file (directory if generating multiple trees)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Draw a newick tree in the terminal
    Print {
        /// The phylogenetic tree
        tree: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        shell: Shell,
    },
}
