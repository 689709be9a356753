#![warn(missing_docs)]
//! The `phylonj` binary is a command line tool, using the [`phylonj`] crate.
//! It builds, roots and simulates phylogenetic trees directly in the terminal.

use clap::{CommandFactory, Parser};
use clap_complete::generate;
use ftail::Ftail;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter};
use phylonj::{
    builder::{build_from_sequences, build_tree},
    distance::{read_fasta, DistanceMatrix, DistanceOptions},
    progress::BAR_LENGTH,
    simulate::{generate_caterpillar, generate_tree, CoalescentSimulator, Distr},
    tree::{root_the_tree, PhyloTree, Tree},
};
use std::{fs, io, path::Path};

/// contains the struct representing the command line arguments
/// parsed by [`clap`] and used to execute this binary
pub mod cli;

use cli::{Commands, Shape};

type Error = Box<dyn std::error::Error>;
type Result<T> = std::result::Result<T, Error>;

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Ftail::new()
        .console(level)
        .init()
        .map_err(|e| format!("could not set up logging: {e:?}"))?;
    Ok(())
}

fn progress_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::new(BAR_LENGTH);
    bar.set_style(ProgressStyle::with_template(
        "[{elapsed_precise}] {wide_bar} {percent}%",
    )?);
    Ok(bar)
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, format!("{content}\n"))?,
        None => println!("{content}"),
    }
    Ok(())
}

fn write_tree(tree: PhyloTree, root: bool, output: Option<&Path>) -> Result<()> {
    let newick = if root {
        root_the_tree(tree)?.to_newick()?
    } else {
        tree.to_newick()?
    };
    write_output(&newick, output)
}

fn simulate(
    shape: Shape,
    tips: usize,
    brlens: bool,
    distr: Distr,
    population_size: f64,
) -> Result<Tree> {
    let tree = match shape {
        Shape::Random => generate_tree(tips, brlens, distr)?,
        Shape::Caterpillar => generate_caterpillar(tips, brlens, distr)?,
        Shape::Coalescent => CoalescentSimulator::new(population_size).simulate(&vec![0.0; tips])?,
    };
    Ok(tree)
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Build {
            matrix,
            method,
            triangle,
            root,
            output,
        } => {
            let matrix = DistanceMatrix::from_file(&matrix, !triangle)?;
            info!("Read a matrix of {} taxa", matrix.size());
            let bar = progress_bar()?;
            let tree = build_tree(&matrix, method, &bar)?.ok_or("tree building was cancelled")?;
            bar.finish_and_clear();
            write_tree(tree, root, output.as_deref())
        }
        Commands::Align {
            sequences,
            model,
            method,
            twice_max,
            root,
            output,
            save_matrix,
        } => {
            let records = read_fasta(&sequences)?;
            let options = DistanceOptions {
                fallback_to_twice_max: twice_max,
            };
            let bar = progress_bar()?;
            let (tree, matrix) = build_from_sequences(&records, model, options, method, &bar)?
                .ok_or("tree building was cancelled")?;
            bar.finish_and_clear();
            if let Some(path) = save_matrix {
                matrix.to_file(&path, true)?;
            }
            write_tree(tree, root, output.as_deref())
        }
        Commands::Root { tree, output } => {
            let tree = Tree::from_file(&tree)?;
            let root = tree.get_root()?;
            let tree = if tree.get_children(&root)?.len() == 2 {
                PhyloTree::Rooted(tree)
            } else {
                PhyloTree::Unrooted(tree.to_unrooted()?)
            };
            write_tree(tree, true, output.as_deref())
        }
        Commands::Matrix {
            sequences,
            model,
            twice_max,
            square,
            output,
        } => {
            let records = read_fasta(&sequences)?;
            let options = DistanceOptions {
                fallback_to_twice_max: twice_max,
            };
            let bar = progress_bar()?;
            let matrix = DistanceMatrix::from_sequences(&records, model, options, &bar)?
                .ok_or("distance computation was cancelled")?;
            bar.finish_and_clear();
            match output {
                Some(path) => matrix.to_file(&path, square)?,
                None => println!("{}", matrix.to_phylip(square)?),
            }
            Ok(())
        }
        Commands::Simulate {
            tips,
            shape,
            branch_lengths,
            distribution,
            population_size,
            trees,
            output,
        } => {
            let draw = || simulate(shape, tips, branch_lengths, distribution, population_size);
            if let Some(ntrees) = trees {
                let output = output
                    .ok_or("an output directory is needed to generate multiple trees")?;
                fs::create_dir_all(&output)?;
                for i in 1..=ntrees {
                    let path = output.join(format!("{i}_{tips}_tips.nwk"));
                    draw()?.to_file(&path)?;
                }
            } else {
                let tree = draw()?;
                write_output(&tree.to_newick()?, output.as_deref())?;
            }
            Ok(())
        }
        Commands::Print { tree } => {
            Tree::from_file(&tree)?.print()?;
            Ok(())
        }
        Commands::Completions { shell } => {
            let mut cmd = cli::Args::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_logging(args.verbose)?;
    run(args.command)
}
