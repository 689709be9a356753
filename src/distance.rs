//! Compute and manipulate phylogenetic distance matrices
//!

use std::{collections::HashMap, fs, path::Path};

use clap::ValueEnum;
use itertools::Itertools;
use log::{debug, info, warn};
use thiserror::Error;

use crate::progress::Progress;
use crate::states::{canonical_state_count, guess_sequence_type, state, SequenceType};

/// Errors that can occur when building, reading and writing [`DistanceMatrix`] structs.
#[derive(Error, Debug)]
pub enum MatrixError {
    /// Two taxa of the matrix have the same name
    #[error("Taxon {0} appears more than once in the matrix.")]
    DuplicateTaxon(String),
    /// The rows given to build the matrix do not form a square
    #[error("Expected {expected} values in row {row} but found {found}.")]
    NotSquare {
        /// Row with the wrong number of values (the number of rows itself
        /// when it does not match the number of taxa)
        row: usize,
        /// Number of taxa
        expected: usize,
        /// Number of values found
        found: usize,
    },
    /// A taxon has a non zero distance to itself
    #[error("Distance between taxon {0} and itself is not zero.")]
    NonZeroDiagonal(usize),
    /// `d(i, j)` and `d(j, i)` differ
    #[error("Non symmetric matrix: distances between {0} and {1} differ.")]
    NonSymmetric(usize, usize),
    /// A distance is below zero
    #[error("Negative distance {2} between {0} and {1}.")]
    NegativeDistance(usize, usize, f64),
    /// We are trying to access a taxon that does not exist
    #[error("Missing taxon {0}")]
    MissingTaxon(String),
    /// We are trying to access a row that does not exist
    #[error("Index {index} is out of bounds for a matrix of size {size}")]
    OutOfBounds {
        /// The faulty index
        index: usize,
        /// Size of the distance matrix
        size: usize,
    },
    /// Sequences given to compute distances are not all the same length
    #[error("Sequence {taxon} has length {found}, expected {expected}: sequences must be aligned.")]
    Unaligned {
        /// Name of the offending sequence
        taxon: String,
        /// Length of the first sequence
        expected: usize,
        /// Length of the offending sequence
        found: usize,
    },
    /// The distance between two sequences can not be estimated
    #[error("Cannot compute the distance between {0} and {1}.")]
    CannotComputeDistance(String, String),
    /// There was an [`std::io::Error`] when writing the matrix to a phylip file
    #[error("Error writing file")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur when parsing phylip distance matrix or fasta files.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The phylip file is empty
    #[error("Matrix file is empty.")]
    EmptyMatrixFile,
    /// There was a [`std::num::ParseIntError`] when reading the number of taxa
    #[error("Could not parse size from file.")]
    SizeParseError(#[from] std::num::ParseIntError),
    /// One of the matrix rows is empty
    #[error("Row {0} is empty.")]
    EmptyRow(usize),
    /// There was an error when reading a distance.
    #[error("Could not parse distance '{0}' from file.")]
    DistParseError(String),
    /// There is a missing distance from one of the matrix rows
    #[error("Missing distance from matrix row {0}")]
    MissingDistance(usize),
    /// The size of the matrix and the number of rows do not match
    #[error("Size and number of rows do not match: {0} rows for size {1}")]
    SizeAndRowsMismatch(usize, usize),
    /// There was a [`MatrixError`] when create the distance matrix object
    #[error("Error creating matrix.")]
    MatrixError(#[from] MatrixError),
    /// The fasta file could not be parsed
    #[error("Error reading sequences")]
    FastaError(#[from] needletail::errors::ParseError),
    /// There was a [`std::io::Error`] when reading the phylip file
    #[error("Error reading file")]
    IoError(#[from] std::io::Error),
}

/// Position of pair `(i, j)`, `i < j`, in the row-major upper triangle of an `n x n` matrix
pub(crate) fn upper_triangle_index(n: usize, i: usize, j: usize) -> usize {
    ((2 * n - 3 - i) * i) / 2 + j - 1
}

/// A square, symmetric matrix of non negative distances between named taxa,
/// with a zero diagonal.
///
/// Taxa keep the order in which they were given; rows and columns are
/// addressed by that order.
/// ```
/// use phylonj::distance::DistanceMatrix;
///
/// let matrix = DistanceMatrix::from_rows(
///     vec!["A".into(), "B".into(), "C".into()],
///     vec![
///         vec![0.0, 2.0, 4.0],
///         vec![2.0, 0.0, 4.0],
///         vec![4.0, 4.0, 0.0],
///     ],
/// ).unwrap();
///
/// assert_eq!(matrix.size(), 3);
/// assert_eq!(matrix.get(0, 2), 4.0);
/// assert_eq!(matrix.get_by_name("C", "B").unwrap(), 4.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    /// Identifiers of the taxa
    taxa: Vec<String>,
    /// Position of each taxon
    index: HashMap<String, usize>,
    /// Upper triangle of the matrix, row by row
    matrix: Vec<f64>,
}

impl DistanceMatrix {
    /// Creates a matrix of zeros over the given taxa
    pub fn new(taxa: Vec<String>) -> Result<Self, MatrixError> {
        let mut index = HashMap::with_capacity(taxa.len());
        for (i, taxon) in taxa.iter().enumerate() {
            if index.insert(taxon.clone(), i).is_some() {
                return Err(MatrixError::DuplicateTaxon(taxon.clone()));
            }
        }

        let n = taxa.len();
        Ok(Self {
            taxa,
            index,
            matrix: vec![0.0; n * n.saturating_sub(1) / 2],
        })
    }

    /// Builds a matrix from complete rows, checking that they form a valid
    /// distance matrix. NaN and infinite values are accepted as is.
    pub fn from_rows(taxa: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let mut matrix = Self::new(taxa)?;
        let n = matrix.size();

        if rows.len() != n {
            return Err(MatrixError::NotSquare {
                row: rows.len(),
                expected: n,
                found: rows.len(),
            });
        }
        if let Some((row, values)) = rows.iter().find_position(|r| r.len() != n) {
            return Err(MatrixError::NotSquare {
                row,
                expected: n,
                found: values.len(),
            });
        }

        for i in 0..n {
            if rows[i][i] != 0.0 {
                return Err(MatrixError::NonZeroDiagonal(i));
            }
            for j in (i + 1)..n {
                let (upper, lower) = (rows[i][j], rows[j][i]);
                let same = upper == lower || (upper.is_nan() && lower.is_nan());
                if !same {
                    return Err(MatrixError::NonSymmetric(i, j));
                }
                matrix.set(i, j, upper)?;
            }
        }

        Ok(matrix)
    }

    /// Number of taxa in the matrix
    pub fn size(&self) -> usize {
        self.taxa.len()
    }

    /// Names of the taxa, in row order
    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    /// Row of a taxon
    pub fn index_of(&self, taxon: &str) -> Result<usize, MatrixError> {
        self.index
            .get(taxon)
            .copied()
            .ok_or_else(|| MatrixError::MissingTaxon(taxon.to_owned()))
    }

    /// Distance between the taxa of rows `i` and `j`.
    ///
    /// # Panics
    /// If `i` or `j` is not below [`DistanceMatrix::size`].
    pub fn get(&self, i: usize, j: usize) -> f64 {
        let n = self.size();
        assert!(i < n && j < n, "index out of bounds for matrix of size {n}");
        match i.cmp(&j) {
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Less => self.matrix[upper_triangle_index(n, i, j)],
            std::cmp::Ordering::Greater => self.matrix[upper_triangle_index(n, j, i)],
        }
    }

    /// Sets the distance between the taxa of rows `i` and `j`, in both halves
    /// of the matrix.
    pub fn set(&mut self, i: usize, j: usize, distance: f64) -> Result<(), MatrixError> {
        let n = self.size();
        if let Some(&index) = [i, j].iter().find(|&&idx| idx >= n) {
            return Err(MatrixError::OutOfBounds { index, size: n });
        }
        if distance < 0.0 {
            return Err(MatrixError::NegativeDistance(i, j, distance));
        }

        match i.cmp(&j) {
            std::cmp::Ordering::Equal if distance != 0.0 => Err(MatrixError::NonZeroDiagonal(i)),
            std::cmp::Ordering::Equal => Ok(()),
            std::cmp::Ordering::Less => {
                self.matrix[upper_triangle_index(n, i, j)] = distance;
                Ok(())
            }
            std::cmp::Ordering::Greater => {
                self.matrix[upper_triangle_index(n, j, i)] = distance;
                Ok(())
            }
        }
    }

    /// Distance between two taxa given by name
    pub fn get_by_name(&self, taxon1: &str, taxon2: &str) -> Result<f64, MatrixError> {
        Ok(self.get(self.index_of(taxon1)?, self.index_of(taxon2)?))
    }

    /// Sets the distance between two taxa given by name
    pub fn set_by_name(&mut self, taxon1: &str, taxon2: &str, distance: f64) -> Result<(), MatrixError> {
        let (i, j) = (self.index_of(taxon1)?, self.index_of(taxon2)?);
        self.set(i, j, distance)
    }

    /// A full row of the matrix
    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.size()).map(|j| self.get(i, j)).collect()
    }

    /// Returns a string representing the distance matrix in square format
    fn to_phylip_square(&self) -> String {
        let mut output = format!("{}\n", self.size());

        for (i, name) in self.taxa.iter().enumerate() {
            output += &format!("{name}  ");
            for j in 0..self.size() {
                output += &format!("  {}", self.get(i, j));
            }
            output += "\n"
        }

        output
    }

    /// Returns a string representing the distance matrix in (lower) triangle format
    fn to_phylip_triangle(&self) -> String {
        let mut output = format!("{}\n", self.size());

        for (i, name) in self.taxa.iter().enumerate() {
            output += &format!("{name}  ");
            for j in 0..i {
                output += &format!("  {}", self.get(i, j));
            }
            output += "\n"
        }

        output
    }

    /// Outputs the matrix as a phylip formatted string
    pub fn to_phylip(&self, square: bool) -> Result<String, MatrixError> {
        if square {
            Ok(self.to_phylip_square())
        } else {
            Ok(self.to_phylip_triangle())
        }
    }

    /// Writes the matrix to a phylip file
    pub fn to_file(&self, path: &Path, square: bool) -> Result<(), MatrixError> {
        match fs::write(path, self.to_phylip(square)?) {
            Ok(_) => Ok(()),
            Err(e) => Err(MatrixError::IoError(e)),
        }
    }

    /// Build a distance matrix from a phylip formatted string. Square
    /// matrices must be symmetric, triangle matrices give the lower half.
    pub fn from_phylip(phylip: &str, square: bool) -> Result<Self, ParseError> {
        let mut lines = phylip.lines().filter(|l| !l.trim().is_empty());
        let size: usize = lines
            .next()
            .ok_or(ParseError::EmptyMatrixFile)?
            .trim()
            .parse()?;

        let mut names = vec![];
        let mut rows = vec![];

        for (i, line) in lines.enumerate() {
            let mut fields = line.split_whitespace();
            let name = fields.next().ok_or(ParseError::EmptyRow(i))?;
            let dists = fields
                .map(|d| d.parse::<f64>().map_err(|_| ParseError::DistParseError(d.into())))
                .collect::<Result<Vec<_>, _>>()?;

            if square && dists.len() != size || !square && dists.len() != i {
                return Err(ParseError::MissingDistance(i + 1));
            }

            names.push(name.to_owned());
            rows.push(dists);
        }

        if names.len() != size {
            return Err(ParseError::SizeAndRowsMismatch(names.len(), size));
        }

        if square {
            return Ok(Self::from_rows(names, rows)?);
        }

        let mut matrix = Self::new(names)?;
        for (i, row) in rows.into_iter().enumerate() {
            for (j, dist) in row.into_iter().enumerate() {
                matrix.set(i, j, dist)?;
            }
        }

        Ok(matrix)
    }

    /// Reads the matrix from a phylip file
    pub fn from_file(path: &Path, square: bool) -> Result<Self, ParseError> {
        let phylip = fs::read_to_string(path)?;
        Self::from_phylip(&phylip, square)
    }
}

// ######################
// # SEQUENCE DISTANCES #
// ######################

/// Evolutionary models used to turn sequence differences into distances
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum DistanceModel {
    /// Proportion of differing sites, uncorrected
    #[value(name = "p")]
    PDistance,
    /// [Jukes-Cantor](https://en.wikipedia.org/wiki/Models_of_DNA_evolution#JC69_model_(Jukes_and_Cantor_1969))
    /// correction: $d = -b \ln(1 - p/b)$ with $b = (k-1)/k$ for an alphabet of $k$ residues
    #[value(name = "jc")]
    JukesCantor,
}

/// Options of the sequence distance computation
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceOptions {
    /// Use twice the largest computable distance for pairs of sequences
    /// whose distance can not be estimated, instead of failing
    pub fallback_to_twice_max: bool,
}

/// A named, aligned sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    /// Name of the sequence
    pub id: String,
    /// Residues, one byte per site
    pub residues: Vec<u8>,
}

impl SequenceRecord {
    /// Creates a new record
    pub fn new(id: &str, residues: &[u8]) -> Self {
        Self {
            id: id.to_owned(),
            residues: residues.to_vec(),
        }
    }
}

/// Reads the records of a fasta (or fastq) file
pub fn read_fasta(path: &Path) -> Result<Vec<SequenceRecord>, ParseError> {
    let mut reader = needletail::parse_fastx_file(path)?;
    let mut records = vec![];
    while let Some(record) = reader.next() {
        let record = record?;
        let id = String::from_utf8_lossy(record.id());
        // keep the identifier, drop the description
        let id = id.split_whitespace().next().unwrap_or_default();
        records.push(SequenceRecord {
            id: id.to_owned(),
            residues: record.seq().to_vec(),
        });
    }
    debug!("Read {} sequences from {path:?}", records.len());

    Ok(records)
}

/// Number of differences and of comparable sites between two sequences.
/// Sites where either residue is not canonical are skipped.
fn count_differences(sequence_type: SequenceType, s1: &[u8], s2: &[u8]) -> (usize, usize) {
    let mut differences = 0;
    let mut sites = 0;
    for (&c1, &c2) in s1.iter().zip(s2) {
        let (Some(r1), Some(r2)) = (state(sequence_type, c1), state(sequence_type, c2)) else {
            continue;
        };
        if r1.is_canonical() && r2.is_canonical() {
            sites += 1;
            if r1.index != r2.index {
                differences += 1;
            }
        }
    }
    (differences, sites)
}

/// Distance under a model, `None` when it can not be estimated
fn pairwise_distance(
    model: DistanceModel,
    sequence_type: SequenceType,
    s1: &[u8],
    s2: &[u8],
) -> Option<f64> {
    let (differences, sites) = count_differences(sequence_type, s1, s2);
    if sites == 0 {
        return None;
    }
    let p = differences as f64 / sites as f64;

    match model {
        DistanceModel::PDistance => Some(p),
        DistanceModel::JukesCantor => {
            let k = canonical_state_count(sequence_type) as f64;
            let b = (k - 1.0) / k;
            if p >= b {
                None
            } else {
                // -0.0 for identical sequences
                Some((-b * (1.0 - p / b).ln()).max(0.0))
            }
        }
    }
}

impl DistanceMatrix {
    /// Computes pairwise distances between aligned sequences.
    ///
    /// Whether the sequences are nucleotides or amino acids is guessed from
    /// their residues. Progress is reported once per row; `Ok(None)` is
    /// returned if `ctx` is cancelled.
    /// ```
    /// use phylonj::distance::{DistanceMatrix, DistanceModel, DistanceOptions, SequenceRecord};
    /// use phylonj::progress::NoProgress;
    ///
    /// let records = vec![
    ///     SequenceRecord::new("A", b"ACGTACGTAC"),
    ///     SequenceRecord::new("B", b"ACGTACGTAA"),
    ///     SequenceRecord::new("C", b"ACG-ACGTTT"),
    /// ];
    /// let matrix = DistanceMatrix::from_sequences(
    ///     &records,
    ///     DistanceModel::PDistance,
    ///     DistanceOptions::default(),
    ///     &NoProgress,
    /// ).unwrap().unwrap();
    ///
    /// assert_eq!(matrix.get_by_name("A", "B").unwrap(), 0.1);
    /// // the gap is skipped: 2 differences over 9 sites
    /// assert_eq!(matrix.get_by_name("A", "C").unwrap(), 2.0 / 9.0);
    /// ```
    pub fn from_sequences(
        records: &[SequenceRecord],
        model: DistanceModel,
        options: DistanceOptions,
        ctx: &dyn Progress,
    ) -> Result<Option<Self>, MatrixError> {
        let mut matrix = Self::new(records.iter().map(|r| r.id.clone()).collect())?;
        if let Some(first) = records.first() {
            let expected = first.residues.len();
            if let Some(record) = records.iter().find(|r| r.residues.len() != expected) {
                return Err(MatrixError::Unaligned {
                    taxon: record.id.clone(),
                    expected,
                    found: record.residues.len(),
                });
            }
        }

        let sequence_type = guess_sequence_type(records.iter().map(|r| r.residues.as_slice()));
        info!(
            "Computing {model:?} distances between {} {sequence_type:?} sequences",
            records.len()
        );

        let n = records.len();
        let mut missing = vec![];
        let mut max: Option<f64> = None;
        for i in 0..n {
            if ctx.is_cancelled() {
                info!("Distance computation cancelled");
                return Ok(None);
            }
            for j in (i + 1)..n {
                let (s1, s2) = (&records[i].residues, &records[j].residues);
                match pairwise_distance(model, sequence_type, s1, s2) {
                    Some(d) => {
                        matrix.set(i, j, d)?;
                        max = Some(max.map_or(d, |m| m.max(d)));
                    }
                    None if options.fallback_to_twice_max => missing.push((i, j)),
                    None => {
                        return Err(MatrixError::CannotComputeDistance(
                            records[i].id.clone(),
                            records[j].id.clone(),
                        ))
                    }
                }
            }
            ctx.report_progress((i + 1) as f64 / n as f64);
        }

        if let Some(&(i, j)) = missing.first() {
            let Some(max) = max else {
                return Err(MatrixError::CannotComputeDistance(
                    records[i].id.clone(),
                    records[j].id.clone(),
                ));
            };
            warn!(
                "{} pairs of sequences have no computable distance, using {}",
                missing.len(),
                2.0 * max
            );
            for (i, j) in missing {
                matrix.set(i, j, 2.0 * max)?;
            }
        }

        Ok(Some(matrix))
    }
}
