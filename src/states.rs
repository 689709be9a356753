//! Residue lookup tables for nucleotide and amino acid sequences.
//!
//! The tables are built once, on first use, and never modified afterwards.
//! Lookups are case insensitive.

use lazy_static::lazy_static;

/// Canonical nucleotides, in index order
pub static NUCLEOTIDES: &[u8] = b"ACGT";
/// IUPAC nucleotide ambiguity codes
pub static AMB_NUCLEOTIDES: &[u8] = b"RYMKSWHBVDN?";
/// Canonical amino acids, in index order
pub static AMINOACIDS: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";
/// Amino acid ambiguity codes
pub static AMB_AMINOACIDS: &[u8] = b"BZJX?";
/// Gap characters shared by both alphabets
pub static GAPS: &[u8] = b"-.";
/// Amino acid equivalent of a stop codon
pub static STOP: u8 = b'*';

/// Kinds of sequences handled by the distance computations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceType {
    /// DNA or RNA
    Nucleotide,
    /// Protein
    AminoAcid,
}

/// What a residue code stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    /// A single, well defined residue
    Canonical,
    /// A set of possible residues
    Ambiguous,
    /// An alignment gap
    Gap,
    /// A stop codon
    Stop,
}

/// A residue as read from a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct State {
    /// Upper case code of the residue
    pub code: u8,
    /// Position among the states of the alphabet: canonical states come
    /// first, so their index is below [`canonical_state_count`]
    pub index: usize,
    /// Kind of residue
    pub kind: StateKind,
}

impl State {
    /// Checks if the state can be compared with another canonical state
    pub fn is_canonical(&self) -> bool {
        self.kind == StateKind::Canonical
    }
}

type StateTable = [Option<State>; 256];

fn build_table(groups: &[(&[u8], StateKind)]) -> StateTable {
    let mut table = [None; 256];
    let mut index = 0;
    for (codes, kind) in groups {
        for &code in codes.iter() {
            let state = State {
                code,
                index,
                kind: *kind,
            };
            table[code as usize] = Some(state);
            table[code.to_ascii_lowercase() as usize] = Some(state);
            index += 1;
        }
    }
    table
}

lazy_static! {
    static ref NUCLEOTIDE_STATES: StateTable = {
        let mut table = build_table(&[
            (NUCLEOTIDES, StateKind::Canonical),
            (AMB_NUCLEOTIDES, StateKind::Ambiguous),
            (GAPS, StateKind::Gap),
        ]);
        // RNA
        table[b'U' as usize] = table[b'T' as usize];
        table[b'u' as usize] = table[b'T' as usize];
        table
    };
    static ref AMINOACID_STATES: StateTable = build_table(&[
        (AMINOACIDS, StateKind::Canonical),
        (AMB_AMINOACIDS, StateKind::Ambiguous),
        (&[STOP], StateKind::Stop),
        (GAPS, StateKind::Gap),
    ]);
}

/// Looks up a nucleotide code, `None` if the byte is not a nucleotide.
/// ```
/// use phylonj::states::{nucleotide_state, StateKind};
///
/// let state = nucleotide_state(b'g').unwrap();
/// assert_eq!((state.code, state.index, state.kind), (b'G', 2, StateKind::Canonical));
///
/// assert_eq!(nucleotide_state(b'N').unwrap().kind, StateKind::Ambiguous);
/// assert!(nucleotide_state(b'E').is_none());
/// ```
pub fn nucleotide_state(code: u8) -> Option<State> {
    NUCLEOTIDE_STATES[code as usize]
}

/// Looks up an amino acid code, `None` if the byte is not an amino acid.
pub fn amino_acid_state(code: u8) -> Option<State> {
    AMINOACID_STATES[code as usize]
}

/// Looks up a residue in the alphabet of a sequence type
pub fn state(sequence_type: SequenceType, code: u8) -> Option<State> {
    match sequence_type {
        SequenceType::Nucleotide => nucleotide_state(code),
        SequenceType::AminoAcid => amino_acid_state(code),
    }
}

/// Number of non-ambiguous residues of an alphabet
pub fn canonical_state_count(sequence_type: SequenceType) -> usize {
    match sequence_type {
        SequenceType::Nucleotide => NUCLEOTIDES.len(),
        SequenceType::AminoAcid => AMINOACIDS.len(),
    }
}

/// Guesses whether sequences are nucleotides or amino acids: they are
/// nucleotides when every residue of every sequence is a nucleotide code.
/// ```
/// use phylonj::states::{guess_sequence_type, SequenceType};
///
/// assert_eq!(guess_sequence_type([b"ACGT-N".as_slice(), b"acgu".as_slice()]), SequenceType::Nucleotide);
/// assert_eq!(guess_sequence_type([b"ACGT".as_slice(), b"MKVL".as_slice()]), SequenceType::AminoAcid);
/// ```
pub fn guess_sequence_type<'a>(sequences: impl IntoIterator<Item = &'a [u8]>) -> SequenceType {
    for sequence in sequences {
        if sequence.iter().any(|&c| nucleotide_state(c).is_none()) {
            return SequenceType::AminoAcid;
        }
    }
    SequenceType::Nucleotide
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_states_come_first() {
        for sequence_type in [SequenceType::Nucleotide, SequenceType::AminoAcid] {
            let n = canonical_state_count(sequence_type);
            for code in 0..=255u8 {
                if let Some(s) = state(sequence_type, code) {
                    assert_eq!(s.is_canonical(), s.index < n, "{}", code as char);
                    assert!(s.code.is_ascii_uppercase() || !s.code.is_ascii_alphabetic());
                }
            }
        }
    }

    #[test]
    fn rna_is_read_as_dna() {
        assert_eq!(nucleotide_state(b'u'), nucleotide_state(b'T'));
    }

    #[test]
    fn amino_acids() {
        let w = amino_acid_state(b'W').unwrap();
        assert_eq!(w.index, 18);
        assert!(w.is_canonical());

        assert_eq!(amino_acid_state(b'*').unwrap().kind, StateKind::Stop);
        assert_eq!(amino_acid_state(b'-').unwrap().kind, StateKind::Gap);
        assert_eq!(amino_acid_state(b'x').unwrap().kind, StateKind::Ambiguous);
        assert!(amino_acid_state(b'1').is_none());
        assert_eq!(canonical_state_count(SequenceType::AminoAcid), 20);
    }

    #[test]
    fn gaps() {
        for code in [b'-', b'.'] {
            assert_eq!(nucleotide_state(code).unwrap().kind, StateKind::Gap);
        }
    }

    #[test]
    fn guess_empty() {
        assert_eq!(
            guess_sequence_type(std::iter::empty::<&[u8]>()),
            SequenceType::Nucleotide
        );
    }
}
