//! Substitution matrix loading: amino acid (BLOSUM62, optionally alphabet-reduced)
//! and nucleotide (match/mismatch) scoring, plus the 2-mer extended score matrix
//! shared read-only across workers.

use bio::scores::blosum62;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("I/O error reading matrix file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed matrix file: {0}")]
    Malformed(String),

    #[error("alphabet size {alphabet} with k-mer size {k} yields a lookup table of A^k = {power} entries, past the {limit}-entry memory guard")]
    AlphabetKmerOverflow {
        alphabet: usize,
        k: usize,
        power: u64,
        limit: u64,
    },

    #[error("max-seq-len {max_seq_len} does not fit in the u16 position encoding (must be < {limit})")]
    SeqLenOverflow { max_seq_len: usize, limit: u64 },

    #[error("reduced alphabet size {target} is not smaller than the source alphabet size {from}")]
    InvalidReduction { from: usize, target: usize },
}

pub type MatrixResult<T> = Result<T, MatrixError>;

/// Sanity ceiling on the lookup table's entry count (`A^k`, a `Vec<u16>`
/// length — this is a memory guard, not a correctness constraint: the
/// table can legitimately hold far more than `u16::MAX` entries, it's only
/// the position *values* stored in each entry that must fit in `u16`).
/// At 2 bytes/entry this caps the table at 1 GiB.
const LOOKUP_TABLE_ENTRY_LIMIT: u64 = 1 << 29;

/// Query/target sequences longer than this overflow the `u16`
/// sentinel-excluded position encoding stored in each lookup table entry.
const MAX_SEQ_LEN_LIMIT: u64 = u16::MAX as u64;

/// The 20 canonical amino acids in the order `bio::scores::blosum62` expects,
/// plus the ambiguity code `X` mapped to alphabet index 20.
const CANONICAL_AA: &[u8] = b"ARNDCQEGHILKMFPSTWYVX";

/// A substitution matrix: an `alphabet_size x alphabet_size` integer score
/// table addressed by residue code, plus the code<->letter mapping.
#[derive(Debug, Clone)]
pub struct SubstitutionMatrix {
    pub alphabet_size: usize,
    pub int2aa: Vec<char>,
    aa2int: [i16; 256],
    pub sub_matrix: Vec<Vec<i32>>,
    /// Karlin-Altschul lambda/K, used by the E-value computer. Defaults to
    /// BLOSUM62's published ungapped values when not otherwise known.
    pub lambda: f64,
    pub k_param: f64,
}

impl SubstitutionMatrix {
    fn build(int2aa: Vec<char>, sub_matrix: Vec<Vec<i32>>, lambda: f64, k_param: f64) -> Self {
        // Lowercase letters are left unmapped (aa2int stays -1) so soft-masked
        // residues fall outside the alphabet and are skipped as ambiguous,
        // per §4.1's edge case (sequence.rs's doc comment).
        let mut aa2int = [-1i16; 256];
        for (code, &ch) in int2aa.iter().enumerate() {
            aa2int[ch as usize] = code as i16;
        }
        Self {
            alphabet_size: int2aa.len(),
            int2aa,
            aa2int,
            sub_matrix,
            lambda,
            k_param,
        }
    }

    /// Map an ASCII residue letter to its integer code, or `None` if it falls
    /// outside the alphabet (the sequence view treats this as an ambiguous
    /// residue, per §4.1's edge case).
    pub fn aa2int(&self, letter: u8) -> Option<u8> {
        let v = self.aa2int[letter as usize];
        if v < 0 {
            None
        } else {
            Some(v as u8)
        }
    }

    /// Build the full 21-letter amino acid matrix. `matrix_file` overrides
    /// the built-in BLOSUM62 table (evaluated via `bio::scores::blosum62`)
    /// with a parsed custom matrix file.
    pub fn amino_acid(matrix_file: Option<&Path>) -> MatrixResult<Self> {
        match matrix_file {
            Some(path) => Self::parse_file(path),
            None => Ok(Self::builtin_blosum62()),
        }
    }

    fn builtin_blosum62() -> Self {
        let int2aa: Vec<char> = CANONICAL_AA.iter().map(|&b| b as char).collect();
        let n = int2aa.len();
        let mut sub_matrix = vec![vec![0i32; n]; n];
        for i in 0..n {
            for j in 0..n {
                sub_matrix[i][j] = blosum62(CANONICAL_AA[i], CANONICAL_AA[j]);
            }
        }
        Self::build(int2aa, sub_matrix, 0.267, 0.041)
    }

    fn parse_file(path: &Path) -> MatrixResult<Self> {
        let text = fs::read_to_string(path)?;
        let mut header: Option<Vec<char>> = None;
        let mut rows = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if header.is_none() {
                header = Some(line.split_whitespace().map(|tok| {
                    tok.chars().next().unwrap_or('X')
                }).collect());
                continue;
            }
            let mut fields = line.split_whitespace();
            let _row_label = fields.next();
            let row: Vec<i32> = fields
                .map(|tok| tok.parse::<i32>().map_err(|_| {
                    MatrixError::Malformed(format!("non-integer score {tok:?}"))
                }))
                .collect::<MatrixResult<Vec<i32>>>()?;
            rows.push(row);
        }
        let int2aa = header.ok_or_else(|| MatrixError::Malformed("missing header row".into()))?;
        if rows.len() != int2aa.len() || rows.iter().any(|r| r.len() != int2aa.len()) {
            return Err(MatrixError::Malformed("matrix is not square with the header".into()));
        }
        Ok(Self::build(int2aa, rows, 0.267, 0.041))
    }

    /// Simple nucleotide match/mismatch matrix (4 or 5-letter alphabet with
    /// ambiguity code `N`).
    pub fn nucleotide(match_score: i32, mismatch_score: i32) -> Self {
        let int2aa = vec!['A', 'C', 'G', 'T', 'N'];
        let n = int2aa.len();
        let mut sub_matrix = vec![vec![mismatch_score; n]; n];
        for i in 0..4 {
            sub_matrix[i][i] = match_score;
        }
        for i in 0..n {
            sub_matrix[4][i] = 0;
            sub_matrix[i][4] = 0;
        }
        Self::build(int2aa, sub_matrix, 1.0, 0.5)
    }

    /// Reduce the alphabet to `target_size` by merging amino acid groups
    /// (a simplified stand-in for the source engine's probability-weighted
    /// reducer: each merged group's pairwise score is the mean of its
    /// members' pairwise scores, rounded to the nearest integer).
    pub fn reduced(&self, target_size: usize) -> MatrixResult<Self> {
        if target_size >= self.alphabet_size {
            return Err(MatrixError::InvalidReduction {
                from: self.alphabet_size,
                target: target_size,
            });
        }
        let groups = Self::partition(self.alphabet_size, target_size);
        let mut int2aa = Vec::with_capacity(target_size);
        for group in &groups {
            int2aa.push(self.int2aa[group[0]]);
        }
        let mut sub_matrix = vec![vec![0i32; target_size]; target_size];
        for (gi, group_i) in groups.iter().enumerate() {
            for (gj, group_j) in groups.iter().enumerate() {
                let mut sum = 0i64;
                let mut count = 0i64;
                for &a in group_i {
                    for &b in group_j {
                        sum += self.sub_matrix[a][b] as i64;
                        count += 1;
                    }
                }
                sub_matrix[gi][gj] = ((sum as f64 / count as f64).round()) as i32;
            }
        }
        let mut reduced = Self::build(int2aa, sub_matrix, self.lambda, self.k_param);
        // `build` only maps each group's representative letter (the one
        // carried into `int2aa`). Alias every other original letter in the
        // group to the same merged code, so reduction actually merges
        // recognition rather than dropping the rest of the group's letters
        // out of the alphabet.
        for (gi, group) in groups.iter().enumerate() {
            for &member in group {
                let ch = self.int2aa[member];
                reduced.aa2int[ch as usize] = gi as i16;
            }
        }
        Ok(reduced)
    }

    /// Split `source` residue indices into `target` contiguous groups of as
    /// equal size as possible.
    fn partition(source: usize, target: usize) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); target];
        for i in 0..source {
            groups[i * target / source].push(i);
        }
        groups
    }
}

/// The 2-mer extended score matrix: precomputed sum-of-pairs scores for every
/// pair of 2-mers, shared read-only across workers. Kept for parity with the
/// source engine's `ExtendedSubstitutionMatrix`; the chaining algorithm in
/// this crate consumes k-mers directly rather than through a k-mer
/// generator, so this table is not on the current hot path.
pub struct ExtendedScoreMatrix {
    pub alphabet_size: usize,
    scores: Vec<i32>,
}

impl ExtendedScoreMatrix {
    pub fn build(mat: &SubstitutionMatrix) -> Self {
        let a = mat.alphabet_size;
        let mut scores = vec![0i32; a * a * a * a];
        for i0 in 0..a {
            for i1 in 0..a {
                for j0 in 0..a {
                    for j1 in 0..a {
                        let idx = ((i0 * a + i1) * a + j0) * a + j1;
                        scores[idx] = mat.sub_matrix[i0][j0] + mat.sub_matrix[i1][j1];
                    }
                }
            }
        }
        Self { alphabet_size: a, scores }
    }

    pub fn score(&self, i0: u8, i1: u8, j0: u8, j1: u8) -> i32 {
        let a = self.alphabet_size;
        let idx = ((i0 as usize * a + i1 as usize) * a + j0 as usize) * a + j1 as usize;
        self.scores[idx]
    }
}

/// Validate that the `A^k`-entry lookup table is representable without
/// blowing past a sane memory ceiling (§7(a)'s "incompatible alphabet/k
/// combination" config error). Returns the table size on success.
///
/// This is independent of sequence length: the table holds one `u16`
/// *position* per k-mer index, and the index domain itself (`A^k`) is not
/// constrained to 16 bits — only the positions stored in it are, which
/// `check_max_seq_len` below validates separately.
pub fn check_lookup_capacity(alphabet_size: usize, k: usize) -> MatrixResult<u64> {
    let mut power: u64 = 1;
    for _ in 0..k {
        power = power.saturating_mul(alphabet_size as u64);
        if power >= LOOKUP_TABLE_ENTRY_LIMIT {
            return Err(MatrixError::AlphabetKmerOverflow {
                alphabet: alphabet_size,
                k,
                power,
                limit: LOOKUP_TABLE_ENTRY_LIMIT,
            });
        }
    }
    Ok(power)
}

/// Validate that `max_seq_len` fits in the `u16` sentinel-excluded position
/// encoding used by the query lookup table (§7(a), §9's 16-bit wraparound
/// design note).
pub fn check_max_seq_len(max_seq_len: usize) -> MatrixResult<()> {
    if max_seq_len as u64 >= MAX_SEQ_LEN_LIMIT {
        return Err(MatrixError::SeqLenOverflow {
            max_seq_len,
            limit: MAX_SEQ_LEN_LIMIT,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_blosum62_is_symmetric_and_self_positive() {
        let mat = SubstitutionMatrix::amino_acid(None).unwrap();
        assert_eq!(mat.alphabet_size, 21);
        for i in 0..mat.alphabet_size {
            for j in 0..mat.alphabet_size {
                assert_eq!(mat.sub_matrix[i][j], mat.sub_matrix[j][i]);
            }
        }
        let a_code = mat.aa2int(b'A').unwrap();
        assert!(mat.sub_matrix[a_code as usize][a_code as usize] > 0);
    }

    #[test]
    fn aa2int_rejects_unknown_letters() {
        let mat = SubstitutionMatrix::amino_acid(None).unwrap();
        assert!(mat.aa2int(b'*').is_none());
    }

    #[test]
    fn aa2int_rejects_lowercase_soft_masked_residues() {
        let mat = SubstitutionMatrix::amino_acid(None).unwrap();
        assert!(mat.aa2int(b'a').is_none());
    }

    #[test]
    fn lookup_capacity_rejects_overflow() {
        assert!(check_lookup_capacity(21, 4).is_ok());
        assert!(check_lookup_capacity(21, 20).is_err());
    }

    #[test]
    fn max_seq_len_rejects_overflow() {
        assert!(check_max_seq_len(65_000).is_ok());
        assert!(check_max_seq_len(70_000).is_err());
    }

    #[test]
    fn reduced_matrix_shrinks_alphabet() {
        let mat = SubstitutionMatrix::amino_acid(None).unwrap();
        let reduced = mat.reduced(10).unwrap();
        assert_eq!(reduced.alphabet_size, 10);
    }

    #[test]
    fn nucleotide_matrix_scores_match_and_mismatch() {
        let mat = SubstitutionMatrix::nucleotide(2, -3);
        let a = mat.aa2int(b'A').unwrap();
        let c = mat.aa2int(b'C').unwrap();
        assert_eq!(mat.sub_matrix[a as usize][a as usize], 2);
        assert_eq!(mat.sub_matrix[a as usize][c as usize], -3);
    }
}
