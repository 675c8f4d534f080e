//! Seed matcher: enumerate a target's k-mers against the query lookup table
//! and emit anchors (§4.2).

use crate::kmer::QueryLookup;
use crate::sequence::Sequence;
use crate::types::KmerPos;

/// Append anchors for every target k-mer whose index is present in `lookup`,
/// up to `max_anchors`. `anchors` is caller-owned scratch; it is not
/// cleared here so callers can reuse one buffer's capacity across targets by
/// truncating it themselves between calls.
pub fn match_seeds(
    lookup: &QueryLookup,
    target: &Sequence,
    k: usize,
    alphabet_size: usize,
    mask: Option<&[bool]>,
    max_anchors: usize,
    anchors: &mut Vec<KmerPos>,
) {
    for (j, index) in target.kmers(k, alphabet_size, mask) {
        if anchors.len() >= max_anchors {
            break;
        }
        if let Some(i) = lookup.get(index) {
            anchors.push(KmerPos::new(i, j as u16));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::SubstitutionMatrix;

    #[test]
    fn emits_one_anchor_per_shared_kmer() {
        let matrix = SubstitutionMatrix::amino_acid(None).unwrap();
        let query = Sequence::encode(b"ACDEFGHIK", &matrix);
        let target = Sequence::encode(b"ACDEFGHIK", &matrix);
        let mut lookup = QueryLookup::new(matrix.alphabet_size, 4).unwrap();
        lookup.populate(&query, None);

        let mut anchors = Vec::new();
        match_seeds(&lookup, &target, 4, matrix.alphabet_size, None, 1000, &mut anchors);
        assert_eq!(anchors.len(), 6);
        for a in &anchors {
            assert_eq!(a.i, a.j);
            assert_eq!(a.ij, 0);
        }
    }

    #[test]
    fn no_shared_kmers_emits_nothing() {
        let matrix = SubstitutionMatrix::amino_acid(None).unwrap();
        let query = Sequence::encode(b"AAAAAA", &matrix);
        let target = Sequence::encode(b"CCCCCC", &matrix);
        let mut lookup = QueryLookup::new(matrix.alphabet_size, 4).unwrap();
        lookup.populate(&query, None);

        let mut anchors = Vec::new();
        match_seeds(&lookup, &target, 4, matrix.alphabet_size, None, 1000, &mut anchors);
        assert!(anchors.is_empty());
    }

    #[test]
    fn respects_max_anchors_cap() {
        let matrix = SubstitutionMatrix::amino_acid(None).unwrap();
        let query = Sequence::encode(b"ACDEACDEACDE", &matrix);
        let target = Sequence::encode(b"ACDEACDEACDE", &matrix);
        let mut lookup = QueryLookup::new(matrix.alphabet_size, 4).unwrap();
        lookup.populate(&query, None);

        let mut anchors = Vec::new();
        match_seeds(&lookup, &target, 4, matrix.alphabet_size, None, 3, &mut anchors);
        assert_eq!(anchors.len(), 3);
    }
}
