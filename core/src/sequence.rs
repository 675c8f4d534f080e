//! Encoded sequence views over query and target residues.

use crate::matrix::SubstitutionMatrix;

/// An integer-encoded residue sequence. `codes[p]` is `None` when the
/// original residue at position `p` falls outside the substitution matrix's
/// alphabet (an ambiguous residue); any k-mer window crossing such a
/// position is skipped by `KmerIter`.
pub struct Sequence {
    codes: Vec<Option<u8>>,
}

impl Sequence {
    pub fn encode(raw: &[u8], matrix: &SubstitutionMatrix) -> Self {
        let codes = raw.iter().map(|&b| matrix.aa2int(b)).collect();
        Self { codes }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// The residue code at `pos`, or `0` if ambiguous. Chain construction
    /// only ever indexes positions that fall within a resolved stretch, so
    /// the fallback is never exercised on a real k-mer match; it exists so
    /// the boundary resolver's unchecked gap-scoring walk (§4.5) has a
    /// defined value to feed the substitution matrix.
    pub fn code_at(&self, pos: usize) -> u8 {
        self.codes[pos].unwrap_or(0)
    }

    /// Iterate the sequence's k-mers in order, yielding `(position, index)`
    /// for every window with no ambiguous residue at a position the mask
    /// includes. `mask` selects which of the `k` window offsets contribute
    /// to the index (spaced k-mers); `None` means every offset contributes.
    pub fn kmers<'a>(
        &'a self,
        k: usize,
        alphabet_size: usize,
        mask: Option<&'a [bool]>,
    ) -> KmerIter<'a> {
        KmerIter {
            seq: self,
            k,
            alphabet_size,
            mask,
            pos: 0,
            scratch: Vec::with_capacity(k),
        }
    }
}

pub struct KmerIter<'a> {
    seq: &'a Sequence,
    k: usize,
    alphabet_size: usize,
    mask: Option<&'a [bool]>,
    pos: usize,
    /// Reused across every window so index computation allocates at most
    /// once per iterator, not once per k-mer.
    scratch: Vec<u8>,
}

impl<'a> Iterator for KmerIter<'a> {
    type Item = (usize, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.k == 0 || self.seq.len() < self.k {
            return None;
        }
        while self.pos + self.k <= self.seq.len() {
            let start = self.pos;
            self.pos += 1;
            if let Some(index) = self.window_index(start) {
                return Some((start, index));
            }
        }
        None
    }
}

impl<'a> KmerIter<'a> {
    fn window_index(&mut self, start: usize) -> Option<u32> {
        self.scratch.clear();
        for offset in 0..self.k {
            let included = self.mask.map(|m| m[offset]).unwrap_or(true);
            if !included {
                continue;
            }
            self.scratch.push(self.seq.codes[start + offset]?);
        }
        Some(crate::kmer::int2index(&self.scratch, self.alphabet_size))
    }
}
