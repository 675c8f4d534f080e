//! Stretch extractor: converts a sorted anchor stream into diagonal runs of
//! at least two colinear anchors (§4.3).

use crate::types::{KmerPos, Stretch};

/// Full diagonal (`i - j` widened to avoid the collision risk of the 16-bit
/// wrapped `ij` field) used only for the region-continuity checks below;
/// distinct from `KmerPos::ij`, which stays 16-bit for sort order.
fn diagonal(a: &KmerPos) -> i32 {
    a.i as i32 - a.j as i32
}

/// Sort `anchors` and sweep them into stretches. Singleton anchors (neither
/// the previous nor the next anchor shares their diagonal) are dropped; a
/// monotonicity guard (`prev_i <= curr_i && prev_j <= curr_j`) stops the
/// first-occurrence lookup's occasional backward jumps from joining a
/// region across a break.
pub fn extract_stretches(anchors: &mut [KmerPos]) -> Vec<Stretch> {
    anchors.sort();
    let n = anchors.len();
    let mut stretches = Vec::new();
    if n < 2 {
        return stretches;
    }

    let mut region_min_i = u16::MAX;
    let mut region_max_i = 0u16;
    let mut region_min_j = u16::MAX;
    let mut region_max_j = 0u16;
    let mut region_kmer_cnt = 0u16;

    let mut prev_diagonal: Option<i32> = None;
    let mut prev_i = 0u16;
    let mut prev_j = 0u16;

    for idx in 0..n {
        let curr = anchors[idx];
        let curr_diagonal = diagonal(&curr);
        let next_diagonal = anchors.get(idx + 1).map(diagonal);

        if Some(curr_diagonal) != next_diagonal && Some(curr_diagonal) != prev_diagonal {
            continue;
        }

        if (next_diagonal == Some(curr_diagonal) || prev_diagonal == Some(curr_diagonal))
            && prev_i <= curr.i
            && prev_j <= curr.j
        {
            region_min_i = region_min_i.min(curr.i);
            region_max_i = region_max_i.max(curr.i);
            region_min_j = region_min_j.min(curr.j);
            region_max_j = region_max_j.max(curr.j);
            region_kmer_cnt += 1;
        }

        prev_diagonal = Some(curr_diagonal);
        prev_i = curr.i;
        prev_j = curr.j;

        if next_diagonal != Some(curr_diagonal) || idx == n - 1 {
            if region_kmer_cnt > 0 {
                // i_end/j_end are exclusive (one past the last matched
                // residue), matching the half-open convention the chainer,
                // bridge and CIGAR emitter all assume.
                stretches.push(Stretch {
                    i_start: region_min_i,
                    i_end: region_max_i + 1,
                    j_start: region_min_j,
                    j_end: region_max_j + 1,
                    kmer_cnt: region_kmer_cnt,
                });
            }
            region_min_i = u16::MAX;
            region_max_i = 0;
            region_min_j = u16::MAX;
            region_max_j = 0;
            region_kmer_cnt = 0;
            prev_i = 0;
            prev_j = 0;
        }
    }

    stretches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor(i: u16, j: u16) -> KmerPos {
        KmerPos::new(i, j)
    }

    #[test]
    fn single_anchor_is_dropped() {
        let mut anchors = vec![anchor(0, 0)];
        assert!(extract_stretches(&mut anchors).is_empty());
    }

    #[test]
    fn colinear_run_forms_one_stretch() {
        let mut anchors = vec![anchor(0, 0), anchor(1, 1), anchor(2, 2), anchor(3, 3)];
        let stretches = extract_stretches(&mut anchors);
        assert_eq!(stretches.len(), 1);
        let s = stretches[0];
        assert_eq!((s.i_start, s.i_end, s.j_start, s.j_end), (0, 4, 0, 4));
        assert_eq!(s.kmer_cnt, 4);
    }

    #[test]
    fn stretch_invariants_hold() {
        let mut anchors = vec![anchor(0, 0), anchor(1, 1), anchor(5, 5), anchor(6, 6)];
        let stretches = extract_stretches(&mut anchors);
        for s in &stretches {
            assert_eq!(s.i_end - s.i_start, s.j_end - s.j_start);
            assert!(s.kmer_cnt >= 2);
        }
    }

    #[test]
    fn two_separate_diagonals_form_two_stretches() {
        let mut anchors = vec![
            anchor(0, 0),
            anchor(1, 1),
            anchor(10, 0),
            anchor(11, 1),
        ];
        let stretches = extract_stretches(&mut anchors);
        assert_eq!(stretches.len(), 2);
    }
}
