//! Stretch chainer: a 2D DP over sorted stretches selecting the
//! highest-scoring colinear, non-overlapping chain (§4.4).

use crate::types::{DpRow, Stretch};

const GAP_PENALTY: i32 = -1;

/// Chain `stretches` (already produced by [`crate::stretch::extract_stretches`];
/// this function sorts them itself per the `i_start` asc / `i_end` desc
/// order §4.3 requires before chaining). Returns the selected path ordered
/// from the best-scoring end (index 0) down to the chain's root (last
/// index), or `None` if there are no stretches.
pub fn chain_stretches(stretches: &mut Vec<Stretch>) -> Option<Vec<Stretch>> {
    stretches.sort();
    let n = stretches.len();
    if n == 0 {
        return None;
    }

    let mut dp: Vec<DpRow> = (0..n)
        .map(|i| DpRow { prev: i, score: stretches[i].kmer_cnt as i32 })
        .collect();

    let mut best_score = 0i32;
    let mut best_end = 0usize;

    for curr in 0..n {
        for prev in 0..curr {
            // Non-overlap check: the j-side term compares against
            // `prev.i_end`, not `prev.j_end`. Preserved exactly as this
            // engine's original produces it — flipping it changes results.
            if stretches[curr].i_start > stretches[prev].i_end
                && stretches[curr].j_start > stretches[prev].i_end
            {
                let candidate = dp[prev].score + GAP_PENALTY + stretches[curr].kmer_cnt as i32;
                if candidate > dp[curr].score {
                    dp[curr] = DpRow { prev, score: candidate };
                }
            }
        }
        if dp[curr].score > best_score {
            best_score = dp[curr].score;
            best_end = curr;
        }
    }

    let mut path = Vec::new();
    let mut curr = best_end;
    loop {
        path.push(stretches[curr]);
        if dp[curr].prev == curr {
            break;
        }
        curr = dp[curr].prev;
    }
    Some(path)
}
