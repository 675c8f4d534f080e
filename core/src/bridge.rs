//! Boundary resolver: a 1D DP that finds the optimal split point in the gap
//! between consecutive chained stretches, plus greedy terminal extension of
//! the chain's outer ends (§4.5).

use crate::matrix::SubstitutionMatrix;
use crate::sequence::Sequence;
use crate::types::Stretch;

/// Resolve gap boundaries between every consecutive pair in `path` (ordered
/// best-end-first, root-last — the layout [`crate::chain::chain_stretches`]
/// returns), then extend the chain's two outer ends. Mutates `path` in
/// place.
pub fn resolve_boundaries(
    path: &mut [Stretch],
    query: &Sequence,
    target: &Sequence,
    matrix: &SubstitutionMatrix,
) {
    bridge_gaps(path, query, target, matrix);
    extend_terminals(path, query, target, matrix);
}

/// Neither accumulator is floored at zero: the chosen split is the
/// unconstrained maximum-sum point across the gap, unlike classic
/// Smith-Waterman boundary trimming.
fn bridge_gaps(path: &mut [Stretch], query: &Sequence, target: &Sequence, matrix: &SubstitutionMatrix) {
    let n = path.len();
    for stretch in (1..n).rev() {
        let mut scores: Vec<i32> = Vec::new();
        let mut score = 0i32;
        let mut i = path[stretch].i_end as i64;
        let mut j = path[stretch].j_end as i64;
        while i < path[stretch - 1].i_start as i64 && j < path[stretch - 1].j_start as i64 {
            let curr = sub_score(query, target, matrix, i, j);
            score += curr;
            scores.push(score);
            i += 1;
            j += 1;
        }
        scores.push(0);
        let mut pos = scores.len() - 1;

        let mut max_score = 0i32;
        let mut max_pos = 0i64;
        let mut max_rev_pos = 0i64;
        let mut rev_pos = 0i64;
        score = 0;
        let mut i = path[stretch - 1].i_start as i64;
        let mut j = path[stretch - 1].j_start as i64;
        while i > path[stretch].i_end as i64 && j > path[stretch].j_end as i64 {
            let curr = sub_score(query, target, matrix, i, j);
            score += curr;
            if scores[pos] + score > max_score {
                max_score = scores[pos] + score;
                max_pos = pos as i64;
                max_rev_pos = rev_pos;
            }
            rev_pos += 1;
            pos -= 1;
            i -= 1;
            j -= 1;
        }

        path[stretch - 1].i_start = (path[stretch - 1].i_start as i64 - max_rev_pos) as u16;
        path[stretch - 1].j_start = (path[stretch - 1].j_start as i64 - max_rev_pos) as u16;
        path[stretch].i_end = (path[stretch].i_end as i64 + max_pos) as u16;
        path[stretch].j_end = (path[stretch].j_end as i64 + max_pos) as u16;
    }
}

/// The leftward and rightward walks share one running `max_score`; the
/// rightward pass only advances boundaries once it exceeds whatever the
/// leftward pass already reached. Keep this shared, not reset.
///
/// `i_start` is inclusive (first matched residue) and `i_end` is exclusive
/// (one past the last matched residue), so the leftward walk's first new
/// candidate is `i_start - 1` and the rightward walk's first new candidate
/// is `i_end` itself; on improvement the boundary becomes the candidate
/// (`i_start = i`) or one past it (`i_end = i + 1`) respectively.
fn extend_terminals(path: &mut [Stretch], query: &Sequence, target: &Sequence, matrix: &SubstitutionMatrix) {
    let last = path.len() - 1;
    let mut max_score = 0i32;
    let mut score = 0i32;

    let mut i = path[last].i_start as i64 - 1;
    let mut j = path[last].j_start as i64 - 1;
    while i > -1 && j > -1 {
        score += sub_score(query, target, matrix, i, j);
        if score > max_score {
            path[last].i_start = i as u16;
            path[last].j_start = j as u16;
            max_score = score;
        }
        i -= 1;
        j -= 1;
    }

    score = 0;
    let mut i = path[0].i_end as i64;
    let mut j = path[0].j_end as i64;
    while i < query.len() as i64 && j < target.len() as i64 {
        score += sub_score(query, target, matrix, i, j);
        if score > max_score {
            path[0].i_end = (i + 1) as u16;
            path[0].j_end = (j + 1) as u16;
            max_score = score;
        }
        i += 1;
        j += 1;
    }
}

fn sub_score(query: &Sequence, target: &Sequence, matrix: &SubstitutionMatrix, i: i64, j: i64) -> i32 {
    let qc = query.code_at(i as usize) as usize;
    let tc = target.code_at(j as usize) as usize;
    matrix.sub_matrix[qc][tc]
}
