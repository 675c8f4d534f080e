//! Scorer, CIGAR emission, coverage and the final accept/reject filter
//! (§4.6).

use crate::evalue::EvalueComputer;
use crate::matrix::SubstitutionMatrix;
use crate::sequence::Sequence;
use crate::types::{ResultRecord, Stretch};

/// Which of query/target coverage must clear `cov_thr` for a hit to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovMode {
    Both,
    Target,
    Query,
}

impl CovMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => CovMode::Target,
            2 => CovMode::Query,
            _ => CovMode::Both,
        }
    }
}

pub fn has_coverage(cov_mode: CovMode, cov_thr: f32, q_cov: f32, t_cov: f32) -> bool {
    match cov_mode {
        CovMode::Both => q_cov >= cov_thr && t_cov >= cov_thr,
        CovMode::Target => t_cov >= cov_thr,
        CovMode::Query => q_cov >= cov_thr,
    }
}

pub fn compute_cov(start: u32, end: u32, len: u32) -> f32 {
    (end - start) as f32 / len as f32
}

pub struct FilterParams {
    pub cov_mode: CovMode,
    pub cov_thr: f32,
    pub seq_id_thr: f32,
    pub eval_thr: f64,
    pub gap_open: i32,
    pub gap_extend: i32,
}

/// Walk the resolved chain from its root (last index) to its best-scoring
/// end (index 0), emitting one CIGAR run per stretch and one gap run
/// between consecutive stretches, then score, filter and build the result
/// record for `target_key`. Returns `None` when the hit fails the filter.
pub fn score_and_filter(
    path: &[Stretch],
    query: &Sequence,
    target: &Sequence,
    matrix: &SubstitutionMatrix,
    evaluer: &EvalueComputer,
    params: &FilterParams,
    target_key: u32,
    is_identity: bool,
) -> Option<ResultRecord> {
    let mut cigar = String::new();
    let mut ids = 0i32;
    let mut score = 0i32;

    for stretch in (0..path.len()).rev() {
        let s = &path[stretch];
        let mut i = s.i_start;
        let mut j = s.j_start;
        while i < s.i_end {
            cigar.push('M');
            if query.code_at(i as usize) == target.code_at(j as usize) {
                ids += 1;
            }
            score += matrix.sub_matrix[query.code_at(i as usize) as usize][target.code_at(j as usize) as usize];
            i += 1;
            j += 1;
        }

        if stretch > 0 {
            score -= params.gap_open;
            let prev = &path[stretch - 1];
            if prev.i_start == s.i_end {
                for _ in s.j_end..prev.j_start {
                    cigar.push('I');
                    score -= params.gap_extend;
                }
            } else {
                for _ in s.i_end..prev.i_start {
                    cigar.push('D');
                    score -= params.gap_extend;
                }
            }
        }
    }

    let q_start = path[path.len() - 1].i_start as u32;
    let q_end = path[0].i_end as u32;
    let t_start = path[path.len() - 1].j_start as u32;
    let t_end = path[0].j_end as u32;

    let q_cov = compute_cov(q_start, q_end, query.len() as u32);
    let t_cov = compute_cov(t_start, t_end, target.len() as u32);
    let aln_len = cigar.len() as u32;
    let seq_id = ids as f32 / aln_len as f32;
    let bit_score = (evaluer.compute_bit_score(score) + 0.5) as i32;
    let e_value = evaluer.compute_evalue(score, query.len() as u32);

    let has_cov = has_coverage(params.cov_mode, params.cov_thr, q_cov, t_cov);
    let has_seq_id = seq_id >= params.seq_id_thr - f32::EPSILON;
    let has_evalue = e_value <= params.eval_thr;

    // `is_identity` already folds in both `--include-identity` and the
    // same-DB short-circuit (worker::process_query); a self-hit bypasses
    // the coverage/identity/E-value filter outright once either applies.
    let accept = is_identity || (has_cov && has_seq_id && has_evalue);
    if !accept {
        return None;
    }

    Some(ResultRecord {
        target_key,
        bit_score,
        q_cov,
        t_cov,
        seq_id,
        e_value,
        aln_len,
        q_start,
        q_end,
        q_len: query.len() as u32,
        t_start,
        t_end,
        t_len: target.len() as u32,
        cigar,
    })
}
