//! Karlin-Altschul bit score and E-value computation, built from the
//! substitution matrix's statistical parameters and the searched database
//! size.

use crate::matrix::SubstitutionMatrix;

/// Built once per run from the total residues in the target database and
/// the chosen substitution matrix; shared read-only across workers (§5).
pub struct EvalueComputer {
    lambda: f64,
    k_param: f64,
    db_residues: u64,
}

impl EvalueComputer {
    pub fn new(db_residues: u64, matrix: &SubstitutionMatrix) -> Self {
        Self {
            lambda: matrix.lambda,
            k_param: matrix.k_param,
            db_residues,
        }
    }

    pub fn compute_bit_score(&self, raw_score: i32) -> f64 {
        (self.lambda * raw_score as f64 - self.k_param.ln()) / std::f64::consts::LN_2
    }

    pub fn compute_evalue(&self, raw_score: i32, query_len: u32) -> f64 {
        let search_space = query_len as f64 * self.db_residues as f64;
        self.k_param * search_space * (-self.lambda * raw_score as f64).exp()
    }
}
