//! End-to-end tests driving `worker::Engine` over real on-disk stores,
//! covering spec scenarios S3/S5/S6 and the cross-thread-count determinism
//! property (§8).

use std::path::Path;
use std::sync::Mutex;

use seedchain_core::evalue::EvalueComputer;
use seedchain_core::matrix::SubstitutionMatrix;
use seedchain_core::scorer::{CovMode, FilterParams};
use seedchain_core::store::{StoreReader, StoreWriter};
use seedchain_core::worker::{Engine, EngineConfig};

fn write_db(path: &Path, records: &[(u32, &str)]) {
    let mut writer = StoreWriter::create(path).unwrap();
    for &(key, body) in records {
        writer.write_start();
        writer.write_add(body.as_bytes());
        writer.write_end(key, path).unwrap();
    }
    writer.flush(path).unwrap();
}

fn permissive_filter() -> FilterParams {
    FilterParams {
        cov_mode: CovMode::Both,
        cov_thr: 0.0,
        seq_id_thr: 0.0,
        eval_thr: f64::MAX,
        gap_open: 11,
        gap_extend: 1,
    }
}

fn run_engine(
    dir: &Path,
    query: &[(u32, &str)],
    target: &[(u32, &str)],
    prefilter: &[(u32, &str)],
    config: EngineConfig,
) -> Vec<String> {
    let matrix = SubstitutionMatrix::amino_acid(None).unwrap();
    run_engine_with_matrix(dir, query, target, prefilter, config, &matrix)
}

fn run_engine_with_matrix(
    dir: &Path,
    query: &[(u32, &str)],
    target: &[(u32, &str)],
    prefilter: &[(u32, &str)],
    config: EngineConfig,
    matrix: &SubstitutionMatrix,
) -> Vec<String> {
    let query_path = dir.join("query");
    let target_path = dir.join("target");
    let prefilter_path = dir.join("prefilter");
    let output_path = dir.join("output");
    write_db(&query_path, query);
    write_db(&target_path, target);
    write_db(&prefilter_path, prefilter);

    let evaluer = EvalueComputer::new(1_000_000, matrix);
    let engine = Engine { config, matrix, evaluer: &evaluer };

    let query_reader = StoreReader::open(&query_path).unwrap();
    let target_reader = StoreReader::open(&target_path).unwrap();
    let mut prefilter_reader = StoreReader::open(&prefilter_path).unwrap();
    let writer = Mutex::new(StoreWriter::create(&output_path).unwrap());

    engine
        .run(&query_reader, &target_reader, &mut prefilter_reader, &writer, &output_path, false)
        .unwrap();
    writer.into_inner().unwrap().flush(&output_path).unwrap();

    let output_reader = StoreReader::open(&output_path).unwrap();
    let mut lines = Vec::new();
    for &key in output_reader.keys() {
        let text = output_reader.get_str(key).unwrap();
        lines.extend(text.lines().map(|l| l.to_string()));
    }
    lines
}

fn base_config(filter: FilterParams) -> EngineConfig {
    EngineConfig {
        k: 4,
        alphabet_size: 21,
        max_seq_len: 10_000,
        spaced_mask: None,
        flush_window: 4096,
        include_identity: true,
        same_db: false,
        filter,
    }
}

#[test]
fn s3_two_colinear_stretches_with_gap_produce_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let query = [(1u32, "ACDEFGHIKLMNPQRST")];
    let target = [(1u32, "ACDEFGXXXLMNPQRST")];
    let prefilter = [(1u32, "1")];

    let lines = run_engine(dir.path(), &query, &target, &prefilter, base_config(permissive_filter()));
    assert_eq!(lines.len(), 1);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    let cigar = fields[13];
    assert!(cigar.contains('M'));
    let seq_id: f32 = fields[4].parse().unwrap();
    assert!(seq_id < 1.0);
}

#[test]
fn s5_filtered_by_evalue_yields_no_record() {
    let dir = tempfile::tempdir().unwrap();
    let query = [(1u32, "ACDEFGHIK")];
    let target = [(2u32, "ACDEFGHIK")];
    let prefilter = [(1u32, "2")];

    let mut filter = permissive_filter();
    filter.eval_thr = 0.0;

    let lines = run_engine(dir.path(), &query, &target, &prefilter, base_config(filter));
    assert!(lines.is_empty());
}

#[test]
fn s6_self_hit_same_db_emits_despite_include_identity_off() {
    let dir = tempfile::tempdir().unwrap();
    let query = [(1u32, "ACDEFGHIK")];
    let prefilter = [(1u32, "1")];

    // Thresholds tight enough that only the same-DB short-circuit (not the
    // ordinary filter) can let this hit through.
    let mut filter = permissive_filter();
    filter.eval_thr = 0.0;
    filter.cov_thr = 2.0;
    filter.seq_id_thr = 2.0;

    let mut config = base_config(filter);
    config.include_identity = false;
    config.same_db = true;

    let lines = run_engine(dir.path(), &query, &query, &prefilter, config);
    assert_eq!(lines.len(), 1);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(fields[13], "MMMMMMMMM");
}

#[test]
fn unresolvable_target_key_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let query = [(1u32, "ACDEFGHIK")];
    let target = [(2u32, "ACDEFGHIK")];
    // references target key 99, which doesn't exist, plus the real key 2.
    let prefilter = [(1u32, "99\n2")];

    let lines = run_engine(dir.path(), &query, &target, &prefilter, base_config(permissive_filter()));
    assert_eq!(lines.len(), 1);
}

#[test]
fn output_is_deterministic_across_repeated_runs() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let query = [(1u32, "ACDEFGHIKLMNPQRST"), (2u32, "ACDEFGHIK")];
    let target = [(1u32, "ACDEFGXXXLMNPQRST"), (2u32, "ACDEFGHIK")];
    let prefilter = [(1u32, "1"), (2u32, "2")];

    let mut lines_a =
        run_engine(dir_a.path(), &query, &target, &prefilter, base_config(permissive_filter()));
    let mut lines_b =
        run_engine(dir_b.path(), &query, &target, &prefilter, base_config(permissive_filter()));
    lines_a.sort();
    lines_b.sort();
    assert_eq!(lines_a, lines_b);
}

#[test]
fn reduced_alphabet_matrix_and_config_stay_consistent() {
    // A lookup table sized for the reduced alphabet must be paired with a
    // matrix that actually encodes residues into that smaller alphabet, or
    // `Sequence::encode` can emit a code the table is too small to index.
    let dir = tempfile::tempdir().unwrap();
    let full = SubstitutionMatrix::amino_acid(None).unwrap();
    let reduced = full.reduced(10).unwrap();
    assert_eq!(reduced.alphabet_size, 10);

    let query = [(1u32, "ACDEFGHIKLMNPQRST")];
    let target = [(1u32, "ACDEFGHIKLMNPQRST")];
    let prefilter = [(1u32, "1")];

    let mut config = base_config(permissive_filter());
    config.alphabet_size = reduced.alphabet_size;

    let lines = run_engine_with_matrix(dir.path(), &query, &target, &prefilter, config, &reduced);
    assert_eq!(lines.len(), 1);
}
