use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use seedchain_core::evalue::EvalueComputer;
use seedchain_core::matrix::SubstitutionMatrix;
use seedchain_core::scorer::{CovMode, FilterParams};
use seedchain_core::store::{StoreReader, StoreWriter};
use seedchain_core::worker::{Engine, EngineConfig};

/// K-mer anchor chaining aligner: given a query DB, a prefilter result DB and
/// a target DB, emits per-query result blocks of local pairwise alignments.
#[derive(Parser)]
#[command(name = "seedchain")]
#[command(about = "K-mer anchor chaining sequence aligner")]
#[command(version)]
struct Cli {
    /// Query sequence database
    query_db: PathBuf,

    /// Prefilter result database (query key -> candidate target keys)
    result_db: PathBuf,

    /// Target sequence database
    target_db: PathBuf,

    /// Output result database
    output_db: PathBuf,

    /// Number of worker threads (0 = all logical cores)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// K-mer size
    #[arg(long, default_value_t = 4)]
    k: usize,

    /// Alphabet size (21 for the full amino acid alphabet plus `X`)
    #[arg(long = "alphabet-size", default_value_t = 21)]
    alphabet_size: usize,

    /// Maximum accepted query/target sequence length
    #[arg(long = "max-seq-len", default_value_t = 65534)]
    max_seq_len: usize,

    /// Enable spaced k-mers
    #[arg(long = "spaced-kmer")]
    spaced_kmer: bool,

    /// Spaced k-mer pattern as a string of `1`/`0`, e.g. "1101011"
    #[arg(long = "spaced-kmer-pattern")]
    spaced_kmer_pattern: Option<String>,

    /// Custom substitution matrix file (defaults to built-in BLOSUM62)
    #[arg(long = "matrix-file")]
    matrix_file: Option<PathBuf>,

    /// Gap open penalty
    #[arg(long = "gap-open", default_value_t = 11)]
    gap_open: i32,

    /// Gap extend penalty
    #[arg(long = "gap-extend", default_value_t = 1)]
    gap_extend: i32,

    /// Coverage mode: 0 = both, 1 = target, 2 = query
    #[arg(long = "cov-mode", default_value_t = 0)]
    cov_mode: u8,

    /// Minimum coverage threshold
    #[arg(long = "cov-thr", default_value_t = 0.0)]
    cov_thr: f32,

    /// Minimum sequence identity threshold
    #[arg(long = "min-seq-id", default_value_t = 0.0)]
    min_seq_id: f32,

    /// E-value threshold
    #[arg(short = 'e', long = "evalue", default_value_t = 0.001)]
    evalue: f64,

    /// Emit self-hits even when they would otherwise fail the filter
    #[arg(long = "include-identity")]
    include_identity: bool,

    /// Number of prefilter query keys held resident per flush window
    #[arg(long = "flush-window", default_value_t = 4096)]
    flush_window: usize,

    /// Print extra diagnostic logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("query DB:  {}", cli.query_db.display());
    log::info!("target DB: {}", cli.target_db.display());
    log::info!("result DB: {}", cli.result_db.display());
    log::info!("output DB: {}", cli.output_db.display());

    let threads = if cli.threads == 0 { num_cpus::get() } else { cli.threads };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("failed to start worker thread pool")?;
    log::info!("using {threads} worker threads");

    if let Err(e) = run(&cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let spaced_mask = parse_spaced_mask(cli)?;

    let matrix = SubstitutionMatrix::amino_acid(cli.matrix_file.as_deref())
        .context("failed to load substitution matrix")?;
    let matrix = if cli.alphabet_size != matrix.alphabet_size {
        matrix
            .reduced(cli.alphabet_size)
            .context("failed to reduce substitution matrix to --alphabet-size")?
    } else {
        matrix
    };

    let query_reader = StoreReader::open(&cli.query_db)
        .with_context(|| format!("failed to open query DB {}", cli.query_db.display()))?;
    let target_reader = StoreReader::open(&cli.target_db)
        .with_context(|| format!("failed to open target DB {}", cli.target_db.display()))?;
    let mut prefilter_reader = StoreReader::open(&cli.result_db)
        .with_context(|| format!("failed to open result DB {}", cli.result_db.display()))?;

    let db_residues = total_residues(&target_reader)?;
    let evaluer = EvalueComputer::new(db_residues, &matrix);

    let same_db = cli.query_db == cli.target_db;
    let config = EngineConfig {
        k: cli.k,
        alphabet_size: cli.alphabet_size,
        max_seq_len: cli.max_seq_len,
        spaced_mask,
        flush_window: cli.flush_window,
        include_identity: cli.include_identity,
        same_db,
        filter: FilterParams {
            cov_mode: CovMode::from_code(cli.cov_mode),
            cov_thr: cli.cov_thr,
            seq_id_thr: cli.min_seq_id,
            eval_thr: cli.evalue,
            gap_open: cli.gap_open,
            gap_extend: cli.gap_extend,
        },
    };

    let writer = StoreWriter::create(&cli.output_db)
        .with_context(|| format!("failed to create output DB {}", cli.output_db.display()))?;
    let writer = Mutex::new(writer);

    let engine = Engine { config, matrix: &matrix, evaluer: &evaluer };
    engine
        .run(
            &query_reader,
            &target_reader,
            &mut prefilter_reader,
            &writer,
            &cli.output_db,
            true,
        )
        .context("alignment engine failed")?;

    writer
        .into_inner()
        .unwrap_or_else(|e| e.into_inner())
        .flush(&cli.output_db)
        .context("failed to flush output DB")?;

    log::info!("done");
    Ok(())
}

fn total_residues(target_reader: &StoreReader) -> Result<u64> {
    let mut total = 0u64;
    for &key in target_reader.keys() {
        total += target_reader.get(key)?.len() as u64;
    }
    Ok(total)
}

fn parse_spaced_mask(cli: &Cli) -> Result<Option<Vec<bool>>> {
    if !cli.spaced_kmer {
        return Ok(None);
    }
    let pattern = cli
        .spaced_kmer_pattern
        .as_deref()
        .ok_or_else(|| anyhow!("--spaced-kmer requires --spaced-kmer-pattern"))?;
    let mask: Vec<bool> = pattern
        .chars()
        .map(|c| match c {
            '1' => Ok(true),
            '0' => Ok(false),
            other => Err(anyhow!("invalid character {other:?} in --spaced-kmer-pattern, expected 0/1")),
        })
        .collect::<Result<_>>()?;
    if mask.len() != cli.k {
        return Err(anyhow!(
            "--spaced-kmer-pattern length {} does not match --k {}",
            mask.len(),
            cli.k
        ));
    }
    if !mask.iter().any(|&b| b) {
        return Err(anyhow!("--spaced-kmer-pattern must include at least one `1`"));
    }
    Ok(Some(mask))
}
