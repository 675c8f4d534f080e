//! Worker orchestrator: partitions the prefilter result stream into flush
//! windows and runs a dynamic-schedule parallel loop over query entries
//! within each window (§4.7, §5).

use std::sync::Mutex;

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use log::warn;
use rayon::prelude::*;

use crate::bridge::resolve_boundaries;
use crate::chain::chain_stretches;
use crate::error::{EngineError, EngineResult};
use crate::evalue::EvalueComputer;
use crate::kmer::QueryLookup;
use crate::matrix::{check_max_seq_len, SubstitutionMatrix};
use crate::scorer::{score_and_filter, FilterParams};
use crate::seedmatch::match_seeds;
use crate::sequence::Sequence;
use crate::store::{StoreReader, StoreWriter};
use crate::stretch::extract_stretches;
use crate::types::KmerPos;

pub struct EngineConfig {
    pub k: usize,
    pub alphabet_size: usize,
    pub max_seq_len: usize,
    pub spaced_mask: Option<Vec<bool>>,
    pub flush_window: usize,
    pub include_identity: bool,
    pub same_db: bool,
    pub filter: FilterParams,
}

/// Per-thread scratch reused across every target of every query a given
/// rayon task sees (`rayon::map_init` plays the role of task-local storage
/// here, standing in for the explicit per-worker arrays of §3's "Lifecycles").
struct WorkerScratch {
    lookup: QueryLookup,
    anchors: Vec<KmerPos>,
}

impl WorkerScratch {
    fn new(alphabet_size: usize, k: usize) -> EngineResult<Self> {
        let lookup = QueryLookup::new(alphabet_size, k)?;
        Ok(Self { lookup, anchors: Vec::with_capacity(256) })
    }
}

pub struct Engine<'a> {
    pub config: EngineConfig,
    pub matrix: &'a SubstitutionMatrix,
    pub evaluer: &'a EvalueComputer,
}

impl<'a> Engine<'a> {
    /// `prefilter_reader` is remapped between flush windows, mirroring the
    /// source engine's `remapData()` call on the prefilter-result store
    /// (the one whose resident size scales with the whole job, not with
    /// either sequence database).
    pub fn run(
        &self,
        query_reader: &StoreReader,
        target_reader: &StoreReader,
        prefilter_reader: &mut StoreReader,
        writer: &Mutex<StoreWriter>,
        writer_path: &std::path::Path,
        progress: bool,
    ) -> EngineResult<()> {
        check_max_seq_len(self.config.max_seq_len)?;
        let keys: Vec<u32> = prefilter_reader.keys().to_vec();

        for window in keys.chunks(self.config.flush_window.max(1)) {
            {
                let prefilter_ref: &StoreReader = prefilter_reader;
                let bar = if progress {
                    let bar = ProgressBar::new(window.len() as u64);
                    bar.set_style(
                        ProgressStyle::with_template("{bar:40} {pos}/{len} queries ({eta})")
                            .unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    Some(bar)
                } else {
                    None
                };

                let results: Vec<EngineResult<()>> = if let Some(bar) = &bar {
                    window
                        .par_iter()
                        .progress_with(bar.clone())
                        .map_init(
                            || WorkerScratch::new(self.config.alphabet_size, self.config.k),
                            |scratch, &query_key| {
                                let scratch =
                                    scratch.as_mut().map_err(|e| EngineError::Config(e.to_string()))?;
                                self.process_query(
                                    query_key,
                                    scratch,
                                    query_reader,
                                    target_reader,
                                    prefilter_ref,
                                    writer,
                                    writer_path,
                                )
                            },
                        )
                        .collect()
                } else {
                    window
                        .par_iter()
                        .map_init(
                            || WorkerScratch::new(self.config.alphabet_size, self.config.k),
                            |scratch, &query_key| {
                                let scratch =
                                    scratch.as_mut().map_err(|e| EngineError::Config(e.to_string()))?;
                                self.process_query(
                                    query_key,
                                    scratch,
                                    query_reader,
                                    target_reader,
                                    prefilter_ref,
                                    writer,
                                    writer_path,
                                )
                            },
                        )
                        .collect()
                };

                for r in results {
                    r?;
                }
            }

            prefilter_reader.remap_data()?;
        }

        Ok(())
    }

    fn process_query(
        &self,
        query_key: u32,
        scratch: &mut WorkerScratch,
        query_reader: &StoreReader,
        target_reader: &StoreReader,
        prefilter_reader: &StoreReader,
        writer: &Mutex<StoreWriter>,
        writer_path: &std::path::Path,
    ) -> EngineResult<()> {
        let query_raw = query_reader.get(query_key)?;
        let query = Sequence::encode(query_raw, self.matrix);
        if query.len() > self.config.max_seq_len {
            return Err(EngineError::SequenceTooLong { len: query.len(), max: self.config.max_seq_len });
        }

        scratch.lookup.reset();
        scratch.lookup.populate(&query, self.config.spaced_mask.as_deref());

        let targets_raw = prefilter_reader.get(query_key)?;
        let targets_text = std::str::from_utf8(targets_raw).unwrap_or("");

        let mut out = String::new();
        for line in targets_text.lines() {
            let Some(target_key_str) = line.split_whitespace().next() else { continue };
            let Ok(target_key) = target_key_str.parse::<u32>() else { continue };

            let target_raw = match target_reader.get(target_key) {
                Ok(bytes) => bytes,
                Err(_) => {
                    let err = EngineError::UnresolvableTarget(target_key);
                    warn!("{err} for query {query_key}, skipping (§7 per-target data error)");
                    continue;
                }
            };
            let target = Sequence::encode(target_raw, self.matrix);
            if target.len() > self.config.max_seq_len {
                warn!("target {target_key} exceeds max-seq-len, skipping");
                continue;
            }

            let is_identity = query_key == target_key && (self.config.include_identity || self.config.same_db);

            scratch.anchors.clear();
            match_seeds(
                &scratch.lookup,
                &target,
                self.config.k,
                self.config.alphabet_size,
                self.config.spaced_mask.as_deref(),
                self.config.max_seq_len,
                &mut scratch.anchors,
            );

            let mut stretches = extract_stretches(&mut scratch.anchors);
            let Some(mut path) = chain_stretches(&mut stretches) else { continue };
            resolve_boundaries(&mut path, &query, &target, self.matrix);

            if let Some(record) = score_and_filter(
                &path,
                &query,
                &target,
                self.matrix,
                self.evaluer,
                &self.config.filter,
                target_key,
                is_identity,
            ) {
                out.push_str(&record.to_line());
                out.push('\n');
            }
        }

        scratch.lookup.reset();

        let mut writer = writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.write_start();
        writer.write_add(out.as_bytes());
        writer.write_end(query_key, writer_path)?;
        Ok(())
    }
}
