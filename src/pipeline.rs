//! Run orchestration.
//!
//! Transcripts are split into per-region chunks. Each chunk is loaded,
//! matched and classified independently; results are then written to the
//! audit log and the xref store strictly in chunk order, either inline or
//! from a worker pool.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use crate::cache::DataCache;
use crate::chunk::{build_chunks, Chunk};
use crate::config::Config;
use crate::loader::{load_oligo_data, load_transcripts};
use crate::location::Location;
use crate::matcher::{
    classify_probe_sets, map_transcripts_to_features, mark_promiscuous_probe_sets,
    MappingStatus, SweepStats,
};
use crate::output::{write_header, write_statuses};
use crate::source::{OligoSource, TranscriptSource};
use crate::store::{check_existing_xrefs, store_mappings, XrefCache, XrefStore};
use crate::types::ArrayRegistry;

/// Read-only collaborators shared by every chunk.
pub struct MappingContext<'a> {
    pub config: &'a Config,
    pub oligo_source: &'a dyn OligoSource,
    pub arrays: &'a ArrayRegistry,
    pub cache: &'a dyn DataCache,
}

/// Everything computed for one chunk.
#[derive(Debug)]
pub struct ChunkResult {
    pub location: Location,
    pub statuses: Vec<MappingStatus>,
    pub sweep: SweepStats,
    /// Probe sets flagged as hitting too many transcripts.
    pub promiscuous: usize,
}

/// Totals for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub chunks: usize,
    pub pairs: usize,
    pub mapped: usize,
    pub links: usize,
}

/// Load, match and classify one chunk.
pub fn process_chunk(chunk: Chunk, ctx: &MappingContext<'_>) -> Result<ChunkResult> {
    let (location, transcripts) = chunk.into_parts();
    debug!(
        "Processing chunk {} with {} transcripts",
        location,
        transcripts.len()
    );

    let mut data = load_oligo_data(
        &location,
        &transcripts,
        ctx.oligo_source,
        ctx.arrays,
        ctx.cache,
        ctx.config,
    )?;

    let sweep = map_transcripts_to_features(&mut data, &transcripts, &location);
    let promiscuous =
        mark_promiscuous_probe_sets(&mut data, ctx.config.max_transcripts_per_probe_set);
    if promiscuous > 0 {
        info!(
            "{} probe sets on {} hit more than {} transcripts",
            promiscuous, location, ctx.config.max_transcripts_per_probe_set
        );
    }

    let statuses = classify_probe_sets(&mut data, &transcripts, ctx.arrays, ctx.config.threshold)
        .with_context(|| format!("Failed to classify probe sets on {}", location))?;

    Ok(ChunkResult {
        location,
        statuses,
        sweep,
        promiscuous,
    })
}

/// Writes chunk results to the audit log and the xref store.
///
/// Owns the run-wide xref cache, so exactly one emitter exists per run.
pub struct Emitter<'a, W: Write> {
    log: W,
    store: &'a mut dyn XrefStore,
    arrays: &'a ArrayRegistry,
    xref_cache: XrefCache,
    summary: RunSummary,
}

impl<'a, W: Write> Emitter<'a, W> {
    pub fn new(mut log: W, store: &'a mut dyn XrefStore, arrays: &'a ArrayRegistry) -> Result<Self> {
        write_header(&mut log)?;
        Ok(Emitter {
            log,
            store,
            arrays,
            xref_cache: XrefCache::new(),
            summary: RunSummary::default(),
        })
    }

    /// Log every status of `result`, then store the mapped ones.
    pub fn emit(&mut self, mut result: ChunkResult) -> Result<()> {
        write_statuses(&mut self.log, &result.statuses).context("Failed to write audit log")?;

        let links = store_mappings(
            &mut result.statuses,
            self.arrays,
            &mut self.xref_cache,
            self.store,
        )
        .with_context(|| format!("Failed to store mappings for {}", result.location))?;

        self.summary.chunks += 1;
        self.summary.pairs += result.statuses.len();
        self.summary.mapped += result.statuses.iter().filter(|s| s.is_mapped()).count();
        self.summary.links += links;
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }
}

/// Map every chunk of the transcripts in `transcript_source`, writing the
/// audit log to the writer returned by `open_log` and mapped pairs to `store`.
///
/// `open_log` is only called once the store has passed the existing-xref
/// check, so a refused run leaves an earlier log untouched.
///
/// `threads <= 1` runs sequentially; otherwise chunks are computed by a pool
/// of `threads` workers and emitted in chunk order.
pub fn run<W, F>(
    config: &Config,
    transcript_source: &dyn TranscriptSource,
    oligo_source: &dyn OligoSource,
    cache: &dyn DataCache,
    store: &mut dyn XrefStore,
    open_log: F,
    threads: usize,
) -> Result<RunSummary>
where
    W: Write,
    F: FnOnce() -> Result<W>,
{
    let start = Instant::now();
    config.validate()?;
    check_existing_xrefs(store, config.skip_xref_check)?;
    let log = open_log()?;

    let arrays = ArrayRegistry::new(oligo_source.fetch_arrays().context("Failed to load arrays")?);
    if arrays.is_empty() {
        warn!("No oligo arrays available; nothing can be mapped");
    }

    let filter = config.location_filter.as_ref();
    let transcripts = load_transcripts(transcript_source, filter, config.downstream_flank, cache)?;
    let chunks = build_chunks(transcripts, filter, transcript_source)?;
    info!("Split transcripts into {} chunks", chunks.len());

    let ctx = MappingContext {
        config,
        oligo_source,
        arrays: &arrays,
        cache,
    };
    let mut emitter = Emitter::new(log, store, &arrays)?;

    if threads <= 1 {
        run_sequential(chunks, &ctx, &mut emitter)?;
    } else {
        run_parallel(chunks, &ctx, &mut emitter, threads)?;
    }

    let summary = emitter.summary();
    info!(
        "Mapped {} of {} probe set / transcript pairs ({} xref links) in {:.2}s",
        summary.mapped,
        summary.pairs,
        summary.links,
        start.elapsed().as_secs_f64()
    );
    Ok(summary)
}

fn run_sequential<W: Write>(
    chunks: Vec<Chunk>,
    ctx: &MappingContext<'_>,
    emitter: &mut Emitter<'_, W>,
) -> Result<()> {
    for chunk in chunks {
        let result = process_chunk(chunk, ctx)?;
        emitter.emit(result)?;
    }
    Ok(())
}

/// Timing counters shared by workers and the emitter.
#[derive(Default)]
struct PerfMetrics {
    /// Total time workers spend processing chunks, in nanoseconds.
    worker_mapping_ns: AtomicU64,
    /// Number of chunks processed by workers.
    chunks_processed: AtomicU64,
    /// Maximum number of results buffered while waiting for an earlier chunk.
    max_pending_size: AtomicU64,
}

impl PerfMetrics {
    fn add_worker_mapping(&self, ns: u64) {
        self.worker_mapping_ns.fetch_add(ns, Ordering::Relaxed);
        self.chunks_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn update_max_pending(&self, size: usize) {
        self.max_pending_size
            .fetch_max(size as u64, Ordering::Relaxed);
    }

    fn log_summary(&self) {
        let mapping_ms = self.worker_mapping_ns.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        debug!(
            "Workers processed {} chunks in {:.2} ms (cumulative); at most {} results waited for an earlier chunk",
            self.chunks_processed.load(Ordering::Relaxed),
            mapping_ms,
            self.max_pending_size.load(Ordering::Relaxed)
        );
    }
}

/// Work item for the parallel pipeline.
struct WorkItem {
    /// Position of the chunk in emission order.
    seq_id: u64,
    chunk: Chunk,
}

/// Result from processing a work item.
struct WorkResult {
    seq_id: u64,
    result: Result<ChunkResult>,
}

fn run_parallel<W: Write>(
    chunks: Vec<Chunk>,
    ctx: &MappingContext<'_>,
    emitter: &mut Emitter<'_, W>,
    num_threads: usize,
) -> Result<()> {
    info!("Using parallel mode with {} threads", num_threads);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .context("Failed to create thread pool")?;

    let metrics = PerfMetrics::default();
    let (work_tx, work_rx): (Sender<WorkItem>, Receiver<WorkItem>) = unbounded();
    let (result_tx, result_rx): (Sender<WorkResult>, Receiver<WorkResult>) =
        bounded(num_threads * 2);

    for (seq_id, chunk) in chunks.into_iter().enumerate() {
        // The receiver is still alive here.
        let _ = work_tx.send(WorkItem {
            seq_id: seq_id as u64,
            chunk,
        });
    }
    drop(work_tx);

    let outcome = thread::scope(|scope| {
        let metrics = &metrics;
        let workers = scope.spawn(move || {
            pool.scope(|s| {
                for _ in 0..num_threads {
                    let work_rx = work_rx.clone();
                    let result_tx = result_tx.clone();
                    s.spawn(move |_| worker_loop(work_rx, result_tx, ctx, metrics));
                }
            });
        });

        let emitted = emit_results_ordered(result_rx, emitter, metrics);

        if workers.join().is_err() {
            return Err(anyhow::anyhow!("Worker thread panicked"));
        }
        emitted
    });

    metrics.log_summary();
    outcome
}

/// Worker loop: receives chunks and sends their results.
fn worker_loop(
    work_rx: Receiver<WorkItem>,
    result_tx: Sender<WorkResult>,
    ctx: &MappingContext<'_>,
    metrics: &PerfMetrics,
) {
    while let Ok(item) = work_rx.recv() {
        let started = Instant::now();
        let result = process_chunk(item.chunk, ctx);
        metrics.add_worker_mapping(started.elapsed().as_nanos() as u64);

        if result_tx
            .send(WorkResult {
                seq_id: item.seq_id,
                result,
            })
            .is_err()
        {
            break;
        }
    }
}

/// Emit results in chunk order, buffering out-of-order results.
///
/// Stops at the first failed chunk; chunks before it stay emitted.
fn emit_results_ordered<W: Write>(
    result_rx: Receiver<WorkResult>,
    emitter: &mut Emitter<'_, W>,
    metrics: &PerfMetrics,
) -> Result<()> {
    let mut pending: BTreeMap<u64, Result<ChunkResult>> = BTreeMap::new();
    let mut next_expected: u64 = 0;

    for item in result_rx {
        pending.insert(item.seq_id, item.result);
        metrics.update_max_pending(pending.len());

        while let Some(result) = pending.remove(&next_expected) {
            emitter.emit(result?)?;
            next_expected += 1;
        }
    }

    if !pending.is_empty() {
        anyhow::bail!("No result for chunk {}", next_expected);
    }
    Ok(())
}
