//! CLI entry point for probemapper.
//!
//! Maps microarray probe sets to transcripts and records the mapped pairs as
//! cross-references in the working directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, LevelFilter, Log, Metadata, Record};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use probemapper::cache::{DataCache, FileCache, NoCache};
use probemapper::config::{
    Config, DEFAULT_ARRAY_TYPE, DEFAULT_COORD_SYSTEM, DEFAULT_LOG_FILENAME, EVENT_LOG_FILENAME,
};
use probemapper::parser::{load_oligo_source, load_transcript_source};
use probemapper::pipeline::run;
use probemapper::source::resolve_location;
use probemapper::store::TsvXrefStore;

/// Microarray probe set to transcript mapping tool.
///
/// Classifies every probe set / transcript overlap as mapped or not, writes an
/// audit log line per pair and stores mapped pairs as xrefs.
#[derive(Parser, Debug)]
#[command(name = "probemapper")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GTF annotation file with the transcripts to map
    #[arg(short = 'g', long = "gtf")]
    gtf: PathBuf,

    /// Sequence region lengths (name<TAB>length)
    #[arg(short = 'r', long = "regions")]
    regions: PathBuf,

    /// Arrays table (name, type, probe set size, external db id, external db name)
    #[arg(short = 'a', long = "arrays")]
    arrays: PathBuf,

    /// Probes table (probe id, probe set name, array names)
    #[arg(short = 'p', long = "probes")]
    probes: PathBuf,

    /// Probe features table (region, start, end, strand, probe id)
    #[arg(short = 'f', long = "features")]
    features: PathBuf,

    /// Working directory for the log, cache files and xref tables
    #[arg(short = 'd', long = "dir", default_value = ".")]
    dir: PathBuf,

    /// Only map transcripts and probes in this location, e.g. chromosome:22:20m-21m
    #[arg(short = 'l', long = "location")]
    location: Option<String>,

    /// Downstream flank in bp added to the 3' end of transcripts
    #[arg(long = "flank", default_value = "2000")]
    flank: i64,

    /// Percentage of a probe set that must hit exons or flank (0-100]
    #[arg(short = 't', long = "threshold", default_value = "50")]
    threshold: f64,

    /// Probe sets hitting more transcripts than this are never mapped
    #[arg(short = 'm', long = "max-transcripts", default_value = "100")]
    max_transcripts: usize,

    /// Audit log file name inside the working directory
    #[arg(long = "log-file", default_value = DEFAULT_LOG_FILENAME)]
    log_file: String,

    /// Map even if the xref store already contains xrefs
    #[arg(long = "skip-xref-check")]
    skip_xref_check: bool,

    /// Do not read or write oligo data cache files
    #[arg(long = "no-cache")]
    no_cache: bool,

    /// Coordinate system name for all inputs
    #[arg(long = "coord-system", default_value = DEFAULT_COORD_SYSTEM)]
    coord_system: String,

    /// Array type to map
    #[arg(long = "array-type", default_value = DEFAULT_ARRAY_TYPE)]
    array_type: String,

    /// GTF tag for transcript ID
    #[arg(short = 'T', long = "transcript", default_value = "transcript_id")]
    transcript_tag: String,

    /// Number of worker threads (0 = auto-detect, 1 = sequential)
    #[arg(long = "threads", short = 'j', default_value = "1")]
    threads: usize,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Sends each record to the console logger and the event log file.
struct TeeLogger {
    console: env_logger::Logger,
    file: env_logger::Logger,
}

impl Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.console.enabled(metadata) || self.file.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.console.log(record);
        self.file.log(record);
    }

    fn flush(&self) {
        self.console.flush();
        self.file.flush();
    }
}

/// Console at warn (info with -v, debug with -vv, or RUST_LOG); the event
/// log in `dir` always gets info and up.
fn init_logging(verbose: u8, dir: &Path) -> Result<()> {
    let console = env_logger::Builder::new()
        .filter_level(match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        })
        .parse_default_env()
        .build();

    let path = dir.join(EVENT_LOG_FILENAME);
    let event_log = File::create(&path)
        .with_context(|| format!("Failed to create event log {}", path.display()))?;
    let file = env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(event_log)))
        .build();

    log::set_max_level(console.filter().max(file.filter()));
    log::set_boxed_logger(Box::new(TeeLogger { console, file }))
        .context("Failed to install logger")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Validate inputs
    for (what, path) in [
        ("GTF", &args.gtf),
        ("Regions", &args.regions),
        ("Arrays", &args.arrays),
        ("Probes", &args.probes),
        ("Features", &args.features),
    ] {
        if !path.exists() {
            bail!("{} file not found: {}", what, path.display());
        }
    }

    fs::create_dir_all(&args.dir)
        .with_context(|| format!("Failed to create working directory {}", args.dir.display()))?;
    init_logging(args.verbose, &args.dir)?;

    // Build configuration
    let mut config = Config::new();
    config.set_threshold_percent(args.threshold)?;
    config.set_flank(args.flank)?;
    config.max_transcripts_per_probe_set = args.max_transcripts;
    config.array_type = args.array_type.clone();
    config.coord_system = args.coord_system.clone();
    config.transcript_id_tag = args.transcript_tag.clone();
    config.working_dir = args.dir.clone();
    config.log_filename = args.log_file.clone();
    config.skip_xref_check = args.skip_xref_check;
    config.use_cache = !args.no_cache;

    let transcripts = load_transcript_source(
        &args.gtf,
        &args.regions,
        &config.coord_system,
        &config.transcript_id_tag,
    )?;

    if let Some(text) = &args.location {
        let location = resolve_location(text, &transcripts)
            .with_context(|| format!("Invalid location filter: {}", text))?;
        config.location_filter = Some(location);
    }
    config.validate()?;
    info!("{}", config.describe());

    let oligos = load_oligo_source(
        &args.arrays,
        &args.probes,
        &args.features,
        &config.coord_system,
    )?;

    let file_cache;
    let cache: &dyn DataCache = if config.use_cache {
        file_cache = FileCache::new(&config.working_dir);
        &file_cache
    } else {
        &NoCache
    };

    let mut store = TsvXrefStore::open(&config.working_dir)?;

    // Determine thread count
    let num_threads = if args.threads == 0 {
        num_cpus::get()
    } else {
        args.threads
    };

    let log_path = config.log_path();
    let summary = run(
        &config,
        &transcripts,
        &oligos,
        cache,
        &mut store,
        || {
            let file = File::create(&log_path)
                .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
            Ok(BufWriter::new(file))
        },
        num_threads,
    )?;

    eprintln!(
        "Done! {} of {} probe set / transcript pairs mapped, log written to {}",
        summary.mapped,
        summary.pairs,
        log_path.display()
    );
    Ok(())
}
