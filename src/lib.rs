//! probemapper - Microarray probe set to transcript mapping library.
//!
//! This library maps the genomic hits of microarray probes to transcripts and
//! decides, per probe set and transcript, whether enough probes land in the
//! transcript's exons (or its downstream flank) to call the pair mapped.
//!
//! # Features
//!
//! - Parse GTF transcripts and array/probe/feature tables (with gzip support)
//! - Chunk work by sequence region and cache loaded oligo data per chunk
//! - Sort-merge sweep between features and transcripts, no all-pairs scan
//! - Classify hits as exon-flank, intron or antisense; flag promiscuous probe sets
//! - Write an audit log and store mapped pairs as xrefs
//!
//! # Example
//!
//! ```ignore
//! use probemapper::cache::NoCache;
//! use probemapper::config::Config;
//! use probemapper::parser::{load_oligo_source, load_transcript_source};
//! use probemapper::pipeline::run;
//! use probemapper::store::MemoryXrefStore;
//! use std::path::Path;
//!
//! let config = Config::default();
//! let transcripts = load_transcript_source(
//!     Path::new("genes.gtf"),
//!     Path::new("regions.tsv"),
//!     "chromosome",
//!     "transcript_id",
//! )?;
//! let oligos = load_oligo_source(
//!     Path::new("arrays.tsv"),
//!     Path::new("probes.tsv"),
//!     Path::new("features.tsv"),
//!     "chromosome",
//! )?;
//! let mut store = MemoryXrefStore::new();
//! let summary = run(
//!     &config,
//!     &transcripts,
//!     &oligos,
//!     &NoCache,
//!     &mut store,
//!     || Ok(std::io::stdout()),
//!     1,
//! )?;
//! ```

pub mod cache;
pub mod chunk;
pub mod config;
pub mod error;
pub mod loader;
pub mod location;
pub mod matcher;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod probeset;
pub mod source;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::MapperError;
pub use location::Location;
pub use matcher::MappingStatus;
pub use probeset::{OligoData, ProbeSet};
pub use types::{MappableOligoFeature, MappableTranscript, Strand};
