//! Parsers for the file-backed data sources.

pub mod gtf;
pub mod oligo;
pub mod regions;
pub mod util;

pub use gtf::parse_gtf;
pub use oligo::{parse_arrays, parse_features, parse_probes};
pub use regions::parse_regions;
pub use util::open_reader;

use anyhow::Result;
use log::info;
use std::path::Path;

use crate::source::{MemoryOligoSource, MemoryTranscriptSource};

/// Build a transcript source from a GTF file and a region length table.
pub fn load_transcript_source(
    gtf: &Path,
    regions: &Path,
    coord_system: &str,
    transcript_id_tag: &str,
) -> Result<MemoryTranscriptSource> {
    let mut source = MemoryTranscriptSource::new();
    for (name, length) in parse_regions(regions)? {
        source.add_region(coord_system, &name, length);
    }
    for transcript in parse_gtf(gtf, coord_system, transcript_id_tag)? {
        source.add_transcript(transcript);
    }
    info!(
        "Read {} transcripts from {}",
        source.num_transcripts(),
        gtf.display()
    );
    Ok(source)
}

/// Build an oligo source from array, probe and feature tables.
pub fn load_oligo_source(
    arrays: &Path,
    probes: &Path,
    features: &Path,
    coord_system: &str,
) -> Result<MemoryOligoSource> {
    let arrays = parse_arrays(arrays)?;
    let probes = parse_probes(probes)?;
    let num_probes = probes.len();
    let source = MemoryOligoSource::new(arrays, probes, parse_features(features, coord_system)?);
    info!(
        "Read {} probes and {} probe features",
        num_probes,
        source.num_features()
    );
    Ok(source)
}
