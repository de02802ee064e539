//! Region chunking.
//!
//! Splits the transcript collection into one [`Chunk`] per sequence region so
//! matching only ever deals with one region at a time.

use anyhow::Result;
use log::debug;
use rayon::prelude::*;

use crate::location::Location;
use crate::source::TranscriptSource;
use crate::types::MappableTranscript;

/// One sequence region's worth of work.
#[derive(Debug)]
pub struct Chunk {
    location: Location,
    transcripts: Vec<MappableTranscript>,
    sorted: bool,
}

impl Chunk {
    pub fn new(location: Location) -> Self {
        Chunk {
            location,
            transcripts: Vec::new(),
            sorted: true,
        }
    }

    pub fn with_transcripts(location: Location, transcripts: Vec<MappableTranscript>) -> Self {
        Chunk {
            location,
            transcripts,
            sorted: false,
        }
    }

    fn add(&mut self, transcript: MappableTranscript) {
        self.transcripts.push(transcript);
        self.sorted = false;
    }

    /// Bounding location of the chunk.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Transcripts on this chunk, sorted by location.
    pub fn transcripts(&mut self) -> &[MappableTranscript] {
        if !self.sorted {
            self.transcripts
                .par_sort_by(|a, b| a.location().cmp(b.location()));
            self.sorted = true;
        }
        &self.transcripts
    }

    /// Consume the chunk, returning its location and sorted transcripts.
    pub fn into_parts(mut self) -> (Location, Vec<MappableTranscript>) {
        self.transcripts();
        (self.location, self.transcripts)
    }
}

/// Partition `transcripts` into per-region chunks.
///
/// With a `filter` a single chunk covering exactly the filter is returned.
/// Otherwise transcripts are sorted, grouped by coordinate system and region,
/// each group bounded by the full region extent from `source`, and the chunks
/// ordered by descending extent length.
pub fn build_chunks(
    mut transcripts: Vec<MappableTranscript>,
    filter: Option<&Location>,
    source: &dyn TranscriptSource,
) -> Result<Vec<Chunk>> {
    if let Some(filter) = filter {
        return Ok(vec![Chunk::with_transcripts(filter.clone(), transcripts)]);
    }

    transcripts.par_sort_by(|a, b| a.location().cmp(b.location()));

    let mut chunks: Vec<Chunk> = Vec::new();
    for t in transcripts {
        let loc = t.location();
        let same_region = chunks.last().is_some_and(|c| {
            c.location.coord_system() == loc.coord_system()
                && c.location.seq_region() == loc.seq_region()
        });

        if !same_region {
            let extent = source.region_extent(loc.coord_system(), loc.seq_region())?;
            debug!("New chunk for region {}", extent);
            chunks.push(Chunk::new(extent));
        }

        if let Some(chunk) = chunks.last_mut() {
            chunk.add(t);
        }
    }

    // Input was sorted, so every chunk already is.
    for chunk in &mut chunks {
        chunk.sorted = true;
    }

    chunks.sort_by(|a, b| b.location.length().cmp(&a.location.length()));

    Ok(chunks)
}
