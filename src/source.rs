//! Data-access interfaces.
//!
//! The mapping core only talks to these traits. In-memory implementations are
//! provided; the [`crate::parser`] module fills them from files.

use ahash::AHashMap;
use anyhow::Result;

use crate::error::MapperError;
use crate::location::Location;
use crate::types::{OligoArray, OligoFeature, OligoProbe, SourceTranscript, Strand};

/// Source of arrays, probes and probe features.
pub trait OligoSource: Sync {
    /// All known arrays.
    fn fetch_arrays(&self) -> Result<Vec<OligoArray>>;

    /// Features overlapping `location`, ignoring strand.
    fn fetch_features(&self, location: &Location) -> Result<Vec<OligoFeature>>;

    /// Probes with the given ids. Unknown ids are left out.
    fn fetch_probes(&self, ids: &[u64]) -> Result<Vec<OligoProbe>>;
}

/// Source of transcripts and sequence region geometry.
pub trait TranscriptSource: Sync {
    /// All transcripts, or those overlapping `filter`.
    fn fetch_transcripts(&self, filter: Option<&Location>) -> Result<Vec<SourceTranscript>>;

    /// Full extent of a sequence region.
    fn region_extent(&self, coord_system: &str, seq_region: &str) -> Result<Location>;
}

type RegionKey = (String, String);

/// Oligo data held in memory, features grouped by region and sorted by start.
#[derive(Debug, Clone, Default)]
pub struct MemoryOligoSource {
    arrays: Vec<OligoArray>,
    probes: AHashMap<u64, OligoProbe>,
    features: AHashMap<RegionKey, Vec<OligoFeature>>,
}

impl MemoryOligoSource {
    pub fn new(
        arrays: Vec<OligoArray>,
        probes: Vec<OligoProbe>,
        features: Vec<OligoFeature>,
    ) -> Self {
        let probes = probes.into_iter().map(|p| (p.id, p)).collect();

        let mut by_region: AHashMap<RegionKey, Vec<OligoFeature>> = AHashMap::new();
        for f in features {
            let key = (
                f.location.coord_system().to_string(),
                f.location.seq_region().to_string(),
            );
            by_region.entry(key).or_default().push(f);
        }
        for list in by_region.values_mut() {
            list.sort_by(|a, b| a.location.cmp(&b.location));
        }

        MemoryOligoSource {
            arrays,
            probes,
            features: by_region,
        }
    }

    pub fn num_features(&self) -> usize {
        self.features.values().map(Vec::len).sum()
    }
}

impl OligoSource for MemoryOligoSource {
    fn fetch_arrays(&self) -> Result<Vec<OligoArray>> {
        Ok(self.arrays.clone())
    }

    fn fetch_features(&self, location: &Location) -> Result<Vec<OligoFeature>> {
        let key = (
            location.coord_system().to_string(),
            location.seq_region().to_string(),
        );
        let Some(features) = self.features.get(&key) else {
            return Ok(Vec::new());
        };

        let stop = features.partition_point(|f| f.location.start() <= location.end());
        Ok(features[..stop]
            .iter()
            .filter(|f| f.location.overlaps(location, false))
            .cloned()
            .collect())
    }

    fn fetch_probes(&self, ids: &[u64]) -> Result<Vec<OligoProbe>> {
        Ok(ids.iter().filter_map(|id| self.probes.get(id)).cloned().collect())
    }
}

/// Transcripts and region lengths held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTranscriptSource {
    transcripts: Vec<SourceTranscript>,
    regions: AHashMap<RegionKey, i64>,
}

impl MemoryTranscriptSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transcript(&mut self, transcript: SourceTranscript) {
        self.transcripts.push(transcript);
    }

    /// Register a sequence region of `length` bases.
    pub fn add_region(&mut self, coord_system: &str, seq_region: &str, length: i64) {
        self.regions
            .insert((coord_system.to_string(), seq_region.to_string()), length);
    }

    pub fn num_transcripts(&self) -> usize {
        self.transcripts.len()
    }
}

impl TranscriptSource for MemoryTranscriptSource {
    fn fetch_transcripts(&self, filter: Option<&Location>) -> Result<Vec<SourceTranscript>> {
        Ok(match filter {
            Some(filter) => self
                .transcripts
                .iter()
                .filter(|t| t.location.overlaps(filter, false))
                .cloned()
                .collect(),
            None => self.transcripts.clone(),
        })
    }

    fn region_extent(&self, coord_system: &str, seq_region: &str) -> Result<Location> {
        let key = (coord_system.to_string(), seq_region.to_string());
        match self.regions.get(&key) {
            Some(&length) if length > 0 => Ok(Location::new(
                coord_system,
                seq_region,
                1,
                length,
                Strand::Unknown,
            )?),
            _ => Err(MapperError::UnknownRegion {
                coord_system: coord_system.to_string(),
                seq_region: seq_region.to_string(),
            }
            .into()),
        }
    }
}

/// Resolve a location filter given on the command line.
///
/// `coord_system:region` selects the whole region, bounded by its extent in
/// `source`. Anything else must parse as a [`Location`].
pub fn resolve_location(text: &str, source: &dyn TranscriptSource) -> Result<Location> {
    if let Some((coord_system, seq_region)) = text.split_once(':') {
        if !coord_system.is_empty() && !seq_region.is_empty() && !seq_region.contains(':') {
            return source.region_extent(coord_system, seq_region);
        }
    }
    Ok(text.parse::<Location>()?)
}
