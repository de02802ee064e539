//! Core data structures for probemapper.
//!
//! This module contains the records consumed from the data sources (arrays,
//! probes, features, transcripts) and the mappable wrappers the matching
//! engine works on.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MapperError;
use crate::location::Location;

/// Index of a transcript inside its chunk's sorted transcript array.
pub type TranscriptId = usize;

/// Index of a feature inside an [`crate::probeset::OligoData`] arena.
pub type FeatureId = usize;

/// Index of a probe set inside an [`crate::probeset::OligoData`] map.
pub type ProbeSetId = usize;

/// Strand orientation for genomic features.
///
/// Variant order matches the numeric encoding (-1, 0, +1) and is used when
/// ordering locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    Negative,
    Unknown,
    Positive,
}

/// Error type for parsing strand from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStrandError;

impl fmt::Display for ParseStrandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid strand: expected one of '+', '-', '.', '1', '-1', '0'")
    }
}

impl std::error::Error for ParseStrandError {}

impl FromStr for Strand {
    type Err = ParseStrandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" | "1" | "+1" => Ok(Strand::Positive),
            "-" | "-1" => Ok(Strand::Negative),
            "." | "0" | "?" => Ok(Strand::Unknown),
            _ => Err(ParseStrandError),
        }
    }
}

impl Strand {
    /// Numeric representation (+1, -1, 0).
    pub fn as_i8(&self) -> i8 {
        match self {
            Strand::Positive => 1,
            Strand::Negative => -1,
            Strand::Unknown => 0,
        }
    }

    /// True if both strands are known and differ.
    pub fn is_opposite(&self, other: Strand) -> bool {
        matches!(
            (self, other),
            (Strand::Positive, Strand::Negative) | (Strand::Negative, Strand::Positive)
        )
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// External database owning the probe sets of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalDatabase {
    pub id: u32,
    pub name: String,
}

/// A microarray design.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OligoArray {
    pub name: String,
    /// Array vendor type, e.g. "AFFY".
    pub array_type: String,
    /// Number of probes in each probe set on this array.
    pub probe_set_size: u32,
    pub external_db: ExternalDatabase,
}

/// Arrays indexed by name.
#[derive(Debug, Clone, Default)]
pub struct ArrayRegistry {
    arrays: AHashMap<String, OligoArray>,
}

impl ArrayRegistry {
    pub fn new(arrays: Vec<OligoArray>) -> Self {
        ArrayRegistry {
            arrays: arrays.into_iter().map(|a| (a.name.clone(), a)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&OligoArray, MapperError> {
        self.arrays
            .get(name)
            .ok_or_else(|| MapperError::UnknownArray(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// A single oligo probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OligoProbe {
    pub id: u64,
    pub probe_set_name: String,
    /// Names of the arrays containing this probe.
    pub array_names: Vec<String>,
}

/// A probe's hit on the genome, as delivered by the data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OligoFeature {
    pub probe_id: u64,
    pub location: Location,
}

impl OligoFeature {
    pub fn new(probe_id: u64, location: Location) -> Self {
        OligoFeature { probe_id, location }
    }

    /// Hit length in bases.
    pub fn length(&self) -> i64 {
        self.location.length()
    }
}

/// A transcript as delivered by the data source, before flanking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTranscript {
    pub id: u64,
    pub accession: String,
    /// Genomic span of the transcript.
    pub location: Location,
    /// Exons of the transcript on the same region and strand.
    pub cdna_location: Location,
}

/// A transcript with its downstream flank applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappableTranscript {
    pub id: u64,
    pub accession: String,
    location: Location,
    cdna_location: Location,
}

impl MappableTranscript {
    /// Derive a mappable transcript by extending both the span and the
    /// exons by `flank` bases at the 3' end.
    pub fn new(source: SourceTranscript, flank: i64) -> Result<Self, MapperError> {
        if flank < 0 {
            return Err(MapperError::InvalidConfig(format!(
                "downstream flank must be >= 0, got {}",
                flank
            )));
        }

        let location = source.location.extend_downstream(flank);
        let cdna_location = source.cdna_location.extend_downstream(flank);

        if cdna_location.overlap_size(&location, true) != cdna_location.length() {
            return Err(MapperError::InconsistentTranscript {
                accession: source.accession,
                cdna: cdna_location.to_string(),
                extent: location.to_string(),
            });
        }

        Ok(MappableTranscript {
            id: source.id,
            accession: source.accession,
            location,
            cdna_location,
        })
    }

    /// Transcript span plus flank.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Exons plus flank.
    pub fn cdna_location(&self) -> &Location {
        &self.cdna_location
    }
}

/// A probe hit wrapped for matching.
///
/// Holds its owning probe set and the transcripts it has been matched to as
/// indices, so ownership stays acyclic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappableOligoFeature {
    pub location: Location,
    pub probe_set: ProbeSetId,
    transcripts: Vec<TranscriptId>,
}

impl MappableOligoFeature {
    pub fn new(location: Location, probe_set: ProbeSetId) -> Self {
        MappableOligoFeature {
            location,
            probe_set,
            transcripts: Vec::new(),
        }
    }

    /// Hit length in bases.
    pub fn length(&self) -> i64 {
        self.location.length()
    }

    /// Transcripts this feature has been matched to, in match order.
    pub fn transcripts(&self) -> &[TranscriptId] {
        &self.transcripts
    }

    pub(crate) fn push_transcript(&mut self, transcript: TranscriptId) {
        self.transcripts.push(transcript);
    }
}
