//! Error types for probemapper.
//!
//! Domain failures raised by the mapping core. File and orchestration code
//! wraps these in `anyhow` with context.

use thiserror::Error;

/// Errors raised while building, matching or classifying mapping data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapperError {
    /// A location string could not be parsed.
    #[error("invalid location '{input}': {reason}")]
    InvalidLocation { input: String, reason: String },

    /// A span with start > end or a non-positive start.
    #[error("invalid span {start}-{end}: start must be >= 1 and <= end")]
    InvalidSpan { start: i64, end: i64 },

    /// The extent of a sequence region could not be resolved.
    #[error("cannot resolve extent of sequence region {coord_system}:{seq_region}")]
    UnknownRegion {
        coord_system: String,
        seq_region: String,
    },

    /// A transcript whose cDNA location does not sit inside its extent.
    #[error("transcript {accession}: cDNA location {cdna} is not contained in {extent}")]
    InconsistentTranscript {
        accession: String,
        cdna: String,
        extent: String,
    },

    /// Configuration values outside their allowed range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A feature refers to a probe the data source does not know about.
    #[error("unknown probe id {0}")]
    UnknownProbe(u64),

    /// A probe or probe set refers to an array the data source does not know about.
    #[error("unknown oligo array '{0}'")]
    UnknownArray(String),

    /// A probe set without any array, so no probe set size can be read.
    #[error("probe set '{0}' is not on any array")]
    ProbeSetWithoutArray(String),

    /// A full-length hit that fits none of the exon-flank, intron or
    /// reverse-strand buckets.
    #[error(
        "unclassified hit: probe set {probe_set}, transcript {transcript}, feature {feature}"
    )]
    UnclassifiedHit {
        probe_set: String,
        transcript: String,
        feature: String,
    },
}
