//! Matching of probe features to transcripts.

pub mod classify;
pub mod sweep;

pub use classify::{
    classify_hit, classify_probe_sets, exon_flank_threshold, mark_promiscuous_probe_sets,
    HitKind, MappingStatus,
};
pub use sweep::{map_transcripts_to_features, SweepStats};
