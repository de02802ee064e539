//! Configuration and defaults for probemapper.
//!
//! This module contains the configuration structure and default values
//! that control how probe sets are mapped to transcripts.

use std::path::PathBuf;

use crate::error::MapperError;
use crate::location::Location;

/// Default fraction of a probe set that must hit exons or flank.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Default maximum number of transcripts a probe set may hit.
pub const DEFAULT_MAX_TRANSCRIPTS_PER_PROBE_SET: usize = 100;

/// Default downstream flank in bp.
pub const DEFAULT_DOWNSTREAM_FLANK: i64 = 2000;

/// Only probes on arrays of this type are mapped by default.
pub const DEFAULT_ARRAY_TYPE: &str = "AFFY";

/// Coordinate system assumed for file inputs.
pub const DEFAULT_COORD_SYSTEM: &str = "chromosome";

/// Default name of the probe set / transcript audit log.
pub const DEFAULT_LOG_FILENAME: &str = "probeset2transcript.log";

/// Name of the event log written next to the audit log.
pub const EVENT_LOG_FILENAME: &str = "probe_mapper.log";

/// Configuration for the mapping process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fraction (0-1] of a probe set's probes that must hit exons or flank.
    pub threshold: f64,
    /// Probe sets hitting more transcripts than this are never mapped.
    pub max_transcripts_per_probe_set: usize,
    /// Bases appended at the 3' end of every transcript and its exons.
    pub downstream_flank: i64,
    /// Array type to map; probes on any other type are ignored.
    pub array_type: String,
    /// Coordinate system name given to file inputs.
    pub coord_system: String,
    /// GTF tag for transcript accession.
    pub transcript_id_tag: String,
    /// Directory for the audit log, cache files and xref tables.
    pub working_dir: PathBuf,
    /// Audit log file name, relative to `working_dir`.
    pub log_filename: String,
    /// Only map transcripts and probes in this location.
    pub location_filter: Option<Location>,
    /// Skip the check for xrefs already present in the output store.
    pub skip_xref_check: bool,
    /// Read and write oligo data cache files.
    pub use_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            threshold: DEFAULT_THRESHOLD,
            max_transcripts_per_probe_set: DEFAULT_MAX_TRANSCRIPTS_PER_PROBE_SET,
            downstream_flank: DEFAULT_DOWNSTREAM_FLANK,
            array_type: DEFAULT_ARRAY_TYPE.to_string(),
            coord_system: DEFAULT_COORD_SYSTEM.to_string(),
            transcript_id_tag: "transcript_id".to_string(),
            working_dir: PathBuf::from("."),
            log_filename: DEFAULT_LOG_FILENAME.to_string(),
            location_filter: None,
            skip_xref_check: false,
            use_cache: true,
        }
    }
}

impl Config {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mapping threshold from a percentage (e.g. 60 for 60%).
    pub fn set_threshold_percent(&mut self, percent: f64) -> Result<(), MapperError> {
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(MapperError::InvalidConfig(format!(
                "threshold must be in (0, 100], got {}",
                percent
            )));
        }
        self.threshold = percent / 100.0;
        Ok(())
    }

    /// Set the downstream flank in bp.
    pub fn set_flank(&mut self, flank: i64) -> Result<(), MapperError> {
        if flank < 0 {
            return Err(MapperError::InvalidConfig(format!(
                "downstream flank must be >= 0, got {}",
                flank
            )));
        }
        self.downstream_flank = flank;
        Ok(())
    }

    /// Check every setting before any data is loaded.
    pub fn validate(&self) -> Result<(), MapperError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(MapperError::InvalidConfig(format!(
                "threshold must be in (0, 1], got {}",
                self.threshold
            )));
        }
        if self.downstream_flank < 0 {
            return Err(MapperError::InvalidConfig(format!(
                "downstream flank must be >= 0, got {}",
                self.downstream_flank
            )));
        }
        if self.array_type.is_empty() {
            return Err(MapperError::InvalidConfig(
                "array type must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Path of the audit log.
    pub fn log_path(&self) -> PathBuf {
        self.working_dir.join(&self.log_filename)
    }

    /// Multi-line summary logged at startup.
    pub fn describe(&self) -> String {
        let filter = self
            .location_filter
            .as_ref()
            .map(|l| l.to_string())
            .unwrap_or_else(|| "all".to_string());
        format!(
            "probemapper configuration:\n\
             ==========================\n\
             Location filter: {}\n\
             Down stream flank: {}\n\
             Mapping overlap threshold: {:.0}%\n\
             Max transcripts per probe set: {}\n\
             Array type: {}\n\
             Working directory: {}\n\
             ==========================",
            filter,
            self.downstream_flank,
            self.threshold * 100.0,
            self.max_transcripts_per_probe_set,
            self.array_type,
            self.working_dir.display()
        )
    }
}
