//! Parsers for array, probe and probe feature tables.
//!
//! All three are tab-separated, plain or gzip-compressed:
//! - arrays: `name, type, probe_set_size, external_db_id, external_db_name`
//! - probes: `probe_id, probe_set_name, array names (comma separated)`
//! - features: `region, start, end, strand, probe_id`

use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;

use crate::location::Location;
use crate::parser::util::{data_lines, open_reader, split_fields};
use crate::types::{ExternalDatabase, OligoArray, OligoFeature, OligoProbe, Strand};

/// Parse an arrays table.
pub fn parse_arrays(path: &Path) -> Result<Vec<OligoArray>> {
    parse_arrays_reader(open_reader(path)?)
        .with_context(|| format!("Failed to parse arrays file {}", path.display()))
}

fn parse_arrays_reader<R: BufRead>(reader: R) -> Result<Vec<OligoArray>> {
    let mut arrays = Vec::new();
    for line in data_lines(reader) {
        let (line_num, line) = line?;
        let fields = split_fields(&line, 5, line_num)?;

        arrays.push(OligoArray {
            name: fields[0].to_string(),
            array_type: fields[1].to_string(),
            probe_set_size: fields[2]
                .parse()
                .with_context(|| format!("line {}: bad probe set size", line_num))?,
            external_db: ExternalDatabase {
                id: fields[3]
                    .parse()
                    .with_context(|| format!("line {}: bad external db id", line_num))?,
                name: fields[4].to_string(),
            },
        });
    }
    Ok(arrays)
}

/// Parse a probes table.
pub fn parse_probes(path: &Path) -> Result<Vec<OligoProbe>> {
    parse_probes_reader(open_reader(path)?)
        .with_context(|| format!("Failed to parse probes file {}", path.display()))
}

fn parse_probes_reader<R: BufRead>(reader: R) -> Result<Vec<OligoProbe>> {
    let mut probes = Vec::new();
    for line in data_lines(reader) {
        let (line_num, line) = line?;
        let fields = split_fields(&line, 3, line_num)?;

        let array_names: Vec<String> = fields[2]
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if array_names.is_empty() {
            anyhow::bail!("line {}: probe {} is on no array", line_num, fields[0]);
        }

        probes.push(OligoProbe {
            id: fields[0]
                .parse()
                .with_context(|| format!("line {}: bad probe id", line_num))?,
            probe_set_name: fields[1].to_string(),
            array_names,
        });
    }
    Ok(probes)
}

/// Parse a probe features table; locations are on `coord_system`.
pub fn parse_features(path: &Path, coord_system: &str) -> Result<Vec<OligoFeature>> {
    parse_features_reader(open_reader(path)?, coord_system)
        .with_context(|| format!("Failed to parse features file {}", path.display()))
}

fn parse_features_reader<R: BufRead>(reader: R, coord_system: &str) -> Result<Vec<OligoFeature>> {
    let mut features = Vec::new();
    for line in data_lines(reader) {
        let (line_num, line) = line?;
        let fields = split_fields(&line, 5, line_num)?;

        let start: i64 = fields[1]
            .parse()
            .with_context(|| format!("line {}: bad start", line_num))?;
        let end: i64 = fields[2]
            .parse()
            .with_context(|| format!("line {}: bad end", line_num))?;
        let strand: Strand = fields[3]
            .parse()
            .with_context(|| format!("line {}: bad strand", line_num))?;
        let probe_id: u64 = fields[4]
            .parse()
            .with_context(|| format!("line {}: bad probe id", line_num))?;

        let location = Location::new(coord_system, fields[0], start, end, strand)
            .with_context(|| format!("line {}", line_num))?;
        features.push(OligoFeature::new(probe_id, location));
    }
    Ok(features)
}
