//! Sequence region length table: `name<TAB>length`.

use anyhow::{bail, Context, Result};
use std::io::BufRead;
use std::path::Path;

use crate::parser::util::{data_lines, open_reader, split_fields};

/// Parse a region length table into `(name, length)` pairs.
pub fn parse_regions(path: &Path) -> Result<Vec<(String, i64)>> {
    parse_regions_reader(open_reader(path)?)
        .with_context(|| format!("Failed to parse regions file {}", path.display()))
}

fn parse_regions_reader<R: BufRead>(reader: R) -> Result<Vec<(String, i64)>> {
    let mut regions = Vec::new();
    for line in data_lines(reader) {
        let (line_num, line) = line?;
        let fields = split_fields(&line, 2, line_num)?;
        let length: i64 = fields[1]
            .trim()
            .parse()
            .with_context(|| format!("line {}: bad region length", line_num))?;
        if length < 1 {
            bail!("line {}: region {} has length {}", line_num, fields[0], length);
        }
        regions.push((fields[0].to_string(), length));
    }
    Ok(regions)
}
