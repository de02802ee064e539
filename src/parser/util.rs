//! Utility functions for file parsing.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Creates a buffered reader that automatically handles gzip-compressed files.
///
/// This function checks if the file path ends with ".gz" and wraps the file
/// in a GzDecoder if so. Otherwise, it returns a plain buffered reader.
pub fn create_buffered_reader(file: File, path: &Path) -> Box<dyn BufRead + Send> {
    if path.to_string_lossy().ends_with(".gz") {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    }
}

/// Open `path` for buffered reading, decompressing `.gz` files.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(create_buffered_reader(file, path))
}

/// Non-empty, non-comment lines of `reader` with their 1-based line numbers.
pub fn data_lines<R: BufRead>(reader: R) -> impl Iterator<Item = Result<(usize, String)>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(i, line)| match line {
            Ok(line) if line.trim().is_empty() || line.starts_with('#') => None,
            Ok(line) => Some(Ok((i + 1, line))),
            Err(e) => Some(Err(anyhow::Error::from(e).context(format!("Failed to read line {}", i + 1)))),
        })
}

/// Split a tab-separated line, requiring at least `min` fields.
pub fn split_fields(line: &str, min: usize, line_num: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < min {
        anyhow::bail!(
            "line {}: expected at least {} tab-separated fields, found {}",
            line_num,
            min,
            fields.len()
        );
    }
    Ok(fields)
}
