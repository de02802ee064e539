//! Genomic locations.
//!
//! A [`Location`] is one or more 1-based inclusive spans on a single sequence
//! region of a coordinate system, with a strand. Multi-span locations model
//! exon sets; overlap sizes are summed across span pairs.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::MapperError;
use crate::types::Strand;

/// A 1-based inclusive coordinate range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: i64,
    pub end: i64,
}

impl Span {
    /// Create a span, rejecting start < 1 or start > end.
    pub fn new(start: i64, end: i64) -> Result<Self, MapperError> {
        if start < 1 || start > end {
            return Err(MapperError::InvalidSpan { start, end });
        }
        Ok(Span { start, end })
    }

    /// Span length (end - start + 1).
    pub fn length(&self) -> i64 {
        self.end - self.start + 1
    }

    /// Number of bases shared with `other`.
    fn intersection(&self, other: &Span) -> i64 {
        if self.start <= other.end && self.end >= other.start {
            self.end.min(other.end) - self.start.max(other.start) + 1
        } else {
            0
        }
    }
}

/// A stranded set of spans on one sequence region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    coord_system: String,
    seq_region: String,
    /// Ascending by start, never empty.
    spans: Vec<Span>,
    strand: Strand,
}

impl Location {
    /// Create a single-span location.
    pub fn new(
        coord_system: &str,
        seq_region: &str,
        start: i64,
        end: i64,
        strand: Strand,
    ) -> Result<Self, MapperError> {
        Ok(Location {
            coord_system: coord_system.to_string(),
            seq_region: seq_region.to_string(),
            spans: vec![Span::new(start, end)?],
            strand,
        })
    }

    /// Create a location from `(start, end)` pairs. Spans are sorted by start.
    pub fn from_spans(
        coord_system: &str,
        seq_region: &str,
        spans: Vec<(i64, i64)>,
        strand: Strand,
    ) -> Result<Self, MapperError> {
        if spans.is_empty() {
            return Err(MapperError::InvalidLocation {
                input: format!("{}:{}", coord_system, seq_region),
                reason: "location has no spans".to_string(),
            });
        }

        let mut spans = spans
            .into_iter()
            .map(|(s, e)| Span::new(s, e))
            .collect::<Result<Vec<_>, _>>()?;
        spans.sort();

        Ok(Location {
            coord_system: coord_system.to_string(),
            seq_region: seq_region.to_string(),
            spans,
            strand,
        })
    }

    pub fn coord_system(&self) -> &str {
        &self.coord_system
    }

    pub fn seq_region(&self) -> &str {
        &self.seq_region
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Lowest covered position.
    pub fn start(&self) -> i64 {
        self.spans[0].start
    }

    /// Highest covered position.
    pub fn end(&self) -> i64 {
        self.spans[self.spans.len() - 1].end
    }

    /// Total number of bases over all spans.
    pub fn length(&self) -> i64 {
        self.spans.iter().map(Span::length).sum()
    }

    /// True if both locations are on the same coordinate system and region.
    pub fn same_region(&self, other: &Location) -> bool {
        self.seq_region == other.seq_region && self.coord_system == other.coord_system
    }

    fn strands_compatible(&self, other: &Location) -> bool {
        self.strand == other.strand
            || self.strand == Strand::Unknown
            || other.strand == Strand::Unknown
    }

    /// Check whether any span of this location intersects any span of `other`.
    ///
    /// With `strand_sensitive` the strands must be equal or one of them unknown.
    pub fn overlaps(&self, other: &Location, strand_sensitive: bool) -> bool {
        if !self.same_region(other) || (strand_sensitive && !self.strands_compatible(other)) {
            return false;
        }
        if self.start() > other.end() || self.end() < other.start() {
            return false;
        }
        self.spans
            .iter()
            .any(|x| other.spans.iter().any(|y| x.intersection(y) > 0))
    }

    /// Number of bases shared with `other`, summed over all span pairs.
    ///
    /// Returns 0 when the locations do not overlap under the strand rule.
    pub fn overlap_size(&self, other: &Location, strand_sensitive: bool) -> i64 {
        if !self.same_region(other) || (strand_sensitive && !self.strands_compatible(other)) {
            return 0;
        }
        if self.start() > other.end() || self.end() < other.start() {
            return 0;
        }
        self.spans
            .iter()
            .map(|x| other.spans.iter().map(|y| x.intersection(y)).sum::<i64>())
            .sum()
    }

    /// Extend the 3' end by `flank` bases.
    ///
    /// Positive and unknown strands grow the last span's end; the negative
    /// strand grows the first span's start, clamped at position 1.
    pub fn extend_downstream(&self, flank: i64) -> Location {
        let mut extended = self.clone();
        if flank <= 0 {
            return extended;
        }
        match self.strand {
            Strand::Negative => {
                let first = &mut extended.spans[0];
                first.start = (first.start - flank).max(1);
            }
            Strand::Positive | Strand::Unknown => {
                let last = extended.spans.len() - 1;
                extended.spans[last].end += flank;
            }
        }
        extended
    }
}

impl Ord for Location {
    /// Coordinate system, region, then per span start, end and strand, then
    /// span count.
    fn cmp(&self, other: &Self) -> Ordering {
        self.coord_system
            .cmp(&other.coord_system)
            .then_with(|| self.seq_region.cmp(&other.seq_region))
            .then_with(|| {
                for (x, y) in self.spans.iter().zip(other.spans.iter()) {
                    let ord = x
                        .start
                        .cmp(&y.start)
                        .then(x.end.cmp(&y.end))
                        .then(self.strand.cmp(&other.strand));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                self.spans.len().cmp(&other.spans.len())
            })
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spans: Vec<String> = self
            .spans
            .iter()
            .map(|s| format!("{}-{}", s.start, s.end))
            .collect();
        write!(
            f,
            "{}:{}:{}:{}",
            self.coord_system,
            self.seq_region,
            spans.join(","),
            self.strand
        )
    }
}

/// Parse a position, accepting `k` and `m` suffixes (e.g. `20m`).
fn parse_position(s: &str) -> Option<i64> {
    let lower = s.to_ascii_lowercase();
    let (digits, factor) = if let Some(d) = lower.strip_suffix('m') {
        (d, 1_000_000)
    } else if let Some(d) = lower.strip_suffix('k') {
        (d, 1_000)
    } else {
        (lower.as_str(), 1)
    };
    digits.parse::<i64>().ok().map(|v| v * factor)
}

impl FromStr for Location {
    type Err = MapperError;

    /// Parse `coord_system:region:start-end[,start-end...][:strand]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| MapperError::InvalidLocation {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() < 3 || parts.len() > 4 {
            return Err(invalid("expected coord_system:region:start-end[:strand]"));
        }
        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(invalid("empty coordinate system or region name"));
        }

        let mut spans = Vec::new();
        for range in parts[2].split(',') {
            let (start, end) = range
                .split_once('-')
                .ok_or_else(|| invalid("range must be start-end"))?;
            let start = parse_position(start).ok_or_else(|| invalid("bad start position"))?;
            let end = parse_position(end).ok_or_else(|| invalid("bad end position"))?;
            spans.push((start, end));
        }

        let strand = match parts.get(3) {
            Some(text) => text.parse::<Strand>().map_err(|_| invalid("bad strand"))?,
            None => Strand::Unknown,
        };

        Location::from_spans(parts[0], parts[1], spans, strand)
    }
}
