//! GTF file parser with gzip support.
//!
//! Reads transcripts from GTF (Gene Transfer Format) annotation files. Exon
//! rows give a transcript's cDNA spans; a transcript row, when present, gives
//! its genomic span, otherwise the span is the hull of its exons.

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use std::io::BufRead;
use std::path::Path;

use crate::location::Location;
use crate::parser::util::{data_lines, open_reader};
use crate::types::{SourceTranscript, Strand};

/// Transcript fields collected while reading.
struct TranscriptBuilder {
    seq_region: String,
    strand: Strand,
    span: Option<(i64, i64)>,
    exons: Vec<(i64, i64)>,
}

/// Parse a GTF file into transcripts on `coord_system`.
///
/// Supports both plain text and gzip-compressed GTF files. Internal ids are
/// assigned from 1 in order of first appearance.
pub fn parse_gtf(
    path: &Path,
    coord_system: &str,
    transcript_id_tag: &str,
) -> Result<Vec<SourceTranscript>> {
    let reader = open_reader(path).context("Failed to open GTF file")?;
    parse_gtf_reader(reader, coord_system, transcript_id_tag)
        .with_context(|| format!("Failed to parse GTF file {}", path.display()))
}

/// Parse GTF data from a reader.
fn parse_gtf_reader<R: BufRead>(
    reader: R,
    coord_system: &str,
    transcript_id_tag: &str,
) -> Result<Vec<SourceTranscript>> {
    let mut builders: IndexMap<String, TranscriptBuilder> = IndexMap::new();

    for line in data_lines(reader) {
        let (line_num, line) = line?;

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            continue;
        }

        let feature_type = fields[2];
        if feature_type != "exon" && feature_type != "transcript" {
            continue;
        }

        let chrom = fields[0];
        let start: i64 = fields[3]
            .parse()
            .with_context(|| format!("line {}: failed to parse start coordinate", line_num))?;
        let end: i64 = fields[4]
            .parse()
            .with_context(|| format!("line {}: failed to parse end coordinate", line_num))?;
        let strand = match fields[6].parse::<Strand>() {
            Ok(s) => s,
            Err(_) => continue, // Skip entries without valid strand
        };

        let transcript_id = extract_attribute(fields[8], transcript_id_tag).with_context(|| {
            format!("line {}: missing {} attribute", line_num, transcript_id_tag)
        })?;

        let builder = builders
            .entry(transcript_id.clone())
            .or_insert_with(|| TranscriptBuilder {
                seq_region: chrom.to_string(),
                strand,
                span: None,
                exons: Vec::new(),
            });

        if builder.seq_region != chrom || builder.strand != strand {
            bail!(
                "line {}: transcript {} spans several regions or strands",
                line_num,
                transcript_id
            );
        }

        if feature_type == "exon" {
            builder.exons.push((start, end));
        } else {
            builder.span = Some((start, end));
        }
    }

    let mut transcripts = Vec::with_capacity(builders.len());
    for (i, (accession, builder)) in builders.into_iter().enumerate() {
        if builder.exons.is_empty() {
            // Nothing to map against.
            continue;
        }

        let exons = merge_spans(builder.exons);
        let (start, end) = builder.span.unwrap_or_else(|| {
            let first = exons[0].0;
            let last = exons.iter().map(|e| e.1).max().unwrap_or(first);
            (first, last)
        });

        let location = Location::new(coord_system, &builder.seq_region, start, end, builder.strand)
            .with_context(|| format!("transcript {}", accession))?;
        let cdna_location =
            Location::from_spans(coord_system, &builder.seq_region, exons, builder.strand)
                .with_context(|| format!("transcript {}", accession))?;

        transcripts.push(SourceTranscript {
            id: i as u64 + 1,
            accession,
            location,
            cdna_location,
        });
    }

    Ok(transcripts)
}

/// Sort spans and merge overlapping ones so no base is counted twice.
fn merge_spans(mut spans: Vec<(i64, i64)>) -> Vec<(i64, i64)> {
    spans.sort_unstable();
    let mut merged: Vec<(i64, i64)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Extract an attribute value from the GTF attributes string.
///
/// GTF attributes are in the format: key "value"; key "value"; ...
fn extract_attribute(attributes: &str, key: &str) -> Option<String> {
    // Find the key
    let key_pattern = format!("{} ", key);
    let start_idx = attributes.find(&key_pattern)?;

    // Find the value between quotes
    let after_key = &attributes[start_idx + key_pattern.len()..];
    let first_quote = after_key.find('"')?;
    let after_first_quote = &after_key[first_quote + 1..];
    let second_quote = after_first_quote.find('"')?;

    Some(after_first_quote[..second_quote].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    fn parse(text: &str) -> Result<Vec<SourceTranscript>> {
        parse_gtf_reader(BufReader::new(text.as_bytes()), "chromosome", "transcript_id")
    }

    #[test]
    fn test_extract_attribute() {
        let attrs = r#"gene_id "ENSG00000279493.1"; transcript_id "ENST00000624081.1"; gene_type "artifact";"#;

        assert_eq!(
            extract_attribute(attrs, "transcript_id"),
            Some("ENST00000624081.1".to_string())
        );
        assert_eq!(extract_attribute(attrs, "nonexistent"), None);
    }

    #[test]
    fn test_parse_gtf_reader() {
        let gtf_content = r#"##description: test
1	TEST	gene	1000	2100	.	+	.	gene_id "G1"; gene_name "Gene1";
1	TEST	transcript	1000	2100	.	+	.	gene_id "G1"; transcript_id "T1";
1	TEST	exon	1000	1200	.	+	.	gene_id "G1"; transcript_id "T1"; exon_number 1;
1	TEST	exon	1500	2000	.	+	.	gene_id "G1"; transcript_id "T1"; exon_number 2;
"#;

        let ts = parse(gtf_content).unwrap();
        assert_eq!(ts.len(), 1);

        let t = &ts[0];
        assert_eq!(t.id, 1);
        assert_eq!(t.accession, "T1");
        assert_eq!(t.location.to_string(), "chromosome:1:1000-2100:1");
        assert_eq!(t.cdna_location.to_string(), "chromosome:1:1000-1200,1500-2000:1");
    }

    #[test]
    fn test_parse_gtf_span_from_exon_hull() {
        let gtf_content = "2\tTEST\texon\t1500\t2000\t.\t-\t.\ttranscript_id \"T2\";\n\
                           2\tTEST\texon\t1000\t1200\t.\t-\t.\ttranscript_id \"T2\";\n\
                           2\tTEST\texon\t1100\t1250\t.\t-\t.\ttranscript_id \"T2\";\n";

        let ts = parse(gtf_content).unwrap();
        let t = &ts[0];
        assert_eq!(t.location.to_string(), "chromosome:2:1000-2000:-1");
        // Overlapping exon rows are merged.
        assert_eq!(t.cdna_location.to_string(), "chromosome:2:1000-1250,1500-2000:-1");
    }

    #[test]
    fn test_parse_gtf_skips_transcripts_without_exons() {
        let gtf_content = "1\tTEST\ttranscript\t100\t200\t.\t+\t.\ttranscript_id \"T1\";\n\
                           1\tTEST\texon\t300\t400\t.\t+\t.\ttranscript_id \"T2\";\n";
        let ts = parse(gtf_content).unwrap();
        assert_eq!(ts.len(), 1);
        assert_eq!(ts[0].accession, "T2");
        assert_eq!(ts[0].id, 2);
    }

    #[test]
    fn test_parse_gtf_rejects_mixed_strands() {
        let gtf_content = "1\tTEST\texon\t100\t200\t.\t+\t.\ttranscript_id \"T1\";\n\
                           1\tTEST\texon\t300\t400\t.\t-\t.\ttranscript_id \"T1\";\n";
        assert!(parse(gtf_content).is_err());
    }

    #[test]
    fn test_parse_gtf_missing_tag() {
        let gtf_content = "1\tTEST\texon\t100\t200\t.\t+\t.\tgene_id \"G1\";\n";
        let err = parse(gtf_content).unwrap_err();
        assert!(err.to_string().contains("missing transcript_id"));
    }
}
