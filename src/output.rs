//! Audit log formatting.
//!
//! One tab-separated line per probe set / transcript pair, mapped or not.

use anyhow::Result;

use std::io::Write;

use crate::matcher::MappingStatus;

/// Write the audit log header.
pub fn write_header<W: Write>(writer: &mut W) -> Result<()> {
    writeln!(
        writer,
        "#ProbeSet\tTranscript\tMapped\tProbeSetSize\tExonFlankHits\tIntronHits\tReverseStrandHits\tDescription"
    )?;
    Ok(())
}

/// Format the audit line for one status.
pub fn format_status_line(status: &MappingStatus) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        status.probe_set,
        status.transcript_accession,
        u8::from(status.is_mapped()),
        status.probe_set_size,
        status.exon_flank_hits,
        status.intron_hits,
        status.reverse_strand_hits,
        status.tags().join(",")
    )
}

/// Write one line per status and flush, so the log survives a later
/// failure while storing.
pub fn write_statuses<W: Write>(writer: &mut W, statuses: &[MappingStatus]) -> Result<()> {
    for status in statuses {
        writeln!(writer, "{}", format_status_line(status))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(
        probe_set: &str,
        accession: &str,
        size: u32,
        threshold: u32,
        hits: (u32, u32, u32),
    ) -> MappingStatus {
        MappingStatus {
            probe_set: probe_set.to_string(),
            arrays: vec!["HG-U133A".to_string()],
            transcript_id: 1,
            transcript_accession: accession.to_string(),
            threshold,
            probe_set_size: size,
            exon_flank_hits: hits.0,
            intron_hits: hits.1,
            reverse_strand_hits: hits.2,
            too_many_transcripts: false,
            xrefs: Vec::new(),
        }
    }

    #[test]
    fn test_format_mapped_line() {
        let s = status("comp_at_1", "ENST1", 11, 6, (6, 0, 0));
        assert_eq!(format_status_line(&s), "comp_at_1\tENST1\t1\t11\t6\t0\t0\tmapped");
    }

    #[test]
    fn test_format_intronic_line() {
        let s = status("comp_at_3", "ENST3", 16, 8, (0, 12, 0));
        assert_eq!(
            format_status_line(&s),
            "comp_at_3\tENST3\t0\t16\t0\t12\t0\tinsufficient,intronic"
        );
    }

    #[test]
    fn test_format_all_tags() {
        let mut s = status("p", "T", 11, 6, (9, 1, 2));
        s.too_many_transcripts = true;
        assert_eq!(
            format_status_line(&s),
            "p\tT\t0\t11\t9\t1\t2\tinsufficient,intronic,antisense,promiscuous"
        );
    }

    #[test]
    fn test_write_statuses() {
        let mut buf = Vec::new();
        write_header(&mut buf).unwrap();
        write_statuses(
            &mut buf,
            &[
                status("a", "T1", 11, 6, (6, 0, 0)),
                status("b", "T2", 11, 6, (1, 0, 0)),
            ],
        )
        .unwrap();

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("#ProbeSet"));
        assert_eq!(lines[1], "a\tT1\t1\t11\t6\t0\t0\tmapped");
        assert_eq!(lines[2], "b\tT2\t0\t11\t1\t0\t0\tinsufficient");
    }
}
