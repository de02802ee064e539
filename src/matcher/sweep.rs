//! Sort-merge overlap scan between transcripts and probe features.
//!
//! Both sides are walked in location order so each transcript only looks at
//! the features that can start inside it, instead of every feature.

use log::info;

use crate::location::Location;
use crate::probeset::OligoData;
use crate::types::MappableTranscript;

/// Counters reported by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Feature/transcript pairs recorded.
    pub mapped: usize,
    /// Location comparisons made.
    pub comparisons: usize,
}

/// Attach to every feature of `data` the transcripts whose cDNA location
/// fully contains it on the same strand.
///
/// `transcripts` must be sorted by location. Features of `data` are visited in
/// feature order, so each feature's transcript list grows in transcript order.
/// Transcripts on a region other than `region`'s are skipped.
pub fn map_transcripts_to_features(
    data: &mut OligoData,
    transcripts: &[MappableTranscript],
    region: &Location,
) -> SweepStats {
    let order = data.sorted_feature_ids();
    let mut stats = SweepStats::default();

    // Features before the floor start before the current transcript, so they
    // start before every later one too.
    let mut feature_floor = 0;

    for (ti, t) in transcripts.iter().enumerate() {
        let t_loc = t.location();

        match region.seq_region().cmp(t_loc.seq_region()) {
            std::cmp::Ordering::Greater => continue,
            std::cmp::Ordering::Less => break,
            std::cmp::Ordering::Equal => {}
        }

        let mut hits = Vec::new();
        for (i, &fid) in order.iter().enumerate().skip(feature_floor) {
            let f_loc = &data.feature(fid).location;

            if t_loc.start() > f_loc.start() {
                feature_floor = i + 1;
                continue;
            }

            if t_loc.strand() != f_loc.strand() {
                continue;
            }

            stats.comparisons += 1;

            // Strand is ignored here so the break below stays correct.
            if t_loc.overlaps(f_loc, false) {
                if t.cdna_location().overlap_size(f_loc, true) == f_loc.length() {
                    hits.push(fid);
                }
            } else if f_loc > t_loc {
                break;
            }
        }

        stats.mapped += hits.len();
        for fid in hits {
            data.attach_transcript(fid, ti);
        }
    }

    info!(
        "Found {} raw mappings between oligo features and transcripts on {} ({} comparisons)",
        stats.mapped, region, stats.comparisons
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SourceTranscript, Strand};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn loc(start: i64, end: i64, strand: Strand) -> Location {
        Location::new("chromosome", "1", start, end, strand).unwrap()
    }

    fn region() -> Location {
        Location::new("chromosome", "1", 1, 100_000, Strand::Unknown).unwrap()
    }

    fn transcript(id: u64, extent: Location, cdna: Location) -> MappableTranscript {
        flanked_transcript(id, extent, cdna, 0)
    }

    fn flanked_transcript(id: u64, extent: Location, cdna: Location, flank: i64) -> MappableTranscript {
        MappableTranscript::new(
            SourceTranscript {
                id,
                accession: format!("T{}", id),
                location: extent,
                cdna_location: cdna,
            },
            flank,
        )
        .unwrap()
    }

    fn sorted(mut ts: Vec<MappableTranscript>) -> Vec<MappableTranscript> {
        ts.sort_by(|a, b| a.location().cmp(b.location()));
        ts
    }

    #[test]
    fn test_exon_hit_recorded() {
        let cdna = Location::from_spans(
            "chromosome",
            "1",
            vec![(100, 200), (300, 400)],
            Strand::Positive,
        )
        .unwrap();
        let ts = vec![transcript(1, loc(100, 400, Strand::Positive), cdna)];

        let mut data = OligoData::new();
        let ps = data.probe_set_id("p");
        data.add_feature_if_unique(ps, loc(110, 134, Strand::Positive)); // exon 1
        data.add_feature_if_unique(ps, loc(220, 244, Strand::Positive)); // intron
        data.add_feature_if_unique(ps, loc(190, 214, Strand::Positive)); // exon/intron boundary
        data.add_feature_if_unique(ps, loc(310, 334, Strand::Negative)); // antisense

        let stats = map_transcripts_to_features(&mut data, &ts, &region());
        assert_eq!(stats.mapped, 1);
        assert_eq!(data.feature(0).transcripts(), &[0]);
        for id in 1..4 {
            assert!(data.feature(id).transcripts().is_empty());
        }
    }

    #[test]
    fn test_equal_starts_do_not_advance_floor() {
        // Two transcripts starting where the feature starts; both must see it.
        let ts = sorted(vec![
            transcript(1, loc(100, 200, Strand::Positive), loc(100, 200, Strand::Positive)),
            transcript(2, loc(100, 300, Strand::Positive), loc(100, 300, Strand::Positive)),
        ]);

        let mut data = OligoData::new();
        let ps = data.probe_set_id("p");
        data.add_feature_if_unique(ps, loc(100, 124, Strand::Positive));

        let stats = map_transcripts_to_features(&mut data, &ts, &region());
        assert_eq!(stats.mapped, 2);
        assert_eq!(data.feature(0).transcripts(), &[0, 1]);
    }

    #[test]
    fn test_other_regions_skipped() {
        let other = Location::new("chromosome", "2", 100, 200, Strand::Positive).unwrap();
        let ts = vec![transcript(1, other.clone(), other)];

        let mut data = OligoData::new();
        let ps = data.probe_set_id("p");
        data.add_feature_if_unique(ps, loc(110, 134, Strand::Positive));

        let stats = map_transcripts_to_features(&mut data, &ts, &region());
        assert_eq!(stats, SweepStats::default());
    }

    #[test]
    fn test_empty_inputs() {
        let mut data = OligoData::new();
        let stats = map_transcripts_to_features(&mut data, &[], &region());
        assert_eq!(stats.mapped, 0);
    }

    fn random_strand(rng: &mut StdRng) -> Strand {
        if rng.gen_bool(0.5) {
            Strand::Positive
        } else {
            Strand::Negative
        }
    }

    #[test]
    fn test_sweep_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            let mut ts = Vec::new();
            for id in 0..60 {
                let strand = random_strand(&mut rng);
                let start = rng.gen_range(1..20_000);
                let exon_count = rng.gen_range(1..4);
                let mut spans = Vec::new();
                let mut pos = start;
                for _ in 0..exon_count {
                    let len = rng.gen_range(20..400);
                    spans.push((pos, pos + len));
                    pos += len + rng.gen_range(1..500);
                }
                let end = spans[spans.len() - 1].1;
                let cdna = Location::from_spans("chromosome", "1", spans, strand).unwrap();
                // Negative strand flanks extend the start, so the sweep's
                // start ordering sees them too.
                let flank = rng.gen_range(0..300);
                ts.push(flanked_transcript(id, loc(start, end, strand), cdna, flank));
            }
            let ts = sorted(ts);

            let mut data = OligoData::new();
            for n in 0..400 {
                let ps = data.probe_set_id(&format!("ps{}", n % 25));
                let start = rng.gen_range(1..22_000);
                let strand = random_strand(&mut rng);
                data.add_feature_if_unique(ps, loc(start, start + 24, strand));
            }

            map_transcripts_to_features(&mut data, &ts, &region());

            for f in data.features() {
                let mut expected: Vec<usize> = ts
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| {
                        t.location().strand() == f.location.strand()
                            && t.cdna_location().overlap_size(&f.location, true) == f.length()
                    })
                    .map(|(i, _)| i)
                    .collect();
                let mut actual = f.transcripts().to_vec();
                expected.sort_unstable();
                actual.sort_unstable();
                assert_eq!(actual, expected, "feature {}", f.location);
            }
        }
    }
}
