//! Classification of probe set / transcript pairs.
//!
//! Every full-length hit of a probe set on a transcript falls into one of
//! three buckets: exon-flank, intron or reverse strand. A pair is mapped when
//! enough hits land in exons or the downstream flank.

use log::info;

use crate::error::MapperError;
use crate::location::Location;
use crate::probeset::OligoData;
use crate::store::ExternalRef;
use crate::types::{ArrayRegistry, MappableTranscript, ProbeSetId};

/// Where a probe hit lands relative to a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// Inside the exons or downstream flank, same strand.
    ExonFlank,
    /// Inside the transcript extent but not its exons, same strand.
    Intron,
    /// Inside the transcript extent, opposite strand.
    ReverseStrand,
}

/// Classify one hit of `probe_set` on `transcript`.
///
/// Returns `Ok(None)` when the hit does not lie entirely within the
/// transcript extent on either strand.
pub fn classify_hit(
    probe_set: &str,
    feature: &Location,
    transcript: &MappableTranscript,
) -> Result<Option<HitKind>, MapperError> {
    let len = feature.length();
    let extent = transcript.location();

    if !feature.overlaps(extent, false) || feature.overlap_size(extent, false) != len {
        return Ok(None);
    }

    if feature.overlap_size(transcript.cdna_location(), true) == len {
        Ok(Some(HitKind::ExonFlank))
    } else if feature.overlap_size(extent, true) == len {
        Ok(Some(HitKind::Intron))
    } else if feature.strand().is_opposite(extent.strand()) {
        Ok(Some(HitKind::ReverseStrand))
    } else {
        Err(MapperError::UnclassifiedHit {
            probe_set: probe_set.to_string(),
            transcript: transcript.accession.clone(),
            feature: feature.to_string(),
        })
    }
}

/// Outcome for one probe set / transcript pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingStatus {
    pub probe_set: String,
    /// Arrays containing the probe set.
    pub arrays: Vec<String>,
    pub transcript_id: u64,
    pub transcript_accession: String,
    /// Exon-flank hits needed to map.
    pub threshold: u32,
    pub probe_set_size: u32,
    pub exon_flank_hits: u32,
    pub intron_hits: u32,
    pub reverse_strand_hits: u32,
    pub too_many_transcripts: bool,
    /// Xrefs created or reused when the pair was stored.
    pub xrefs: Vec<ExternalRef>,
}

impl MappingStatus {
    pub fn is_mapped(&self) -> bool {
        !self.too_many_transcripts && self.exon_flank_hits >= self.threshold
    }

    /// Description tags, e.g. `["insufficient", "intronic"]`.
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags = vec![if self.is_mapped() {
            "mapped"
        } else {
            "insufficient"
        }];
        if self.intron_hits > 0 {
            tags.push("intronic");
        }
        if self.reverse_strand_hits > 0 {
            tags.push("antisense");
        }
        if self.too_many_transcripts {
            tags.push("promiscuous");
        }
        tags
    }
}

/// Number of exon-flank hits needed for a probe set of `size` probes.
pub fn exon_flank_threshold(size: u32, fraction: f64) -> u32 {
    (f64::from(size) * fraction).ceil() as u32
}

/// Flag probe sets hitting more than `max` distinct transcripts.
///
/// Returns the number of probe sets flagged.
pub fn mark_promiscuous_probe_sets(data: &mut OligoData, max: usize) -> usize {
    let mut flagged = 0;
    for id in 0..data.num_probe_sets() {
        if data.overlapping_transcripts(id).len() > max {
            data.probe_set_mut(id).too_many_transcripts = true;
            flagged += 1;
        }
    }
    flagged
}

/// Build a status for every probe set / transcript pair in `data`.
///
/// `transcripts` are the chunk transcripts the sweep indexed into. Probe sets
/// are visited in insertion order and transcripts in first-hit order.
pub fn classify_probe_sets(
    data: &mut OligoData,
    transcripts: &[MappableTranscript],
    arrays: &ArrayRegistry,
    fraction: f64,
) -> Result<Vec<MappingStatus>, MapperError> {
    let mut statuses = Vec::new();

    for id in 0..data.num_probe_sets() {
        for t in data.overlapping_transcripts(id).to_vec() {
            statuses.push(classify_pair(data, id, &transcripts[t], arrays, fraction)?);
        }
    }

    let mapped = statuses.iter().filter(|s| s.is_mapped()).count();
    info!(
        "Found {} overlapping probe set and transcript pairs, {} mapped",
        statuses.len(),
        mapped
    );
    Ok(statuses)
}

fn classify_pair(
    data: &OligoData,
    id: ProbeSetId,
    transcript: &MappableTranscript,
    arrays: &ArrayRegistry,
    fraction: f64,
) -> Result<MappingStatus, MapperError> {
    let ps = data.probe_set(id);
    let first_array = ps
        .arrays()
        .first()
        .ok_or_else(|| MapperError::ProbeSetWithoutArray(ps.name().to_string()))?;
    let probe_set_size = arrays.get(first_array)?.probe_set_size;

    let mut status = MappingStatus {
        probe_set: ps.name().to_string(),
        arrays: ps.arrays().to_vec(),
        transcript_id: transcript.id,
        transcript_accession: transcript.accession.clone(),
        threshold: exon_flank_threshold(probe_set_size, fraction),
        probe_set_size,
        exon_flank_hits: 0,
        intron_hits: 0,
        reverse_strand_hits: 0,
        too_many_transcripts: ps.too_many_transcripts,
        xrefs: Vec::new(),
    };

    for &fid in ps.features() {
        match classify_hit(ps.name(), &data.feature(fid).location, transcript)? {
            Some(HitKind::ExonFlank) => status.exon_flank_hits += 1,
            Some(HitKind::Intron) => status.intron_hits += 1,
            Some(HitKind::ReverseStrand) => status.reverse_strand_hits += 1,
            None => {}
        }
    }

    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExternalDatabase, OligoArray, SourceTranscript, Strand};

    fn loc(start: i64, end: i64, strand: Strand) -> Location {
        Location::new("chromosome", "1", start, end, strand).unwrap()
    }

    fn registry(size: u32) -> ArrayRegistry {
        ArrayRegistry::new(vec![OligoArray {
            name: "HG-U133A".to_string(),
            array_type: "AFFY".to_string(),
            probe_set_size: size,
            external_db: ExternalDatabase {
                id: 3010,
                name: "AFFY_HG_U133A".to_string(),
            },
        }])
    }

    /// Transcript on 1000-5000 with exons 1000-2000 and 4000-5000.
    fn transcript(id: u64, strand: Strand) -> MappableTranscript {
        let cdna = Location::from_spans(
            "chromosome",
            "1",
            vec![(1000, 2000), (4000, 5000)],
            strand,
        )
        .unwrap();
        MappableTranscript::new(
            SourceTranscript {
                id,
                accession: format!("ENST{}", id),
                location: loc(1000, 5000, strand),
                cdna_location: cdna,
            },
            0,
        )
        .unwrap()
    }

    /// Probe set with `exon` exon hits, `intron` intron hits and `anti`
    /// antisense hits, all attached to transcript index 0.
    fn probe_set_data(name: &str, exon: i64, intron: i64, anti: i64) -> OligoData {
        let mut data = OligoData::new();
        let ps = data.probe_set_id(name);
        data.probe_set_mut(ps).add_arrays(["HG-U133A"]);
        let mut add = |start: i64, strand: Strand| {
            data.add_feature_if_unique(ps, loc(start, start + 24, strand));
            let fid = data.features().len() - 1;
            data.attach_transcript(fid, 0);
        };
        for i in 0..exon {
            add(1000 + i * 30, Strand::Positive);
        }
        for i in 0..intron {
            add(2500 + i * 30, Strand::Positive);
        }
        for i in 0..anti {
            add(1000 + i * 30, Strand::Negative);
        }
        data
    }

    #[test]
    fn test_classify_hit_buckets() {
        let t = transcript(1, Strand::Positive);
        assert_eq!(
            classify_hit("p", &loc(1100, 1124, Strand::Positive), &t),
            Ok(Some(HitKind::ExonFlank))
        );
        assert_eq!(
            classify_hit("p", &loc(3000, 3024, Strand::Positive), &t),
            Ok(Some(HitKind::Intron))
        );
        assert_eq!(
            classify_hit("p", &loc(1100, 1124, Strand::Negative), &t),
            Ok(Some(HitKind::ReverseStrand))
        );
        // Straddles an exon boundary: inside the extent but not the exons.
        assert_eq!(
            classify_hit("p", &loc(1990, 2014, Strand::Positive), &t),
            Ok(Some(HitKind::Intron))
        );
        // Partly outside the extent.
        assert_eq!(classify_hit("p", &loc(990, 1014, Strand::Positive), &t), Ok(None));
    }

    #[test]
    fn test_classify_hit_unknown_strand_is_compatible() {
        let unknown_t = MappableTranscript::new(
            SourceTranscript {
                id: 2,
                accession: "ENST2".to_string(),
                location: loc(1000, 5000, Strand::Unknown),
                cdna_location: loc(1000, 2000, Strand::Unknown),
            },
            0,
        )
        .unwrap();
        assert_eq!(
            classify_hit("p", &loc(1100, 1124, Strand::Positive), &unknown_t),
            Ok(Some(HitKind::ExonFlank))
        );
        assert_eq!(
            classify_hit("p", &loc(1100, 1124, Strand::Unknown), &transcript(1, Strand::Negative)),
            Ok(Some(HitKind::ExonFlank))
        );
    }

    #[test]
    fn test_threshold_edge() {
        assert_eq!(exon_flank_threshold(10, 0.5), 5);
        assert_eq!(exon_flank_threshold(11, 0.5), 6);
        assert_eq!(exon_flank_threshold(16, 0.5), 8);
        assert_eq!(exon_flank_threshold(16, 1.0), 16);

        let ts = vec![transcript(1, Strand::Positive)];

        let mut five = probe_set_data("five", 5, 0, 0);
        let s = classify_probe_sets(&mut five, &ts, &registry(10), 0.5).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].threshold, 5);
        assert!(s[0].is_mapped());

        let mut four = probe_set_data("four", 4, 0, 0);
        let s = classify_probe_sets(&mut four, &ts, &registry(10), 0.5).unwrap();
        assert!(!s[0].is_mapped());
        assert_eq!(s[0].tags(), vec!["insufficient"]);
    }

    #[test]
    fn test_promiscuity_overrides_hits() {
        let ts = vec![transcript(1, Strand::Positive), transcript(2, Strand::Positive)];
        let mut data = probe_set_data("promiscuous_at", 6, 0, 0);
        data.attach_transcript(0, 1);

        assert_eq!(mark_promiscuous_probe_sets(&mut data, 1), 1);
        let s = classify_probe_sets(&mut data, &ts, &registry(11), 0.5).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s[0].exon_flank_hits, 6);
        assert!(s.iter().all(|s| !s.is_mapped()));
        assert_eq!(s[0].tags(), vec!["insufficient", "promiscuous"]);

        // At the maximum the set is still trusted.
        let mut data = probe_set_data("ok_at", 6, 0, 0);
        data.attach_transcript(0, 1);
        assert_eq!(mark_promiscuous_probe_sets(&mut data, 2), 0);
    }

    #[test]
    fn test_comp_at_1_scenario() {
        let ts = vec![transcript(1, Strand::Positive)];
        let mut data = probe_set_data("comp_at_1", 6, 0, 0);
        let s = classify_probe_sets(&mut data, &ts, &registry(11), 0.5).unwrap();

        let s = &s[0];
        assert_eq!(s.probe_set, "comp_at_1");
        assert_eq!(s.transcript_accession, "ENST1");
        assert_eq!(s.probe_set_size, 11);
        assert_eq!(s.threshold, 6);
        assert_eq!((s.exon_flank_hits, s.intron_hits, s.reverse_strand_hits), (6, 0, 0));
        assert!(s.is_mapped());
        assert_eq!(s.tags(), vec!["mapped"]);
    }

    #[test]
    fn test_comp_at_3_scenario() {
        let ts = vec![
            transcript(1, Strand::Positive),
            transcript(2, Strand::Positive),
            transcript(3, Strand::Positive),
        ];
        let mut data = OligoData::new();
        let ps = data.probe_set_id("comp_at_3");
        data.probe_set_mut(ps).add_arrays(["HG-U133A"]);
        for i in 0..12 {
            data.add_feature_if_unique(ps, loc(2500 + i * 30, 2524 + i * 30, Strand::Positive));
            data.attach_transcript(i as usize, 2);
        }

        let s = classify_probe_sets(&mut data, &ts, &registry(16), 0.5).unwrap();
        assert_eq!(s.len(), 1);
        let s = &s[0];
        assert_eq!(s.transcript_accession, "ENST3");
        assert_eq!(s.threshold, 8);
        assert_eq!((s.exon_flank_hits, s.intron_hits, s.reverse_strand_hits), (0, 12, 0));
        assert_eq!(s.tags(), vec!["insufficient", "intronic"]);
    }

    #[test]
    fn test_antisense_tag() {
        let ts = vec![transcript(1, Strand::Positive)];
        let mut data = probe_set_data("anti_at", 6, 0, 2);
        let s = classify_probe_sets(&mut data, &ts, &registry(11), 0.5).unwrap();
        assert_eq!(s[0].reverse_strand_hits, 2);
        assert_eq!(s[0].tags(), vec!["mapped", "antisense"]);
    }

    #[test]
    fn test_probe_set_without_array() {
        let ts = vec![transcript(1, Strand::Positive)];
        let mut data = OligoData::new();
        let ps = data.probe_set_id("orphan");
        data.add_feature_if_unique(ps, loc(1100, 1124, Strand::Positive));
        data.attach_transcript(0, 0);

        assert_eq!(
            classify_probe_sets(&mut data, &ts, &registry(11), 0.5),
            Err(MapperError::ProbeSetWithoutArray("orphan".to_string()))
        );
    }

    #[test]
    fn test_probe_sets_without_hits_yield_nothing() {
        let ts = vec![transcript(1, Strand::Positive)];
        let mut data = OligoData::new();
        let ps = data.probe_set_id("empty");
        data.probe_set_mut(ps).add_arrays(["HG-U133A"]);
        assert!(classify_probe_sets(&mut data, &ts, &registry(11), 0.5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_swept_pairs_classify_soundly() {
        use crate::matcher::sweep::map_transcripts_to_features;
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let arrays = registry(11);
        let region = Location::new("chromosome", "1", 1, 100_000, Strand::Unknown).unwrap();
        let strands = [Strand::Positive, Strand::Negative, Strand::Unknown];

        for _ in 0..30 {
            let flank = rng.gen_range(0..200);
            let mut ts = Vec::new();
            for id in 0..40u64 {
                let strand = strands[rng.gen_range(0..3)];
                let start = rng.gen_range(1..20_000);
                let mut spans = Vec::new();
                let mut pos = start;
                for _ in 0..rng.gen_range(1..4) {
                    let len = rng.gen_range(20..400);
                    spans.push((pos, pos + len));
                    pos += len + rng.gen_range(1..500);
                }
                let end = spans[spans.len() - 1].1;
                let source = SourceTranscript {
                    id,
                    accession: format!("ENST{}", id),
                    location: loc(start, end, strand),
                    cdna_location: Location::from_spans("chromosome", "1", spans, strand)
                        .unwrap(),
                };
                ts.push(MappableTranscript::new(source, flank).unwrap());
            }
            ts.sort_by(|a, b| a.location().cmp(b.location()));

            let mut data = OligoData::new();
            for n in 0..300 {
                let ps = data.probe_set_id(&format!("ps{}", n % 20));
                data.probe_set_mut(ps).add_arrays(["HG-U133A"]);
                let start = rng.gen_range(1..22_000);
                let strand = strands[rng.gen_range(0..3)];
                data.add_feature_if_unique(ps, loc(start, start + 24, strand));
            }

            map_transcripts_to_features(&mut data, &ts, &region);

            // Every recorded pair is an exon-flank hit.
            for f in data.features() {
                let name = data.probe_set(f.probe_set).name();
                for &ti in f.transcripts() {
                    assert_eq!(
                        classify_hit(name, &f.location, &ts[ti]),
                        Ok(Some(HitKind::ExonFlank))
                    );
                }
            }

            let statuses = classify_probe_sets(&mut data, &ts, &arrays, 0.5).unwrap();
            for s in &statuses {
                assert!(s.exon_flank_hits >= 1, "{} on {}", s.probe_set, s.transcript_accession);

                let t = ts.iter().find(|t| t.id == s.transcript_id).unwrap();
                let extent = t.location();
                let ps = data.find_probe_set(&s.probe_set).unwrap();
                let contained: Vec<&Location> = data
                    .probe_set(ps)
                    .features()
                    .iter()
                    .map(|&fid| &data.feature(fid).location)
                    .filter(|f| f.overlap_size(extent, false) == f.length())
                    .collect();
                let opposite = contained
                    .iter()
                    .filter(|f| f.strand().is_opposite(extent.strand()))
                    .count();

                // Each contained hit lands in exactly one bucket.
                assert_eq!(
                    (s.exon_flank_hits + s.intron_hits + s.reverse_strand_hits) as usize,
                    contained.len()
                );
                assert_eq!(s.reverse_strand_hits as usize, opposite);
            }
        }
    }
}
