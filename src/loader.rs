//! Loading transcripts and per-chunk oligo data.

use ahash::AHashMap;
use anyhow::{Context, Result};
use log::{debug, info};
use std::time::Instant;

use crate::cache::{cache_key, transcript_cache_key, DataCache};
use crate::config::Config;
use crate::error::MapperError;
use crate::location::Location;
use crate::probeset::OligoData;
use crate::source::{OligoSource, TranscriptSource};
use crate::types::{ArrayRegistry, MappableTranscript, OligoFeature, OligoProbe};

/// Load transcripts (all, or those overlapping `filter`) and apply the
/// downstream flank, from `cache` when possible.
pub fn load_transcripts(
    source: &dyn TranscriptSource,
    filter: Option<&Location>,
    flank: i64,
    cache: &dyn DataCache,
) -> Result<Vec<MappableTranscript>> {
    let start = Instant::now();
    let key = transcript_cache_key(filter, flank);

    let transcripts = match cache.load_transcripts(&key) {
        Some(transcripts) => transcripts,
        None => {
            match filter {
                Some(f) => info!("Loading transcripts for location {}", f),
                None => info!("Loading all transcripts"),
            }
            let transcripts = source
                .fetch_transcripts(filter)
                .context("Failed to load transcripts")?
                .into_iter()
                .map(|t| MappableTranscript::new(t, flank))
                .collect::<Result<Vec<_>, _>>()?;
            cache.store_transcripts(&key, &transcripts);
            transcripts
        }
    };

    info!(
        "Loaded {} transcripts in {:.2}s",
        transcripts.len(),
        start.elapsed().as_secs_f64()
    );
    Ok(transcripts)
}

/// Answers "does this location overlap any transcript extent?" for a
/// location-sorted transcript slice on a single region.
struct TranscriptIndex<'a> {
    transcripts: &'a [MappableTranscript],
    /// `max_end[i]` is the largest extent end among `transcripts[..=i]`.
    max_end: Vec<i64>,
}

impl<'a> TranscriptIndex<'a> {
    fn new(transcripts: &'a [MappableTranscript]) -> Self {
        let mut max_end = Vec::with_capacity(transcripts.len());
        let mut running = i64::MIN;
        for t in transcripts {
            running = running.max(t.location().end());
            max_end.push(running);
        }
        TranscriptIndex {
            transcripts,
            max_end,
        }
    }

    fn overlaps_any(&self, location: &Location) -> bool {
        let Some(first) = self.transcripts.first() else {
            return false;
        };
        if !first.location().same_region(location) {
            return false;
        }
        let n = self
            .transcripts
            .partition_point(|t| t.location().start() <= location.end());
        n > 0 && self.max_end[n - 1] >= location.start()
    }
}

/// Load the features and probe sets for `location`, from `cache` when
/// possible.
///
/// Only features overlapping at least one of `transcripts` (sorted, one
/// region) are kept, and only those whose probe sits exclusively on arrays of
/// the configured type. Duplicate hits within a probe set are dropped.
pub fn load_oligo_data(
    location: &Location,
    transcripts: &[MappableTranscript],
    source: &dyn OligoSource,
    arrays: &ArrayRegistry,
    cache: &dyn DataCache,
    config: &Config,
) -> Result<OligoData> {
    let start = Instant::now();
    let key = cache_key(location, config.downstream_flank, &config.array_type);

    let data = match cache.load(&key) {
        Some(data) => data,
        None => {
            let data = load_oligo_data_from_source(location, transcripts, source, arrays, config)?;
            cache.store(&key, &data);
            data
        }
    };

    info!(
        "Loaded {} oligo features and {} probe sets for location {} in {:.2}s",
        data.features().len(),
        data.num_probe_sets(),
        location,
        start.elapsed().as_secs_f64()
    );
    Ok(data)
}

fn load_oligo_data_from_source(
    location: &Location,
    transcripts: &[MappableTranscript],
    source: &dyn OligoSource,
    arrays: &ArrayRegistry,
    config: &Config,
) -> Result<OligoData> {
    info!("Loading oligo data for location {} from source", location);

    let features = load_features(location, transcripts, source)?;

    let mut probe_ids: Vec<u64> = features.iter().map(|f| f.probe_id).collect();
    probe_ids.sort_unstable();
    probe_ids.dedup();

    let mut data = OligoData::new();
    let probes = load_probe_sets(&mut data, &probe_ids, source)?;

    let mut ignored = 0usize;
    for feature in features {
        let probe = probes
            .get(&feature.probe_id)
            .ok_or(MapperError::UnknownProbe(feature.probe_id))?;

        if !on_wanted_arrays_only(probe, arrays, &config.array_type)? {
            ignored += 1;
            continue;
        }

        // load_probe_sets created a probe set for every fetched probe.
        let ps = data.probe_set_id(&probe.probe_set_name);
        data.add_feature_if_unique(ps, feature.location);
    }

    if ignored > 0 {
        debug!(
            "Ignored {} features of probes on arrays other than {}",
            ignored, config.array_type
        );
    }
    Ok(data)
}

/// Fetch features in `location` that overlap at least one transcript.
fn load_features(
    location: &Location,
    transcripts: &[MappableTranscript],
    source: &dyn OligoSource,
) -> Result<Vec<OligoFeature>> {
    let index = TranscriptIndex::new(transcripts);
    let fetched = source
        .fetch_features(location)
        .with_context(|| format!("Failed to load oligo features for {}", location))?;
    let total = fetched.len();

    let kept: Vec<OligoFeature> = fetched
        .into_iter()
        .filter(|f| index.overlaps_any(&f.location))
        .collect();

    debug!(
        "Kept {} of {} oligo features overlapping transcripts",
        kept.len(),
        total
    );
    Ok(kept)
}

/// Fetch probes in one go, creating their probe sets in `data`.
fn load_probe_sets(
    data: &mut OligoData,
    probe_ids: &[u64],
    source: &dyn OligoSource,
) -> Result<AHashMap<u64, OligoProbe>> {
    let mut id2probe = AHashMap::with_capacity(probe_ids.len());
    for probe in source
        .fetch_probes(probe_ids)
        .context("Failed to load oligo probes")?
    {
        let ps = data.probe_set_id(&probe.probe_set_name);
        data.probe_set_mut(ps)
            .add_arrays(probe.array_names.iter().map(String::as_str));
        id2probe.insert(probe.id, probe);
    }
    Ok(id2probe)
}

fn on_wanted_arrays_only(
    probe: &OligoProbe,
    arrays: &ArrayRegistry,
    array_type: &str,
) -> Result<bool, MapperError> {
    for name in &probe.array_names {
        if arrays.get(name)?.array_type != array_type {
            return Ok(false);
        }
    }
    Ok(true)
}
