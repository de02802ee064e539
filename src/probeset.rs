//! Probe sets and the per-chunk feature arena.
//!
//! Features live in a single arena owned by [`OligoData`]; probe sets refer to
//! them by index and keep their own sorted, duplicate-free index sequence.

use ahash::AHashSet;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::location::Location;
use crate::types::{FeatureId, MappableOligoFeature, ProbeSetId, TranscriptId};

/// Named group of probes, possibly spread over several arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeSet {
    name: String,
    /// Sorted by feature location, no duplicates.
    features: Vec<FeatureId>,
    /// Arrays containing this probe set, first-seen order.
    arrays: Vec<String>,
    /// Unique transcripts hit by any feature; `None` until computed or after
    /// a change to the features.
    #[serde(skip)]
    overlapping: Option<Vec<TranscriptId>>,
    pub too_many_transcripts: bool,
}

impl ProbeSet {
    pub fn new(name: &str) -> Self {
        ProbeSet {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> &[FeatureId] {
        &self.features
    }

    pub fn arrays(&self) -> &[String] {
        &self.arrays
    }

    /// Record arrays containing this probe set, ignoring ones already known.
    pub fn add_arrays<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            if !self.arrays.iter().any(|a| a == name) {
                self.arrays.push(name.to_string());
            }
        }
    }

    /// Insert `feature` into `arena` and this probe set unless an equal
    /// feature is already present.
    ///
    /// Returns true if the feature was inserted.
    pub fn add_if_unique(
        &mut self,
        arena: &mut Vec<MappableOligoFeature>,
        feature: MappableOligoFeature,
    ) -> bool {
        // All members share this probe set's name, so location decides.
        match self
            .features
            .binary_search_by(|&id| arena[id].location.cmp(&feature.location))
        {
            Ok(_) => false,
            Err(pos) => {
                let id = arena.len();
                arena.push(feature);
                self.features.insert(pos, id);
                self.invalidate();
                true
            }
        }
    }

    /// Drop the cached overlapping transcripts.
    pub fn invalidate(&mut self) {
        self.overlapping = None;
    }

    /// Unique transcripts referenced by this probe set's features, in
    /// first-seen order.
    pub fn overlapping_transcripts(&mut self, arena: &[MappableOligoFeature]) -> &[TranscriptId] {
        let features = &self.features;
        self.overlapping.get_or_insert_with(|| {
            let mut seen = AHashSet::new();
            let mut transcripts = Vec::new();
            for &id in features {
                for &t in arena[id].transcripts() {
                    if seen.insert(t) {
                        transcripts.push(t);
                    }
                }
            }
            transcripts
        })
    }
}

/// Features and probe sets loaded for one chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OligoData {
    features: Vec<MappableOligoFeature>,
    probe_sets: IndexMap<String, ProbeSet>,
}

impl OligoData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the probe set called `name`, creating it if needed.
    pub fn probe_set_id(&mut self, name: &str) -> ProbeSetId {
        match self.probe_sets.get_index_of(name) {
            Some(id) => id,
            None => {
                self.probe_sets
                    .insert_full(name.to_string(), ProbeSet::new(name))
                    .0
            }
        }
    }

    pub fn find_probe_set(&self, name: &str) -> Option<ProbeSetId> {
        self.probe_sets.get_index_of(name)
    }

    pub fn probe_set(&self, id: ProbeSetId) -> &ProbeSet {
        &self.probe_sets[id]
    }

    pub fn probe_set_mut(&mut self, id: ProbeSetId) -> &mut ProbeSet {
        &mut self.probe_sets[id]
    }

    pub fn num_probe_sets(&self) -> usize {
        self.probe_sets.len()
    }

    pub fn probe_sets(&self) -> impl Iterator<Item = &ProbeSet> {
        self.probe_sets.values()
    }

    pub fn features(&self) -> &[MappableOligoFeature] {
        &self.features
    }

    pub fn feature(&self, id: FeatureId) -> &MappableOligoFeature {
        &self.features[id]
    }

    /// Add a feature at `location` to probe set `probe_set` unless the set
    /// already holds one there.
    pub fn add_feature_if_unique(&mut self, probe_set: ProbeSetId, location: Location) -> bool {
        let feature = MappableOligoFeature::new(location, probe_set);
        self.probe_sets[probe_set].add_if_unique(&mut self.features, feature)
    }

    /// Record that `feature` lies within `transcript`.
    pub fn attach_transcript(&mut self, feature: FeatureId, transcript: TranscriptId) {
        let f = &mut self.features[feature];
        f.push_transcript(transcript);
        let owner = f.probe_set;
        self.probe_sets[owner].invalidate();
    }

    /// Unique transcripts hit by probe set `id`.
    pub fn overlapping_transcripts(&mut self, id: ProbeSetId) -> &[TranscriptId] {
        let OligoData {
            features,
            probe_sets,
        } = self;
        probe_sets[id].overlapping_transcripts(features)
    }

    /// Feature ids ordered by location, ties broken by probe set name.
    pub fn sorted_feature_ids(&self) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = (0..self.features.len()).collect();
        ids.par_sort_by(|&a, &b| {
            let fa = &self.features[a];
            let fb = &self.features[b];
            fa.location.cmp(&fb.location).then_with(|| {
                self.probe_sets[fa.probe_set]
                    .name
                    .cmp(&self.probe_sets[fb.probe_set].name)
            })
        });
        ids
    }
}
