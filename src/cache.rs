//! Advisory cache for loaded transcripts and oligo data.
//!
//! One entry holds either the mappable transcripts for a location filter or
//! the features and probe sets loaded for one query location. Loading from the
//! cache and from the data source yield the same downstream results; a missing
//! or unreadable entry just means a fresh load.

use ahash::AHashMap;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::location::Location;
use crate::probeset::OligoData;
use crate::types::MappableTranscript;

/// Key-value store for [`OligoData`] and transcript lists.
pub trait DataCache: Sync {
    /// Cached oligo data for `key`, if present and readable.
    fn load(&self, key: &str) -> Option<OligoData>;

    /// Save `data` under `key`. Failures are logged, never returned.
    fn store(&self, key: &str, data: &OligoData);

    /// Cached transcripts for `key`, if present and readable.
    fn load_transcripts(&self, key: &str) -> Option<Vec<MappableTranscript>>;

    /// Save `transcripts` under `key`. Failures are logged, never returned.
    fn store_transcripts(&self, key: &str, transcripts: &[MappableTranscript]);
}

/// Cache key for the oligo data of `location`.
///
/// Includes the settings that change what is loaded, so entries written
/// under another configuration are never reused.
pub fn cache_key(location: &Location, flank: i64, array_type: &str) -> String {
    format!("{}_flank{}_{}", location, flank, array_type)
}

/// Cache key for the transcripts selected by `filter` (`all` without one).
pub fn transcript_cache_key(filter: Option<&Location>, flank: i64) -> String {
    match filter {
        Some(filter) => format!("{}_flank{}", filter, flank),
        None => format!("all_flank{}", flank),
    }
}

/// Cache that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl DataCache for NoCache {
    fn load(&self, _key: &str) -> Option<OligoData> {
        None
    }

    fn store(&self, _key: &str, _data: &OligoData) {}

    fn load_transcripts(&self, _key: &str) -> Option<Vec<MappableTranscript>> {
        None
    }

    fn store_transcripts(&self, _key: &str, _transcripts: &[MappableTranscript]) {}
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<AHashMap<String, OligoData>>,
    transcripts: Mutex<AHashMap<String, Vec<MappableTranscript>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of oligo data entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of transcript list entries.
    pub fn transcript_entries(&self) -> usize {
        self.transcripts.lock().map(|e| e.len()).unwrap_or(0)
    }
}

impl DataCache for MemoryCache {
    fn load(&self, key: &str) -> Option<OligoData> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn store(&self, key: &str, data: &OligoData) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), data.clone());
        }
    }

    fn load_transcripts(&self, key: &str) -> Option<Vec<MappableTranscript>> {
        self.transcripts.lock().ok()?.get(key).cloned()
    }

    fn store_transcripts(&self, key: &str, transcripts: &[MappableTranscript]) {
        if let Ok(mut entries) = self.transcripts.lock() {
            entries.insert(key.to_string(), transcripts.to_vec());
        }
    }
}

/// Cache of bincode files in a directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: &Path) -> Self {
        FileCache {
            dir: dir.to_path_buf(),
        }
    }

    /// File holding the oligo data entry for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.entry_path("mappable_oligo_features", key)
    }

    /// File holding the transcript entry for `key`.
    pub fn transcripts_path_for(&self, key: &str) -> PathBuf {
        self.entry_path("mappable_transcripts", key)
    }

    fn entry_path(&self, prefix: &str, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{}_{}.bin", prefix, safe))
    }
}

fn read_entry<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }

    info!("Loading cache file {}", path.display());
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("Cannot open cache file {}: {}", path.display(), e);
            return None;
        }
    };
    match bincode::deserialize_from(BufReader::new(file)) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!("Ignoring corrupt cache file {}: {}", path.display(), e);
            None
        }
    }
}

fn write_entry<T: Serialize + ?Sized>(path: &Path, data: &T) {
    let result = File::create(path)
        .map_err(bincode::Error::from)
        .and_then(|f| {
            let mut writer = BufWriter::new(f);
            bincode::serialize_into(&mut writer, data)?;
            writer.flush().map_err(bincode::Error::from)
        });
    if let Err(e) = result {
        warn!("Failed to write cache file {}: {}", path.display(), e);
    }
}

impl DataCache for FileCache {
    fn load(&self, key: &str) -> Option<OligoData> {
        read_entry(&self.path_for(key))
    }

    fn store(&self, key: &str, data: &OligoData) {
        write_entry(&self.path_for(key), data);
    }

    fn load_transcripts(&self, key: &str) -> Option<Vec<MappableTranscript>> {
        read_entry(&self.transcripts_path_for(key))
    }

    fn store_transcripts(&self, key: &str, transcripts: &[MappableTranscript]) {
        write_entry(&self.transcripts_path_for(key), transcripts);
    }
}
