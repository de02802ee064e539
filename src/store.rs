//! Cross-reference store for mapped probe sets.
//!
//! A mapped probe set becomes one external reference (xref) per external
//! database of its arrays, linked to each transcript it maps to by an
//! object-xref row.

use ahash::AHashMap;
use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::matcher::MappingStatus;
use crate::parser::open_reader;
use crate::types::ArrayRegistry;

/// Xrefs file name inside the working directory.
pub const XREF_FILENAME: &str = "xref.tsv";

/// Object-xref links file name inside the working directory.
pub const OBJECT_XREF_FILENAME: &str = "object_xref.tsv";

/// Version given to newly created xrefs.
const NEW_XREF_VERSION: &str = "1";

/// A persisted external reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRef {
    pub id: u64,
    pub external_db_id: u32,
    pub primary_id: String,
    pub display_id: String,
    pub version: String,
}

/// Output store for xrefs and their transcript links.
pub trait XrefStore {
    /// Xrefs with the given primary id.
    fn fetch_xrefs(&self, primary_id: &str) -> Result<Vec<ExternalRef>>;

    /// Create a new xref and return it with its assigned id.
    fn store_xref(
        &mut self,
        external_db_id: u32,
        primary_id: &str,
        display_id: &str,
        version: &str,
    ) -> Result<ExternalRef>;

    /// Link transcript `transcript_id` to xref `xref_id`.
    fn store_object_xref(&mut self, transcript_id: u64, xref_id: u64) -> Result<()>;

    /// Number of xrefs in the store.
    fn xref_count(&self) -> Result<usize>;

    /// Push buffered writes to durable storage.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Xrefs held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryXrefStore {
    xrefs: Vec<ExternalRef>,
    by_primary_id: AHashMap<String, Vec<usize>>,
    object_xrefs: Vec<(u64, u64)>,
}

impl MemoryXrefStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn xrefs(&self) -> &[ExternalRef] {
        &self.xrefs
    }

    /// (transcript id, xref id) links in insertion order.
    pub fn object_xrefs(&self) -> &[(u64, u64)] {
        &self.object_xrefs
    }

    fn insert(&mut self, xref: ExternalRef) {
        self.by_primary_id
            .entry(xref.primary_id.clone())
            .or_default()
            .push(self.xrefs.len());
        self.xrefs.push(xref);
    }

    fn next_id(&self) -> u64 {
        self.xrefs.iter().map(|x| x.id).max().unwrap_or(0) + 1
    }
}

impl XrefStore for MemoryXrefStore {
    fn fetch_xrefs(&self, primary_id: &str) -> Result<Vec<ExternalRef>> {
        Ok(self
            .by_primary_id
            .get(primary_id)
            .map(|ids| ids.iter().map(|&i| self.xrefs[i].clone()).collect())
            .unwrap_or_default())
    }

    fn store_xref(
        &mut self,
        external_db_id: u32,
        primary_id: &str,
        display_id: &str,
        version: &str,
    ) -> Result<ExternalRef> {
        let xref = ExternalRef {
            id: self.next_id(),
            external_db_id,
            primary_id: primary_id.to_string(),
            display_id: display_id.to_string(),
            version: version.to_string(),
        };
        self.insert(xref.clone());
        Ok(xref)
    }

    fn store_object_xref(&mut self, transcript_id: u64, xref_id: u64) -> Result<()> {
        self.object_xrefs.push((transcript_id, xref_id));
        Ok(())
    }

    fn xref_count(&self) -> Result<usize> {
        Ok(self.xrefs.len())
    }
}

/// Xrefs appended to tab-separated files in a directory.
///
/// `xref.tsv` rows: `id, external_db_id, primary_id, display_id, version`.
/// `object_xref.tsv` rows: `transcript_id, Transcript, xref_id`.
/// Existing xrefs are read on open so reruns reuse them.
pub struct TsvXrefStore {
    memory: MemoryXrefStore,
    xref_writer: BufWriter<File>,
    object_xref_writer: BufWriter<File>,
}

impl TsvXrefStore {
    pub fn open(dir: &Path) -> Result<Self> {
        let xref_path = dir.join(XREF_FILENAME);
        let mut memory = MemoryXrefStore::new();
        if xref_path.exists() {
            for xref in read_xrefs(&xref_path)? {
                memory.insert(xref);
            }
            debug!(
                "Read {} existing xrefs from {}",
                memory.xrefs.len(),
                xref_path.display()
            );
        }

        let append = |path: PathBuf| -> Result<BufWriter<File>> {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(BufWriter::new(file))
        };

        Ok(TsvXrefStore {
            memory,
            xref_writer: append(xref_path)?,
            object_xref_writer: append(dir.join(OBJECT_XREF_FILENAME))?,
        })
    }
}

fn read_xrefs(path: &Path) -> Result<Vec<ExternalRef>> {
    let reader = open_reader(path)?;
    let mut xrefs = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            bail!(
                "{}:{}: expected 5 columns, found {}",
                path.display(),
                line_num + 1,
                fields.len()
            );
        }
        xrefs.push(ExternalRef {
            id: fields[0]
                .parse()
                .with_context(|| format!("{}:{}: bad xref id", path.display(), line_num + 1))?,
            external_db_id: fields[1].parse().with_context(|| {
                format!("{}:{}: bad external db id", path.display(), line_num + 1)
            })?,
            primary_id: fields[2].to_string(),
            display_id: fields[3].to_string(),
            version: fields[4].to_string(),
        });
    }
    Ok(xrefs)
}

impl XrefStore for TsvXrefStore {
    fn fetch_xrefs(&self, primary_id: &str) -> Result<Vec<ExternalRef>> {
        self.memory.fetch_xrefs(primary_id)
    }

    fn store_xref(
        &mut self,
        external_db_id: u32,
        primary_id: &str,
        display_id: &str,
        version: &str,
    ) -> Result<ExternalRef> {
        let xref = self
            .memory
            .store_xref(external_db_id, primary_id, display_id, version)?;
        writeln!(
            self.xref_writer,
            "{}\t{}\t{}\t{}\t{}",
            xref.id, xref.external_db_id, xref.primary_id, xref.display_id, xref.version
        )?;
        Ok(xref)
    }

    fn store_object_xref(&mut self, transcript_id: u64, xref_id: u64) -> Result<()> {
        self.memory.store_object_xref(transcript_id, xref_id)?;
        writeln!(self.object_xref_writer, "{}\tTranscript\t{}", transcript_id, xref_id)?;
        Ok(())
    }

    fn xref_count(&self) -> Result<usize> {
        self.memory.xref_count()
    }

    fn flush(&mut self) -> Result<()> {
        self.xref_writer.flush()?;
        self.object_xref_writer.flush()?;
        Ok(())
    }
}

/// Abort if the store already holds xrefs, unless `skip` is set.
pub fn check_existing_xrefs(store: &dyn XrefStore, skip: bool) -> Result<()> {
    if skip {
        return Ok(());
    }
    let count = store.xref_count()?;
    if count > 0 {
        bail!(
            "Output store already contains {} oligo xrefs. Remove them before running, or skip this check.",
            count
        );
    }
    Ok(())
}

/// Run-wide xref lookup keyed by (external database name, probe set name).
pub type XrefCache = AHashMap<(String, String), ExternalRef>;

/// Persist every mapped status: one xref per array's external database and one
/// object-xref link per (transcript, xref).
///
/// Xrefs used are appended to each status. Returns the number of links stored.
pub fn store_mappings(
    statuses: &mut [MappingStatus],
    arrays: &ArrayRegistry,
    cache: &mut XrefCache,
    store: &mut dyn XrefStore,
) -> Result<usize> {
    let mut links = 0;

    for status in statuses.iter_mut().filter(|s| s.is_mapped()) {
        for array_name in &status.arrays {
            let xdb = &arrays.get(array_name)?.external_db;
            let key = (xdb.name.clone(), status.probe_set.clone());

            let xref = match cache.get(&key) {
                Some(xref) => xref.clone(),
                None => {
                    let existing = store
                        .fetch_xrefs(&status.probe_set)?
                        .into_iter()
                        .find(|x| x.external_db_id == xdb.id);
                    let xref = match existing {
                        Some(xref) => xref,
                        None => store.store_xref(
                            xdb.id,
                            &status.probe_set,
                            &status.probe_set,
                            NEW_XREF_VERSION,
                        )?,
                    };
                    cache.insert(key, xref.clone());
                    xref
                }
            };

            store.store_object_xref(status.transcript_id, xref.id)?;
            status.xrefs.push(xref);
            links += 1;
        }
    }

    store.flush()?;
    if links > 0 {
        info!("Stored {} probe set to transcript links", links);
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExternalDatabase, OligoArray};
    use std::fs;

    fn arrays() -> ArrayRegistry {
        let array = |name: &str, db_id: u32, db_name: &str| OligoArray {
            name: name.to_string(),
            array_type: "AFFY".to_string(),
            probe_set_size: 11,
            external_db: ExternalDatabase {
                id: db_id,
                name: db_name.to_string(),
            },
        };
        ArrayRegistry::new(vec![
            array("HG-U133A", 3010, "AFFY_HG_U133A"),
            array("HG-U133B", 3011, "AFFY_HG_U133B"),
        ])
    }

    fn status(probe_set: &str, transcript_id: u64, exon_hits: u32) -> MappingStatus {
        MappingStatus {
            probe_set: probe_set.to_string(),
            arrays: vec!["HG-U133A".to_string(), "HG-U133B".to_string()],
            transcript_id,
            transcript_accession: format!("ENST{}", transcript_id),
            threshold: 6,
            probe_set_size: 11,
            exon_flank_hits: exon_hits,
            intron_hits: 0,
            reverse_strand_hits: 0,
            too_many_transcripts: false,
            xrefs: Vec::new(),
        }
    }

    #[test]
    fn test_store_mappings_reuses_xrefs_across_transcripts() {
        let mut store = MemoryXrefStore::new();
        let mut cache = XrefCache::new();
        let mut statuses = vec![status("ps1", 1, 6), status("ps1", 2, 7), status("ps1", 3, 2)];

        let links = store_mappings(&mut statuses, &arrays(), &mut cache, &mut store).unwrap();

        // Two arrays x two mapped transcripts; the unmapped one is skipped.
        assert_eq!(links, 4);
        assert_eq!(store.xrefs().len(), 2);
        assert_eq!(store.object_xrefs().len(), 4);
        assert_eq!(statuses[0].xrefs, statuses[1].xrefs);
        assert!(statuses[2].xrefs.is_empty());

        let xref = &store.xrefs()[0];
        assert_eq!(xref.primary_id, "ps1");
        assert_eq!(xref.display_id, "ps1");
        assert_eq!(xref.version, "1");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_store_mappings_finds_xref_already_in_store() {
        let mut store = MemoryXrefStore::new();
        let existing = store.store_xref(3010, "ps1", "ps1", "1").unwrap();
        let mut cache = XrefCache::new();
        let mut statuses = vec![status("ps1", 1, 6)];

        store_mappings(&mut statuses, &arrays(), &mut cache, &mut store).unwrap();

        // Only the second database needed a new xref.
        assert_eq!(store.xrefs().len(), 2);
        assert_eq!(statuses[0].xrefs[0], existing);
    }

    #[test]
    fn test_check_existing_xrefs() {
        let mut store = MemoryXrefStore::new();
        assert!(check_existing_xrefs(&store, false).is_ok());

        store.store_xref(3010, "ps1", "ps1", "1").unwrap();
        assert!(check_existing_xrefs(&store, false).is_err());
        assert!(check_existing_xrefs(&store, true).is_ok());
    }

    #[test]
    fn test_tsv_store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = TsvXrefStore::open(dir.path()).unwrap();
            let mut cache = XrefCache::new();
            let mut statuses = vec![status("ps1", 42, 6)];
            store_mappings(&mut statuses, &arrays(), &mut cache, &mut store).unwrap();
        }

        let xrefs = fs::read_to_string(dir.path().join(XREF_FILENAME)).unwrap();
        assert_eq!(
            xrefs,
            "1\t3010\tps1\tps1\t1\n2\t3011\tps1\tps1\t1\n"
        );
        let links = fs::read_to_string(dir.path().join(OBJECT_XREF_FILENAME)).unwrap();
        assert_eq!(links, "42\tTranscript\t1\n42\tTranscript\t2\n");

        let store = TsvXrefStore::open(dir.path()).unwrap();
        assert_eq!(store.xref_count().unwrap(), 2);
        assert_eq!(store.fetch_xrefs("ps1").unwrap().len(), 2);
        assert!(check_existing_xrefs(&store, false).is_err());
    }
}
