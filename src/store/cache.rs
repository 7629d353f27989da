//! On-disk snapshots of a loaded store, keyed by dataset name.
//!
//! A snapshot either restores the same logical store a fresh load would
//! produce, or nothing: stale, unreadable or corrupt snapshots are misses.

use std::fs;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::loader::{discover_files, load_folder};
use super::{GraphStore, MemoryStore, Triple, TripleSource};
use crate::error::Result;
use crate::ident::FileRegistry;

#[derive(Deserialize)]
struct Snapshot {
    fingerprint: String,
    created_at: DateTime<Utc>,
    registry: FileRegistry,
    triples: MemoryStore,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dataset: &'a str,
    fingerprint: &'a str,
    created_at: DateTime<Utc>,
    registry: &'a FileRegistry,
    triples: &'a [Triple],
}

/// Digest over the name, size and mtime of every `*.xml` file in `folder`.
pub fn dataset_fingerprint(folder: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for path in discover_files(folder)? {
        let metadata = fs::metadata(&path)?;
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        if let Some(name) = path.file_name() {
            hasher.update(name.to_string_lossy().as_bytes());
        }
        hasher.update(metadata.len().to_le_bytes());
        hasher.update(modified.to_le_bytes());
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Directory of JSON snapshots.
pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, dataset: &str) -> PathBuf {
        let name: String = dataset
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.snapshot.json", name))
    }

    pub fn load(&self, dataset: &str, fingerprint: &str) -> Option<GraphStore> {
        let path = self.path_for(dataset);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No cached snapshot for dataset {}", dataset);
                return None;
            }
            Err(e) => {
                log::warn!("Cannot open snapshot {}: {}", path.display(), e);
                return None;
            }
        };

        let snapshot: Snapshot = match serde_json::from_reader(BufReader::new(file)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Ignoring corrupt snapshot {}: {}", path.display(), e);
                return None;
            }
        };

        if snapshot.fingerprint != fingerprint {
            log::info!(
                "Snapshot for {} from {} is stale, reloading",
                dataset,
                snapshot.created_at.to_rfc3339()
            );
            return None;
        }

        log::info!("Loaded cached snapshot for {} ({} triples)", dataset, snapshot.triples.len());
        Some(GraphStore::new(snapshot.registry, snapshot.triples))
    }

    /// Written to a temp file then renamed, so readers never see half a snapshot.
    pub fn save(&self, dataset: &str, fingerprint: &str, store: &GraphStore) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(dataset);
        let tmp = path.with_extension("json.tmp");

        let snapshot = SnapshotRef {
            dataset,
            fingerprint,
            created_at: Utc::now(),
            registry: store.registry(),
            triples: store.source().triples(),
        };
        let mut writer = BufWriter::new(fs::File::create(&tmp)?);
        serde_json::to_writer(&mut writer, &snapshot)?;
        writer.flush()?;
        drop(writer);
        fs::rename(&tmp, &path)?;

        log::info!("Saved snapshot for {} to {}", dataset, path.display());
        Ok(())
    }

    pub fn clear(&self, dataset: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(dataset)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Restore `dataset` from `cache` when fresh, otherwise parse `folder` and
/// refresh the snapshot.
pub fn load_or_parse(folder: &Path, dataset: &str, cache: Option<&SnapshotCache>) -> Result<GraphStore> {
    let Some(cache) = cache else {
        return load_folder(folder);
    };

    let fingerprint = dataset_fingerprint(folder)?;
    if let Some(store) = cache.load(dataset, &fingerprint) {
        return Ok(store);
    }

    let store = load_folder(folder)?;
    if let Err(e) = cache.save(dataset, &fingerprint, &store) {
        log::warn!("Failed to save snapshot for {}: {}", dataset, e);
    }
    Ok(store)
}
