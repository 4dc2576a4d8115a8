//! Persistent `relative_path -> [canonical id]` map for incremental runs.
//!
//! The document is plain JSON with sorted keys, rewritten whole through an
//! atomic rename so a crashed analyzer never leaves partial state behind.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json;
use tracing::debug;

use crate::error::EntityMapError;
use crate::model::CanonicalId;

/// File name inside the cache directory.
pub const ENTITY_MAP_FILE: &str = "entity_ids.json";

/// On-disk map of relative file paths to the canonical ids they produced.
#[derive(Debug, Default)]
pub struct EntityMap {
    path: PathBuf,
    entries: BTreeMap<String, Vec<String>>,
}

impl EntityMap {
    /// Load the map from `<cache_dir>/entity_ids.json`, starting empty when
    /// the file does not exist yet.
    pub fn load(cache_dir: &Path) -> Result<Self, EntityMapError> {
        let path = cache_dir.join(ENTITY_MAP_FILE);
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| EntityMapError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| EntityMapError::Malformed {
                path: path.clone(),
                source,
            })?
        } else {
            BTreeMap::new()
        };
        Ok(EntityMap { path, entries })
    }

    /// Ids previously recorded for a relative path.
    pub fn ids_for(&self, relative_path: &str) -> Vec<CanonicalId> {
        self.entries
            .get(relative_path)
            .map(|ids| ids.iter().map(|s| CanonicalId(s.clone())).collect())
            .unwrap_or_default()
    }

    /// Replace the entry for one path. Ids are stored sorted and deduplicated.
    pub fn update(&mut self, relative_path: &str, ids: &[CanonicalId]) {
        let set: BTreeSet<String> = ids.iter().map(|id| id.0.clone()).collect();
        if set.is_empty() {
            self.entries.remove(relative_path);
        } else {
            self.entries
                .insert(relative_path.to_string(), set.into_iter().collect());
        }
    }

    /// Remove an entry, returning the ids it held.
    pub fn remove(&mut self, relative_path: &str) -> Vec<CanonicalId> {
        self.entries
            .remove(relative_path)
            .map(|ids| ids.into_iter().map(CanonicalId).collect())
            .unwrap_or_default()
    }

    /// Drop every entry. A full-project run clears up front and rewrites at
    /// the end.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Write the whole document atomically: serialize into a temp file in
    /// the same directory, then rename over the target.
    pub fn save(&self) -> Result<(), EntityMapError> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir).map_err(|source| EntityMapError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|source| {
            EntityMapError::Io {
                path: dir.clone(),
                source,
            }
        })?;
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            EntityMapError::Serialize { source }
        })?;
        tmp.write_all(json.as_bytes())
            .map_err(|source| EntityMapError::Io {
                path: tmp.path().to_path_buf(),
                source,
            })?;
        tmp.persist(&self.path)
            .map_err(|e| EntityMapError::Io {
                path: self.path.clone(),
                source: e.error,
            })?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "entity map saved");
        Ok(())
    }
}
