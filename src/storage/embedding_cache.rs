use crate::common::{FaceBlurError, Result};
use crate::core::recognizer::Embedding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

const CACHE_VERSION: u32 = 1;
pub const CACHE_FILE_NAME: &str = ".embeddings.bincode";

/// Identity of a whitelist image on disk. An entry is only reused while the
/// file keeps the same name, size and modification time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    pub name: String,
    pub size: u64,
    pub modified_secs: u64,
}

impl FileStamp {
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified_secs = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| FaceBlurError::Whitelist(format!("Invalid file name: {:?}", path)))?
            .to_string();

        Ok(Self { name, size: metadata.len(), modified_secs })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CachedEmbedding {
    pub stamp: FileStamp,
    pub embedding: Embedding,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CacheData {
    pub version: u32,
    pub model_id: String,
    pub entries: Vec<CachedEmbedding>,
}

/// Persists whitelist embeddings next to the images so they are not
/// recomputed on every run.
pub struct EmbeddingCache {
    path: PathBuf,
    model_id: String,
    entries: Vec<CachedEmbedding>,
}

impl EmbeddingCache {
    pub fn path_for(whitelist_dir: &Path) -> PathBuf {
        whitelist_dir.join(CACHE_FILE_NAME)
    }

    pub fn empty(whitelist_dir: &Path, model_id: &str) -> Self {
        Self {
            path: Self::path_for(whitelist_dir),
            model_id: model_id.to_string(),
            entries: Vec::new(),
        }
    }

    /// Loads the cache; a missing, unreadable, outdated or foreign-model
    /// cache starts empty.
    pub fn load(whitelist_dir: &Path, model_id: &str) -> Self {
        let mut cache = Self::empty(whitelist_dir, model_id);

        let data = match fs::read(&cache.path) {
            Ok(data) => data,
            Err(_) => return cache,
        };

        match bincode::deserialize::<CacheData>(&data) {
            Ok(stored) if stored.version == CACHE_VERSION && stored.model_id == model_id => {
                tracing::debug!("Loaded {} cached embedding(s)", stored.entries.len());
                cache.entries = stored.entries;
            }
            Ok(stored) => {
                tracing::info!(
                    "Discarding embedding cache (version {}, model {})",
                    stored.version, stored.model_id
                );
            }
            Err(e) => {
                tracing::warn!("Ignoring corrupt embedding cache {:?}: {}", cache.path, e);
            }
        }

        cache
    }

    pub fn lookup(&self, stamp: &FileStamp) -> Option<&Embedding> {
        self.entries
            .iter()
            .find(|entry| &entry.stamp == stamp)
            .map(|entry| &entry.embedding)
    }

    pub fn insert(&mut self, stamp: FileStamp, embedding: Embedding) {
        self.entries.retain(|entry| entry.stamp.name != stamp.name);
        self.entries.push(CachedEmbedding { stamp, embedding });
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.stamp.name != name);
        before != self.entries.len()
    }

    /// Drops entries whose file is no longer in `names`.
    pub fn retain_names(&mut self, names: &[String]) {
        self.entries.retain(|entry| names.contains(&entry.stamp.name));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        let data = CacheData {
            version: CACHE_VERSION,
            model_id: self.model_id.clone(),
            entries: self.entries.clone(),
        };
        let encoded = bincode::serialize(&data)
            .map_err(|e| FaceBlurError::Whitelist(format!("Failed to serialize cache: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, encoded)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn stamp(name: &str, size: u64) -> FileStamp {
        FileStamp { name: name.to_string(), size, modified_secs: 42 }
    }

    #[test]
    fn saved_entries_are_reloaded_for_same_model() {
        let dir = tempdir().unwrap();
        let mut cache = EmbeddingCache::empty(dir.path(), "model-a");
        cache.insert(stamp("alice.jpg", 10), vec![0.1, 0.2]);
        cache.save().unwrap();

        let reloaded = EmbeddingCache::load(dir.path(), "model-a");
        assert_eq!(reloaded.lookup(&stamp("alice.jpg", 10)), Some(&vec![0.1, 0.2]));
        assert!(reloaded.lookup(&stamp("alice.jpg", 11)).is_none());
    }

    #[test]
    fn other_model_starts_empty() {
        let dir = tempdir().unwrap();
        let mut cache = EmbeddingCache::empty(dir.path(), "model-a");
        cache.insert(stamp("alice.jpg", 10), vec![1.0]);
        cache.save().unwrap();

        assert!(EmbeddingCache::load(dir.path(), "model-b").is_empty());
    }

    #[test]
    fn corrupt_cache_starts_empty() {
        let dir = tempdir().unwrap();
        fs::write(EmbeddingCache::path_for(dir.path()), b"not bincode").unwrap();
        assert!(EmbeddingCache::load(dir.path(), "m").is_empty());
    }

    #[test]
    fn insert_replaces_same_name_and_retain_prunes() {
        let dir = tempdir().unwrap();
        let mut cache = EmbeddingCache::empty(dir.path(), "m");
        cache.insert(stamp("a.png", 1), vec![1.0]);
        cache.insert(stamp("a.png", 2), vec![2.0]);
        cache.insert(stamp("b.png", 1), vec![3.0]);
        assert_eq!(cache.len(), 2);

        cache.retain_names(&["b.png".to_string()]);
        assert_eq!(cache.len(), 1);
        assert!(cache.remove("b.png"));
        assert!(!cache.remove("b.png"));
    }
}
