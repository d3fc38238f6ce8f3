// =============================================================================
// Chunk Store — key-value collaborator holding chunk metadata and blobs
// =============================================================================
//
// Two keys per chunk, both derived from the chunk id:
//
//   {prefix}:{id}:meta   flat string field map
//   {prefix}:{id}:blob   compressed bytes
//
// plus two append-only index lists:
//
//   {prefix}s                    every chunk id, in write order
//   {prefix}s:bySymbol:{symbol}  chunk ids of one symbol
//
// `put_chunk` must make meta and blob visible together and must refuse a
// meta key that is already present: chunks are never rewritten in place.
// =============================================================================

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::StoreError;

/// Flat string-keyed metadata map.
pub type FieldMap = BTreeMap<String, String>;

/// Default key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "ticks:chunk";

/// Key naming for one store namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn meta_key(&self, chunk_id: &str) -> String {
        format!("{}:{}:meta", self.prefix, chunk_id)
    }

    pub fn blob_key(&self, chunk_id: &str) -> String {
        format!("{}:{}:blob", self.prefix, chunk_id)
    }

    pub fn all_index_key(&self) -> String {
        format!("{}s", self.prefix)
    }

    pub fn symbol_index_key(&self, symbol: &str) -> String {
        format!("{}s:bySymbol:{}", self.prefix, symbol)
    }
}

/// Storage backend for chunks.
pub trait ChunkStore: Send + Sync {
    /// Store meta and blob so that readers observe both or neither. Fails
    /// with [`StoreError::AlreadyExists`] when `meta_key` is taken.
    fn put_chunk(
        &self,
        meta_key: &str,
        meta: &FieldMap,
        blob_key: &str,
        blob: &[u8],
    ) -> Result<(), StoreError>;

    fn get_meta(&self, meta_key: &str) -> Result<Option<FieldMap>, StoreError>;

    fn get_blob(&self, blob_key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Append `member` to the list under `index_key`.
    fn append_index(&self, index_key: &str, member: &str) -> Result<(), StoreError>;

    /// Members of the list under `index_key`, in append order. Empty when the
    /// list does not exist.
    fn index_members(&self, index_key: &str) -> Result<Vec<String>, StoreError>;
}

// =============================================================================
// MemoryChunkStore
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    metas: HashMap<String, FieldMap>,
    blobs: HashMap<String, Vec<u8>>,
    indexes: HashMap<String, Vec<String>>,
}

/// In-process store. A single lock covers all maps so `put_chunk` is atomic.
#[derive(Default)]
pub struct MemoryChunkStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a metadata map directly.
    pub fn put_meta(&self, meta_key: &str, meta: FieldMap) {
        self.inner.write().metas.insert(meta_key.to_string(), meta);
    }

    /// Overwrite a blob directly.
    pub fn put_blob(&self, blob_key: &str, blob: Vec<u8>) {
        self.inner.write().blobs.insert(blob_key.to_string(), blob);
    }

    /// Delete a meta or blob key. Returns whether anything was removed.
    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write();
        inner.metas.remove(key).is_some() | inner.blobs.remove(key).is_some()
    }

    /// Number of stored blobs.
    pub fn chunk_count(&self) -> usize {
        self.inner.read().blobs.len()
    }
}

impl ChunkStore for MemoryChunkStore {
    fn put_chunk(
        &self,
        meta_key: &str,
        meta: &FieldMap,
        blob_key: &str,
        blob: &[u8],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.metas.contains_key(meta_key) {
            return Err(StoreError::AlreadyExists(meta_key.to_string()));
        }
        inner.blobs.insert(blob_key.to_string(), blob.to_vec());
        inner.metas.insert(meta_key.to_string(), meta.clone());
        Ok(())
    }

    fn get_meta(&self, meta_key: &str) -> Result<Option<FieldMap>, StoreError> {
        Ok(self.inner.read().metas.get(meta_key).cloned())
    }

    fn get_blob(&self, blob_key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.read().blobs.get(blob_key).cloned())
    }

    fn append_index(&self, index_key: &str, member: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .indexes
            .entry(index_key.to_string())
            .or_default()
            .push(member.to_string());
        Ok(())
    }

    fn index_members(&self, index_key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .indexes
            .get(index_key)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// FileChunkStore
// =============================================================================

/// One file per key under a root directory.
///
/// Metas are JSON objects (`*.json`), blobs raw bytes (`*.bin`),
/// indexes newline-separated ids (`*.idx`). Each file is written to a `.tmp`
/// sibling and renamed into place; the blob is renamed before the meta, so a
/// visible meta always has its blob.
pub struct FileChunkStore {
    root: PathBuf,
    /// Serialises chunk commits and index appends within this process.
    write_lock: Mutex<()>,
}

impl FileChunkStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "file chunk store opened");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str, extension: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| match c {
                ':' | '/' | '\\' => '_',
                c => c,
            })
            .collect();
        self.root.join(format!("{name}.{extension}"))
    }

    fn write_tmp(path: &Path, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(tmp)
    }

    fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl ChunkStore for FileChunkStore {
    fn put_chunk(
        &self,
        meta_key: &str,
        meta: &FieldMap,
        blob_key: &str,
        blob: &[u8],
    ) -> Result<(), StoreError> {
        let blob_path = self.path_for(blob_key, "bin");
        let meta_path = self.path_for(meta_key, "json");

        let meta_json = serde_json::to_vec_pretty(meta)?;

        let _guard = self.write_lock.lock();
        if meta_path.exists() {
            return Err(StoreError::AlreadyExists(meta_key.to_string()));
        }
        let blob_tmp = Self::write_tmp(&blob_path, blob)?;
        let meta_tmp = Self::write_tmp(&meta_path, &meta_json)?;

        fs::rename(&blob_tmp, &blob_path)?;
        fs::rename(&meta_tmp, &meta_path)?;

        debug!(meta = %meta_path.display(), blob_bytes = blob.len(), "chunk files committed");
        Ok(())
    }

    fn get_meta(&self, meta_key: &str) -> Result<Option<FieldMap>, StoreError> {
        match Self::read_optional(&self.path_for(meta_key, "json"))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_blob(&self, blob_key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Self::read_optional(&self.path_for(blob_key, "bin"))
    }

    fn append_index(&self, index_key: &str, member: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(index_key, "idx"))?;
        writeln!(file, "{member}")?;
        Ok(())
    }

    fn index_members(&self, index_key: &str) -> Result<Vec<String>, StoreError> {
        let file = match fs::File::open(self.path_for(index_key, "idx")) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                out.push(line.to_string());
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Tests
// =============================================================================
