//! Content-addressed store for audit artifacts.
//!
//! Objects are keyed by the hex SHA-256 of their bytes. Storing the same
//! content twice is a no-op, so concurrent writers never conflict.

use crate::error::{LedgerError, Result};
use crate::hashing::{canonical_json, sha256_hex};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_CACHE_CAPACITY: usize = 256;
const OBJECT_EXTENSION: &str = "json";

/// Outcome of a put: the content key and whether it was new.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasPut {
    pub hash: String,
    pub inserted: bool,
}

pub trait ContentStore: Send + Sync {
    /// Store raw bytes under their hash.
    fn put_bytes(&self, bytes: &[u8]) -> Result<CasPut>;

    /// Fetch the bytes stored under `hash`, if any.
    fn get_bytes(&self, hash: &str) -> Result<Option<Vec<u8>>>;

    fn contains(&self, hash: &str) -> Result<bool>;

    /// All stored keys, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Recompute the hash of a stored object and compare it with its key.
    fn verify(&self, hash: &str) -> Result<()> {
        let bytes = self
            .get_bytes(hash)?
            .ok_or_else(|| LedgerError::IntegrityMismatch(format!("object {} is missing", hash)))?;
        let actual = sha256_hex(&bytes);
        if actual != hash {
            return Err(LedgerError::IntegrityMismatch(format!(
                "object {} hashes to {}",
                hash, actual
            )));
        }
        Ok(())
    }
}

impl dyn ContentStore {
    /// Store the canonical JSON form of `value`.
    pub fn put<T: Serialize>(&self, value: &T) -> Result<CasPut> {
        self.put_bytes(&canonical_json(value)?)
    }

    pub fn get<T: DeserializeOwned>(&self, hash: &str) -> Result<Option<T>> {
        match self.get_bytes(hash)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn validate_key(hash: &str) -> Result<()> {
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LedgerError::IntegrityMismatch(format!(
            "'{}' is not a content hash",
            hash
        )));
    }
    Ok(())
}

/// In-memory store, used by tests and ephemeral ledgers.
#[derive(Default)]
pub struct MemoryContentStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite an object in place to simulate corruption.
    #[cfg(any(test, feature = "testing"))]
    pub fn corrupt(&self, hash: &str, bytes: Vec<u8>) {
        self.objects.write().insert(hash.to_string(), bytes);
    }
}

impl ContentStore for MemoryContentStore {
    fn put_bytes(&self, bytes: &[u8]) -> Result<CasPut> {
        let hash = sha256_hex(bytes);
        let mut objects = self.objects.write();
        let inserted = !objects.contains_key(&hash);
        if inserted {
            objects.insert(hash.clone(), bytes.to_vec());
        }
        Ok(CasPut { hash, inserted })
    }

    fn get_bytes(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().get(hash).cloned())
    }

    fn contains(&self, hash: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(hash))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Directory-backed store: one `<hash>.json` file per object, fronted by an
/// LRU read cache.
pub struct FsContentStore {
    root: PathBuf,
    cache: Mutex<LruCache<String, Vec<u8>>>,
}

impl FsContentStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_cache_capacity(root, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(root: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            root,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, hash: &str) -> PathBuf {
        self.root.join(format!("{}.{}", hash, OBJECT_EXTENSION))
    }
}

impl ContentStore for FsContentStore {
    fn put_bytes(&self, bytes: &[u8]) -> Result<CasPut> {
        let hash = sha256_hex(bytes);
        let path = self.object_path(&hash);
        if path.exists() {
            debug!(hash = %hash, "CAS object already present");
            return Ok(CasPut { hash, inserted: false });
        }

        // Write to a temp file first so readers never observe a partial object.
        let tmp = self.root.join(format!(".{}.tmp", hash));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        self.cache.lock().put(hash.clone(), bytes.to_vec());
        debug!(hash = %hash, size = bytes.len(), "CAS object stored");
        Ok(CasPut { hash, inserted: true })
    }

    fn get_bytes(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        validate_key(hash)?;
        if let Some(bytes) = self.cache.lock().get(hash) {
            return Ok(Some(bytes.clone()));
        }

        let path = self.object_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        self.cache.lock().put(hash.to_string(), bytes.clone());
        Ok(Some(bytes))
    }

    fn contains(&self, hash: &str) -> Result<bool> {
        validate_key(hash)?;
        Ok(self.object_path(hash).exists())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(OBJECT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Verification always reads from disk so a tampered file is not masked
    /// by a cached copy.
    fn verify(&self, hash: &str) -> Result<()> {
        validate_key(hash)?;
        let path = self.object_path(hash);
        if !path.exists() {
            return Err(LedgerError::IntegrityMismatch(format!("object {} is missing", hash)));
        }
        let actual = sha256_hex(&fs::read(&path)?);
        if actual != hash {
            return Err(LedgerError::IntegrityMismatch(format!(
                "object {} hashes to {}",
                hash, actual
            )));
        }
        Ok(())
    }
}
