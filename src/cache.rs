//! Content-hash build cache for incremental builds.
//!
//! Composition is cheap per page but a site rebuild touches every page,
//! layout and asset. This module lets the builder skip files whose content
//! has not changed since the last successful build.
//!
//! # Design
//!
//! The cache is **content-addressed**: each source file maps to the SHA-256
//! of its bytes. Content hashes rather than modification times, so the cache
//! survives `git checkout` and filesystems with coarse mtime resolution.
//!
//! Entries are monotonic. The builder calls [`BuildCache::store_hash`] or
//! [`BuildCache::update_hash`] only after the corresponding output was
//! written, so an entry always reflects the last successfully built content.
//! A failed write leaves the old entry (or none) and the file is retried on
//! the next build.
//!
//! ## Storage
//!
//! Two JSON files live in the cache directory (default `.unify-cache/`):
//!
//! - `file-hashes.json`: source path → content hash
//! - `dependencies.json`: source path → list of [`Dependency`] edges, used to
//!   restore the [`DependencyTracker`](crate::deps::DependencyTracker) across
//!   process restarts
//!
//! Each file carries a format version. A missing, unreadable, corrupt or
//! outdated file loads as an empty map: the next build is a full build, never
//! a crash.

use crate::types::Dependency;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File holding the path → hash map.
const HASHES_FILENAME: &str = "file-hashes.json";

/// File holding the path → dependency-list map.
const DEPENDENCIES_FILENAME: &str = "dependencies.json";

/// Version of the on-disk format. Bump this to invalidate all existing
/// caches when the format or key computation changes.
const CACHE_VERSION: u32 = 1;

/// Versioned envelope shared by both cache files.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile<T> {
    version: u32,
    entries: HashMap<String, T>,
}

/// Outcome of [`BuildCache::check_multiple`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckResult {
    pub changed: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
}

/// Persisted content hashes and dependency lists.
#[derive(Debug, Clone)]
pub struct BuildCache {
    cache_dir: PathBuf,
    hashes: HashMap<String, String>,
    dependencies: HashMap<String, Vec<Dependency>>,
}

impl BuildCache {
    /// Create an empty cache rooted at `cache_dir` (first build, or `--clean`).
    pub fn empty(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            hashes: HashMap::new(),
            dependencies: HashMap::new(),
        }
    }

    /// Load both maps from `cache_dir`. Each map independently degrades to
    /// empty if its file is missing or can't be parsed.
    pub fn load(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        let hashes = load_map(&cache_dir.join(HASHES_FILENAME));
        let dependencies = load_map(&cache_dir.join(DEPENDENCIES_FILENAME));
        debug!(
            dir = %cache_dir.display(),
            hashes = hashes.len(),
            dependencies = dependencies.len(),
            "loaded build cache"
        );
        Self {
            cache_dir,
            hashes,
            dependencies,
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Number of files with a stored hash.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Stored hash for `path`, if any.
    pub fn hash(&self, path: &Path) -> Option<&str> {
        self.hashes.get(&key(path)).map(String::as_str)
    }

    /// True if `path` has no stored hash, can't be read, or its content
    /// differs from the stored hash.
    pub fn has_changed(&self, path: &Path) -> bool {
        let Some(stored) = self.hashes.get(&key(path)) else {
            return true;
        };
        match hash_file(path) {
            Ok(current) => current != *stored,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "hash failed, treating as changed");
                true
            }
        }
    }

    /// Partition `paths` into changed and unchanged files.
    ///
    /// Hashing runs in parallel. A hash error on one file marks only that
    /// file as changed. Input order is preserved within each list.
    pub fn check_multiple(&self, paths: &[PathBuf]) -> CheckResult {
        let flags: Vec<bool> = paths.par_iter().map(|p| self.has_changed(p)).collect();
        let mut result = CheckResult::default();
        for (path, changed) in paths.iter().zip(flags) {
            if changed {
                result.changed.push(path.clone());
            } else {
                result.unchanged.push(path.clone());
            }
        }
        result
    }

    /// Hash `path` from disk and record it. Call only after the file's
    /// output was written successfully.
    pub fn store_hash(&mut self, path: &Path) -> io::Result<String> {
        let hash = hash_file(path)?;
        self.hashes.insert(key(path), hash.clone());
        Ok(hash)
    }

    /// Record the hash of already-read `content` for `path`.
    pub fn update_hash(&mut self, path: &Path, content: &str) -> String {
        let hash = hash_content(content);
        self.hashes.insert(key(path), hash.clone());
        hash
    }

    /// Every path with a stored hash.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.hashes.keys().map(PathBuf::from).collect()
    }

    /// Replace the persisted dependency list of `path`.
    pub fn set_dependencies(&mut self, path: &Path, deps: Vec<Dependency>) {
        if deps.is_empty() {
            self.dependencies.remove(&key(path));
        } else {
            self.dependencies.insert(key(path), deps);
        }
    }

    /// Persisted dependency lists, keyed by source path.
    pub fn dependencies(&self) -> impl Iterator<Item = (PathBuf, &[Dependency])> {
        self.dependencies
            .iter()
            .map(|(path, deps)| (PathBuf::from(path), deps.as_slice()))
    }

    /// Forget everything about `path` (deleted source file).
    pub fn remove(&mut self, path: &Path) {
        let key = key(path);
        self.hashes.remove(&key);
        self.dependencies.remove(&key);
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
        self.dependencies.clear();
    }

    /// Write both maps into the cache directory, creating it if needed.
    pub fn persist(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        save_map(&self.cache_dir.join(HASHES_FILENAME), &self.hashes)?;
        save_map(&self.cache_dir.join(DEPENDENCIES_FILENAME), &self.dependencies)?;
        debug!(dir = %self.cache_dir.display(), "persisted build cache");
        Ok(())
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn load_map<T: for<'de> Deserialize<'de>>(path: &Path) -> HashMap<String, T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return HashMap::new(),
    };
    let file: CacheFile<T> = match serde_json::from_str(&content) {
        Ok(f) => f,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "corrupt cache file, starting cold");
            return HashMap::new();
        }
    };
    if file.version != CACHE_VERSION {
        debug!(path = %path.display(), version = file.version, "cache version mismatch");
        return HashMap::new();
    }
    file.entries
}

fn save_map<T: Serialize + Clone>(path: &Path, entries: &HashMap<String, T>) -> io::Result<()> {
    let file = CacheFile {
        version: CACHE_VERSION,
        entries: entries.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(tmp, path)
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// SHA-256 hash of in-memory content. Matches [`hash_file`] for the same bytes.
pub fn hash_content(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub invalidations: usize,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn invalidate(&mut self) {
        self.invalidations += 1;
    }

    pub fn total(&self) -> usize {
        self.hits + self.invalidations
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} changed ({} total)",
                self.hits,
                self.invalidations,
                self.total()
            )
        } else {
            write!(f, "{} changed", self.invalidations)
        }
    }
}
