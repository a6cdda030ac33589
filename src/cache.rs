//! Rendered-response cache.
//!
//! Running `convert` is the expensive part of serving an image request. This
//! module stores every rendered response on disk so that the same request
//! string is transformed at most once per cache directory.
//!
//! # Design
//!
//! ## Cache keys
//!
//! The cache is **content-addressed by request**: the key is the SHA-256 of
//! the canonical request string (decoded path plus the verbatim query), as
//! lowercase hex. Case is preserved, so `/iiif/Cat/...` and `/iiif/cat/...`
//! are different entries. Source files are assumed immutable; replacing a
//! source image requires clearing the cache directory by hand.
//!
//! ## Storage
//!
//! One file per key at `<cache_dir>/<key>`:
//!
//! ```text
//! image/jpeg\n
//! <encoded bytes…>
//! ```
//!
//! The content type and the bytes live in the same file, so publishing an
//! entry is a single rename. Writes go to a uniquely named temporary file in
//! the cache directory first and are renamed into place, which means a
//! reader sees either nothing or a complete entry, never a partial one.
//!
//! There is no eviction or expiry.
//!
//! ## Disabling
//!
//! With `cache.enabled = false` lookups always miss and stores are skipped.
//! Concurrent identical requests are still deduplicated by
//! [`SingleFlight`](crate::flight::SingleFlight), which is independent of
//! this module.

use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read cache entry {key}: {source}")]
    ReadFailed {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to write cache entry {key}: {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Lowercase hex SHA-256 of a canonical request string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A rendered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct ResponseCache {
    dir: PathBuf,
    enabled: bool,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            enabled: true,
            stats: CacheStats::default(),
        }
    }

    /// A cache that never stores anything.
    pub fn disabled(dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: false,
            ..Self::new(dir)
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn key(canonical_request: &str) -> CacheKey {
        CacheKey(format!("{:x}", Sha256::digest(canonical_request.as_bytes())))
    }

    /// Path of the entry file for `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Look up an entry. A missing file is a miss, not an error.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        if !self.enabled {
            return Ok(None);
        }
        let raw = match std::fs::read(self.entry_path(key)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::ReadFailed {
                    key: key.to_string(),
                    source,
                });
            }
        };
        let entry = decode_entry(raw).map_err(|source| CacheError::ReadFailed {
            key: key.to_string(),
            source,
        })?;
        self.stats.hit();
        Ok(Some(entry))
    }

    /// Store an entry via a temporary file and an atomic rename.
    pub fn put(&self, key: &CacheKey, bytes: &[u8], content_type: &str) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        self.write_entry(key, bytes, content_type)
            .map_err(|source| CacheError::WriteFailed {
                key: key.to_string(),
                source,
            })
    }

    fn write_entry(&self, key: &CacheKey, bytes: &[u8], content_type: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(content_type.as_bytes())?;
        staged.write_all(b"\n")?;
        staged.write_all(bytes)?;
        staged.flush()?;
        staged
            .persist(self.entry_path(key))
            .map_err(|e| e.error)?;
        Ok(())
    }
}

fn decode_entry(mut raw: Vec<u8>) -> io::Result<CacheEntry> {
    let corrupt = || io::Error::new(io::ErrorKind::InvalidData, "malformed cache entry");
    let newline = raw.iter().position(|&b| b == b'\n').ok_or_else(corrupt)?;
    let bytes = raw.split_off(newline + 1);
    raw.truncate(newline);
    let content_type = String::from_utf8(raw).map_err(|_| corrupt())?;
    if content_type.is_empty() {
        return Err(corrupt());
    }
    Ok(CacheEntry {
        bytes,
        content_type,
    })
}

/// Running totals for a server process.
///
/// Shared across request threads, hence atomics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU32,
    builds: AtomicU32,
    shared: AtomicU32,
}

impl CacheStats {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn build(&self) {
        self.builds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn share(&self) {
        self.shared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn builds(&self) -> u32 {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn shared(&self) -> u32 {
        self.shared.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u32 {
        self.hits() + self.builds() + self.shared()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hits, builds, shared) = (self.hits(), self.builds(), self.shared());
        if hits > 0 || shared > 0 {
            if shared > 0 {
                write!(
                    f,
                    "{} cached, {} shared, {} rendered ({} total)",
                    hits,
                    shared,
                    builds,
                    self.total()
                )
            } else {
                write!(
                    f,
                    "{} cached, {} rendered ({} total)",
                    hits,
                    builds,
                    self.total()
                )
            }
        } else {
            write!(f, "{} rendered", builds)
        }
    }
}
