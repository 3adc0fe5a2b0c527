#[cfg(test)]
mod tests;

use crate::error::AppError;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Content-addressed cache under `DATA_DIR`.
///
/// Two kinds of entries share the directory: `<H_C>.yaml` content files,
/// authoritative and keyed by a hash of their own bytes, and `<H_U>.map`
/// pointer files that map a subscription URL's hash to the `H_C` currently
/// associated with it. The pointer is advisory — `lookup` falls through to
/// a fresh fetch whenever it is missing, unreadable, or points at a content
/// file that no longer exists.
#[derive(Clone)]
pub struct CacheIndex {
    dir: PathBuf,
}

/// Result of resolving a subscription URL against the cache.
pub struct Lookup {
    /// Path the content file would live at (or does live at, if `present`).
    pub path: PathBuf,
    /// `true` if the content file exists and is within the freshness window.
    pub fresh: bool,
    /// `true` if the content file exists at all (fresh or stale).
    pub present: bool,
    /// Content hash, when a pointer was resolved.
    pub content_hash: Option<String>,
}

impl CacheIndex {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn content_path(&self, content_hash: &str) -> PathBuf {
        self.dir.join(format!("{content_hash}.yaml"))
    }

    fn pointer_path(&self, url_hash: &str) -> PathBuf {
        self.dir.join(format!("{url_hash}.map"))
    }

    /// `lookup(U) -> (path, fresh, present)` per the cache index contract.
    pub fn lookup(&self, url: &str, max_age: Duration) -> Lookup {
        let url_hash = hash_str(url);
        let content_hash = std::fs::read_to_string(self.pointer_path(&url_hash))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let Some(content_hash) = content_hash else {
            metrics::counter!("auditor_cache_lookup_total", "result" => "miss").increment(1);
            return Lookup {
                path: self.dir.join("unresolved.yaml"),
                fresh: false,
                present: false,
                content_hash: None,
            };
        };

        let path = self.content_path(&content_hash);
        let present = path.exists();
        let fresh = present && self.is_fresh(&path, max_age);

        metrics::counter!(
            "auditor_cache_lookup_total",
            "result" => if fresh { "hit" } else if present { "stale" } else { "miss" }
        )
        .increment(1);

        Lookup {
            path,
            fresh,
            present,
            content_hash: Some(content_hash),
        }
    }

    fn is_fresh(&self, path: &Path, max_age: Duration) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(modified) = meta.modified() else {
            return false;
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age < max_age,
            Err(_) => true, // mtime in the future: treat as fresh
        }
    }

    /// `store_bytes(H_C, bytes)`: write via temp-file + fsync + rename.
    ///
    /// Fsync happens before rename: without it a crash between `write` and
    /// `rename` can leave the temp file's data unflushed while the rename has
    /// already landed on a journal, yielding a truncated "complete" file.
    pub fn store_bytes(&self, content_hash: &str, bytes: &[u8]) -> Result<(), AppError> {
        let target = self.content_path(content_hash);
        atomic_write(&target, bytes)
    }

    /// `point(U -> H_C)`: best-effort write of the pointer file.
    pub fn point(&self, url: &str, content_hash: &str) {
        let url_hash = hash_str(url);
        if let Err(e) = std::fs::write(self.pointer_path(&url_hash), content_hash) {
            tracing::warn!("cache: failed to write pointer for url hash {}: {}", url_hash, e);
        }
    }

    pub fn content_hash_of(bytes: &[u8]) -> String {
        hash_bytes(bytes)
    }
}

/// Write `bytes` to `path` via a `.tmp` sibling, fsync the temp handle, then
/// rename into place. Used both by the cache index and by the checker's
/// incremental document saves.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = std::fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    // Truncated to 32 hex chars: plenty of collision resistance for a
    // content-addressed filename, and keeps names close to the original
    // MD5-hex length this cache format was designed around.
    let hex = format!("{digest:x}");
    hex[..32].to_string()
}
