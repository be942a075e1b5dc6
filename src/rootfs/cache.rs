//! Content-addressed cache of built initramfs archives.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::errors::KraftError;
use crate::util::fs::write_atomic;
use crate::util::hash::Fingerprint;

/// Defaults recovered from the rootfs source, stored next to the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootfsMeta {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A cache hit.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub archive: PathBuf,
    pub meta: RootfsMeta,
}

pub struct RootfsCache {
    dir: PathBuf,
}

impl RootfsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        RootfsCache { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn archive_path(&self, key: &str, compress: bool) -> PathBuf {
        let ext = if compress { "cpio.gz" } else { "cpio" };
        self.dir.join(format!("{}.{}", key, ext))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn lookup(&self, key: &str, compress: bool) -> Option<CacheEntry> {
        let archive = self.archive_path(key, compress);
        if !archive.is_file() {
            return None;
        }
        let meta = std::fs::read_to_string(self.meta_path(key))
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())?;
        Some(CacheEntry { archive, meta })
    }

    /// Store `data` under `key`; the metadata is written last so a partial
    /// store is never reported as a hit.
    pub fn store(&self, key: &str, compress: bool, data: &[u8], meta: &RootfsMeta) -> Result<PathBuf> {
        let archive = self.archive_path(key, compress);
        write_atomic(&archive, data).map_err(|e| KraftError::cache_write(&archive, e))?;

        let meta_path = self.meta_path(key);
        let json = serde_json::to_vec_pretty(meta).context("failed to serialize rootfs metadata")?;
        write_atomic(&meta_path, &json).map_err(|e| KraftError::cache_write(&meta_path, e))?;
        Ok(archive)
    }
}

/// Feed every path, mode, link target and file content under `dir` into `fp`.
///
/// Entries at the paths in `skip`, and everything below them, are left out.
pub fn fingerprint_dir(fp: &mut Fingerprint, dir: &Path, skip: &[PathBuf]) -> Result<()> {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !skip.iter().any(|p| e.path() == p));
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("path outside of {}", dir.display()))?;
        fp.update_str(&relative.to_string_lossy());
        fp.update_u32(mode(entry.path()));

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path())
                .with_context(|| format!("failed to read link {}", entry.path().display()))?;
            fp.update_str("l").update_str(&target.to_string_lossy());
        } else if file_type.is_dir() {
            fp.update_str("d");
        } else {
            let data = std::fs::read(entry.path())
                .with_context(|| format!("failed to read {}", entry.path().display()))?;
            fp.update_str("f").update_bytes(&data);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::symlink_metadata(path)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0)
}

#[cfg(not(unix))]
fn mode(_path: &Path) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{rootfs_tree, write_file};
    use tempfile::TempDir;

    fn key(dir: &Path) -> String {
        let mut fp = Fingerprint::new();
        fingerprint_dir(&mut fp, dir, &[]).unwrap();
        fp.finish()
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let tmp = TempDir::new().unwrap();
        let root = rootfs_tree(tmp.path());

        let before = key(&root);
        assert_eq!(before, key(&root));

        write_file(&root.join("etc/hostname"), "changed\n");
        assert_ne!(before, key(&root));
    }

    #[test]
    fn test_fingerprint_skips_given_paths() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("Dockerfile"), "FROM scratch\n");
        let mut fp = Fingerprint::new();
        fingerprint_dir(&mut fp, tmp.path(), &[tmp.path().join(".unikraft")]).unwrap();
        let before = fp.finish();

        write_file(&tmp.path().join(".unikraft/build/kernel"), "k");
        let mut fp = Fingerprint::new();
        fingerprint_dir(&mut fp, tmp.path(), &[tmp.path().join(".unikraft")]).unwrap();
        assert_eq!(before, fp.finish());
    }

    #[test]
    fn test_store_and_lookup() {
        let tmp = TempDir::new().unwrap();
        let cache = RootfsCache::new(tmp.path().join("cache"));
        assert!(cache.lookup("abc", false).is_none());

        let meta = RootfsMeta {
            command: vec!["/bin/app".into()],
            env: BTreeMap::new(),
        };
        cache.store("abc", false, b"archive", &meta).unwrap();

        let hit = cache.lookup("abc", false).unwrap();
        assert_eq!(hit.meta, meta);
        assert_eq!(std::fs::read(hit.archive).unwrap(), b"archive");
        assert!(cache.lookup("abc", true).is_none());
    }
}
