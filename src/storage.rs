//! Key-value storage behind the look repository.
//!
//! Values are JSON text. Both stores enforce a byte quota over keys plus
//! values; a write that would exceed it fails with `StorageQuotaExceeded` and
//! the previous value stays in place.

use crate::error::{ComposeError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
    /// Bytes currently charged against the quota.
    fn usage(&self) -> Result<usize>;
}

fn check_quota(quota: usize, used_elsewhere: usize, key: &str, value: &str) -> Result<()> {
    let needed = key.len() + value.len();
    let available = quota.saturating_sub(used_elsewhere);
    if needed > available {
        return Err(ComposeError::StorageQuotaExceeded { needed, available });
    }
    Ok(())
}

/// In-memory store, used by tests and as a fallback when no data directory exists.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: usize,
}

impl MemoryStore {
    pub fn new(quota: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let current = self
            .entries
            .get(key)
            .map_or(0, |old| key.len() + old.len());
        check_quota(self.quota, self.usage()? - current, key, value)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn usage(&self) -> Result<usize> {
        Ok(self.entries.iter().map(|(k, v)| k.len() + v.len()).sum())
    }
}

/// One `<key>.json` file per key inside a directory.
///
/// Writes go to a temporary file that is renamed over the target, so a failed
/// write never leaves a truncated value behind.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
    quota: usize,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>, quota: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ComposeError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid storage key {key:?}"),
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Writes `bytes` to `tmp`, then renames it over `path`.
    fn replace_with(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(tmp, path)
    }

    fn charged_size(path: &Path) -> io::Result<usize> {
        let key_len = path
            .file_stem()
            .map_or(0, |stem| stem.to_string_lossy().len());
        Ok(key_len + fs::metadata(path)?.len() as usize)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let current = match Self::charged_size(&path) {
            Ok(size) => size,
            Err(err) if err.kind() == io::ErrorKind::NotFound => 0,
            Err(err) => return Err(err.into()),
        };
        check_quota(self.quota, self.usage()?.saturating_sub(current), key, value)?;

        let tmp = self.dir.join(format!(".{key}.tmp"));
        if let Err(err) = Self::replace_with(&tmp, &path, value.as_bytes()) {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    log::warn!("could not remove {}: {cleanup}", tmp.display());
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn usage(&self) -> Result<usize> {
        let mut total = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                total += Self::charged_size(&path)?;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("lookboard-store-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn memory_store_rejects_writes_over_quota() {
        let mut store = MemoryStore::new(20);
        store.set("a", "0123456789").unwrap();
        let err = store.set("b", "0123456789").unwrap_err();
        assert!(matches!(
            err,
            ComposeError::StorageQuotaExceeded {
                needed: 11,
                available: 9
            }
        ));
        assert_eq!(store.get("b").unwrap(), None);

        // Replacing a value only charges the difference.
        store.set("a", "0123456789abcdefgh").unwrap();
        assert!(store.set("a", "0123456789abcdefghij").is_err());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("0123456789abcdefgh"));
    }

    #[test]
    fn file_store_round_trips_and_keeps_old_value_on_failure() {
        let dir = temp_dir();
        let mut store = FileStore::open(&dir, 64).unwrap();
        assert_eq!(store.get("looks").unwrap(), None);

        store.set("looks", "[1,2,3]").unwrap();
        assert_eq!(store.get("looks").unwrap().as_deref(), Some("[1,2,3]"));
        assert_eq!(store.usage().unwrap(), "looks".len() + "[1,2,3]".len());

        let big = "x".repeat(100);
        assert!(matches!(
            store.set("looks", &big),
            Err(ComposeError::StorageQuotaExceeded { .. })
        ));
        assert_eq!(store.get("looks").unwrap().as_deref(), Some("[1,2,3]"));

        store.remove("looks").unwrap();
        store.remove("looks").unwrap();
        assert_eq!(store.get("looks").unwrap(), None);
        assert!(store.set("../escape", "1").is_err());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_write_leaves_no_temp_file() {
        let dir = temp_dir();
        let mut store = FileStore::open(&dir, 1 << 20).unwrap();
        // A directory where the value file belongs makes the final rename fail.
        fs::create_dir_all(dir.join("looks.json")).unwrap();

        assert!(matches!(store.set("looks", "[]"), Err(ComposeError::Io(_))));
        assert!(!dir.join(".looks.tmp").exists());
        assert!(dir.join("looks.json").is_dir());

        fs::remove_dir_all(&dir).unwrap();
    }
}
