use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{check_quota, DurableStorage, StorageError};

/// One `<key>.json` file per key under `dir`. The optional quota caps the total
/// bytes of every stored value.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    quota_bytes: Option<u64>,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            quota_bytes: None,
        }
    }

    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn used_bytes_excluding(&self, skip: &Path) -> u64 {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return 0;
        };
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .filter(|path| path != skip)
            .filter_map(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum()
    }
}

impl DurableStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let needed = self.used_bytes_excluding(&path) + value.len() as u64;
        check_quota(key, needed, self.quota_bytes)?;
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        std::fs::write(&path, value).map_err(io_err)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_roundtrip_and_remove() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let storage = FileStorage::new(temp.path().join("store"));
        assert_eq!(storage.read("app-theme")?, None);

        storage.write("app-theme", "\"classic\"")?;
        assert_eq!(storage.read("app-theme")?.as_deref(), Some("\"classic\""));
        assert!(temp.path().join("store/app-theme.json").exists());

        storage.remove("app-theme")?;
        storage.remove("app-theme")?;
        assert_eq!(storage.read("app-theme")?, None);
        Ok(())
    }

    #[test]
    fn file_storage_quota_counts_other_keys_but_not_the_overwritten_one() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let storage = FileStorage::new(temp.path()).with_quota(Some(10));
        storage.write("a", "12345")?;
        storage.write("a", "1234567")?;

        let err = storage.write("b", "12345").err();
        assert!(err.as_ref().is_some_and(StorageError::is_quota));
        assert_eq!(storage.read("b")?, None);
        assert_eq!(storage.read("a")?.as_deref(), Some("1234567"));
        Ok(())
    }

    #[test]
    fn file_storage_sanitizes_keys() {
        let storage = FileStorage::new("/tmp/atelier");
        assert_eq!(
            storage.path_for("../image gen"),
            PathBuf::from("/tmp/atelier/___image_gen.json")
        );
    }
}
