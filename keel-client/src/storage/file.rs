//! File-backed storage: one JSON document per key.
//!
//! Queue records are human-readable on disk, which makes corrupted records
//! observable and keeps the skip-bad-records semantics easy to exercise.
//! Writes go to a temp file first and are renamed into place, so a crash
//! mid-write leaves either the old value or no value, never a torn record.

use super::{Storage, StorageError};
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

const SUFFIX: &str = ".json";
const TMP_SUFFIX: &str = ".json.tmp";

/// Directory-of-files storage.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        // Keys come from the queue store (uuid-style ids); anything that
        // could escape the directory is rejected rather than sanitized.
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(StorageError::WriteRejected(format!("invalid key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}{SUFFIX}")))
    }
}

fn io_error(e: std::io::Error) -> StorageError {
    match e.kind() {
        IoErrorKind::PermissionDenied => StorageError::WriteRejected(e.to_string()),
        _ => StorageError::Io(e.to_string()),
    }
}

fn key_of(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    if name.ends_with(TMP_SUFFIX) {
        return None;
    }
    name.strip_suffix(SUFFIX).map(str::to_string)
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!("{key}{TMP_SUFFIX}"));
        tokio::fs::write(&tmp, &value).await.map_err(io_error)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn list_all(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_error)?;
        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            let Some(key) = key_of(&path) else { continue };
            match tokio::fs::read(&path).await {
                Ok(bytes) => out.push((key, bytes)),
                // Deleted between listing and reading; not our problem.
                Err(e) if e.kind() == IoErrorKind::NotFound => continue,
                Err(e) => return Err(io_error(e)),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();

        storage.put("item-1", b"{\"a\":1}".to_vec()).await.unwrap();
        assert_eq!(
            storage.get("item-1").await.unwrap(),
            Some(b"{\"a\":1}".to_vec())
        );

        storage.delete("item-1").await.unwrap();
        assert_eq!(storage.get("item-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_all_sees_every_record_but_not_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();

        storage.put("a", b"1".to_vec()).await.unwrap();
        storage.put("b", b"2".to_vec()).await.unwrap();
        tokio::fs::write(dir.path().join("c.json.tmp"), b"torn")
            .await
            .unwrap();

        let mut keys: Vec<String> = storage
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = FileStorage::open(dir.path()).await.unwrap();
            storage.put("persisted", b"v".to_vec()).await.unwrap();
        }
        let storage = FileStorage::open(dir.path()).await.unwrap();
        assert_eq!(
            storage.get("persisted").await.unwrap(),
            Some(b"v".to_vec())
        );
    }

    #[tokio::test]
    async fn hostile_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();

        assert!(storage.put("../escape", vec![]).await.is_err());
        assert!(storage.put("", vec![]).await.is_err());
        assert!(storage.get("a/b").await.is_err());
    }
}
