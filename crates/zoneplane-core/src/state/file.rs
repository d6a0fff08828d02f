// # File Store
//
// File-backed implementation of Store with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: every commit writes a temp file, then renames it over
//   the store file
// - Backup: the previous file is copied to `.backup` before the rename
// - Recovery: a store file that fails to parse is replaced from the backup
//
// A commit is acknowledged only after the rename, so a crash can lose at
// most the commit in flight.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "dataset": { "revision": 7, "zones": [...], "records": [...] }
// }
// ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::memory::swap_if_current;
use crate::Error;
use crate::dataset::Dataset;
use crate::traits::store::{Store, StoreFactory};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// JSON-file store
///
/// The committed dataset is cached in memory; the file is rewritten on
/// every commit while the write lock is held.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    current: RwLock<Arc<Dataset>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFileFormat {
    version: String,
    dataset: Dataset,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// Creates parent directories as needed. A corrupted file is recovered
    /// from its backup; with no usable backup the store starts empty.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let dataset = Self::load_with_recovery(&path).await?;
        tracing::debug!(
            path = %path.display(),
            revision = dataset.revision,
            zones = dataset.zones.len(),
            "file store opened"
        );
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(dataset)),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<Dataset, Error> {
        match Self::load(path).await {
            Ok(dataset) => Ok(dataset),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );
                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(Dataset::default());
                }
                match Self::load(&backup_path).await {
                    Ok(dataset) => {
                        tracing::info!(revision = dataset.revision, "Recovered store from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(dataset)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unusable: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(Dataset::default())
                    }
                }
            }
            Err(other) => Err(other),
        }
    }

    async fn load(path: &Path) -> Result<Dataset, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(Dataset::default());
        }
        let content = fs::read_to_string(path).await?;
        let file: StoreFileFormat = serde_json::from_str(&content)?;
        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }
        Ok(file.dataset)
    }

    async fn write(&self, dataset: &Dataset) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            dataset: dataset.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut handle = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            handle.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            handle.flush().await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store_unavailable(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;
        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl Store for FileStore {
    async fn snapshot(&self) -> Result<Arc<Dataset>, Error> {
        Ok(Arc::clone(&*self.current.read().await))
    }

    async fn commit(&self, expected_revision: u64, next: Dataset) -> Result<u64, Error> {
        let mut guard = self.current.write().await;
        let mut staged = Arc::clone(&guard);
        let revision = swap_if_current(&mut staged, expected_revision, next)?;
        self.write(&staged).await?;
        *guard = staged;
        Ok(revision)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Commits are written through; rewrite so a deleted file reappears.
        let guard = self.current.read().await;
        self.write(&guard).await
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for creating file stores
///
/// Expects `{"path": "/var/lib/zoneplane/store.json"}`.
pub struct FileStoreFactory;

#[async_trait]
impl StoreFactory for FileStoreFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn Store>, Error> {
        let path = config
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::config("file store requires a 'path' string"))?;
        Ok(Arc::new(FileStore::open(path).await?))
    }
}
