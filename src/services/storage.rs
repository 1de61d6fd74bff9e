use crate::models::{ArtifactKind, StorageKey};
use reqwest::Url;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Extension used when neither the source nor the content type suggests one
pub const DEFAULT_EXTENSION: &str = "jpg";

const MAX_EXTENSION_LEN: usize = 5;

/// Errors that can occur with temporary storage
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {key}: {source}")]
    Remove {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{key} is not present in storage: {detail}")]
    Integrity { key: String, detail: String },

    #[error("storage root unavailable: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: usize,
    pub failed: usize,
}

/// Directory-backed store for per-request temporary images
///
/// Every file lives directly under `root` and is named after its
/// [`StorageKey`], so no externally supplied string ever reaches a path.
#[derive(Debug)]
pub struct TempStore {
    root: PathBuf,
    /// Keys of scopes that were dropped before releasing; swept again by
    /// the next scope that releases normally
    orphans: Mutex<Vec<StorageKey>>,
}

impl TempStore {
    /// Open the store, creating the root directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        tracing::debug!("Temporary storage ready at {}", root.display());
        Ok(Self {
            root,
            orphans: Mutex::new(Vec::new()),
        })
    }

    /// Produce a fresh key; nothing touches the disk yet
    pub fn allocate(&self, kind: ArtifactKind, extension_hint: Option<&str>) -> StorageKey {
        let extension = extension_hint
            .and_then(sanitize_extension)
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        StorageKey::new(kind, extension)
    }

    pub fn path_of(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Persist `bytes` under `key` and flush them to disk
    ///
    /// Refuses to overwrite an existing file.
    pub async fn write(&self, key: &StorageKey, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.path_of(key);
        let write_err = |source| StorageError::Write {
            key: key.file_name(),
            source,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_err)?;
        file.write_all(bytes).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;

        tracing::trace!("Stored {} ({} bytes)", key, bytes.len());
        Ok(path)
    }

    /// Check independently that `key` is on disk with the expected size
    pub async fn confirm(&self, key: &StorageKey, expected_len: usize) -> Result<(), StorageError> {
        let metadata = tokio::fs::metadata(self.path_of(key))
            .await
            .map_err(|e| StorageError::Integrity {
                key: key.file_name(),
                detail: e.to_string(),
            })?;

        if !metadata.is_file() || metadata.len() != expected_len as u64 {
            return Err(StorageError::Integrity {
                key: key.file_name(),
                detail: format!("expected {} bytes, found {}", expected_len, metadata.len()),
            });
        }

        Ok(())
    }

    /// Remove one key; a key that was never written counts as removed
    pub async fn remove(&self, key: &StorageKey) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_of(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove {
                key: key.file_name(),
                source,
            }),
        }
    }

    /// Try to remove every key; one failure never stops the rest
    pub async fn release_all(&self, keys: &[StorageKey]) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        for key in keys {
            match self.remove(key).await {
                Ok(()) => report.released += 1,
                Err(e) => {
                    tracing::warn!("Cleanup failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn adopt_orphans(&self, keys: Vec<StorageKey>) {
        self.orphans
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(keys);
    }

    fn take_orphans(&self) -> Vec<StorageKey> {
        std::mem::take(
            &mut *self
                .orphans
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// Start tracking the keys of one request
    pub fn scope(self: &Arc<Self>) -> RequestScope {
        RequestScope {
            store: Arc::clone(self),
            keys: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }
}

/// Keys allocated while serving one request
///
/// Every key is recorded at allocation time, before anything is written,
/// and handed to [`TempStore::release_all`] by [`RequestScope::release_all`].
/// If the scope is dropped without being released (a cancelled request
/// future, for instance) the remaining files are removed synchronously.
/// A write still running on the blocking pool at that point can land after
/// the sweep, so the dropped keys are also handed back to the store and
/// removed once more when the next scope releases. A file created after
/// that second sweep is not tracked anymore.
#[derive(Debug)]
pub struct RequestScope {
    store: Arc<TempStore>,
    keys: Mutex<Vec<StorageKey>>,
    released: AtomicBool,
}

impl RequestScope {
    pub fn allocate(&self, kind: ArtifactKind, extension_hint: Option<&str>) -> StorageKey {
        let key = self.store.allocate(kind, extension_hint);
        self.keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(key.clone());
        key
    }

    pub async fn write(&self, key: &StorageKey, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        self.store.write(key, bytes).await
    }

    pub async fn confirm(&self, key: &StorageKey, expected_len: usize) -> Result<(), StorageError> {
        self.store.confirm(key, expected_len).await
    }

    pub fn allocated(&self) -> Vec<StorageKey> {
        self.keys
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Remove everything this scope allocated. Only the first call does work.
    pub async fn release_all(&self) -> ReleaseReport {
        if self.released.swap(true, Ordering::SeqCst) {
            return ReleaseReport::default();
        }

        let keys = std::mem::take(
            &mut *self
                .keys
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        let report = self.store.release_all(&keys).await;

        tracing::debug!(
            "Released {} temporary files ({} failed)",
            report.released,
            report.failed
        );

        let orphans = self.store.take_orphans();
        if !orphans.is_empty() {
            let swept = self.store.release_all(&orphans).await;
            tracing::debug!(
                "Swept {} keys left by dropped requests ({} failed)",
                swept.released,
                swept.failed
            );
        }

        report
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        if self.released.load(Ordering::SeqCst) {
            return;
        }

        let keys = self
            .keys
            .get_mut()
            .map(std::mem::take)
            .unwrap_or_else(|poisoned| std::mem::take(poisoned.into_inner()));

        for key in &keys {
            match std::fs::remove_file(self.store.path_of(key)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Cleanup on drop failed for {}: {}", key, e),
            }
        }

        if !keys.is_empty() {
            self.store.adopt_orphans(keys);
        }
    }
}

/// Lower-case an extension and reject anything that is not short and alphanumeric
pub fn sanitize_extension(raw: &str) -> Option<String> {
    let ext = raw.trim().trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || ext.len() > MAX_EXTENSION_LEN || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

/// Extension of the last path segment of a URL, if it has a usable one
pub fn extension_from_url(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.last()?;
    extension_from_file_name(segment)
}

/// Extension of a bare filename, if it has a usable one
pub fn extension_from_file_name(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    sanitize_extension(ext)
}

/// Extension conventionally used for an image content type
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}
