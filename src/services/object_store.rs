//! src/services/object_store.rs
//!
//! The object store seam: a key → bytes store with content-type metadata.
//! `LocalObjectStore` keeps payloads on disk sharded beneath
//! `base_path/{shard}/{shard}/{key}`; the S3 backend lives in `s3_store`.

use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const CONTENT_TYPE_SUFFIX: &str = ".content-type";

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("invalid object key")]
    InvalidKey,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("s3 request failed: {0}")]
    S3(String),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Bytes read back from the store along with their recorded content type.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Bytes,
}

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Write `bytes` under `key`, replacing anything already there.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> ObjectStoreResult<()>;

    /// Read the object stored under `key`.
    async fn get(&self, key: &str) -> ObjectStoreResult<StoredObject>;

    /// Remove the object under `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> ObjectStoreResult<()>;

    /// Cheap reachability probe used by `/readyz`.
    async fn check(&self) -> ObjectStoreResult<()>;

    /// Whether this service itself serves objects under `/objects/{key}`.
    fn serves_locally(&self) -> bool {
        false
    }
}

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Keys produced by the photo service are always `<hex>.<ext>`, but the
/// `/objects` route hands us whatever the client sent.
pub fn ensure_key_safe(key: &str) -> ObjectStoreResult<()> {
    if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
        return Err(ObjectStoreError::InvalidKey);
    }
    if key.starts_with('/') || key.contains("..") || key.ends_with(CONTENT_TYPE_SUFFIX) {
        return Err(ObjectStoreError::InvalidKey);
    }
    if key
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return Err(ObjectStoreError::InvalidKey);
    }
    Ok(())
}

/// Disk-backed object store.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    /// Base directory on disk where object payloads are stored.
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase hex.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// base_path/{shard}/{shard}/{key}. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn content_type_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(CONTENT_TYPE_SUFFIX);
        PathBuf::from(name)
    }

    /// Write to a temp file, fsync, then rename into place.
    async fn write_atomic(parent: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, target).await
        }
        .await;

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        result
    }

    /// Remove empty shard directories up to (not including) the base path.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> ObjectStoreResult<()> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;

        // Payload first: a failed put must not leave a sidecar without an object.
        Self::write_atomic(&parent, &file_path, &bytes).await?;
        let sidecar = Self::content_type_path(&file_path);
        if let Err(err) = Self::write_atomic(&parent, &sidecar, content_type.as_bytes()).await {
            let _ = fs::remove_file(&file_path).await;
            return Err(ObjectStoreError::Io(err));
        }

        debug!(key, size_bytes = bytes.len(), "stored object on disk");
        Ok(())
    }

    async fn get(&self, key: &str) -> ObjectStoreResult<StoredObject> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let bytes = fs::read(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::NotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let content_type = match fs::read_to_string(Self::content_type_path(&file_path)).await {
            Ok(content_type) => content_type,
            Err(err) if err.kind() == ErrorKind::NotFound => "application/octet-stream".into(),
            Err(err) => return Err(ObjectStoreError::Io(err)),
        };

        Ok(StoredObject {
            content_type,
            bytes: Bytes::from(bytes),
        })
    }

    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }
        match fs::remove_file(Self::content_type_path(&file_path)).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    async fn check(&self) -> ObjectStoreResult<()> {
        fs::create_dir_all(&self.base_path).await?;
        let tmp_path = self.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let bytes = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if bytes? != b"readyz" {
            return Err(ObjectStoreError::Io(io::Error::other("file content mismatch")));
        }
        Ok(())
    }

    fn serves_locally(&self) -> bool {
        true
    }
}
