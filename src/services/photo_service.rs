//! src/services/photo_service.rs
//!
//! PhotoService ties the object store, the id allocator and the metadata
//! repository together. Ordering rules:
//! - create: object write, then id allocation, then metadata insert
//! - delete: metadata lookup, then object delete, then metadata delete
//!
//! There is no distributed transaction. A failed insert after a successful
//! object write triggers one compensating object delete; if that fails too,
//! the object is orphaned and logged.

use crate::{
    models::photo::{PhotoRecord, PhotoView, display_name_or_default},
    services::{
        id_allocator::IdAllocator,
        object_store::{ObjectStore, ObjectStoreError, StoredObject},
        photo_repository::{PhotoRepository, RecordError},
    },
};
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_EXTENSION_LEN: usize = 10;
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum PhotoError {
    #[error("no file was uploaded")]
    MissingFile,
    #[error("photo {0} not found")]
    NotFound(i64),
    #[error("object store failure: {0}")]
    ObjectStore(#[from] ObjectStoreError),
    #[error("metadata store unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
}

impl From<RecordError> for PhotoError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::NotFound(id) => PhotoError::NotFound(id),
            RecordError::Sqlx(err) => PhotoError::StorageUnavailable(err),
        }
    }
}

pub type PhotoResult<T> = Result<T, PhotoError>;

/// An upload as received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub content: Bytes,
    pub content_type: Option<String>,
    pub original_filename: Option<String>,
    pub display_name: Option<String>,
}

/// Builds public URLs from storage keys. Never persisted.
#[derive(Clone, Debug)]
pub struct PublicUrl {
    base: String,
}

impl PublicUrl {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn for_key(&self, storage_key: &str) -> String {
        format!("{}/{}", self.base, storage_key)
    }
}

/// Random token plus the lowercased extension of `original_filename`.
///
/// The client's filename contributes nothing but a short alphanumeric
/// extension; anything else is dropped.
pub fn storage_key_for(original_filename: Option<&str>) -> String {
    let token = Uuid::new_v4().simple().to_string();
    let extension = original_filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });

    match extension {
        Some(ext) => format!("{}.{}", token, ext),
        None => token,
    }
}

#[derive(Clone)]
pub struct PhotoService {
    /// Shared SQLite pool; also used by the readiness probe.
    pub db: Arc<SqlitePool>,
    pub objects: Arc<dyn ObjectStore>,
    ids: IdAllocator,
    records: PhotoRepository,
    urls: PublicUrl,
}

impl PhotoService {
    /// Wire the service to its collaborators and make sure the id counter exists.
    pub async fn new(
        db: Arc<SqlitePool>,
        objects: Arc<dyn ObjectStore>,
        urls: PublicUrl,
    ) -> PhotoResult<Self> {
        let ids = IdAllocator::new(db.clone());
        ids.init().await?;

        Ok(Self {
            records: PhotoRepository::new(db.clone()),
            db,
            objects,
            ids,
            urls,
        })
    }

    fn view(&self, record: &PhotoRecord) -> PhotoView {
        PhotoView::new(record, self.urls.for_key(&record.storage_key))
    }

    pub async fn create_photo(&self, upload: NewPhoto) -> PhotoResult<PhotoView> {
        if upload.content.is_empty() {
            return Err(PhotoError::MissingFile);
        }

        let storage_key = storage_key_for(upload.original_filename.as_deref());
        let content_type = upload
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into());
        let size_bytes = upload.content.len() as i64;

        self.objects
            .put(&storage_key, upload.content, &content_type)
            .await?;
        debug!(key = %storage_key, size_bytes, "object written");

        let stored = match self
            .allocate_and_insert(&storage_key, &content_type, size_bytes, upload.display_name)
            .await
        {
            Ok(stored) => stored,
            Err(err) => {
                self.compensate_orphan(&storage_key).await;
                return Err(err);
            }
        };

        info!(id = stored.id, key = %stored.storage_key, "photo created");
        Ok(self.view(&stored))
    }

    async fn allocate_and_insert(
        &self,
        storage_key: &str,
        content_type: &str,
        size_bytes: i64,
        display_name: Option<String>,
    ) -> PhotoResult<PhotoRecord> {
        let id = self.ids.next().await?;
        let record = PhotoRecord {
            id,
            storage_key: storage_key.to_string(),
            display_name: display_name_or_default(display_name.as_deref()),
            content_type: content_type.to_string(),
            size_bytes,
            created_at: Utc::now(),
        };
        Ok(self.records.insert(&record).await?)
    }

    /// Best-effort removal of an object whose metadata never got written.
    async fn compensate_orphan(&self, storage_key: &str) {
        match self.objects.delete(storage_key).await {
            Ok(()) => warn!(key = %storage_key, "metadata insert failed; removed uploaded object"),
            Err(err) => error!(
                key = %storage_key,
                error = %err,
                "orphaned object: metadata insert failed and cleanup delete failed"
            ),
        }
    }

    pub async fn list_photos(&self) -> PhotoResult<Vec<PhotoView>> {
        let records = self.records.find_all().await?;
        Ok(records.iter().map(|record| self.view(record)).collect())
    }

    pub async fn get_photo(&self, id: i64) -> PhotoResult<PhotoView> {
        let record = self.records.find_by_id(id).await?;
        Ok(self.view(&record))
    }

    pub async fn rename_photo(&self, id: i64, new_name: &str) -> PhotoResult<PhotoView> {
        let name = display_name_or_default(Some(new_name));
        let record = self.records.update_display_name(id, &name).await?;
        info!(id, name = %record.display_name, "photo renamed");
        Ok(self.view(&record))
    }

    /// Remove the object first; the metadata row goes only once the object is gone.
    pub async fn delete_photo(&self, id: i64) -> PhotoResult<()> {
        let record = self.records.find_by_id(id).await?;

        self.objects.delete(&record.storage_key).await?;
        self.records.delete_by_id(id).await?;

        info!(id, key = %record.storage_key, "photo deleted");
        Ok(())
    }

    /// Read stored bytes by key, for the `/objects` route.
    pub async fn fetch_object(&self, storage_key: &str) -> PhotoResult<StoredObject> {
        Ok(self.objects.get(storage_key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::testing::temp_pool, services::object_store::LocalObjectStore};
    use async_trait::async_trait;
    use std::{
        collections::HashSet,
        io,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };
    use tempfile::TempDir;

    const BASE: &str = "https://cdn.example.com/photos";

    struct Fixture {
        service: PhotoService,
        objects: Arc<LocalObjectStore>,
        _db_dir: TempDir,
        _object_dir: TempDir,
    }

    async fn fixture() -> Fixture {
        let (pool, db_dir) = temp_pool().await;
        let object_dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(LocalObjectStore::new(object_dir.path()));
        let service = PhotoService::new(Arc::new(pool), objects.clone(), PublicUrl::new(BASE))
            .await
            .unwrap();
        Fixture {
            service,
            objects,
            _db_dir: db_dir,
            _object_dir: object_dir,
        }
    }

    fn png(name: Option<&str>) -> NewPhoto {
        NewPhoto {
            content: Bytes::from_static(b"\x89PNG\r\n\x1a\n"),
            content_type: Some("image/png".into()),
            original_filename: Some("cat.png".into()),
            display_name: name.map(str::to_string),
        }
    }

    fn key_of(url: &str) -> &str {
        url.strip_prefix(BASE).unwrap().trim_start_matches('/')
    }

    /// Records every call and fails the ones it is told to.
    #[derive(Default)]
    struct FlakyStore {
        fail_put: AtomicBool,
        fail_delete: AtomicBool,
        puts: AtomicUsize,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put(&self, _key: &str, _bytes: Bytes, _ct: &str) -> Result<(), ObjectStoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail_put.load(Ordering::SeqCst) {
                return Err(ObjectStoreError::Io(io::Error::other("put refused")));
            }
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<StoredObject, ObjectStoreError> {
            Err(ObjectStoreError::NotFound(key.to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), ObjectStoreError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(ObjectStoreError::Io(io::Error::other("delete refused")));
            }
            Ok(())
        }

        async fn check(&self) -> Result<(), ObjectStoreError> {
            Ok(())
        }
    }

    #[test]
    fn storage_key_keeps_only_a_safe_extension() {
        let key = storage_key_for(Some("Cat.PNG"));
        let (token, ext) = key.split_once('.').unwrap();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ext, "png");

        assert_eq!(storage_key_for(Some("noext")).len(), 32);
        assert_eq!(storage_key_for(None).len(), 32);
        assert!(!storage_key_for(Some("x.../../etc")).contains('/'));
        assert_eq!(storage_key_for(Some("evil.p/ng")).len(), 32);
        assert_ne!(storage_key_for(Some("a.png")), storage_key_for(Some("a.png")));
    }

    #[test]
    fn public_url_trims_trailing_slash() {
        let urls = PublicUrl::new("http://localhost:3000/objects/");
        assert_eq!(urls.for_key("k.png"), "http://localhost:3000/objects/k.png");
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_default_name() {
        let fx = fixture().await;

        let cat = fx.service.create_photo(png(Some("Cat"))).await.unwrap();
        assert_eq!(cat.id, 1);
        assert_eq!(cat.display_name, "Cat");
        assert!(cat.url.starts_with(BASE));
        assert!(cat.url.ends_with(".png"));

        let second = fx.service.create_photo(png(None)).await.unwrap();
        assert_eq!(second.id, 2);
        assert_eq!(second.display_name, "Untitled");
    }

    #[tokio::test]
    async fn created_photo_round_trips_through_the_object_store() {
        let fx = fixture().await;
        let created = fx.service.create_photo(png(Some("Cat"))).await.unwrap();

        let listed = fx.service.list_photos().await.unwrap();
        assert_eq!(listed, vec![created.clone()]);

        let object = fx.objects.get(key_of(&created.url)).await.unwrap();
        assert_eq!(object.bytes.as_ref(), b"\x89PNG\r\n\x1a\n");
        assert_eq!(object.content_type, "image/png");
    }

    #[tokio::test]
    async fn empty_upload_is_missing_file() {
        let fx = fixture().await;
        let mut upload = png(None);
        upload.content = Bytes::new();

        assert!(matches!(
            fx.service.create_photo(upload).await,
            Err(PhotoError::MissingFile)
        ));
        assert!(fx.service.list_photos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let fx = fixture().await;

        let handles = (0..20)
            .map(|i| {
                let service = fx.service.clone();
                tokio::spawn(async move {
                    service
                        .create_photo(png(Some(&format!("p{i}"))))
                        .await
                        .unwrap()
                        .id
                })
            })
            .collect::<Vec<_>>();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 20);
        assert_eq!(fx.service.list_photos().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn rename_changes_only_the_name() {
        let fx = fixture().await;
        fx.service.create_photo(png(Some("Cat"))).await.unwrap();
        let before = fx.service.create_photo(png(None)).await.unwrap();

        let renamed = fx.service.rename_photo(2, "Dog").await.unwrap();
        assert_eq!(
            renamed,
            PhotoView {
                display_name: "Dog".into(),
                ..before
            }
        );

        let listed = fx.service.list_photos().await.unwrap();
        assert_eq!(listed[1].display_name, "Dog");
        assert_eq!(listed[0].display_name, "Cat");

        assert!(matches!(
            fx.service.rename_photo(999, "X").await,
            Err(PhotoError::NotFound(999))
        ));
    }

    #[tokio::test]
    async fn delete_removes_object_and_record() {
        let fx = fixture().await;
        let created = fx.service.create_photo(png(Some("Cat"))).await.unwrap();
        let key = key_of(&created.url).to_string();

        fx.service.delete_photo(created.id).await.unwrap();

        assert!(matches!(
            fx.service.get_photo(created.id).await,
            Err(PhotoError::NotFound(_))
        ));
        assert!(matches!(
            fx.objects.get(&key).await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_unknown_id_touches_nothing() {
        let (pool, _dir) = temp_pool().await;
        let store = Arc::new(FlakyStore::default());
        let service = PhotoService::new(Arc::new(pool), store.clone(), PublicUrl::new(BASE))
            .await
            .unwrap();

        assert!(matches!(
            service.delete_photo(42).await,
            Err(PhotoError::NotFound(42))
        ));
        assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_object_delete_keeps_the_record() {
        let (pool, _dir) = temp_pool().await;
        let store = Arc::new(FlakyStore::default());
        let service = PhotoService::new(Arc::new(pool), store.clone(), PublicUrl::new(BASE))
            .await
            .unwrap();
        let created = service.create_photo(png(Some("Cat"))).await.unwrap();

        store.fail_delete.store(true, Ordering::SeqCst);
        assert!(matches!(
            service.delete_photo(created.id).await,
            Err(PhotoError::ObjectStore(_))
        ));
        assert_eq!(service.get_photo(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn failed_put_writes_no_metadata() {
        let (pool, _dir) = temp_pool().await;
        let store = Arc::new(FlakyStore::default());
        store.fail_put.store(true, Ordering::SeqCst);
        let service = PhotoService::new(Arc::new(pool), store.clone(), PublicUrl::new(BASE))
            .await
            .unwrap();

        assert!(matches!(
            service.create_photo(png(None)).await,
            Err(PhotoError::ObjectStore(_))
        ));
        assert!(service.list_photos().await.unwrap().is_empty());
        // the counter was never touched either
        store.fail_put.store(false, Ordering::SeqCst);
        assert_eq!(service.create_photo(png(None)).await.unwrap().id, 1);
    }

    #[tokio::test]
    async fn failed_insert_removes_uploaded_object() {
        let (pool, _dir) = temp_pool().await;
        let pool = Arc::new(pool);
        let store = Arc::new(FlakyStore::default());
        let service = PhotoService::new(pool.clone(), store.clone(), PublicUrl::new(BASE))
            .await
            .unwrap();

        sqlx::query("DROP TABLE photos").execute(&*pool).await.unwrap();

        assert!(matches!(
            service.create_photo(png(Some("Cat"))).await,
            Err(PhotoError::StorageUnavailable(_))
        ));
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn orphaned_object_still_reports_the_insert_failure() {
        let (pool, _dir) = temp_pool().await;
        let pool = Arc::new(pool);
        let store = Arc::new(FlakyStore::default());
        store.fail_delete.store(true, Ordering::SeqCst);
        let service = PhotoService::new(pool.clone(), store.clone(), PublicUrl::new(BASE))
            .await
            .unwrap();

        sqlx::query("DROP TABLE photos").execute(&*pool).await.unwrap();

        assert!(matches!(
            service.create_photo(png(Some("Cat"))).await,
            Err(PhotoError::StorageUnavailable(_))
        ));
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(store.deletes.load(Ordering::SeqCst), 1);
    }
}
