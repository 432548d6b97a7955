use crate::{
    config::S3Settings,
    services::object_store::{ObjectStore, ObjectStoreError, ObjectStoreResult, StoredObject},
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    Client as S3Client,
    config::{Builder as S3ConfigBuilder, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
};
use bytes::Bytes;
use tracing::{debug, info, instrument};

/// Object store backed by an S3-compatible service (AWS, Supabase Storage, MinIO).
#[derive(Clone, Debug)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub async fn new(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));

        if let (Some(key_id), Some(secret)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                key_id.clone(),
                secret.clone(),
                None,
                None,
                "photo-store-env",
            ));
        }
        let aws_config = loader.load().await;

        let mut builder = S3ConfigBuilder::from(&aws_config);
        // Custom endpoints (Supabase, MinIO) only speak path-style addressing.
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = S3Client::from_conf(builder.build());

        info!(
            bucket = %settings.bucket,
            region = %settings.region,
            endpoint = settings.endpoint.as_deref().unwrap_or("aws"),
            "S3 object store initialized"
        );

        Self {
            client,
            bucket: settings.bucket.clone(),
        }
    }
}

fn s3_error<E: std::error::Error>(err: E) -> ObjectStoreError {
    ObjectStoreError::S3(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, bytes), fields(bucket = %self.bucket, size_bytes = bytes.len()))]
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> ObjectStoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(s3_error)?;
        debug!("uploaded object");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> ObjectStoreResult<StoredObject> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    s3_error(err)
                }
            })?;

        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = output.body.collect().await.map_err(s3_error)?.into_bytes();

        Ok(StoredObject {
            content_type,
            bytes,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_error)?;
        debug!("deleted object");
        Ok(())
    }

    async fn check(&self) -> ObjectStoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(s3_error)?;
        Ok(())
    }
}
