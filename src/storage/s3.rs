use std::env;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, meta::region::RegionProviderChain};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    Client,
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
};
use aws_types::region::Region;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    ContentStream, FilenameError, StorageBackend, StorageError, StoredFile, StoredFileReference,
    validate_object_key,
};

/// Bodies up to this size go out as a single PutObject; anything larger is
/// sent as a multipart upload in parts of this size (S3 needs >= 5 MiB).
const PART_SIZE: usize = 8 * 1024 * 1024;

/// Connection settings for the S3 backend, read from the environment.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub public_url: Option<String>,
    pub prefix: String,
}

impl S3Settings {
    pub fn from_env() -> Result<Self, StorageError> {
        let bucket = env::var("S3_BUCKET")
            .map_err(|_| StorageError::Config("S3_BUCKET must be set for the s3 backend".into()))?;

        let prefix = env::var("S3_PREFIX")
            .map(|p| {
                let p = p.trim_matches('/');
                if p.is_empty() { String::new() } else { format!("{p}/") }
            })
            .unwrap_or_default();

        Ok(Self {
            bucket,
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint: env::var("S3_ENDPOINT").ok(),
            access_key: env::var("S3_ACCESS_KEY").ok(),
            secret_key: env::var("S3_SECRET_KEY").ok(),
            public_url: env::var("S3_PUBLIC_URL").ok(),
            prefix,
        })
    }
}

// AWS S3 (or S3-compatible) storage backend
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    public_url: Option<String>,
    prefix: String,
}

impl S3Storage {
    /// Build the S3 client and make sure the bucket is reachable.
    pub async fn new(settings: S3Settings) -> Result<Self, StorageError> {
        let region_provider = RegionProviderChain::first_try(Region::new(settings.region.clone()))
            .or_default_provider()
            .or_else(Region::new("us-east-1"));

        let mut aws_config_builder =
            aws_config::defaults(BehaviorVersion::latest()).region(region_provider);

        // Custom endpoint (e.g., for MinIO)
        if let Some(endpoint) = &settings.endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);

            if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key) {
                let credentials =
                    Credentials::new(access_key.clone(), secret_key.clone(), None, None, "rikka-env");
                aws_config_builder = aws_config_builder.credentials_provider(credentials);
            }
        }

        let aws_config = aws_config_builder.load().await;

        let client = Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(settings.endpoint.is_some()) // Required for MinIO
                .build(),
        );

        Self::ensure_bucket_exists(&client, &settings.bucket).await?;

        Ok(Self {
            client,
            bucket: settings.bucket,
            public_url: settings.public_url,
            prefix: settings.prefix,
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(S3Settings::from_env()?).await
    }

    /// Check the bucket, creating it if it is missing.
    async fn ensure_bucket_exists(client: &Client, bucket: &str) -> Result<(), StorageError> {
        if client.head_bucket().bucket(bucket).send().await.is_ok() {
            info!("Bucket {} exists", bucket);
            return Ok(());
        }

        match client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("Bucket {} created successfully", bucket);
                Ok(())
            }
            Err(e) => {
                let err_msg = DisplayErrorContext(&e).to_string();
                if err_msg.contains("BucketAlreadyOwnedByYou") {
                    info!("Bucket {} already exists", bucket);
                    Ok(())
                } else {
                    error!("Bucket {} does not exist and cannot be created: {}", bucket, err_msg);
                    Err(StorageError::Unavailable(format!(
                        "bucket {bucket} is not reachable: {err_msg}"
                    )))
                }
            }
        }
    }

    async fn put_single(&self, key: &str, body: Bytes) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(body.len() as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        first: BytesMut,
        content: ContentStream<'_>,
    ) -> Result<u64, StorageError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(unavailable)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StorageError::Unavailable("multipart upload returned no id".into()))?
            .to_string();

        match self.upload_parts(key, &upload_id, first, content).await {
            Ok((parts, size)) => {
                let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();
                let finished = self
                    .client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed)
                    .send()
                    .await
                    .map_err(unavailable);
                match finished {
                    Ok(_) => Ok(size),
                    Err(e) => {
                        self.abort(key, &upload_id).await;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                self.abort(key, &upload_id).await;
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        mut buffer: BytesMut,
        mut content: ContentStream<'_>,
    ) -> Result<(Vec<CompletedPart>, u64), StorageError> {
        let mut parts = Vec::new();
        let mut size = 0u64;
        let mut finished = false;

        loop {
            while !finished && buffer.len() < PART_SIZE {
                match content.next().await {
                    Some(chunk) => buffer.extend_from_slice(&chunk?),
                    None => finished = true,
                }
            }
            if buffer.is_empty() {
                break;
            }

            let part = buffer.split_to(buffer.len().min(PART_SIZE)).freeze();
            let part_number = parts.len() as i32 + 1;
            size += part.len() as u64;

            let uploaded = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .map_err(unavailable)?;
            debug!("Uploaded part {} of {}", part_number, key);

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
        }

        Ok((parts, size))
    }

    async fn abort(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            warn!("Failed to abort multipart upload of {}: {}", key, DisplayErrorContext(&e));
        }
    }
}

fn unavailable<E: std::error::Error>(e: E) -> StorageError {
    StorageError::Unavailable(DisplayErrorContext(e).to_string())
}

/// `<prefix><uuid>/<filename>`: the uuid segment keeps distinct uploads of
/// the same name apart.
fn object_key(prefix: &str, filename: &str) -> Result<String, FilenameError> {
    if filename.is_empty() {
        return Err(FilenameError::Empty);
    }
    let key = format!("{}{}/{}", prefix, Uuid::new_v4(), filename);
    validate_object_key(&key)?;
    Ok(key)
}

fn reference_for(bucket: &str, public_url: Option<&str>, key: &str) -> String {
    match public_url {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
        None => format!("s3://{bucket}/{key}"),
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn store(
        &self,
        filename: &str,
        mut content: ContentStream<'_>,
        size_hint: Option<u64>,
    ) -> Result<StoredFile, StorageError> {
        let key = object_key(&self.prefix, filename)?;

        let capacity = size_hint
            .map(|hint| (hint as usize).min(PART_SIZE))
            .unwrap_or(64 * 1024);
        let mut buffer = BytesMut::with_capacity(capacity);

        // Nothing reaches S3 until either the body ends or a full part is ready
        let mut exhausted = false;
        while buffer.len() < PART_SIZE {
            match content.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        let size = if exhausted {
            let size = buffer.len() as u64;
            self.put_single(&key, buffer.freeze()).await?;
            size
        } else {
            self.put_multipart(&key, buffer, content).await?
        };

        info!("Stored s3://{}/{} ({} bytes)", self.bucket, key, size);

        Ok(StoredFile {
            reference: StoredFileReference::new(reference_for(
                &self.bucket,
                self.public_url.as_deref(),
                &key,
            )),
            filename: filename.to_string(),
            size,
        })
    }
}
