//! S3-compatible object store backed by `aws-sdk-s3`

use super::{partial_path, ObjectEntry, ObjectStore, StoreError, StoreResult};
use crate::config::StoreConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as AwsS3Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Object store client for MinIO / S3
#[derive(Clone)]
pub struct S3Store {
    client: AwsS3Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from a validated [`StoreConfig`]
    ///
    /// The secret must already be resolved (see [`StoreConfig::resolve_secret`]).
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let secret = config.secret().ok_or_else(|| {
            StoreError::InvalidConfig(format!(
                "secret key not resolved (expected in ${})",
                config.secret_key_env
            ))
        })?;
        if config.bucket.is_empty() {
            return Err(StoreError::InvalidConfig(
                "bucket name cannot be empty".to_string(),
            ));
        }

        let credentials = Credentials::new(
            config.access_key.clone(),
            secret.to_string(),
            None,
            None,
            "cdm-ingest-explicit",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let timeout_config = aws_sdk_s3::config::timeout::TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(config.timeout_seconds))
            .build();

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .endpoint_url(&config.endpoint)
            .force_path_style(config.force_path_style)
            .timeout_config(timeout_config)
            .build();

        debug!(endpoint = %config.endpoint, bucket = %config.bucket, "S3 client configured");

        Ok(Self {
            client: AwsS3Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        })
    }

    /// Head the bucket to fail fast on a dead tunnel or bad credentials
    pub async fn test_connection(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                let text = e.to_string();
                if text.contains("403") || text.contains("AccessDenied") {
                    StoreError::AccessDenied(format!("Cannot access bucket: {}", self.bucket))
                } else {
                    StoreError::from(e)
                }
            })?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if not_found || e.to_string().contains("404") {
                    Ok(false)
                } else {
                    Err(StoreError::from(e))
                }
            }
        }
    }

    async fn put_file(&self, local_path: &Path, key: &str) -> StoreResult<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", local_path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn get_file(&self, key: &str, local_path: &Path) -> StoreResult<()> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StoreError::NotFound {
                        bucket: self.bucket.clone(),
                        key: key.to_string(),
                    }
                } else {
                    StoreError::from(e)
                }
            })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(local_path);
        let written = async {
            let mut file = File::create(&partial).await?;
            let mut body = response.body;
            while let Some(bytes) = body.try_next().await.map_err(|e| {
                StoreError::Network(format!("Failed to read response body: {}", e))
            })? {
                file.write_all(&bytes).await?;
            }
            file.flush().await?;
            Ok::<(), StoreError>(())
        }
        .await;

        match written {
            Ok(()) => {
                tokio::fs::rename(&partial, local_path).await?;
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(StoreError::from)?;

            entries.extend(response.contents().iter().filter_map(|obj| {
                Some(ObjectEntry {
                    key: obj.key()?.to_string(),
                    size: obj.size().unwrap_or(0) as u64,
                })
            }));

            if response.is_truncated().unwrap_or(false) {
                continuation_token = response.next_continuation_token().map(|s| s.to_string());
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!(prefix, count = entries.len(), "listed objects");
        Ok(entries)
    }
}
