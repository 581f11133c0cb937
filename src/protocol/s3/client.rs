//! S3 client implementation
//!
//! [`S3Client`] speaks to any S3-compatible server (MinIO, AWS, LocalStack)
//! through `aws-sdk-s3`, with static credentials and path-style addressing.

use super::error::{S3Error, S3Result};
use super::operations::{StorageConnector, StorageOperations};
use super::types::{split_upload_metadata, BucketInfo, ObjectInfo, PresignMethod};
use crate::config::{ConnectionConfig, DEFAULT_REGION};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as AwsS3Client;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Provider name attached to the static credentials
const CREDENTIALS_PROVIDER: &str = "orbit-storage-static";

/// S3 client bound to one server
#[derive(Clone)]
pub struct S3Client {
    /// AWS S3 client
    client: AwsS3Client,

    /// `host:port` of the server, for messages
    address: String,
}

impl S3Client {
    /// Build a client for the given connection
    ///
    /// No request is sent; use [`S3Client::connect`] to also verify that the
    /// server answers.
    pub async fn new(config: &ConnectionConfig) -> S3Result<Self> {
        config
            .validate()
            .map_err(|e| S3Error::InvalidConfig(e.to_string()))?;
        let endpoint = config
            .endpoint_url()
            .map_err(|e| S3Error::InvalidConfig(e.to_string()))?;

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.expose_secret().to_string(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.signing_region().to_string()))
            .credentials_provider(credentials)
            .load()
            .await;

        // MinIO needs path-style addressing
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .endpoint_url(endpoint.as_str().trim_end_matches('/'))
            .force_path_style(true)
            .build();

        Ok(Self {
            client: AwsS3Client::from_conf(s3_config),
            address: config.address(),
        })
    }

    /// Build a client and probe the server with a bucket listing
    pub async fn connect(config: &ConnectionConfig) -> S3Result<Self> {
        let client = Self::new(config).await?;
        client
            .test_connection()
            .await
            .map_err(|e| e.context(format!("Failed to reach {}", client.address)))?;
        info!(address = %client.address, "Connected to storage server");
        Ok(client)
    }

    /// Test the connection by listing buckets
    pub async fn test_connection(&self) -> S3Result<()> {
        self.client
            .list_buckets()
            .send()
            .await
            .map_err(S3Error::from)?;
        Ok(())
    }

    /// `host:port` this client talks to
    pub fn address(&self) -> &str {
        &self.address
    }
}

fn to_utc(ts: Option<&AwsDateTime>) -> Option<DateTime<Utc>> {
    ts.and_then(|dt| SystemTime::try_from(*dt).ok())
        .map(DateTime::<Utc>::from)
}

fn trim_etag(etag: Option<&str>) -> String {
    etag.map(|e| e.trim_matches('"').to_string())
        .unwrap_or_default()
}

fn not_found(bucket: &str, key: &str, err: S3Error) -> S3Error {
    if err.is_not_found() {
        S3Error::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        err
    }
}

fn policy_error(bucket: &str, err: S3Error) -> S3Error {
    match err {
        S3Error::Service { ref code, .. } if code == "NoSuchBucketPolicy" => {
            S3Error::NoSuchPolicy(bucket.to_string())
        }
        S3Error::Service { ref code, .. } if code == "NoSuchBucket" => {
            S3Error::BucketNotFound(bucket.to_string())
        }
        other => other,
    }
}

#[async_trait]
impl StorageOperations for S3Client {
    async fn list_buckets(&self) -> S3Result<Vec<BucketInfo>> {
        let mut buckets = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_buckets();
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let response = request.send().await.map_err(S3Error::from)?;

            for bucket in response.buckets() {
                if let Some(name) = bucket.name() {
                    buckets.push(BucketInfo {
                        name: name.to_string(),
                        creation_date: to_utc(bucket.creation_date()),
                    });
                }
            }

            match response.continuation_token() {
                Some(token) if !token.is_empty() => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(buckets)
    }

    async fn make_bucket(&self, bucket: &str, region: Option<&str>) -> S3Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 must not be sent as a location constraint
        if let Some(region) = region.filter(|r| *r != DEFAULT_REGION) {
            let configuration = CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build();
            request = request.create_bucket_configuration(configuration);
        }

        request.send().await.map_err(S3Error::from)?;
        debug!(bucket, "Created bucket");
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> S3Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(S3Error::from)?;
        debug!(bucket, "Removed bucket");
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> S3Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = S3Error::from(e);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
    ) -> S3Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(prefix) = prefix {
                request = request.prefix(prefix);
            }
            if !recursive {
                request = request.delimiter("/");
            }
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(S3Error::from)?;

            for common in response.common_prefixes() {
                if let Some(prefix) = common.prefix() {
                    objects.push(ObjectInfo::directory(prefix));
                }
            }

            for object in response.contents() {
                let Some(key) = object.key() else { continue };
                objects.push(ObjectInfo {
                    name: key.to_string(),
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: to_utc(object.last_modified()),
                    etag: trim_etag(object.e_tag()),
                    content_type: None,
                    is_dir: false,
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string())
                }
                _ => break,
            }
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        metadata: &HashMap<String, String>,
    ) -> S3Result<()> {
        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            S3Error::Io(format!("Failed to read {}: {}", local_path.display(), e))
        })?;
        let (content_type, user_metadata) = split_upload_metadata(metadata, local_path);

        let mut request = self.client.put_object().bucket(bucket).key(key).body(body);
        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }
        for (name, value) in user_metadata {
            request = request.metadata(name, value);
        }

        request.send().await.map_err(S3Error::from)?;
        debug!(bucket, key, path = %local_path.display(), "Uploaded object");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> S3Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| not_found(bucket, key, S3Error::from(e)))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(local_path).await?;
        let mut body = response.body;

        while let Some(bytes) = body
            .try_next()
            .await
            .map_err(|e| S3Error::Network(format!("Failed to read response body: {}", e)))?
        {
            file.write_all(&bytes).await?;
        }

        file.flush().await?;
        debug!(bucket, key, path = %local_path.display(), "Downloaded object");
        Ok(())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> S3Result<ObjectInfo> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| not_found(bucket, key, S3Error::from(e)))?;

        Ok(ObjectInfo {
            name: key.to_string(),
            size: response.content_length().unwrap_or(0).max(0) as u64,
            last_modified: to_utc(response.last_modified()),
            etag: trim_etag(response.e_tag()),
            content_type: response.content_type().map(|s| s.to_string()),
            is_dir: false,
        })
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> S3Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(S3Error::from)?;
        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> S3Result<()> {
        let copy_source = format!("{}/{}", source_bucket, source_key);

        self.client
            .copy_object()
            .copy_source(&copy_source)
            .bucket(dest_bucket)
            .key(dest_key)
            .send()
            .await
            .map_err(|e| not_found(source_bucket, source_key, S3Error::from(e)))?;
        Ok(())
    }

    async fn presigned_url(
        &self,
        method: PresignMethod,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> S3Result<String> {
        let presigning = PresigningConfig::expires_in(expires)
            .map_err(|e| S3Error::InvalidConfig(format!("Invalid presign expiry: {}", e)))?;

        let request = match method {
            PresignMethod::Get => self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(S3Error::from)?,
            PresignMethod::Put => self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(S3Error::from)?,
            PresignMethod::Delete => self
                .client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .presigned(presigning)
                .await
                .map_err(S3Error::from)?,
        };

        Ok(request.uri().to_string())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> S3Result<String> {
        let response = self
            .client
            .get_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| policy_error(bucket, S3Error::from(e)))?;

        response
            .policy()
            .map(|p| p.to_string())
            .ok_or_else(|| S3Error::NoSuchPolicy(bucket.to_string()))
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> S3Result<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|e| policy_error(bucket, S3Error::from(e)))?;
        Ok(())
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> S3Result<()> {
        self.client
            .delete_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| policy_error(bucket, S3Error::from(e)))?;
        Ok(())
    }
}

/// Connects to real servers through [`S3Client`]
#[derive(Debug, Clone, Copy, Default)]
pub struct S3Connector;

#[async_trait]
impl StorageConnector for S3Connector {
    async fn connect(&self, config: &ConnectionConfig) -> S3Result<Arc<dyn StorageOperations>> {
        let client = S3Client::connect(config).await?;
        Ok(Arc::new(client))
    }
}
