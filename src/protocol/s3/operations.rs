//! Storage operations trait
//!
//! Every command handler talks to the remote store through this trait, so the
//! dispatcher can run against the aws-sdk backed [`S3Client`](super::S3Client)
//! or the in-process [`MemoryStorage`](super::MemoryStorage).

use super::error::S3Result;
use super::types::{BucketInfo, BucketStats, ObjectInfo, PresignMethod, StorageStats};
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Primitive operations offered by an S3-compatible store
#[async_trait]
pub trait StorageOperations: Send + Sync {
    /// List every bucket visible to the credentials
    async fn list_buckets(&self) -> S3Result<Vec<BucketInfo>>;

    /// Create a bucket, optionally pinned to a region
    async fn make_bucket(&self, bucket: &str, region: Option<&str>) -> S3Result<()>;

    /// Delete an (empty) bucket
    async fn remove_bucket(&self, bucket: &str) -> S3Result<()>;

    /// Check whether a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> S3Result<bool>;

    /// List objects under `prefix`
    ///
    /// Non-recursive listings stop at the next `/` and report common prefixes
    /// as directory entries.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
    ) -> S3Result<Vec<ObjectInfo>>;

    /// Upload a local file
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        metadata: &HashMap<String, String>,
    ) -> S3Result<()>;

    /// Download an object into a local file, creating parent directories
    async fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> S3Result<()>;

    /// Fetch object metadata
    async fn stat_object(&self, bucket: &str, key: &str) -> S3Result<ObjectInfo>;

    /// Delete a single object
    async fn remove_object(&self, bucket: &str, key: &str) -> S3Result<()>;

    /// Server-side copy, possibly across buckets
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> S3Result<()>;

    /// Issue a presigned URL for one object
    async fn presigned_url(
        &self,
        method: PresignMethod,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> S3Result<String>;

    /// Fetch the bucket policy document
    async fn get_bucket_policy(&self, bucket: &str) -> S3Result<String>;

    /// Attach a bucket policy document
    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> S3Result<()>;

    /// Remove the bucket policy
    async fn delete_bucket_policy(&self, bucket: &str) -> S3Result<()>;

    /// Walk every bucket and total its objects
    async fn storage_stats(&self) -> S3Result<StorageStats> {
        let mut stats = StorageStats::default();

        for bucket in self.list_buckets().await? {
            let objects = self.list_objects(&bucket.name, None, true).await?;
            stats.push_bucket(BucketStats {
                object_count: objects.len() as u64,
                total_size: objects.iter().map(|o| o.size).sum(),
                bucket_name: bucket.name,
            });
        }

        Ok(stats)
    }
}

/// Opens a [`StorageOperations`] session for a validated connection config
#[async_trait]
pub trait StorageConnector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> S3Result<Arc<dyn StorageOperations>>;
}
