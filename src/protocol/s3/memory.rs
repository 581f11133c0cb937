//! In-memory storage for testing
//!
//! Each bucket is an [`object_store::memory::InMemory`] store, so object
//! bodies, ETags, timestamps and content attributes behave like a real object
//! store. Only the bucket table, policies and injected faults live here.
//! Keys registered with [`MemoryStorage::fail_on`] fail every operation that
//! touches them, which is how partial batch failures are exercised without a
//! network.
//!
//! Keys map onto `object_store` paths, so empty segments (`a//b`, a trailing
//! `/`) collapse.

use super::error::{S3Error, S3Result};
use super::operations::{StorageConnector, StorageOperations};
use super::types::{split_upload_metadata, BucketInfo, ObjectInfo, PresignMethod};
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use object_store::memory::InMemory;
use object_store::path::Path as StorePath;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutOptions, PutPayload};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
struct MemoryBucket {
    created: DateTime<Utc>,
    objects: Arc<InMemory>,
    policy: Option<String>,
}

/// Thread-safe in-process object store
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: Mutex<BTreeMap<String, MemoryBucket>>,
    failing_keys: Mutex<HashSet<String>>,
    latency: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every object operation by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every operation on `key` fail with an internal error
    pub fn fail_on(&self, key: impl Into<String>) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.into());
        }
    }

    /// Store an object from bytes, creating nothing implicitly
    pub async fn insert_bytes(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
    ) -> S3Result<()> {
        let payload = PutPayload::from_bytes(data.into());
        let objects = self.objects(bucket)?;
        objects
            .put(&object_path(key), payload)
            .await
            .map_err(|e| store_error(bucket, key, e))?;
        Ok(())
    }

    /// Object contents, if present
    pub async fn object_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let objects = self.objects(bucket).ok()?;
        let result = objects.get(&object_path(key)).await.ok()?;
        result.bytes().await.ok()
    }

    /// User metadata recorded for an object
    pub async fn object_metadata(&self, bucket: &str, key: &str) -> Option<HashMap<String, String>> {
        let objects = self.objects(bucket).ok()?;
        let result = objects.get(&object_path(key)).await.ok()?;
        Some(user_metadata(&result.attributes))
    }

    fn lock(&self) -> S3Result<MutexGuard<'_, BTreeMap<String, MemoryBucket>>> {
        self.buckets
            .lock()
            .map_err(|_| S3Error::Sdk("memory store lock poisoned".to_string()))
    }

    /// The object store behind `bucket`; the table lock is released on return
    fn objects(&self, bucket: &str) -> S3Result<Arc<InMemory>> {
        let buckets = self.lock()?;
        buckets
            .get(bucket)
            .map(|b| b.objects.clone())
            .ok_or_else(|| no_such_bucket(bucket))
    }

    fn with_bucket<T>(&self, bucket: &str, f: impl FnOnce(&mut MemoryBucket) -> T) -> S3Result<T> {
        let mut buckets = self.lock()?;
        buckets
            .get_mut(bucket)
            .map(f)
            .ok_or_else(|| no_such_bucket(bucket))
    }

    fn check_fault(&self, key: &str) -> S3Result<()> {
        let failing = self
            .failing_keys
            .lock()
            .map_err(|_| S3Error::Sdk("memory store lock poisoned".to_string()))?;
        if failing.contains(key) {
            return Err(S3Error::Service {
                code: "InternalError".to_string(),
                message: format!("injected failure for {}", key),
            });
        }
        Ok(())
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn no_such_bucket(bucket: &str) -> S3Error {
    S3Error::Service {
        code: "NoSuchBucket".to_string(),
        message: format!("The specified bucket does not exist: {}", bucket),
    }
}

fn store_error(bucket: &str, key: &str, err: object_store::Error) -> S3Error {
    match err {
        object_store::Error::NotFound { .. } => S3Error::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        other => S3Error::Sdk(format!("memory store: {}", other)),
    }
}

fn object_path(key: &str) -> StorePath {
    StorePath::from(key)
}

fn upload_attributes(content_type: Option<String>, metadata: HashMap<String, String>) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(content_type) = content_type {
        attributes.insert(Attribute::ContentType, content_type.into());
    }
    for (name, value) in metadata {
        attributes.insert(Attribute::Metadata(name.into()), value.into());
    }
    attributes
}

fn content_type(attributes: &Attributes) -> Option<String> {
    attributes
        .get(&Attribute::ContentType)
        .map(|value| value.to_string())
}

fn user_metadata(attributes: &Attributes) -> HashMap<String, String> {
    attributes
        .iter()
        .filter_map(|(attribute, value)| match attribute {
            Attribute::Metadata(name) => Some((name.to_string(), value.to_string())),
            _ => None,
        })
        .collect()
}

fn object_info(meta: &ObjectMeta, content_type: Option<String>) -> ObjectInfo {
    ObjectInfo {
        name: meta.location.to_string(),
        size: meta.size as u64,
        last_modified: Some(meta.last_modified),
        etag: meta.e_tag.clone().unwrap_or_default(),
        content_type,
        is_dir: false,
    }
}

#[async_trait]
impl StorageOperations for MemoryStorage {
    async fn list_buckets(&self) -> S3Result<Vec<BucketInfo>> {
        let buckets = self.lock()?;
        Ok(buckets
            .iter()
            .map(|(name, bucket)| BucketInfo {
                name: name.clone(),
                creation_date: Some(bucket.created),
            })
            .collect())
    }

    async fn make_bucket(&self, bucket: &str, _region: Option<&str>) -> S3Result<()> {
        let mut buckets = self.lock()?;
        if buckets.contains_key(bucket) {
            return Err(S3Error::Service {
                code: "BucketAlreadyOwnedByYou".to_string(),
                message: format!("Bucket already exists: {}", bucket),
            });
        }
        buckets.insert(
            bucket.to_string(),
            MemoryBucket {
                created: Utc::now(),
                objects: Arc::new(InMemory::new()),
                policy: None,
            },
        );
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> S3Result<()> {
        let objects = self.objects(bucket)?;
        if objects.list(None).next().await.is_some() {
            return Err(S3Error::Service {
                code: "BucketNotEmpty".to_string(),
                message: format!("The bucket you tried to delete is not empty: {}", bucket),
            });
        }
        self.lock()?.remove(bucket);
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> S3Result<bool> {
        Ok(self.lock()?.contains_key(bucket))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        recursive: bool,
    ) -> S3Result<Vec<ObjectInfo>> {
        let objects = self.objects(bucket)?;
        let prefix = prefix.unwrap_or("");

        // object_store lists whole path segments: list the enclosing
        // directory, then narrow to the raw prefix.
        let dir = prefix
            .rfind('/')
            .map(|idx| &prefix[..idx])
            .filter(|dir| !dir.is_empty())
            .map(StorePath::from);
        let list_error = |e| store_error(bucket, prefix, e);

        let mut entries = Vec::new();
        if recursive {
            let metas: Vec<ObjectMeta> = objects
                .list(dir.as_ref())
                .try_collect()
                .await
                .map_err(list_error)?;
            entries.extend(
                metas
                    .iter()
                    .filter(|meta| meta.location.as_ref().starts_with(prefix))
                    .map(|meta| object_info(meta, None)),
            );
        } else {
            let listing = objects
                .list_with_delimiter(dir.as_ref())
                .await
                .map_err(list_error)?;
            for common in &listing.common_prefixes {
                let name = format!("{}/", common);
                if name.starts_with(prefix) {
                    entries.push(ObjectInfo::directory(name));
                }
            }
            entries.extend(
                listing
                    .objects
                    .iter()
                    .filter(|meta| meta.location.as_ref().starts_with(prefix))
                    .map(|meta| object_info(meta, None)),
            );
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
        metadata: &HashMap<String, String>,
    ) -> S3Result<()> {
        self.pause().await;
        self.check_fault(key)?;
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| S3Error::from(e).context(format!("Failed to read {}", local_path.display())))?;

        let (content_type, user_metadata) = split_upload_metadata(metadata, local_path);
        let options = PutOptions {
            attributes: upload_attributes(content_type, user_metadata),
            ..Default::default()
        };

        let objects = self.objects(bucket)?;
        objects
            .put_opts(&object_path(key), PutPayload::from_bytes(Bytes::from(data)), options)
            .await
            .map_err(|e| store_error(bucket, key, e))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str, local_path: &Path) -> S3Result<()> {
        self.pause().await;
        self.check_fault(key)?;
        let objects = self.objects(bucket)?;
        let data = objects
            .get(&object_path(key))
            .await
            .map_err(|e| store_error(bucket, key, e))?
            .bytes()
            .await
            .map_err(|e| store_error(bucket, key, e))?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &data).await?;
        Ok(())
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> S3Result<ObjectInfo> {
        self.pause().await;
        self.check_fault(key)?;
        let objects = self.objects(bucket)?;
        let result = objects
            .get(&object_path(key))
            .await
            .map_err(|e| store_error(bucket, key, e))?;
        Ok(object_info(&result.meta, content_type(&result.attributes)))
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> S3Result<()> {
        self.pause().await;
        self.check_fault(key)?;
        // S3 deletes are idempotent: a missing key is not an error.
        let objects = self.objects(bucket)?;
        objects
            .delete(&object_path(key))
            .await
            .map_err(|e| store_error(bucket, key, e))
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
    ) -> S3Result<()> {
        self.pause().await;
        self.check_fault(source_key)?;
        self.check_fault(dest_key)?;
        let source = self.objects(source_bucket)?;
        let dest = self.objects(dest_bucket)?;

        let result = source
            .get(&object_path(source_key))
            .await
            .map_err(|e| store_error(source_bucket, source_key, e))?;
        let options = PutOptions {
            attributes: result.attributes.clone(),
            ..Default::default()
        };
        let data = result
            .bytes()
            .await
            .map_err(|e| store_error(source_bucket, source_key, e))?;

        dest.put_opts(&object_path(dest_key), PutPayload::from_bytes(data), options)
            .await
            .map_err(|e| store_error(dest_bucket, dest_key, e))?;
        Ok(())
    }

    async fn presigned_url(
        &self,
        method: PresignMethod,
        bucket: &str,
        key: &str,
        expires: Duration,
    ) -> S3Result<String> {
        self.check_fault(key)?;
        self.objects(bucket)?;
        Ok(format!(
            "memory://{}/{}?X-Amz-Method={}&X-Amz-Expires={}",
            bucket,
            key,
            method,
            expires.as_secs()
        ))
    }

    async fn get_bucket_policy(&self, bucket: &str) -> S3Result<String> {
        self.with_bucket(bucket, |b| b.policy.clone())?
            .ok_or_else(|| S3Error::NoSuchPolicy(bucket.to_string()))
    }

    async fn set_bucket_policy(&self, bucket: &str, policy: &str) -> S3Result<()> {
        serde_json::from_str::<serde_json::Value>(policy).map_err(|e| S3Error::Service {
            code: "MalformedPolicy".to_string(),
            message: e.to_string(),
        })?;
        self.with_bucket(bucket, |b| b.policy = Some(policy.to_string()))
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> S3Result<()> {
        self.with_bucket(bucket, |b| b.policy = None)
    }
}

/// Connector handing out one shared [`MemoryStorage`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStorage>,
    unreachable: bool,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStorage>) -> Self {
        Self {
            store,
            unreachable: false,
        }
    }

    /// A connector whose every connect attempt fails with a network error
    pub fn unreachable() -> Self {
        Self {
            store: Arc::default(),
            unreachable: true,
        }
    }
}

#[async_trait]
impl StorageConnector for MemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> S3Result<Arc<dyn StorageOperations>> {
        if self.unreachable {
            return Err(S3Error::Network(format!(
                "connection refused: {}",
                config.address()
            )));
        }
        Ok(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_with_bucket(bucket: &str) -> MemoryStorage {
        let store = MemoryStorage::new();
        store.make_bucket(bucket, None).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let store = store_with_bucket("photos").await;
        assert!(store.bucket_exists("photos").await.unwrap());
        assert!(store.make_bucket("photos", None).await.is_err());

        store.insert_bytes("photos", "cat.jpg", "meow").await.unwrap();
        let err = store.remove_bucket("photos").await.unwrap_err();
        assert!(err.to_string().contains("BucketNotEmpty"));

        store.remove_object("photos", "cat.jpg").await.unwrap();
        store.remove_bucket("photos").await.unwrap();
        assert!(!store.bucket_exists("photos").await.unwrap());
    }

    #[tokio::test]
    async fn test_delimited_listing() {
        let store = store_with_bucket("docs").await;
        for key in ["a.txt", "reports/q1.pdf", "reports/q2.pdf", "reports/old/q4.pdf"] {
            store.insert_bytes("docs", key, "x").await.unwrap();
        }

        let top = store.list_objects("docs", None, false).await.unwrap();
        let names: Vec<_> = top.iter().map(|o| (o.name.as_str(), o.is_dir)).collect();
        assert_eq!(names, vec![("a.txt", false), ("reports/", true)]);

        let nested = store
            .list_objects("docs", Some("reports/"), false)
            .await
            .unwrap();
        let names: Vec<_> = nested.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["reports/old/", "reports/q1.pdf", "reports/q2.pdf"]);

        let all = store
            .list_objects("docs", Some("reports/"), true)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|o| !o.is_dir));
    }

    #[tokio::test]
    async fn test_partial_segment_prefix() {
        let store = store_with_bucket("docs").await;
        for key in ["readme.md", "reports/q1.pdf", "reports/q2.pdf", "raw.bin"] {
            store.insert_bytes("docs", key, "x").await.unwrap();
        }

        let top = store.list_objects("docs", Some("re"), false).await.unwrap();
        let names: Vec<_> = top.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["readme.md", "reports/"]);

        let q = store
            .list_objects("docs", Some("reports/q1"), true)
            .await
            .unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].name, "reports/q1.pdf");
        assert_eq!(q[0].size, 1);
        assert!(!q[0].etag.is_empty());
    }

    #[tokio::test]
    async fn test_put_and_get_round_trip_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("report.json");
        tokio::fs::write(&src, br#"{"ok":true}"#).await.unwrap();

        let store = store_with_bucket("data").await;
        let mut metadata = HashMap::new();
        metadata.insert("owner".to_string(), "ops".to_string());
        store
            .put_object("data", "in/report.json", &src, &metadata)
            .await
            .unwrap();

        let info = store.stat_object("data", "in/report.json").await.unwrap();
        assert_eq!(info.size, 11);
        assert_eq!(info.content_type.as_deref(), Some("application/json"));
        assert!(info.last_modified.is_some());
        assert_eq!(
            store.object_metadata("data", "in/report.json").await.unwrap()["owner"],
            "ops"
        );

        let dest = tmp.path().join("nested/dir/copy.json");
        store.get_object("data", "in/report.json", &dest).await.unwrap();
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_missing_object_and_fault_injection() {
        let store = store_with_bucket("data").await;
        let err = store.stat_object("data", "nope").await.unwrap_err();
        assert!(err.is_not_found());

        let err = store.stat_object("nobucket", "nope").await.unwrap_err();
        assert!(err.is_not_found());

        store.insert_bytes("data", "flaky", "x").await.unwrap();
        store.fail_on("flaky");
        assert!(store.remove_object("data", "flaky").await.is_err());
        assert!(store.object_bytes("data", "flaky").await.is_some());
    }

    #[tokio::test]
    async fn test_presigned_url_requires_bucket() {
        let store = store_with_bucket("site").await;
        let url = store
            .presigned_url(PresignMethod::Put, "site", "index.html", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(url, "memory://site/index.html?X-Amz-Method=PUT&X-Amz-Expires=60");

        let err = store
            .presigned_url(PresignMethod::Get, "other", "index.html", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_policy_lifecycle() {
        let store = store_with_bucket("site").await;
        assert!(matches!(
            store.get_bucket_policy("site").await.unwrap_err(),
            S3Error::NoSuchPolicy(_)
        ));

        store
            .set_bucket_policy("site", r#"{"Version":"2012-10-17","Statement":[]}"#)
            .await
            .unwrap();
        assert!(store.get_bucket_policy("site").await.unwrap().contains("2012-10-17"));
        assert!(store.set_bucket_policy("site", "not json").await.is_err());

        store.delete_bucket_policy("site").await.unwrap();
        assert!(store.get_bucket_policy("site").await.is_err());
    }

    #[tokio::test]
    async fn test_copy_and_stats() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.bin");
        tokio::fs::write(&src, vec![0u8; 1024]).await.unwrap();

        let store = store_with_bucket("src").await;
        store.make_bucket("dst", None).await.unwrap();
        store.put_object("src", "a.bin", &src, &HashMap::new()).await.unwrap();
        store.copy_object("src", "a.bin", "dst", "b.bin").await.unwrap();

        let copied = store.stat_object("dst", "b.bin").await.unwrap();
        assert_eq!(copied.content_type.as_deref(), Some("application/octet-stream"));

        let stats = store.storage_stats().await.unwrap();
        assert_eq!(stats.total_buckets, 2);
        assert_eq!(stats.total_objects, 2);
        assert_eq!(stats.total_size, 2048);
    }

    #[tokio::test]
    async fn test_unreachable_connector() {
        let config = ConnectionConfig::new("localhost", 9000, "k", "s");
        let err = MemoryConnector::unreachable()
            .connect(&config)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("localhost:9000"));
    }
}
