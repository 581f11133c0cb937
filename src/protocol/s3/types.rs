//! Type definitions for storage operations

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A bucket as reported by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name
    pub name: String,

    /// Creation timestamp, when the server reports one
    pub creation_date: Option<DateTime<Utc>>,
}

/// An object (or a common prefix in non-recursive listings)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Object key, or the prefix for directory entries
    pub name: String,

    /// Object size in bytes (0 for directory entries)
    pub size: u64,

    /// Last modified timestamp
    pub last_modified: Option<DateTime<Utc>>,

    /// ETag (entity tag), quotes stripped
    pub etag: String,

    /// Content type
    pub content_type: Option<String>,

    /// True for common prefixes returned by delimited listings
    pub is_dir: bool,
}

impl ObjectInfo {
    /// Build a directory entry for a common prefix
    pub fn directory(prefix: impl Into<String>) -> Self {
        Self {
            name: prefix.into(),
            size: 0,
            last_modified: None,
            etag: String::new(),
            content_type: None,
            is_dir: true,
        }
    }
}

/// Per-bucket totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketStats {
    pub bucket_name: String,
    pub object_count: u64,
    pub total_size: u64,
}

/// Aggregate statistics across every bucket visible to the credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub total_buckets: u64,
    pub total_objects: u64,
    pub total_size: u64,
    pub bucket_stats: Vec<BucketStats>,
}

impl StorageStats {
    /// Fold one bucket's totals into the aggregate
    pub fn push_bucket(&mut self, stats: BucketStats) {
        self.total_buckets += 1;
        self.total_objects += stats.object_count;
        self.total_size += stats.total_size;
        self.bucket_stats.push(stats);
    }
}

/// HTTP method a presigned URL is issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresignMethod {
    #[default]
    Get,
    Put,
    Delete,
}

impl PresignMethod {
    /// Wire names accepted by the command layer
    pub const NAMES: &'static [&'static str] = &["GET", "PUT", "DELETE"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresignMethod::Get => "GET",
            PresignMethod::Put => "PUT",
            PresignMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for PresignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresignMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(PresignMethod::Get),
            "PUT" => Ok(PresignMethod::Put),
            "DELETE" => Ok(PresignMethod::Delete),
            other => Err(format!("unsupported presign method: {}", other)),
        }
    }
}

/// One file of an `upload_files` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    pub local_path: PathBuf,
    pub object_name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One file of a `download_files` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    pub object_name: String,
    pub local_path: PathBuf,
}

/// Split upload metadata into the `Content-Type` header and user metadata
///
/// An explicit `Content-Type` entry (any case) wins; otherwise the type is
/// guessed from the file extension.
pub fn split_upload_metadata(
    metadata: &HashMap<String, String>,
    local_path: &Path,
) -> (Option<String>, HashMap<String, String>) {
    let mut content_type = None;
    let mut user_metadata = HashMap::with_capacity(metadata.len());
    for (key, value) in metadata {
        if key.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.clone());
        } else {
            user_metadata.insert(key.clone(), value.clone());
        }
    }
    let content_type =
        content_type.or_else(|| mime_guess::from_path(local_path).first().map(|m| m.to_string()));
    (content_type, user_metadata)
}

/// Render a timestamp the way every response does (RFC 3339, millisecond precision)
pub fn format_timestamp(ts: Option<&DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => "unknown".to_string(),
    }
}
