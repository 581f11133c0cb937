//! Response formatting
//!
//! Every command result is rendered into a [`Response`]: an ordered list of
//! text segments plus an error tag. Rendering is pure; it never fails.

use crate::error::AgentError;
use crate::protocol::s3::{BatchResult, BucketInfo, ObjectInfo, PresignMethod, StorageStats};
use crate::protocol::s3::types::format_timestamp;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Write;
use std::path::PathBuf;

/// One segment of a response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Dispatch-level error tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTag {
    UnknownCommand,
    Internal,
}

/// The uniform envelope every command returns
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub content: Vec<ContentItem>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorTag>,

    /// Machine-readable companion to the text, for batch results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl Response {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::Text { text: text.into() }],
            error: None,
            structured_content: None,
        }
    }

    pub fn unknown_command(name: &str) -> Self {
        Self {
            error: Some(ErrorTag::UnknownCommand),
            ..Self::text(format!("Unknown command: {}", name))
        }
    }

    /// Wrap a handler failure, naming the command
    pub fn internal_error(command: &str, error: &AgentError) -> Self {
        Self {
            error: Some(ErrorTag::Internal),
            ..Self::text(format!("Error executing {}: {}", command, error))
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// All text segments joined by newlines
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|item| match item {
                ContentItem::Text { text } => text.as_str(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Which batch command produced a [`BatchResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Delete,
    Upload,
    Download,
}

impl BatchKind {
    fn label(&self) -> &'static str {
        match self {
            BatchKind::Delete => "delete",
            BatchKind::Upload => "upload",
            BatchKind::Download => "download",
        }
    }
}

/// Typed result of a successful command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Connected {
        address: String,
    },
    Buckets(Vec<BucketInfo>),
    BucketCreated {
        bucket: String,
    },
    BucketDeleted {
        bucket: String,
    },
    BucketExists {
        bucket: String,
        exists: bool,
    },
    Objects {
        bucket: String,
        objects: Vec<ObjectInfo>,
    },
    Uploaded {
        bucket: String,
        object: String,
        file_path: PathBuf,
    },
    Downloaded {
        bucket: String,
        object: String,
        file_path: PathBuf,
    },
    ObjectDeleted {
        bucket: String,
        object: String,
    },
    Batch {
        kind: BatchKind,
        result: BatchResult,
    },
    Copied {
        source_bucket: String,
        source_object: String,
        dest_bucket: String,
        dest_object: String,
    },
    ObjectInfo(ObjectInfo),
    PresignedUrl {
        method: PresignMethod,
        expires_secs: u64,
        url: String,
    },
    Stats(StorageStats),
    PolicySet {
        bucket: String,
    },
    Policy {
        bucket: String,
        policy: String,
    },
    PolicyDeleted {
        bucket: String,
    },
}

/// Render a command result
pub fn render(output: &CommandOutput) -> Response {
    match output {
        CommandOutput::Connected { address } => {
            Response::text(format!("Connected to storage server {}", address))
        }
        CommandOutput::Buckets(buckets) => Response::text(render_buckets(buckets)),
        CommandOutput::BucketCreated { bucket } => {
            Response::text(format!("Bucket created: {}", bucket))
        }
        CommandOutput::BucketDeleted { bucket } => {
            Response::text(format!("Bucket deleted: {}", bucket))
        }
        CommandOutput::BucketExists { bucket, exists } => Response::text(format!(
            "Bucket {} {}",
            bucket,
            if *exists { "exists" } else { "does not exist" }
        )),
        CommandOutput::Objects { bucket, objects } => {
            Response::text(render_objects(bucket, objects))
        }
        CommandOutput::Uploaded {
            bucket,
            object,
            file_path,
        } => Response::text(format!(
            "Uploaded {} to {}/{}",
            file_path.display(),
            bucket,
            object
        )),
        CommandOutput::Downloaded {
            bucket,
            object,
            file_path,
        } => Response::text(format!(
            "Downloaded {}/{} to {}",
            bucket,
            object,
            file_path.display()
        )),
        CommandOutput::ObjectDeleted { bucket, object } => {
            Response::text(format!("Object deleted: {}/{}", bucket, object))
        }
        CommandOutput::Batch { kind, result } => render_batch(*kind, result),
        CommandOutput::Copied {
            source_bucket,
            source_object,
            dest_bucket,
            dest_object,
        } => Response::text(format!(
            "Copied {}/{} to {}/{}",
            source_bucket, source_object, dest_bucket, dest_object
        )),
        CommandOutput::ObjectInfo(info) => Response::text(render_object_info(info)),
        CommandOutput::PresignedUrl {
            method,
            expires_secs,
            url,
        } => Response::text(format!(
            "Presigned URL ({}, expires in {} seconds):\n{}",
            method, expires_secs, url
        )),
        CommandOutput::Stats(stats) => Response::text(render_stats(stats)),
        CommandOutput::PolicySet { bucket } => {
            Response::text(format!("Policy set for bucket {}", bucket))
        }
        CommandOutput::Policy { bucket, policy } => {
            Response::text(format!("Policy for bucket {}:\n{}", bucket, policy))
        }
        CommandOutput::PolicyDeleted { bucket } => {
            Response::text(format!("Policy deleted for bucket {}", bucket))
        }
    }
}

fn render_buckets(buckets: &[BucketInfo]) -> String {
    let mut out = format!("Found {} buckets:", buckets.len());
    for bucket in buckets {
        let _ = write!(
            out,
            "\n- {} (created: {})",
            bucket.name,
            format_timestamp(bucket.creation_date.as_ref())
        );
    }
    out
}

fn render_objects(bucket: &str, objects: &[ObjectInfo]) -> String {
    let mut out = format!("Found {} objects in bucket {}:", objects.len(), bucket);
    for object in objects {
        if object.is_dir {
            let _ = write!(out, "\n- {} (directory)", object.name);
        } else {
            let _ = write!(
                out,
                "\n- {} (size: {} bytes, modified: {})",
                object.name,
                object.size,
                format_timestamp(object.last_modified.as_ref())
            );
        }
    }
    out
}

fn render_object_info(info: &ObjectInfo) -> String {
    format!(
        "Object info:\n- Name: {}\n- Size: {} bytes\n- Last modified: {}\n- ETag: {}\n- Content type: {}",
        info.name,
        info.size,
        format_timestamp(info.last_modified.as_ref()),
        info.etag,
        info.content_type.as_deref().unwrap_or("unknown")
    )
}

/// Bytes to megabytes with two decimals
fn megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0)
}

fn render_stats(stats: &StorageStats) -> String {
    let mut out = format!(
        "Storage statistics:\n- Total buckets: {}\n- Total objects: {}\n- Total size: {}\n\nPer-bucket details:",
        stats.total_buckets,
        stats.total_objects,
        megabytes(stats.total_size)
    );
    for bucket in &stats.bucket_stats {
        let _ = write!(
            out,
            "\n- {}: {} objects, {}",
            bucket.bucket_name,
            bucket.object_count,
            megabytes(bucket.total_size)
        );
    }
    out
}

fn render_batch(kind: BatchKind, result: &BatchResult) -> Response {
    let mut text = format!(
        "Batch {} complete: {} succeeded, {} failed",
        kind.label(),
        result.success_count,
        result.failure_count
    );
    if !result.errors.is_empty() {
        text.push_str("\nErrors:");
        for error in &result.errors {
            let _ = write!(text, "\n- {}: {}", error.key, error.error);
        }
    }

    let errors: Vec<Value> = result
        .errors
        .iter()
        .map(|e| json!({ "item": e.key, "error": e.error }))
        .collect();

    Response {
        structured_content: Some(json!({
            "successCount": result.success_count,
            "failureCount": result.failure_count,
            "errors": errors,
        })),
        ..Response::text(text)
    }
}
