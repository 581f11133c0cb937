//! Argument validation
//!
//! Raw argument bags are checked against the command's [`CommandSpec`]:
//! declared fields are type-checked, enums are matched exactly, defaults are
//! filled in and undeclared fields are dropped. The normalized bag is then
//! lifted into a strongly-typed [`Command`].
//!
//! JSON `null` counts as absent.

use super::schema::{self, CommandSpec, FieldKind, FieldSpec, MAX_PRESIGN_EXPIRY_SECS};
use crate::config::ConnectionConfig;
use crate::error::{json_type_name, AgentError, ValidationError};
use crate::protocol::s3::{DownloadItem, PresignMethod, UploadItem};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// A validated command, one variant per catalogue entry
#[derive(Debug, Clone)]
pub enum Command {
    Connect(ConnectionConfig),
    ListBuckets,
    CreateBucket {
        bucket: String,
        region: Option<String>,
    },
    DeleteBucket {
        bucket: String,
    },
    BucketExists {
        bucket: String,
    },
    ListObjects {
        bucket: String,
        prefix: Option<String>,
        recursive: bool,
    },
    UploadFile {
        bucket: String,
        object: String,
        file_path: PathBuf,
        metadata: HashMap<String, String>,
    },
    DownloadFile {
        bucket: String,
        object: String,
        file_path: PathBuf,
    },
    DeleteObject {
        bucket: String,
        object: String,
    },
    DeleteObjects {
        bucket: String,
        objects: Vec<String>,
    },
    CopyObject {
        source_bucket: String,
        source_object: String,
        dest_bucket: String,
        dest_object: String,
    },
    GetObjectInfo {
        bucket: String,
        object: String,
    },
    PresignedUrl {
        bucket: String,
        object: String,
        method: PresignMethod,
        expires: Duration,
    },
    StorageStats,
    UploadFiles {
        bucket: String,
        files: Vec<UploadItem>,
    },
    DownloadFiles {
        bucket: String,
        files: Vec<DownloadItem>,
    },
    SetBucketPolicy {
        bucket: String,
        policy: String,
    },
    GetBucketPolicy {
        bucket: String,
    },
    DeleteBucketPolicy {
        bucket: String,
    },
}

impl Command {
    /// Look up, validate and type a raw request
    pub fn parse(name: &str, raw: &Value) -> Result<Self, AgentError> {
        let spec =
            schema::lookup(name).ok_or_else(|| AgentError::UnknownCommand(name.to_string()))?;
        let args = validate(spec.fields, raw)?;
        Self::from_args(spec, Args(args)).map_err(AgentError::from)
    }

    /// Canonical command name
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect(_) => "connect",
            Command::ListBuckets => "list_buckets",
            Command::CreateBucket { .. } => "create_bucket",
            Command::DeleteBucket { .. } => "delete_bucket",
            Command::BucketExists { .. } => "bucket_exists",
            Command::ListObjects { .. } => "list_objects",
            Command::UploadFile { .. } => "upload_file",
            Command::DownloadFile { .. } => "download_file",
            Command::DeleteObject { .. } => "delete_object",
            Command::DeleteObjects { .. } => "delete_objects",
            Command::CopyObject { .. } => "copy_object",
            Command::GetObjectInfo { .. } => "get_object_info",
            Command::PresignedUrl { .. } => "generate_presigned_url",
            Command::StorageStats => "get_storage_stats",
            Command::UploadFiles { .. } => "upload_files",
            Command::DownloadFiles { .. } => "download_files",
            Command::SetBucketPolicy { .. } => "set_bucket_policy",
            Command::GetBucketPolicy { .. } => "get_bucket_policy",
            Command::DeleteBucketPolicy { .. } => "delete_bucket_policy",
        }
    }

    fn from_args(spec: &CommandSpec, args: Args) -> Result<Self, ValidationError> {
        let command = match spec.name {
            "connect" => Command::Connect(ConnectionConfig::from_value(&Value::Object(args.0))?),
            "list_buckets" => Command::ListBuckets,
            "create_bucket" => Command::CreateBucket {
                bucket: args.string("bucketName")?,
                region: args.opt_string("region"),
            },
            "delete_bucket" => Command::DeleteBucket {
                bucket: args.string("bucketName")?,
            },
            "bucket_exists" => Command::BucketExists {
                bucket: args.string("bucketName")?,
            },
            "list_objects" => Command::ListObjects {
                bucket: args.string("bucketName")?,
                prefix: args.opt_string("prefix"),
                recursive: args.bool("recursive")?,
            },
            "upload_file" => Command::UploadFile {
                bucket: args.string("bucketName")?,
                object: args.string("objectName")?,
                file_path: PathBuf::from(args.string("filePath")?),
                metadata: args.string_map("metadata"),
            },
            "download_file" => Command::DownloadFile {
                bucket: args.string("bucketName")?,
                object: args.string("objectName")?,
                file_path: PathBuf::from(args.string("filePath")?),
            },
            "delete_object" => Command::DeleteObject {
                bucket: args.string("bucketName")?,
                object: args.string("objectName")?,
            },
            "delete_objects" => Command::DeleteObjects {
                bucket: args.string("bucketName")?,
                objects: args.string_list("objectNames")?,
            },
            "copy_object" => Command::CopyObject {
                source_bucket: args.string("sourceBucket")?,
                source_object: args.string("sourceObject")?,
                dest_bucket: args.string("destBucket")?,
                dest_object: args.string("destObject")?,
            },
            "get_object_info" => Command::GetObjectInfo {
                bucket: args.string("bucketName")?,
                object: args.string("objectName")?,
            },
            "generate_presigned_url" => Command::PresignedUrl {
                bucket: args.string("bucketName")?,
                object: args.string("objectName")?,
                method: args.presign_method("method")?,
                expires: args.expiry("expires")?,
            },
            "get_storage_stats" => Command::StorageStats,
            "upload_files" => Command::UploadFiles {
                bucket: args.string("bucketName")?,
                files: args.records("files")?,
            },
            "download_files" => Command::DownloadFiles {
                bucket: args.string("bucketName")?,
                files: args.records("files")?,
            },
            "set_bucket_policy" => Command::SetBucketPolicy {
                bucket: args.string("bucketName")?,
                policy: args.policy("policy")?,
            },
            "get_bucket_policy" => Command::GetBucketPolicy {
                bucket: args.string("bucketName")?,
            },
            "delete_bucket_policy" => Command::DeleteBucketPolicy {
                bucket: args.string("bucketName")?,
            },
            other => {
                return Err(ValidationError::OutOfRange {
                    field: "name".to_string(),
                    message: format!("has no handler for '{}'", other),
                })
            }
        };
        Ok(command)
    }
}

/// Check `raw` against `fields` and return only the declared fields, with
/// defaults applied
pub fn validate(fields: &[FieldSpec], raw: &Value) -> Result<Map<String, Value>, ValidationError> {
    let empty = Map::new();
    let obj = match raw {
        Value::Object(obj) => obj,
        Value::Null => &empty,
        other => return Err(ValidationError::NotAnObject(json_type_name(other))),
    };

    let mut out = Map::new();
    for field in fields {
        match obj.get(field.name).filter(|v| !v.is_null()) {
            Some(value) => {
                let value = check_kind(field.name, &field.kind, value)?;
                out.insert(field.name.to_string(), value);
            }
            None if field.required => {
                return Err(ValidationError::MissingField(field.name.to_string()))
            }
            None => {
                if let Some(default) = field.default {
                    out.insert(field.name.to_string(), default.to_value());
                }
            }
        }
    }
    Ok(out)
}

fn check_kind(name: &str, kind: &FieldKind, value: &Value) -> Result<Value, ValidationError> {
    let mismatch = |expected: &'static str, found: &Value| ValidationError::InvalidType {
        field: name.to_string(),
        expected,
        found: json_type_name(found),
    };

    match (*kind, value) {
        (FieldKind::String, Value::String(_)) => Ok(value.clone()),
        (FieldKind::String, other) => Err(mismatch("a string", other)),

        (FieldKind::Number, Value::Number(_)) => Ok(value.clone()),
        (FieldKind::Number, other) => Err(mismatch("a number", other)),

        (FieldKind::Bool, Value::Bool(_)) => Ok(value.clone()),
        (FieldKind::Bool, other) => Err(mismatch("a boolean", other)),

        (FieldKind::Enum(allowed), Value::String(s)) => {
            if allowed.iter().any(|a| *a == s.as_str()) {
                Ok(value.clone())
            } else {
                Err(ValidationError::InvalidEnum {
                    field: name.to_string(),
                    value: s.clone(),
                    allowed,
                })
            }
        }
        (FieldKind::Enum(_), other) => Err(mismatch("a string", other)),

        (FieldKind::StringMap, Value::Object(map)) => {
            for (key, entry) in map {
                if !entry.is_string() {
                    return Err(ValidationError::InvalidType {
                        field: format!("{}.{}", name, key),
                        expected: "a string",
                        found: json_type_name(entry),
                    });
                }
            }
            Ok(value.clone())
        }
        (FieldKind::StringMap, other) => Err(mismatch("an object", other)),

        (FieldKind::StringList, Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                if !item.is_string() {
                    return Err(ValidationError::InvalidType {
                        field: format!("{}[{}]", name, index),
                        expected: "a string",
                        found: json_type_name(item),
                    });
                }
            }
            Ok(value.clone())
        }
        (FieldKind::StringList, other) => Err(mismatch("an array", other)),

        (FieldKind::RecordList(fields), Value::Array(items)) => {
            let mut records = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let path = format!("{}[{}]", name, index);
                if !item.is_object() {
                    return Err(ValidationError::InvalidType {
                        field: path,
                        expected: "an object",
                        found: json_type_name(item),
                    });
                }
                let record = validate(fields, item).map_err(|e| e.nested(&path))?;
                records.push(Value::Object(record));
            }
            Ok(Value::Array(records))
        }
        (FieldKind::RecordList(_), other) => Err(mismatch("an array", other)),
    }
}

/// Normalized argument bag produced by [`validate`]
struct Args(Map<String, Value>);

impl Args {
    fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    fn string(&self, field: &str) -> Result<String, ValidationError> {
        self.opt_string(field)
            .ok_or_else(|| ValidationError::MissingField(field.to_string()))
    }

    fn opt_string(&self, field: &str) -> Option<String> {
        self.get(field).and_then(Value::as_str).map(str::to_string)
    }

    fn bool(&self, field: &str) -> Result<bool, ValidationError> {
        self.get(field)
            .and_then(Value::as_bool)
            .ok_or_else(|| ValidationError::MissingField(field.to_string()))
    }

    fn string_map(&self, field: &str) -> HashMap<String, String> {
        self.get(field)
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn string_list(&self, field: &str) -> Result<Vec<String>, ValidationError> {
        let items = self
            .get(field)
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::MissingField(field.to_string()))?;
        Ok(items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect())
    }

    fn records<T: serde::de::DeserializeOwned>(&self, field: &str) -> Result<Vec<T>, ValidationError> {
        let value = self
            .get(field)
            .cloned()
            .ok_or_else(|| ValidationError::MissingField(field.to_string()))?;
        serde_json::from_value(value).map_err(|e| ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!("could not be read: {}", e),
        })
    }

    fn presign_method(&self, field: &str) -> Result<PresignMethod, ValidationError> {
        let name = self.string(field)?;
        name.parse().map_err(|_| ValidationError::InvalidEnum {
            field: field.to_string(),
            value: name,
            allowed: PresignMethod::NAMES,
        })
    }

    fn expiry(&self, field: &str) -> Result<Duration, ValidationError> {
        let out_of_range = || ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!(
                "must be a whole number of seconds between 1 and {}",
                MAX_PRESIGN_EXPIRY_SECS
            ),
        };
        let value = self
            .get(field)
            .ok_or_else(|| ValidationError::MissingField(field.to_string()))?;

        let secs = match value.as_u64() {
            Some(secs) => secs,
            // Accept integral floats such as 3600.0
            None => match value.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= 1.0 => f as u64,
                _ => return Err(out_of_range()),
            },
        };
        if !(1..=MAX_PRESIGN_EXPIRY_SECS).contains(&secs) {
            return Err(out_of_range());
        }
        Ok(Duration::from_secs(secs))
    }

    fn policy(&self, field: &str) -> Result<String, ValidationError> {
        let policy = self.string(field)?;
        serde_json::from_str::<Value>(&policy).map_err(|e| ValidationError::OutOfRange {
            field: field.to_string(),
            message: format!("must be a JSON document: {}", e),
        })?;
        Ok(policy)
    }
}
