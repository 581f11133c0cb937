//! Command schema registry
//!
//! A static table describing every command: its fields, their kinds, which
//! are required and what the optional ones default to. Validation in
//! [`args`](super::args) and the `tools/list` catalogue are both driven from
//! this table, so the two never disagree.

use crate::protocol::s3::PresignMethod;
use serde_json::{json, Map, Value};

/// Default presigned URL lifetime in seconds
pub const DEFAULT_PRESIGN_EXPIRY_SECS: u64 = 3600;

/// Longest presigned URL lifetime S3 accepts (7 days)
pub const MAX_PRESIGN_EXPIRY_SECS: u64 = 604_800;

/// Kind of value a field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    /// String restricted to a closed set
    Enum(&'static [&'static str]),
    /// Object whose values are all strings
    StringMap,
    /// Array of strings
    StringList,
    /// Array of objects, each validated against the nested fields
    RecordList(&'static [FieldSpec]),
}

impl FieldKind {
    /// JSON type name used in error messages and the catalogue
    pub fn json_type(&self) -> &'static str {
        match self {
            FieldKind::String | FieldKind::Enum(_) => "string",
            FieldKind::Number => "number",
            FieldKind::Bool => "boolean",
            FieldKind::StringMap => "object",
            FieldKind::StringList | FieldKind::RecordList(_) => "array",
        }
    }
}

/// Default substituted for an absent optional field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Bool(bool),
    Number(u64),
    Str(&'static str),
}

impl DefaultValue {
    pub fn to_value(self) -> Value {
        match self {
            DefaultValue::Bool(b) => Value::Bool(b),
            DefaultValue::Number(n) => Value::from(n),
            DefaultValue::Str(s) => Value::from(s),
        }
    }
}

/// One declared argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<DefaultValue>,
    pub description: &'static str,
}

const fn required(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        default: None,
        description,
    }
}

const fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        default: None,
        description,
    }
}

const fn with_default(
    name: &'static str,
    kind: FieldKind,
    default: DefaultValue,
    description: &'static str,
) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        default: Some(default),
        description,
    }
}

/// A command name and its argument schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
}

impl CommandSpec {
    /// Look up a declared field by name
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// JSON-schema-like descriptor published through `tools/list`
    pub fn input_schema(&self) -> Value {
        object_schema(self.fields)
    }
}

fn object_schema(fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        properties.insert(field.name.to_string(), field_schema(field));
    }
    let required: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name)
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn field_schema(field: &FieldSpec) -> Value {
    let mut schema = match field.kind {
        FieldKind::Enum(values) => json!({ "type": "string", "enum": values }),
        FieldKind::StringMap => json!({
            "type": "object",
            "additionalProperties": { "type": "string" },
        }),
        FieldKind::StringList => json!({ "type": "array", "items": { "type": "string" } }),
        FieldKind::RecordList(fields) => json!({ "type": "array", "items": object_schema(fields) }),
        kind => json!({ "type": kind.json_type() }),
    };
    schema["description"] = Value::from(field.description);
    if let Some(default) = field.default {
        schema["default"] = default.to_value();
    }
    schema
}

const BUCKET_NAME: FieldSpec = required("bucketName", FieldKind::String, "Bucket name");
const OBJECT_NAME: FieldSpec = required("objectName", FieldKind::String, "Object name");

const UPLOAD_ITEM_FIELDS: &[FieldSpec] = &[
    required("localPath", FieldKind::String, "Local file path"),
    OBJECT_NAME,
    optional("metadata", FieldKind::StringMap, "Object metadata"),
];

const DOWNLOAD_ITEM_FIELDS: &[FieldSpec] = &[
    OBJECT_NAME,
    required("localPath", FieldKind::String, "Local destination path"),
];

static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "connect",
        description: "Connect to an S3-compatible storage server",
        fields: &[
            required("endPoint", FieldKind::String, "Server host name or IP"),
            required("port", FieldKind::Number, "Server port"),
            with_default(
                "useSSL",
                FieldKind::Bool,
                DefaultValue::Bool(false),
                "Use HTTPS",
            ),
            required("accessKey", FieldKind::String, "Access key"),
            required("secretKey", FieldKind::String, "Secret key"),
            optional("region", FieldKind::String, "Region"),
        ],
    },
    CommandSpec {
        name: "list_buckets",
        description: "List all buckets",
        fields: &[],
    },
    CommandSpec {
        name: "create_bucket",
        description: "Create a bucket",
        fields: &[
            BUCKET_NAME,
            optional("region", FieldKind::String, "Region"),
        ],
    },
    CommandSpec {
        name: "delete_bucket",
        description: "Delete a bucket",
        fields: &[BUCKET_NAME],
    },
    CommandSpec {
        name: "bucket_exists",
        description: "Check whether a bucket exists",
        fields: &[BUCKET_NAME],
    },
    CommandSpec {
        name: "list_objects",
        description: "List objects in a bucket",
        fields: &[
            BUCKET_NAME,
            optional("prefix", FieldKind::String, "Object name prefix"),
            with_default(
                "recursive",
                FieldKind::Bool,
                DefaultValue::Bool(false),
                "List recursively",
            ),
        ],
    },
    CommandSpec {
        name: "upload_file",
        description: "Upload a file to a bucket",
        fields: &[
            BUCKET_NAME,
            OBJECT_NAME,
            required("filePath", FieldKind::String, "Local file path"),
            optional("metadata", FieldKind::StringMap, "Object metadata"),
        ],
    },
    CommandSpec {
        name: "download_file",
        description: "Download an object to a local file",
        fields: &[
            BUCKET_NAME,
            OBJECT_NAME,
            required("filePath", FieldKind::String, "Local destination path"),
        ],
    },
    CommandSpec {
        name: "delete_object",
        description: "Delete an object",
        fields: &[BUCKET_NAME, OBJECT_NAME],
    },
    CommandSpec {
        name: "delete_objects",
        description: "Delete several objects",
        fields: &[
            BUCKET_NAME,
            required("objectNames", FieldKind::StringList, "Object names"),
        ],
    },
    CommandSpec {
        name: "copy_object",
        description: "Copy an object",
        fields: &[
            required("sourceBucket", FieldKind::String, "Source bucket name"),
            required("sourceObject", FieldKind::String, "Source object name"),
            required("destBucket", FieldKind::String, "Destination bucket name"),
            required("destObject", FieldKind::String, "Destination object name"),
        ],
    },
    CommandSpec {
        name: "get_object_info",
        description: "Get object metadata",
        fields: &[BUCKET_NAME, OBJECT_NAME],
    },
    CommandSpec {
        name: "generate_presigned_url",
        description: "Generate a presigned URL",
        fields: &[
            BUCKET_NAME,
            OBJECT_NAME,
            with_default(
                "method",
                FieldKind::Enum(PresignMethod::NAMES),
                DefaultValue::Str("GET"),
                "HTTP method",
            ),
            with_default(
                "expires",
                FieldKind::Number,
                DefaultValue::Number(DEFAULT_PRESIGN_EXPIRY_SECS),
                "Expiry in seconds",
            ),
        ],
    },
    CommandSpec {
        name: "get_storage_stats",
        description: "Get storage statistics",
        fields: &[],
    },
    CommandSpec {
        name: "upload_files",
        description: "Upload several files",
        fields: &[
            BUCKET_NAME,
            required(
                "files",
                FieldKind::RecordList(UPLOAD_ITEM_FIELDS),
                "Files to upload",
            ),
        ],
    },
    CommandSpec {
        name: "download_files",
        description: "Download several objects",
        fields: &[
            BUCKET_NAME,
            required(
                "files",
                FieldKind::RecordList(DOWNLOAD_ITEM_FIELDS),
                "Objects to download",
            ),
        ],
    },
    CommandSpec {
        name: "set_bucket_policy",
        description: "Set a bucket policy",
        fields: &[
            BUCKET_NAME,
            required("policy", FieldKind::String, "Policy document (JSON)"),
        ],
    },
    CommandSpec {
        name: "get_bucket_policy",
        description: "Get a bucket policy",
        fields: &[BUCKET_NAME],
    },
    CommandSpec {
        name: "delete_bucket_policy",
        description: "Delete a bucket policy",
        fields: &[BUCKET_NAME],
    },
];

/// Alternate names accepted for registered commands
static ALIASES: &[(&str, &str)] = &[("connect_minio", "connect")];

/// Resolve an alias to its canonical command name
pub fn canonical_name(name: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| *target)
        .unwrap_or(name)
}

/// Look up a command by name or alias
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    let name = canonical_name(name);
    COMMANDS.iter().find(|spec| spec.name == name)
}

/// Every registered command, in catalogue order
pub fn all() -> &'static [CommandSpec] {
    COMMANDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_is_complete() {
        let names: HashSet<&str> = all().iter().map(|c| c.name).collect();
        assert_eq!(names.len(), all().len(), "command names must be unique");
        for name in [
            "connect",
            "list_buckets",
            "create_bucket",
            "delete_bucket",
            "bucket_exists",
            "list_objects",
            "upload_file",
            "download_file",
            "delete_object",
            "delete_objects",
            "copy_object",
            "get_object_info",
            "generate_presigned_url",
            "get_storage_stats",
            "upload_files",
            "download_files",
            "set_bucket_policy",
            "get_bucket_policy",
            "delete_bucket_policy",
        ] {
            assert!(names.contains(name), "missing command {}", name);
        }
    }

    #[test]
    fn test_lookup_and_alias() {
        assert_eq!(lookup("bucket_exists").unwrap().name, "bucket_exists");
        assert_eq!(lookup("connect_minio").unwrap().name, "connect");
        assert!(lookup("frobnicate").is_none());
    }

    #[test]
    fn test_presign_defaults() {
        let spec = lookup("generate_presigned_url").unwrap();
        let method = spec.field("method").unwrap();
        assert_eq!(method.kind, FieldKind::Enum(&["GET", "PUT", "DELETE"]));
        assert_eq!(method.default, Some(DefaultValue::Str("GET")));
        assert_eq!(
            spec.field("expires").unwrap().default,
            Some(DefaultValue::Number(3600))
        );
    }

    #[test]
    fn test_input_schema() {
        let schema = lookup("upload_files").unwrap().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["bucketName", "files"]));
        assert_eq!(schema["properties"]["files"]["type"], "array");
        assert_eq!(
            schema["properties"]["files"]["items"]["required"],
            json!(["localPath", "objectName"])
        );

        let schema = lookup("generate_presigned_url").unwrap().input_schema();
        assert_eq!(schema["properties"]["method"]["default"], "GET");
        assert_eq!(schema["properties"]["expires"]["default"], 3600);
    }

    #[test]
    fn test_required_fields_have_no_default() {
        for spec in all() {
            for field in spec.fields {
                assert!(
                    !(field.required && field.default.is_some()),
                    "{}.{} is required but has a default",
                    spec.name,
                    field.name
                );
            }
        }
    }
}
