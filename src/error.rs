/*!
 * Error types for orbit-storage
 */

use crate::protocol::s3::S3Error;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Malformed or missing command arguments
///
/// Always raised before any remote call is attempted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The argument bag was not a JSON object
    #[error("arguments must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A required field is absent (or null)
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// A field has the wrong JSON type
    #[error("field '{field}' must be {expected}, got {found}")]
    InvalidType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// An enum field carries a value outside its closed set
    #[error("field '{field}' must be one of [{}], got '{value}'", .allowed.join(", "))]
    InvalidEnum {
        field: String,
        value: String,
        allowed: &'static [&'static str],
    },

    /// A field is well-typed but outside its legal range
    #[error("field '{field}' {message}")]
    OutOfRange { field: String, message: String },
}

impl ValidationError {
    /// Prefix the field path, used when validating items nested in arrays
    pub fn nested(self, parent: &str) -> Self {
        let join = |field: String| {
            if field.starts_with('[') {
                format!("{}{}", parent, field)
            } else {
                format!("{}.{}", parent, field)
            }
        };
        match self {
            ValidationError::MissingField(field) => ValidationError::MissingField(join(field)),
            ValidationError::InvalidType {
                field,
                expected,
                found,
            } => ValidationError::InvalidType {
                field: join(field),
                expected,
                found,
            },
            ValidationError::InvalidEnum {
                field,
                value,
                allowed,
            } => ValidationError::InvalidEnum {
                field: join(field),
                value,
                allowed,
            },
            ValidationError::OutOfRange { field, message } => ValidationError::OutOfRange {
                field: join(field),
                message,
            },
            other => other,
        }
    }
}

/// Every failure a command can end in
#[derive(Error, Debug)]
pub enum AgentError {
    /// Arguments failed schema or config validation
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A storage command arrived before any successful connect
    #[error("not connected to a storage server; call connect first")]
    NotConnected,

    /// No schema registered under this command name
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Failure surfaced by the storage layer
    #[error(transparent)]
    Storage(#[from] S3Error),

    /// Process configuration error (logging setup, startup flags)
    #[error("configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// Short category name used in structured logs
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Validation(_) => "validation",
            AgentError::NotConnected => "not_connected",
            AgentError::UnknownCommand(_) => "unknown_command",
            AgentError::Storage(_) => "storage",
            AgentError::Config(_) => "config",
        }
    }
}

/// Name of a JSON value's type, for error messages
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages() {
        let err = ValidationError::MissingField("bucketName".to_string());
        assert_eq!(err.to_string(), "missing required field 'bucketName'");

        let err = ValidationError::InvalidEnum {
            field: "method".to_string(),
            value: "PATCH".to_string(),
            allowed: &["GET", "PUT", "DELETE"],
        };
        assert_eq!(
            err.to_string(),
            "field 'method' must be one of [GET, PUT, DELETE], got 'PATCH'"
        );
    }

    #[test]
    fn test_nested_field_paths() {
        let err = ValidationError::MissingField("localPath".to_string())
            .nested("[2]")
            .nested("files");
        assert_eq!(err, ValidationError::MissingField("files[2].localPath".to_string()));
    }

    #[test]
    fn test_agent_error_categories() {
        assert_eq!(AgentError::NotConnected.category(), "not_connected");
        assert_eq!(
            AgentError::UnknownCommand("frobnicate".to_string()).category(),
            "unknown_command"
        );
        let err: AgentError = S3Error::Network("down".to_string()).into();
        assert_eq!(err.category(), "storage");
        assert_eq!(err.to_string(), "Network error: down");
    }
}
