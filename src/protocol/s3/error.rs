//! Error types for S3 operations

use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use std::io;
use thiserror::Error;

/// Result type alias for S3 operations
pub type S3Result<T> = Result<T, S3Error>;

/// Errors surfaced by the storage layer
///
/// The dispatcher never inspects these beyond their message; handlers and the
/// batch orchestrator rely on `Display` to produce the text the caller sees.
#[derive(Error, Debug, Clone)]
pub enum S3Error {
    /// AWS SDK error
    #[error("AWS SDK error: {0}")]
    Sdk(String),

    /// S3 service error with specific error code
    #[error("S3 service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Object not found in bucket
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Bucket not found or not accessible
    #[error("Bucket not found or not accessible: {0}")]
    BucketNotFound(String),

    /// Bucket has no policy attached
    #[error("No policy attached to bucket: {0}")]
    NoSuchPolicy(String),

    /// Access denied error
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<S3Error>,
    },
}

impl S3Error {
    /// Add context to an error
    pub fn context<S: Into<String>>(self, context: S) -> Self {
        S3Error::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the error means the addressed bucket or object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            S3Error::NotFound { .. } | S3Error::BucketNotFound(_) => true,
            S3Error::Service { code, .. } => is_not_found_code(code),
            S3Error::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl From<io::Error> for S3Error {
    fn from(err: io::Error) -> Self {
        S3Error::Io(err.to_string())
    }
}

pub(crate) fn is_not_found_code(code: &str) -> bool {
    matches!(code, "NoSuchKey" | "NoSuchBucket" | "NotFound")
}

/// Convert AWS SDK errors to S3Error
///
/// HEAD responses carry no body, so the error code is reconstructed from the
/// HTTP status when the service did not provide one.
impl<E> From<SdkError<E>> for S3Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    fn from(error: SdkError<E>) -> Self {
        match error {
            SdkError::DispatchFailure(e) => {
                S3Error::Network(format!("Network dispatch failure: {:?}", e))
            }
            SdkError::ResponseError(e) => S3Error::Network(format!("Response error: {:?}", e)),
            SdkError::TimeoutError(_) => S3Error::Network("Request timed out".to_string()),
            SdkError::ServiceError(e) => {
                let status = e.raw().status().as_u16();
                let err = e.err();
                let code = err
                    .code()
                    .map(str::to_string)
                    .unwrap_or_else(|| status_code_name(status).to_string());
                let message = err
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP status {}", status));

                if code == "AccessDenied" {
                    S3Error::AccessDenied(message)
                } else {
                    S3Error::Service { code, message }
                }
            }
            other => S3Error::Sdk(format!("{:?}", other)),
        }
    }
}

fn status_code_name(status: u16) -> &'static str {
    match status {
        301 => "PermanentRedirect",
        403 => "AccessDenied",
        404 => "NotFound",
        409 => "Conflict",
        500 => "InternalError",
        503 => "ServiceUnavailable",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let base_error = S3Error::Io("disk full".to_string());
        let with_context = base_error.context("Failed to upload");

        assert!(matches!(with_context, S3Error::WithContext { .. }));
        assert_eq!(
            with_context.to_string(),
            "Failed to upload: I/O error: disk full"
        );
    }

    #[test]
    fn test_not_found_detection() {
        assert!(S3Error::NotFound {
            bucket: "b".to_string(),
            key: "k".to_string()
        }
        .is_not_found());
        assert!(S3Error::BucketNotFound("b".to_string()).is_not_found());
        assert!(S3Error::Service {
            code: "NoSuchKey".to_string(),
            message: "gone".to_string()
        }
        .is_not_found());
        assert!(S3Error::Service {
            code: "NotFound".to_string(),
            message: "HTTP status 404".to_string()
        }
        .context("head")
        .is_not_found());
        assert!(!S3Error::AccessDenied("nope".to_string()).is_not_found());
        assert!(!S3Error::Service {
            code: "InternalError".to_string(),
            message: "boom".to_string()
        }
        .is_not_found());
    }

    #[test]
    fn test_status_code_names() {
        assert_eq!(status_code_name(404), "NotFound");
        assert_eq!(status_code_name(403), "AccessDenied");
        assert_eq!(status_code_name(418), "Unknown");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let s3_err: S3Error = io_err.into();
        assert!(matches!(s3_err, S3Error::Io(_)));
    }

    #[test]
    fn test_error_display_formats() {
        let err = S3Error::Service {
            code: "SlowDown".to_string(),
            message: "rate limited".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "S3 service error (SlowDown): rate limited"
        );

        let err = S3Error::NotFound {
            bucket: "my-bucket".to_string(),
            key: "my-key".to_string(),
        };
        assert_eq!(format!("{}", err), "Object not found: my-bucket/my-key");

        let err = S3Error::NoSuchPolicy("photos".to_string());
        assert_eq!(format!("{}", err), "No policy attached to bucket: photos");

        let err = S3Error::Network("connection refused".to_string());
        assert_eq!(format!("{}", err), "Network error: connection refused");
    }
}
