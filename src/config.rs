/*!
 * Configuration types for orbit-storage
 *
 * `ConnectionConfig` is the validated connection descriptor. It is built
 * either from the `connect` command's argument bag or from startup flags,
 * and both paths go through [`ConnectionConfig::from_value`].
 */

use crate::error::{json_type_name, ValidationError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Port used when startup flags omit `--port`
pub const DEFAULT_PORT: u16 = 9000;

/// Region used when neither the connection nor the command names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Validated connection parameters for one S3-compatible server
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Host name or IP, without scheme or port
    pub endpoint: String,

    /// TCP port in 1..=65535
    pub port: u16,

    /// Use HTTPS instead of HTTP
    pub use_ssl: bool,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: SecretString,

    /// Region (optional)
    pub region: Option<String>,
}

impl ConnectionConfig {
    /// Create a config with `use_ssl = false` and no region
    pub fn new(
        endpoint: impl Into<String>,
        port: u16,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            port,
            use_ssl: false,
            access_key: access_key.into(),
            secret_key: SecretString::from(secret_key.into()),
            region: None,
        }
    }

    /// Validate a raw key/value bag (`endPoint`, `port`, `useSSL`, `accessKey`,
    /// `secretKey`, `region`) into a connection config
    pub fn from_value(raw: &Value) -> Result<Self, ValidationError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| ValidationError::NotAnObject(json_type_name(raw)))?;

        let endpoint = required_str(obj, "endPoint")?;
        let access_key = required_str(obj, "accessKey")?;
        let secret_key = required_str(obj, "secretKey")?;
        let port = match present(obj, "port") {
            Some(value) => parse_port(value)?,
            None => return Err(ValidationError::MissingField("port".to_string())),
        };
        let use_ssl = match present(obj, "useSSL") {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ValidationError::InvalidType {
                    field: "useSSL".to_string(),
                    expected: "a boolean",
                    found: json_type_name(other),
                })
            }
            None => false,
        };
        let region = match present(obj, "region") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::String(_)) | None => None,
            Some(other) => {
                return Err(ValidationError::InvalidType {
                    field: "region".to_string(),
                    expected: "a string",
                    found: json_type_name(other),
                })
            }
        };

        let config = Self {
            endpoint,
            port,
            use_ssl,
            access_key,
            secret_key: SecretString::from(secret_key),
            region,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoint.trim().is_empty() {
            return Err(out_of_range("endPoint", "must not be empty"));
        }
        if self.endpoint.contains("://") {
            return Err(out_of_range(
                "endPoint",
                "must be a host name without scheme (use useSSL to select https)",
            ));
        }
        if self.endpoint.contains('/') {
            return Err(out_of_range("endPoint", "must not contain a path"));
        }
        if self.port == 0 {
            return Err(out_of_range("port", "must be between 1 and 65535"));
        }
        if self.access_key.is_empty() {
            return Err(out_of_range("accessKey", "must not be empty"));
        }
        if self.secret_key.expose_secret().is_empty() {
            return Err(out_of_range("secretKey", "must not be empty"));
        }
        self.endpoint_url()?;
        Ok(())
    }

    /// Full endpoint URL, e.g. `http://localhost:9000`
    pub fn endpoint_url(&self) -> Result<Url, ValidationError> {
        let scheme = if self.use_ssl { "https" } else { "http" };
        Url::parse(&format!("{}://{}:{}", scheme, self.endpoint, self.port))
            .map_err(|e| out_of_range("endPoint", &format!("is not a valid host: {}", e)))
    }

    /// Region to sign requests for
    pub fn signing_region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// `host:port`, as shown to the caller
    pub fn address(&self) -> String {
        format!("{}:{}", self.endpoint, self.port)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("region", &self.region)
            .finish()
    }
}

fn present<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn required_str(obj: &Map<String, Value>, field: &str) -> Result<String, ValidationError> {
    match present(obj, field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ValidationError::InvalidType {
            field: field.to_string(),
            expected: "a string",
            found: json_type_name(other),
        }),
        None => Err(ValidationError::MissingField(field.to_string())),
    }
}

fn parse_port(value: &Value) -> Result<u16, ValidationError> {
    let number = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| out_of_range("port", "must be a finite number"))?,
        other => {
            return Err(ValidationError::InvalidType {
                field: "port".to_string(),
                expected: "a number",
                found: json_type_name(other),
            })
        }
    };
    if number.fract() != 0.0 {
        return Err(out_of_range("port", "must be an integer"));
    }
    if !(1.0..=65535.0).contains(&number) {
        return Err(out_of_range(
            "port",
            &format!("must be between 1 and 65535, got {}", number),
        ));
    }
    Ok(number as u16)
}

fn out_of_range(field: &str, message: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Where and how verbosely to log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level for diagnostic output
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    pub log_file: Option<PathBuf>,

    /// Shorthand for log_level = debug
    pub verbose: bool,
}
