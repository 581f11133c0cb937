/*!
 * orbit-storage - object storage command agent
 *
 * Exposes a fixed catalogue of S3 operations (buckets, objects, batch
 * transfers, presigned URLs, bucket policies, usage statistics) to an
 * external agent:
 * - Schema-driven argument validation into typed commands
 * - A dispatcher that turns every outcome into a uniform response
 * - Bounded, error-contained batch uploads, downloads and deletions
 * - aws-sdk-s3 backend for MinIO and other S3-compatible servers
 * - Line-delimited JSON-RPC front end over stdio
 */

pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use command::{Dispatcher, Response};
pub use config::ConnectionConfig;
pub use error::{AgentError, Result, ValidationError};
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
