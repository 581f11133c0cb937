//! S3-compatible storage backend
//!
//! Everything that touches the object store lives here:
//!
//! - [`StorageOperations`]: the primitive operations every command handler uses
//! - [`S3Client`]: the `aws-sdk-s3` implementation, for MinIO and other
//!   S3-compatible servers
//! - [`MemoryStorage`]: an in-process implementation on `object_store`, with
//!   fault injection
//! - [`batch`]: bounded, error-contained execution of N independent items
//!
//! # Example
//!
//! ```no_run
//! use orbit_storage::config::ConnectionConfig;
//! use orbit_storage::protocol::s3::{S3Client, StorageOperations};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConnectionConfig::new("localhost", 9000, "minioadmin", "minioadmin");
//!     let client = S3Client::connect(&config).await?;
//!
//!     for bucket in client.list_buckets().await? {
//!         println!("{}", bucket.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod client;
pub mod error;
pub mod memory;
pub mod operations;
pub mod types;

pub use batch::{run_batch, BatchConfig, BatchError, BatchResult};
pub use client::{S3Client, S3Connector};
pub use error::{S3Error, S3Result};
pub use memory::{MemoryConnector, MemoryStorage};
pub use operations::{StorageConnector, StorageOperations};
pub use types::{
    BucketInfo, BucketStats, DownloadItem, ObjectInfo, PresignMethod, StorageStats, UploadItem,
};
