//! Batch Operations
//!
//! Runs many independent transfer items (uploads, downloads, deletions)
//! against the store with bounded concurrency and per-item error containment.
//!
//! # Overview
//!
//! - **Concurrent Processing** - up to `max_concurrent` items in flight
//! - **Error Containment** - a failing item never aborts its siblings
//! - **Deterministic Results** - every item owns a preallocated slot, so the
//!   error list always follows input order regardless of completion order
//!
//! # Examples
//!
//! ```no_run
//! use orbit_storage::protocol::s3::batch::{run_batch, BatchConfig};
//! use orbit_storage::protocol::s3::{MemoryStorage, StorageOperations};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = MemoryStorage::new();
//! let keys = vec!["a.txt".to_string(), "b.txt".to_string()];
//! let result = run_batch(keys, &BatchConfig::default(), |key| {
//!     let store = &store;
//!     async move { store.remove_object("photos", &key).await }
//! })
//! .await;
//!
//! println!("Deleted: {}, Failed: {}", result.success_count, result.failure_count);
//! # }
//! ```

use super::error::S3Result;
use super::types::{DownloadItem, UploadItem};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default number of items processed concurrently
pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Upper bound accepted for `max_concurrent`
pub const MAX_CONCURRENT_LIMIT: usize = 64;

/// Configuration for batch operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of concurrent item operations (default: 8)
    pub max_concurrent: usize,
}

impl BatchConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.clamp(1, MAX_CONCURRENT_LIMIT),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// How to name an item in the aggregate error list
pub trait BatchKey {
    fn batch_key(&self) -> String;
}

impl BatchKey for String {
    fn batch_key(&self) -> String {
        self.clone()
    }
}

impl BatchKey for UploadItem {
    fn batch_key(&self) -> String {
        self.local_path.display().to_string()
    }
}

impl BatchKey for DownloadItem {
    fn batch_key(&self) -> String {
        self.object_name.clone()
    }
}

/// Lifecycle of one batch item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Pending,
    Success,
    Failure(String),
}

/// One unit of an N-item request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub key: String,
    pub outcome: BatchOutcome,
}

/// Error information for a failed batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    /// Key of the item that failed
    pub key: String,

    /// Error message
    pub error: String,
}

impl BatchError {
    pub fn new(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: error.into(),
        }
    }
}

/// Aggregate outcome of a batch
///
/// `success_count + failure_count` always equals the number of submitted
/// items and `errors.len() == failure_count`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// Number of successful items
    pub success_count: u64,

    /// Number of failed items
    pub failure_count: u64,

    /// Failed items in input order
    pub errors: Vec<BatchError>,

    /// Total time taken
    pub elapsed: Duration,
}

impl BatchResult {
    /// Aggregate completed items
    ///
    /// A slot still `Pending` counts as a failure so that every submitted
    /// item is reflected exactly once.
    pub fn from_items(items: &[BatchItem], elapsed: Duration) -> Self {
        let mut success_count = 0u64;
        let mut errors = Vec::new();

        for item in items {
            match &item.outcome {
                BatchOutcome::Success => success_count += 1,
                BatchOutcome::Failure(message) => {
                    errors.push(BatchError::new(item.key.clone(), message.clone()))
                }
                BatchOutcome::Pending => {
                    errors.push(BatchError::new(item.key.clone(), "item was never processed"))
                }
            }
        }

        Self {
            success_count,
            failure_count: errors.len() as u64,
            errors,
            elapsed,
        }
    }

    /// Number of items submitted
    pub fn total(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Check if all items succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0
    }
}

/// Run `op` once per item and aggregate the outcomes
///
/// Items are started in input order with at most `config.max_concurrent` in
/// flight. Each item's result lands in its own slot, so an error in one item
/// is recorded and the rest keep going.
pub async fn run_batch<T, F, Fut>(items: Vec<T>, config: &BatchConfig, op: F) -> BatchResult
where
    T: BatchKey,
    F: Fn(T) -> Fut,
    Fut: Future<Output = S3Result<()>>,
{
    let start_time = Instant::now();
    let max_concurrent = config.max_concurrent.max(1);

    let mut slots: Vec<BatchItem> = items
        .iter()
        .map(|item| BatchItem {
            key: item.batch_key(),
            outcome: BatchOutcome::Pending,
        })
        .collect();

    debug!(total = slots.len(), max_concurrent, "Starting batch");

    let tasks = items.into_iter().enumerate().map(|(index, item)| {
        let fut = op(item);
        async move { (index, fut.await) }
    });

    let completed: Vec<(usize, S3Result<()>)> = stream::iter(tasks)
        .buffer_unordered(max_concurrent)
        .collect()
        .await;

    for (index, result) in completed {
        let slot = &mut slots[index];
        slot.outcome = match result {
            Ok(()) => BatchOutcome::Success,
            Err(e) => {
                warn!(key = %slot.key, error = %e, "Batch item failed");
                BatchOutcome::Failure(e.to_string())
            }
        };
    }

    let result = BatchResult::from_items(&slots, start_time.elapsed());
    info!(
        succeeded = result.success_count,
        failed = result.failure_count,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Batch complete"
    );
    result
}
