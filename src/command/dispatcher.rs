//! Command dispatcher
//!
//! Validates a raw request, runs the matching handler against the current
//! storage session and turns the outcome into a [`Response`]. The session
//! sits behind an async mutex that every command holds for its whole run,
//! so a `connect` can never swap the store out from under a command in flight.

use super::args::Command;
use super::format::{self, BatchKind, CommandOutput, Response};
use crate::config::ConnectionConfig;
use crate::error::{AgentError, Result};
use crate::protocol::s3::batch::{run_batch, BatchConfig};
use crate::protocol::s3::{StorageConnector, StorageOperations};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// An open connection
struct Session {
    config: ConnectionConfig,
    store: Arc<dyn StorageOperations>,
}

/// Routes commands to handlers
pub struct Dispatcher {
    connector: Arc<dyn StorageConnector>,
    batch_config: BatchConfig,
    session: Mutex<Option<Session>>,
}

impl Dispatcher {
    pub fn new(connector: Arc<dyn StorageConnector>) -> Self {
        Self {
            connector,
            batch_config: BatchConfig::default(),
            session: Mutex::new(None),
        }
    }

    /// Override the batch worker bound
    pub fn with_batch_config(mut self, batch_config: BatchConfig) -> Self {
        self.batch_config = batch_config;
        self
    }

    pub fn batch_config(&self) -> &BatchConfig {
        &self.batch_config
    }

    /// Whether a connect has succeeded
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// `host:port` of the current connection
    pub async fn connected_address(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.config.address())
    }

    /// Open a connection and make it the current session
    ///
    /// A failed attempt leaves any previous session in place.
    pub async fn connect(&self, config: ConnectionConfig) -> Result<String> {
        let mut session = self.session.lock().await;
        self.open_session(config, &mut session).await
    }

    /// Run a command and return its typed result
    pub async fn execute(&self, name: &str, args: &Value) -> Result<CommandOutput> {
        // Validation never touches the network or the session
        let command = Command::parse(name, args)?;

        let mut session = self.session.lock().await;
        let started = Instant::now();
        let result = self.run(command, &mut session).await;
        debug!(
            command = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Command finished"
        );
        result
    }

    /// Run a command and render the outcome; never fails
    pub async fn dispatch(&self, name: &str, args: &Value) -> Response {
        match self.execute(name, args).await {
            Ok(output) => format::render(&output),
            Err(AgentError::UnknownCommand(unknown)) => {
                warn!(command = %unknown, "Unknown command");
                Response::unknown_command(&unknown)
            }
            Err(e) => {
                warn!(command = name, category = e.category(), error = %e, "Command failed");
                Response::internal_error(name, &e)
            }
        }
    }

    async fn open_session(
        &self,
        config: ConnectionConfig,
        session: &mut Option<Session>,
    ) -> Result<String> {
        let address = config.address();
        let store = self.connector.connect(&config).await?;
        info!(address = %address, use_ssl = config.use_ssl, "Connected to storage server");
        *session = Some(Session { config, store });
        Ok(address)
    }

    async fn run(&self, command: Command, session: &mut Option<Session>) -> Result<CommandOutput> {
        let current = session.as_ref().map(|s| Arc::clone(&s.store));
        let connected = || current.as_deref().ok_or(AgentError::NotConnected);

        let output = match command {
            Command::Connect(config) => {
                let address = self.open_session(config, session).await?;
                CommandOutput::Connected { address }
            }
            Command::ListBuckets => CommandOutput::Buckets(connected()?.list_buckets().await?),
            Command::CreateBucket { bucket, region } => {
                connected()?
                    .make_bucket(&bucket, region.as_deref())
                    .await?;
                info!(bucket = %bucket, "Bucket created");
                CommandOutput::BucketCreated { bucket }
            }
            Command::DeleteBucket { bucket } => {
                connected()?.remove_bucket(&bucket).await?;
                info!(bucket = %bucket, "Bucket deleted");
                CommandOutput::BucketDeleted { bucket }
            }
            Command::BucketExists { bucket } => {
                let exists = connected()?.bucket_exists(&bucket).await?;
                CommandOutput::BucketExists { bucket, exists }
            }
            Command::ListObjects {
                bucket,
                prefix,
                recursive,
            } => {
                let objects = connected()?
                    .list_objects(&bucket, prefix.as_deref(), recursive)
                    .await?;
                CommandOutput::Objects { bucket, objects }
            }
            Command::UploadFile {
                bucket,
                object,
                file_path,
                metadata,
            } => {
                connected()?
                    .put_object(&bucket, &object, &file_path, &metadata)
                    .await?;
                CommandOutput::Uploaded {
                    bucket,
                    object,
                    file_path,
                }
            }
            Command::DownloadFile {
                bucket,
                object,
                file_path,
            } => {
                connected()?
                    .get_object(&bucket, &object, &file_path)
                    .await?;
                CommandOutput::Downloaded {
                    bucket,
                    object,
                    file_path,
                }
            }
            Command::DeleteObject { bucket, object } => {
                connected()?.remove_object(&bucket, &object).await?;
                CommandOutput::ObjectDeleted { bucket, object }
            }
            Command::DeleteObjects { bucket, objects } => {
                let store = connected()?;
                let bucket = bucket.as_str();
                let result = run_batch(objects, &self.batch_config, |key| async move {
                    store.remove_object(bucket, &key).await
                })
                .await;
                CommandOutput::Batch {
                    kind: BatchKind::Delete,
                    result,
                }
            }
            Command::CopyObject {
                source_bucket,
                source_object,
                dest_bucket,
                dest_object,
            } => {
                connected()?
                    .copy_object(&source_bucket, &source_object, &dest_bucket, &dest_object)
                    .await?;
                CommandOutput::Copied {
                    source_bucket,
                    source_object,
                    dest_bucket,
                    dest_object,
                }
            }
            Command::GetObjectInfo { bucket, object } => {
                CommandOutput::ObjectInfo(connected()?.stat_object(&bucket, &object).await?)
            }
            Command::PresignedUrl {
                bucket,
                object,
                method,
                expires,
            } => {
                let url = connected()?
                    .presigned_url(method, &bucket, &object, expires)
                    .await?;
                CommandOutput::PresignedUrl {
                    method,
                    expires_secs: expires.as_secs(),
                    url,
                }
            }
            Command::StorageStats => CommandOutput::Stats(connected()?.storage_stats().await?),
            Command::UploadFiles { bucket, files } => {
                let store = connected()?;
                let bucket = bucket.as_str();
                let result = run_batch(files, &self.batch_config, |item| async move {
                    store
                        .put_object(bucket, &item.object_name, &item.local_path, &item.metadata)
                        .await
                })
                .await;
                CommandOutput::Batch {
                    kind: BatchKind::Upload,
                    result,
                }
            }
            Command::DownloadFiles { bucket, files } => {
                let store = connected()?;
                let bucket = bucket.as_str();
                let result = run_batch(files, &self.batch_config, |item| async move {
                    store
                        .get_object(bucket, &item.object_name, &item.local_path)
                        .await
                })
                .await;
                CommandOutput::Batch {
                    kind: BatchKind::Download,
                    result,
                }
            }
            Command::SetBucketPolicy { bucket, policy } => {
                connected()?.set_bucket_policy(&bucket, &policy).await?;
                CommandOutput::PolicySet { bucket }
            }
            Command::GetBucketPolicy { bucket } => {
                let policy = connected()?.get_bucket_policy(&bucket).await?;
                CommandOutput::Policy { bucket, policy }
            }
            Command::DeleteBucketPolicy { bucket } => {
                connected()?.delete_bucket_policy(&bucket).await?;
                CommandOutput::PolicyDeleted { bucket }
            }
        };

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::s3::{MemoryConnector, MemoryStorage};
    use serde_json::json;

    fn dispatcher() -> (Dispatcher, Arc<MemoryStorage>) {
        let store = Arc::new(MemoryStorage::new());
        let connector = MemoryConnector::new(store.clone());
        (Dispatcher::new(Arc::new(connector)), store)
    }

    fn connect_args() -> Value {
        json!({ "endPoint": "localhost", "port": 9000, "accessKey": "k", "secretKey": "s" })
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .execute("list_buckets", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NotConnected));
        assert!(!dispatcher.is_connected().await);
    }

    #[tokio::test]
    async fn test_validation_precedes_connection_check() {
        let (dispatcher, _) = dispatcher();
        let err = dispatcher
            .execute("create_bucket", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_connect_then_create() {
        let (dispatcher, store) = dispatcher();
        let output = dispatcher.execute("connect", &connect_args()).await.unwrap();
        assert_eq!(
            output,
            CommandOutput::Connected {
                address: "localhost:9000".to_string()
            }
        );
        assert_eq!(
            dispatcher.connected_address().await.as_deref(),
            Some("localhost:9000")
        );

        dispatcher
            .execute("create_bucket", &json!({ "bucketName": "b1" }))
            .await
            .unwrap();
        assert!(store.bucket_exists("b1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_connect() {
        let dispatcher = Dispatcher::new(Arc::new(MemoryConnector::unreachable()));
        let err = dispatcher
            .execute("connect", &connect_args())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Storage(_)));
        assert!(err.to_string().contains("localhost:9000"));
        assert!(!dispatcher.is_connected().await);
    }

    #[tokio::test]
    async fn test_dispatch_wraps_storage_errors() {
        let (dispatcher, _) = dispatcher();
        dispatcher.execute("connect", &connect_args()).await.unwrap();

        let response = dispatcher
            .dispatch("delete_bucket", &json!({ "bucketName": "missing" }))
            .await;
        assert!(response.is_error());
        assert!(response
            .joined_text()
            .starts_with("Error executing delete_bucket:"));
        assert!(response.joined_text().contains("NoSuchBucket"));
    }

    #[tokio::test]
    async fn test_delete_objects_contains_failures() {
        let (dispatcher, store) = dispatcher();
        dispatcher.execute("connect", &connect_args()).await.unwrap();
        dispatcher
            .execute("create_bucket", &json!({ "bucketName": "b1" }))
            .await
            .unwrap();
        store.fail_on("b");

        let output = dispatcher
            .execute(
                "delete_objects",
                &json!({ "bucketName": "b1", "objectNames": ["a", "b", "c"] }),
            )
            .await
            .unwrap();
        match output {
            CommandOutput::Batch { kind, result } => {
                assert_eq!(kind, BatchKind::Delete);
                assert_eq!(result.success_count, 2);
                assert_eq!(result.failure_count, 1);
                assert_eq!(result.errors.len(), 1);
                assert_eq!(result.errors[0].key, "b");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_config_is_used() {
        let (dispatcher, _) = dispatcher();
        let dispatcher = dispatcher.with_batch_config(BatchConfig::new(2));
        assert_eq!(dispatcher.batch_config().max_concurrent, 2);
    }
}
