/*!
 * Integration tests for the command dispatcher
 *
 * These tests drive the public dispatch surface against the in-memory store:
 * - Connection lifecycle and the not-connected guard
 * - Validation failures before any remote call
 * - Unknown commands
 * - Partial batch failures
 * - Reconnects waiting for in-flight commands
 * - Bucket, object and policy round trips
 */

use async_trait::async_trait;
use orbit_storage::command::{CommandOutput, Dispatcher, ErrorTag};
use orbit_storage::config::ConnectionConfig;
use orbit_storage::error::{AgentError, ValidationError};
use orbit_storage::protocol::s3::{
    MemoryConnector, MemoryStorage, S3Error, S3Result, StorageConnector, StorageOperations,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hands out a different store on every connect
struct RotatingConnector {
    stores: Mutex<VecDeque<Arc<MemoryStorage>>>,
}

#[async_trait]
impl StorageConnector for RotatingConnector {
    async fn connect(&self, _config: &ConnectionConfig) -> S3Result<Arc<dyn StorageOperations>> {
        let next = self.stores.lock().unwrap().pop_front();
        match next {
            Some(store) => Ok(store),
            None => Err(S3Error::Network("no stores left".to_string())),
        }
    }
}

fn setup() -> (Dispatcher, Arc<MemoryStorage>) {
    let store = Arc::new(MemoryStorage::new());
    let dispatcher = Dispatcher::new(Arc::new(MemoryConnector::new(store.clone())));
    (dispatcher, store)
}

fn connect_args() -> Value {
    json!({ "endPoint": "localhost", "port": 9000, "accessKey": "k", "secretKey": "s" })
}

async fn connected() -> (Dispatcher, Arc<MemoryStorage>) {
    let (dispatcher, store) = setup();
    let response = dispatcher.dispatch("connect", &connect_args()).await;
    assert!(!response.is_error(), "{}", response.joined_text());
    (dispatcher, store)
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let (dispatcher, store) = setup();

    let response = dispatcher.dispatch("connect", &connect_args()).await;
    assert!(!response.is_error());
    assert!(response.joined_text().contains("localhost:9000"));

    let response = dispatcher
        .dispatch("create_bucket", &json!({ "bucketName": "b1" }))
        .await;
    assert!(!response.is_error(), "{}", response.joined_text());

    let response = dispatcher
        .dispatch("bucket_exists", &json!({ "bucketName": "b1" }))
        .await;
    assert_eq!(response.joined_text(), "Bucket b1 exists");

    store.fail_on("b");
    let response = dispatcher
        .dispatch(
            "delete_objects",
            &json!({ "bucketName": "b1", "objectNames": ["a", "b", "c"] }),
        )
        .await;

    // Partial failure is still a success envelope
    assert!(!response.is_error());
    let structured = response.structured_content.clone().unwrap();
    assert_eq!(structured["successCount"], 2);
    assert_eq!(structured["failureCount"], 1);
    assert_eq!(structured["errors"].as_array().unwrap().len(), 1);
    assert_eq!(structured["errors"][0]["item"], "b");

    let text = response.joined_text();
    assert!(text.starts_with("Batch delete complete: 2 succeeded, 1 failed"));
    assert!(text.contains("\n- b: "));
}

#[tokio::test]
async fn test_every_storage_command_requires_connect() {
    let (dispatcher, _) = setup();
    let cases = [
        ("list_buckets", json!({})),
        ("create_bucket", json!({ "bucketName": "b1" })),
        ("delete_bucket", json!({ "bucketName": "b1" })),
        ("bucket_exists", json!({ "bucketName": "b1" })),
        ("list_objects", json!({ "bucketName": "b1" })),
        (
            "upload_file",
            json!({ "bucketName": "b1", "objectName": "o", "filePath": "/tmp/o" }),
        ),
        (
            "download_file",
            json!({ "bucketName": "b1", "objectName": "o", "filePath": "/tmp/o" }),
        ),
        ("delete_object", json!({ "bucketName": "b1", "objectName": "o" })),
        ("delete_objects", json!({ "bucketName": "b1", "objectNames": [] })),
        (
            "copy_object",
            json!({ "sourceBucket": "a", "sourceObject": "o", "destBucket": "b", "destObject": "o" }),
        ),
        ("get_object_info", json!({ "bucketName": "b1", "objectName": "o" })),
        (
            "generate_presigned_url",
            json!({ "bucketName": "b1", "objectName": "o" }),
        ),
        ("get_storage_stats", json!({})),
        ("upload_files", json!({ "bucketName": "b1", "files": [] })),
        ("download_files", json!({ "bucketName": "b1", "files": [] })),
        ("set_bucket_policy", json!({ "bucketName": "b1", "policy": "{}" })),
        ("get_bucket_policy", json!({ "bucketName": "b1" })),
        ("delete_bucket_policy", json!({ "bucketName": "b1" })),
    ];

    for (name, args) in cases {
        let err = dispatcher.execute(name, &args).await.unwrap_err();
        assert!(
            matches!(err, AgentError::NotConnected),
            "{} should require a connection, got {:?}",
            name,
            err
        );
    }
}

#[tokio::test]
async fn test_unknown_command() {
    let (dispatcher, _) = connected().await;
    let response = dispatcher.dispatch("frobnicate", &json!({})).await;
    assert_eq!(response.error, Some(ErrorTag::UnknownCommand));
    assert!(response.joined_text().contains("frobnicate"));
}

#[tokio::test]
async fn test_missing_field_fails_before_remote_call() {
    let (dispatcher, store) = connected().await;
    let err = dispatcher
        .execute("create_bucket", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Validation(ValidationError::MissingField(ref f)) if f == "bucketName"
    ));
    assert!(store.list_buckets().await.unwrap().is_empty());

    let response = dispatcher.dispatch("create_bucket", &json!({})).await;
    assert_eq!(response.error, Some(ErrorTag::Internal));
    assert!(response
        .joined_text()
        .starts_with("Error executing create_bucket:"));
}

#[tokio::test]
async fn test_connect_rejects_out_of_range_ports() {
    let (dispatcher, _) = setup();
    for port in [0, 65536] {
        let mut args = connect_args();
        args["port"] = json!(port);
        let err = dispatcher.execute("connect", &args).await.unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }
    assert!(!dispatcher.is_connected().await);
}

#[tokio::test]
async fn test_connect_alias() {
    let (dispatcher, _) = setup();
    let response = dispatcher.dispatch("connect_minio", &connect_args()).await;
    assert!(!response.is_error());
    assert!(dispatcher.is_connected().await);
}

#[tokio::test]
async fn test_presigned_url_defaults_and_enum() {
    let (dispatcher, _) = connected().await;
    dispatcher
        .execute("create_bucket", &json!({ "bucketName": "b1" }))
        .await
        .unwrap();

    let output = dispatcher
        .execute(
            "generate_presigned_url",
            &json!({ "bucketName": "b1", "objectName": "report.pdf" }),
        )
        .await
        .unwrap();
    match output {
        CommandOutput::PresignedUrl {
            method,
            expires_secs,
            url,
        } => {
            assert_eq!(method.as_str(), "GET");
            assert_eq!(expires_secs, 3600);
            assert!(url.contains("X-Amz-Method=GET"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let err = dispatcher
        .execute(
            "generate_presigned_url",
            &json!({ "bucketName": "b1", "objectName": "report.pdf", "method": "PATCH" }),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Validation(ValidationError::InvalidEnum { .. })
    ));
}

#[tokio::test]
async fn test_empty_batch() {
    let (dispatcher, _) = connected().await;
    dispatcher
        .execute("create_bucket", &json!({ "bucketName": "b1" }))
        .await
        .unwrap();
    let response = dispatcher
        .dispatch(
            "delete_objects",
            &json!({ "bucketName": "b1", "objectNames": [] }),
        )
        .await;
    assert_eq!(
        response.joined_text(),
        "Batch delete complete: 0 succeeded, 0 failed"
    );
}

#[tokio::test]
async fn test_object_and_policy_round_trip() {
    let (dispatcher, store) = connected().await;
    dispatcher
        .execute("create_bucket", &json!({ "bucketName": "src" }))
        .await
        .unwrap();
    dispatcher
        .execute("create_bucket", &json!({ "bucketName": "dst" }))
        .await
        .unwrap();
    store
        .insert_bytes("src", "reports/q1.csv", "a,b\n1,2\n")
        .await
        .unwrap();
    store.insert_bytes("src", "readme.txt", "hello").await.unwrap();

    let response = dispatcher
        .dispatch("list_objects", &json!({ "bucketName": "src" }))
        .await;
    let text = response.joined_text();
    assert!(text.starts_with("Found 2 objects in bucket src:"));
    assert!(text.contains("- reports/ (directory)"));

    let response = dispatcher
        .dispatch(
            "list_objects",
            &json!({ "bucketName": "src", "recursive": true }),
        )
        .await;
    assert!(response.joined_text().contains("- reports/q1.csv (size: 8 bytes"));

    dispatcher
        .execute(
            "copy_object",
            &json!({
                "sourceBucket": "src",
                "sourceObject": "readme.txt",
                "destBucket": "dst",
                "destObject": "copy.txt"
            }),
        )
        .await
        .unwrap();
    assert_eq!(
        store.object_bytes("dst", "copy.txt").await.unwrap().as_ref(),
        b"hello"
    );

    let response = dispatcher
        .dispatch(
            "get_object_info",
            &json!({ "bucketName": "dst", "objectName": "copy.txt" }),
        )
        .await;
    assert!(response.joined_text().contains("- Size: 5 bytes"));

    let response = dispatcher
        .dispatch("get_bucket_policy", &json!({ "bucketName": "src" }))
        .await;
    assert!(response.is_error());

    let policy = r#"{"Version":"2012-10-17","Statement":[]}"#;
    dispatcher
        .execute(
            "set_bucket_policy",
            &json!({ "bucketName": "src", "policy": policy }),
        )
        .await
        .unwrap();
    let response = dispatcher
        .dispatch("get_bucket_policy", &json!({ "bucketName": "src" }))
        .await;
    assert_eq!(
        response.joined_text(),
        format!("Policy for bucket src:\n{}", policy)
    );

    dispatcher
        .execute("delete_bucket_policy", &json!({ "bucketName": "src" }))
        .await
        .unwrap();
    assert!(dispatcher
        .dispatch("get_bucket_policy", &json!({ "bucketName": "src" }))
        .await
        .is_error());

    let response = dispatcher.dispatch("get_storage_stats", &json!({})).await;
    let text = response.joined_text();
    assert!(text.contains("- Total buckets: 2"));
    assert!(text.contains("- Total objects: 3"));

    let response = dispatcher
        .dispatch("delete_bucket", &json!({ "bucketName": "src" }))
        .await;
    assert!(response.is_error(), "non-empty bucket must not be deleted");
}

#[tokio::test]
async fn test_connect_waits_for_in_flight_batch() {
    let first = Arc::new(MemoryStorage::new().with_latency(Duration::from_millis(50)));
    let second = Arc::new(MemoryStorage::new());
    for store in [&first, &second] {
        store.make_bucket("b1", None).await.unwrap();
        for key in ["a", "b", "c"] {
            store.insert_bytes("b1", key, "x").await.unwrap();
        }
    }

    let connector = RotatingConnector {
        stores: Mutex::new(VecDeque::from([first.clone(), second.clone()])),
    };
    let dispatcher = Dispatcher::new(Arc::new(connector));
    dispatcher
        .execute("connect", &connect_args())
        .await
        .unwrap();

    let mut reconnect = connect_args();
    reconnect["port"] = json!(9001);

    let batch_args = json!({ "bucketName": "b1", "objectNames": ["a", "b", "c"] });
    let (batch, connect) = tokio::join!(
        dispatcher.dispatch("delete_objects", &batch_args),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            dispatcher.dispatch("connect", &reconnect).await
        }
    );

    assert_eq!(
        batch.joined_text(),
        "Batch delete complete: 3 succeeded, 0 failed"
    );
    assert!(!connect.is_error(), "{}", connect.joined_text());

    // The batch ran entirely against the store it started on
    for key in ["a", "b", "c"] {
        assert!(first.object_bytes("b1", key).await.is_none());
        assert!(second.object_bytes("b1", key).await.is_some());
    }
    assert_eq!(
        dispatcher.connected_address().await.as_deref(),
        Some("localhost:9001")
    );
}
